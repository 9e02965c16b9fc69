//! Completion gateway boundary.
//!
//! Abstracts the outbound text-completion API behind a trait so the
//! request handler (and its tests) never depend on a live upstream.

mod gemini;

pub use gemini::GeminiGateway;

use async_trait::async_trait;

use crate::session::Message;

/// Stateless adapter from a message history to one completion call.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Get the gateway name.
    fn name(&self) -> &str;

    /// Produce one assistant reply for the given history.
    ///
    /// Single attempt, bounded timeout; retry policy belongs to callers.
    async fn complete(&self, history: &[Message]) -> Result<String, GatewayError>;
}

/// Error from the upstream completion API.
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub gateway: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl GatewayError {
    pub fn new(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "[{}:{}] {}", self.gateway, status, self.message),
            None => write!(f, "[{}] {}", self.gateway, self.message),
        }
    }
}

impl std::error::Error for GatewayError {}
