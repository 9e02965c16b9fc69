//! Error types for the Navi relay.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Request-path error taxonomy for the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request body
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    /// Empty session identifier
    #[error("Session ID is required")]
    MissingSessionId,

    /// Empty prompt
    #[error("Prompt is required")]
    MissingPrompt,

    /// Missing or unusable startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream completion API failure
    #[error("Completion API error: {0}")]
    Gateway(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::MissingSessionId | Self::MissingPrompt => 400,
            Self::Config(_) | Self::Gateway(_) | Self::Io(_) => 500,
        }
    }

    /// Check whether this error is the caller's fault.
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
