//! Google Gemini completion gateway.
//!
//! Speaks the `generateContent` API. The whole history is flattened
//! into a single role-labelled conversation text, which keeps the
//! request shape independent of Gemini's role vocabulary.

use super::{CompletionGateway, GatewayError};
use crate::session::{Message, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gemini `generateContent` adapter.
pub struct GeminiGateway {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiGateway {
    /// Create a new Gemini gateway for the given key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Override the API base URL (tests point this at a local mock).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Flatten the history into one labelled conversation text.
    fn flatten_history(history: &[Message]) -> String {
        let mut text = String::new();
        for message in history {
            text.push_str(message.role.as_str());
            text.push_str(": ");
            text.push_str(&message.content);
            match message.role {
                Role::System => text.push_str("\n\n"),
                Role::User | Role::Assistant => text.push('\n'),
            }
        }
        text
    }
}

#[async_trait]
impl CompletionGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, history: &[Message]) -> Result<String, GatewayError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Self::flatten_history(history),
                }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::new("gemini", format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::new(
                "gemini",
                format!("API error ({}): {}", status.as_u16(), body),
            )
            .with_status(status.as_u16()));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::new("gemini", format!("failed to parse response: {e}")))?;

        let candidate = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| GatewayError::new("gemini", "no candidates in response"))?;

        candidate
            .content
            .parts
            .and_then(|p| p.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| GatewayError::new("gemini", "no content parts in response"))
    }
}
