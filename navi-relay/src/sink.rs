//! Conversation record sinks.
//!
//! Every `/prompt` request emits one [`ConversationRecord`] after the
//! completion call resolves. Delivery is fire-and-forget: a sink must
//! never block or fail the request path, so write errors are logged and
//! dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use navi_common::util::truncate_with_ellipsis;

/// One logged conversation turn.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversationRecord {
    /// Record a successful turn.
    pub fn reply(session_id: &str, prompt: &str, response: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            response: Some(response.to_string()),
            error: None,
        }
    }

    /// Record a failed turn.
    pub fn failure(session_id: &str, prompt: &str, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            response: None,
            error: Some(error.to_string()),
        }
    }
}

/// Capability: record one conversation event.
pub trait ConversationSink: Send + Sync {
    fn record(&self, record: ConversationRecord);
}

/// Sink that discards everything. Used in tests and when no log
/// destinations are configured.
pub struct NullSink;

impl ConversationSink for NullSink {
    fn record(&self, _record: ConversationRecord) {}
}

// ============================================================================
// File sink
// ============================================================================

/// Appends one JSON line per conversation turn to a log file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the log file. Failure here is fatal to startup.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open conversation log: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationSink for FileSink {
    fn record(&self, record: ConversationRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize conversation record");
                return;
            }
        };

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to write conversation record"
            );
        }
    }
}

// ============================================================================
// Webhook sink
// ============================================================================

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const WEBHOOK_USERNAME: &str = "navi-relay";
const PROMPT_PREVIEW_CHARS: usize = 100;
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Discord-style webhook payload.
#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: String,
    username: String,
}

/// Posts a short summary of each conversation turn to a webhook.
///
/// Delivery happens on a spawned task; requires a Tokio runtime.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn format_content(record: &ConversationRecord) -> String {
        match (&record.response, &record.error) {
            (Some(response), _) => format!(
                "**New conversation**\nSession: {}\nUser: {}\nAI: {}",
                record.session_id,
                truncate_with_ellipsis(&record.prompt, PROMPT_PREVIEW_CHARS),
                truncate_with_ellipsis(response, RESPONSE_PREVIEW_CHARS),
            ),
            (None, Some(error)) => format!(
                "**Completion error**\nSession: {}\nError: {}",
                record.session_id, error,
            ),
            (None, None) => format!(
                "**New conversation**\nSession: {}\nUser: {}",
                record.session_id,
                truncate_with_ellipsis(&record.prompt, PROMPT_PREVIEW_CHARS),
            ),
        }
    }
}

impl ConversationSink for WebhookSink {
    fn record(&self, record: ConversationRecord) {
        let payload = WebhookPayload {
            content: Self::format_content(&record),
            username: WEBHOOK_USERNAME.to_string(),
        };
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        "webhook delivery rejected"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "webhook delivery failed");
                }
            }
        });
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Dispatches each record to every configured sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ConversationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ConversationSink>>) -> Self {
        Self { sinks }
    }
}

impl ConversationSink for FanoutSink {
    fn record(&self, record: ConversationRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}
