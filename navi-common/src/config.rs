//! Configuration for the Navi relay.
//!
//! Resolution priority:
//!
//! 1. CLI flags (applied by the binary on top of the loaded config)
//! 2. Environment variables
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `GEMINI_API_KEY` → llm.api_key
//! - `GOOGLE_API_KEY` → llm.api_key (fallback)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Base system prompt seeded into every new session unless overridden
/// with a prompt file.
pub const DEFAULT_BASE_PROMPT: &str = "\
You are Navi - a deeply insightful, human-like travel expert and local insider, \
trusted for personalized, accurate, and culturally rich travel guidance.

Your responsibilities:
- Recommend local attractions, hidden gems, and offbeat travel spots with \
alley-level precision
- Provide personalized food and cafe suggestions with must-try dishes and \
insider tips
- Create quick or full-day itineraries tailored to the user's tone, time \
constraints, and location

Response rules:
1. Be hyper-specific: exact names, entry times, fees, ideal visiting hours
2. Format clearly: bullet points, short sections, category headings
3. Write in a natural, engaging tone - like a passionate travel blogger, not an AI
4. If the user is vague, ask 1-2 clarifying questions and suggest something \
smart in the meantime
5. Never include disclaimers about being an AI";

// ============================================================================
// Server
// ============================================================================

/// HTTP server bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

const fn default_port() -> u16 {
    8080
}

// ============================================================================
// Sessions
// ============================================================================

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a session may sit idle before the sweeper evicts it.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum messages retained per session (system message included).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl SessionConfig {
    /// Idle timeout as a `Duration`.
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a `Duration`.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_history: default_max_history(),
        }
    }
}

const fn default_idle_timeout_secs() -> u64 {
    60
}

const fn default_sweep_interval_secs() -> u64 {
    30
}

const fn default_max_history() -> usize {
    20
}

// ============================================================================
// LLM
// ============================================================================

/// Upstream completion API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model to request from the completion API.
    #[serde(default = "default_model")]
    pub model: String,

    /// Explicit API key. Falls back to `GEMINI_API_KEY` then
    /// `GOOGLE_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional path to a file holding the base system prompt.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
}

impl LlmConfig {
    /// Resolve the API key: explicit config value first, then the
    /// environment chain. Empty strings count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()))
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    /// Load the base system prompt.
    ///
    /// Reads `prompt_file` when set, falling back to the compiled-in
    /// default (with a warning) when the file is unreadable or empty.
    pub fn load_base_prompt(&self) -> String {
        let Some(ref path) = self.prompt_file else {
            return DEFAULT_BASE_PROMPT.to_string();
        };

        match std::fs::read_to_string(path) {
            Ok(prompt) if !prompt.trim().is_empty() => {
                tracing::info!(path = %path.display(), "loaded base prompt from file");
                prompt
            }
            Ok(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "prompt file is empty, using default base prompt"
                );
                DEFAULT_BASE_PROMPT.to_string()
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "could not read prompt file, using default base prompt"
                );
                DEFAULT_BASE_PROMPT.to_string()
            }
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            prompt_file: None,
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

// ============================================================================
// Logging
// ============================================================================

/// Logging and conversation-record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// File that receives one JSON record per conversation turn.
    #[serde(default = "default_conversation_log")]
    pub conversation_log: PathBuf,

    /// Optional webhook notified of each conversation turn.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            conversation_log: default_conversation_log(),
            webhook_url: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_conversation_log() -> PathBuf {
    PathBuf::from("chatbot.log")
}

// ============================================================================
// Root
// ============================================================================

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.idle_timeout_secs, 60);
        assert_eq!(config.session.sweep_interval_secs, 30);
        assert_eq!(config.session.max_history, 20);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_session_durations() {
        let session = SessionConfig {
            idle_timeout_secs: 90,
            sweep_interval_secs: 15,
            max_history: 10,
        };
        assert_eq!(session.idle_timeout(), Duration::from_secs(90));
        assert_eq!(session.sweep_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let llm = LlmConfig {
            api_key: Some("configured-key".into()),
            ..Default::default()
        };
        assert_eq!(llm.resolve_api_key().as_deref(), Some("configured-key"));
    }

    #[test]
    fn test_empty_api_key_counts_as_unset() {
        let llm = LlmConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        // Falls through to the env chain, which may or may not be set in
        // the test environment; the explicit empty string must not win.
        assert_ne!(llm.resolve_api_key().as_deref(), Some(""));
    }

    #[test]
    fn test_base_prompt_default_when_no_file() {
        let llm = LlmConfig::default();
        assert_eq!(llm.load_base_prompt(), DEFAULT_BASE_PROMPT);
    }

    #[test]
    fn test_base_prompt_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are a terse assistant.").unwrap();

        let llm = LlmConfig {
            prompt_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(llm.load_base_prompt(), "You are a terse assistant.\n");
    }

    #[test]
    fn test_base_prompt_empty_file_falls_back() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let llm = LlmConfig {
            prompt_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(llm.load_base_prompt(), DEFAULT_BASE_PROMPT);
    }

    #[test]
    fn test_base_prompt_missing_file_falls_back() {
        let llm = LlmConfig {
            prompt_file: Some(PathBuf::from("/nonexistent/prompt.txt")),
            ..Default::default()
        };
        assert_eq!(llm.load_base_prompt(), DEFAULT_BASE_PROMPT);
    }

    #[test]
    fn test_config_deserializes_with_partial_sections() {
        let config: Config = serde_json::from_str(r#"{"server":{"port":9090}}"#).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.max_history, 20);
    }
}
