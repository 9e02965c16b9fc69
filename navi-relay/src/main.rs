//! Navi Relay - main entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use navi_common::config::Config;
use navi_common::logging::init_logging;

/// Session-keeping HTTP relay in front of the Gemini completion API.
#[derive(Parser, Debug)]
#[command(name = "navi-relay")]
#[command(version)]
#[command(about = "Stateful chat relay with per-session history", long_about = None)]
struct Cli {
    /// Host to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Path to a file containing the base system prompt (optional)
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Path to the conversation log file
    #[arg(long, default_value = "chatbot.log")]
    log_file: PathBuf,

    /// Session idle timeout in seconds
    #[arg(short = 't', long, default_value_t = 60)]
    timeout_secs: u64,

    /// Webhook URL notified of each conversation turn (optional)
    #[arg(long)]
    webhook_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (pretty, json)
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::default();
        config.server.host = self.host;
        config.server.port = self.port;
        config.session.idle_timeout_secs = self.timeout_secs;
        config.llm.prompt_file = self.prompt_file;
        config.logging.conversation_log = self.log_file;
        config.logging.webhook_url = self.webhook_url;
        config.logging.level = self.log_level;
        config.logging.format = self.log_format;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config();

    init_logging(&config.logging.level, &config.logging.format);

    tracing::info!("Navi Relay v{}", env!("CARGO_PKG_VERSION"));

    navi_relay::start_server(&config).await
}
