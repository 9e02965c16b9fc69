//! Navi Relay - a session-keeping HTTP relay in front of a
//! text-completion API.
//!
//! This crate provides the relay service:
//! - Per-session conversation history with sliding-window truncation
//! - A self-expiring session store with a background eviction sweep
//! - A swappable completion gateway (Gemini)
//! - Fire-and-forget conversation logging (file + webhook)
//!
//! ## Architecture
//!
//! ```text
//! Client → /prompt → Session Store (get-or-create, lock)
//!                        ↓
//!                  Completion Gateway → upstream API
//!                        ↓
//!                  history update → conversation sinks → response
//! ```
//!
//! A periodic sweeper evicts sessions idle past the configured timeout,
//! independently of the request path.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod gateway;
pub mod routes;
pub mod session;
pub mod sink;

pub use gateway::{CompletionGateway, GatewayError, GeminiGateway};
pub use routes::{build_router, AppState};
pub use session::{Message, Role, Session, SessionStore, Sweeper};
pub use sink::{ConversationRecord, ConversationSink, FanoutSink, FileSink, NullSink, WebhookSink};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};

use navi_common::config::Config;

/// Build the application state from resolved configuration.
///
/// Returns the state plus the store handle the caller hands to a
/// [`Sweeper`]. Fails when the conversation log cannot be opened.
pub fn build_state(config: &Config) -> anyhow::Result<(AppState, Arc<SessionStore>)> {
    let base_prompt = config.llm.load_base_prompt();
    let store = Arc::new(SessionStore::new(base_prompt, config.session.idle_timeout()));

    let gateway: Option<Arc<dyn CompletionGateway>> = match config.llm.resolve_api_key() {
        Some(key) => Some(Arc::new(GeminiGateway::new(key, config.llm.model.clone()))),
        None => {
            tracing::warn!(
                "no completion API key resolved; /prompt will answer with a configuration error"
            );
            None
        }
    };

    let mut sinks: Vec<Arc<dyn ConversationSink>> = vec![Arc::new(FileSink::open(
        &config.logging.conversation_log,
    )?)];
    if let Some(ref url) = config.logging.webhook_url {
        sinks.push(Arc::new(WebhookSink::new(url)));
    }
    let sink: Arc<dyn ConversationSink> = Arc::new(FanoutSink::new(sinks));

    let state = AppState {
        store: Arc::clone(&store),
        gateway,
        sink,
        max_history: config.session.max_history,
    };

    Ok((state, store))
}

/// Start the relay server and run until a shutdown signal arrives.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let (state, store) = build_state(config)?;

    let sweeper = Sweeper::spawn(Arc::clone(&store), config.session.sweep_interval());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = build_router(state).layer(cors);

    let addr = SocketAddr::from((
        config.server.host.parse::<IpAddr>()?,
        config.server.port,
    ));

    tracing::info!(%addr, "starting Navi Relay");
    tracing::info!(
        model = %config.llm.model,
        session_timeout_secs = config.session.idle_timeout_secs,
        conversation_log = %config.logging.conversation_log.display(),
        webhook = config.logging.webhook_url.is_some(),
        "relay configured"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    tracing::info!("relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
