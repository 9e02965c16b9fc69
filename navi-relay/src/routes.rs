//! Route definitions for the Navi relay.
//!
//! `/prompt` orchestrates one conversation turn: validate → session →
//! completion call → history update → conversation record → response.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use navi_common::util::truncate_with_ellipsis;
use navi_common::Error;

use crate::gateway::CompletionGateway;
use crate::session::{Message, SessionStore};
use crate::sink::{ConversationRecord, ConversationSink};

const LOG_PREVIEW_CHARS: usize = 50;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    /// `None` when no upstream credential was resolved at startup;
    /// `/prompt` then answers with a configuration error.
    pub gateway: Option<Arc<dyn CompletionGateway>>,
    pub sink: Arc<dyn ConversationSink>,
    pub max_history: usize,
}

/// Prompt submission body.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
}

/// Prompt response: exactly one of `response` and `error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct PromptResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Build the relay router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/prompt", post(prompt_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

fn error_response(session_id: &str, err: &Error) -> (StatusCode, Json<PromptResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(PromptResponse {
            session_id: session_id.to_string(),
            response: None,
            error: Some(err.to_string()),
        }),
    )
}

/// Handle one prompt submission.
async fn prompt_handler(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> (StatusCode, Json<PromptResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "invalid prompt request body");
            return error_response("", &Error::InvalidRequest(rejection.body_text()));
        }
    };

    if request.session_id.is_empty() {
        tracing::warn!("missing session ID in request");
        return error_response("", &Error::MissingSessionId);
    }

    if request.prompt.is_empty() {
        tracing::warn!(session_id = %request.session_id, "missing prompt in request");
        return error_response(&request.session_id, &Error::MissingPrompt);
    }

    let Some(gateway) = state.gateway.as_ref() else {
        tracing::error!("completion API key not configured");
        return error_response(
            &request.session_id,
            &Error::Config("completion API key not configured".into()),
        );
    };

    tracing::info!(
        session_id = %request.session_id,
        prompt = %truncate_with_ellipsis(&request.prompt, LOG_PREVIEW_CHARS),
        "processing prompt"
    );

    let session = state.store.get_or_create(&request.session_id);

    // Held until the response is built: turns on one session serialize,
    // including across the upstream call.
    let mut history = session.history().await;
    history.append(Message::user(&request.prompt));

    match gateway.complete(history.messages()).await {
        Ok(reply) => {
            history.append(Message::assistant(&reply));
            if history.truncate_if_needed(state.max_history) {
                tracing::debug!(
                    session_id = %request.session_id,
                    len = history.len(),
                    "truncated session history"
                );
            }

            state
                .sink
                .record(ConversationRecord::reply(&request.session_id, &request.prompt, &reply));

            tracing::info!(
                session_id = %request.session_id,
                reply = %truncate_with_ellipsis(&reply, LOG_PREVIEW_CHARS),
                "generated response"
            );

            (
                StatusCode::OK,
                Json(PromptResponse {
                    session_id: request.session_id,
                    response: Some(reply),
                    error: None,
                }),
            )
        }
        Err(err) => {
            // The user turn stays in history; a retried prompt resends
            // it as context.
            tracing::error!(
                session_id = %request.session_id,
                error = %err,
                "completion call failed"
            );

            state.sink.record(ConversationRecord::failure(
                &request.session_id,
                &request.prompt,
                &err.to_string(),
            ));

            error_response(&request.session_id, &Error::Gateway(err.to_string()))
        }
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: env!("CARGO_PKG_NAME").into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
