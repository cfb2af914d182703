//! The chat relay route (`POST /chat`).

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::{ChatReply, ChatRequest, ErrorBody};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(chat), components(schemas(ChatRequest, ChatReply, ErrorBody)))]
pub struct ChatApi;

/// Register the chat route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// Relay one message to the completion API (`POST /chat`).
///
/// The message joins the shared transcript, the whole transcript is sent
/// upstream, and the reply is stored and returned verbatim.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply generated", body = ChatReply),
        (status = 400, description = "Message is required", body = ErrorBody),
        (status = 500, description = "Error processing your request", body = ErrorBody),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ServerError> {
    let Json(req) = payload?;
    debug!(message_len = req.message.as_deref().map_or(0, str::len), "chat request");

    let reply = state.relay.handle_chat_request(req.message.as_deref()).await?;
    Ok(Json(ChatReply { message: reply }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
