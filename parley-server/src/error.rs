//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON body of
//! the form `{"error": "..."}` with an appropriate status code.
//!
//! Upstream failures are logged with full detail, but callers only ever see
//! the generic [`PROCESSING_ERROR`] message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::relay::{RelayError, MESSAGE_REQUIRED};
use crate::schemas::ErrorBody;

/// Client-facing text for a request body over the size limit.
pub const PAYLOAD_TOO_LARGE: &str = "Payload too large";

/// Client-facing text for any upstream failure.
pub const PROCESSING_ERROR: &str = "Error processing your request";

#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the relay.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The request body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the size limit.
    #[error("request body too large")]
    PayloadTooLarge,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::Relay(RelayError::Validation) => {
                (StatusCode::BAD_REQUEST, MESSAGE_REQUIRED)
            }
            ServerError::BadRequest(detail) => {
                tracing::debug!(detail = %detail, "rejecting undecodable request body");
                (StatusCode::BAD_REQUEST, MESSAGE_REQUIRED)
            }
            ServerError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE),
            ServerError::Relay(RelayError::Upstream(e)) => {
                error!(error = %e, "completion API error");
                (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
            }
        };
        (status, Json(ErrorBody { error: client_message.to_owned() })).into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ServerError::PayloadTooLarge;
        }
        ServerError::BadRequest(rejection.body_text())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
