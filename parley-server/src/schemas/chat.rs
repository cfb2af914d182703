//! Bodies for `POST /chat`.
//!
//! These match what the browser chat client already sends and expects, so
//! the field names are fixed.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// The user's message. Missing or empty is rejected with HTTP 400.
    #[serde(default)]
    pub message: Option<String>,
}

/// Success body for `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatReply {
    /// The model's reply, markdown-formatted.
    pub message: String,
}

/// Error body shared by every failing response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Fixed, client-safe description of the failure.
    pub error: String,
}
