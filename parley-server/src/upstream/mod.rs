//! Outbound completion API.
//!
//! [`CompletionClient`] is the seam between the relay and the third-party
//! chat-completion provider. The production implementation is
//! [`cohere::CohereClient`]; tests substitute a scripted fake.

pub mod cohere;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::transcript::Message;

pub use cohere::CohereClient;

/// Body sent to the completion API for one exchange.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model identifier, e.g. `"command-r-plus"`.
    pub model: String,
    /// The latest user message.
    pub message: String,
    /// The transcript (possibly windowed), oldest first.
    pub chat_history: Vec<Message>,
}

/// Errors raised while calling or decoding the completion API.
///
/// The detail is for server logs only; it is never returned to HTTP callers.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport failure, timeout, or an undecodable body.
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered 2xx but the body did not carry a reply.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// A provider that turns a transcript into a reply.
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    /// Run one completion and return the reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError>;
}
