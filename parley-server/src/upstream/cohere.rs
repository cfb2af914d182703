//! Cohere chat API client (`POST {base_url}/chat`).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{CompletionClient, CompletionRequest, UpstreamError};

/// Default Cohere v1 API root.
pub const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/v1";

/// Longest slice of an error body kept for logging.
const MAX_ERROR_BODY: usize = 2048;

/// Client for the Cohere chat endpoint.
#[derive(Debug, Clone)]
pub struct CohereClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CohereClient {
    /// Build a client with the given credential, API root, and request timeout.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for CohereClient {
    #[instrument(skip(self, request), fields(model = %request.model, history = request.chat_history.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        debug!("sending chat request to Cohere");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: error_detail(&body),
            });
        }

        let body: Value = response.json().await?;
        let reply = extract_reply(&body)?;
        debug!(reply_len = reply.len(), "received Cohere reply");
        Ok(reply)
    }
}

/// Pull the reply out of a chat response body (`{"text": "..."}`).
fn extract_reply(body: &Value) -> Result<String, UpstreamError> {
    body.get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| UpstreamError::Malformed("response has no string `text` field".into()))
}

/// Prefer the API's `message` field; fall back to the (truncated) raw body.
fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json.get("message").and_then(Value::as_str) {
            return message.to_owned();
        }
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
