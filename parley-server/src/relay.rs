//! The relay: one inbound chat message in, one upstream completion out.
//!
//! Exchanges are serialized end-to-end. The transcript lock is taken before
//! the USER append and held across the upstream call until the CHATBOT reply
//! is stored, so two exchanges can never interleave their appends.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::transcript::{Message, Role, Transcript};
use crate::upstream::{CompletionClient, CompletionRequest, UpstreamError};

/// Client-facing text for an empty or missing message.
pub const MESSAGE_REQUIRED: &str = "Message is required";

/// What to do with the USER message when the upstream call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Leave the USER message in place; the next exchange resends it.
    #[default]
    Keep,
    /// Remove the USER message so the failed exchange leaves no trace.
    Rollback,
}

/// Relay tuning knobs, taken from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub model: String,
    pub system_prompt: String,
    pub max_turns: Option<usize>,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound message was empty or absent. Nothing was mutated.
    #[error("{}", MESSAGE_REQUIRED)]
    Validation,

    /// The completion API failed; no reply was stored.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Owns the process-wide transcript and the completion client.
pub struct Relay {
    client: Arc<dyn CompletionClient>,
    transcript: Mutex<Transcript>,
    options: RelayOptions,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("model", &self.options.model)
            .field("max_turns", &self.options.max_turns)
            .field("failure_policy", &self.options.failure_policy)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Create the relay with a fresh transcript holding only the system prompt.
    pub fn new(client: Arc<dyn CompletionClient>, options: RelayOptions) -> Self {
        let transcript = Transcript::new(options.system_prompt.clone());
        Self { client, transcript: Mutex::new(transcript), options }
    }

    /// Relay one user message and return the model's reply.
    pub async fn handle_chat_request(&self, user_text: Option<&str>) -> Result<String, RelayError> {
        let user_text = match user_text {
            Some(text) if !text.is_empty() => text,
            _ => {
                debug!("rejecting empty chat message");
                return Err(RelayError::Validation);
            }
        };

        let mut exchange = PendingExchange::begin(
            self.transcript.lock().await,
            self.options.failure_policy,
        );

        exchange.transcript.append(Role::User, user_text);
        let request = CompletionRequest {
            model: self.options.model.clone(),
            message: user_text.to_owned(),
            chat_history: exchange.transcript.windowed_snapshot(self.options.max_turns),
        };
        debug!(
            transcript_len = exchange.transcript.len(),
            history_sent = request.chat_history.len(),
            "awaiting upstream completion"
        );

        match self.client.complete(&request).await {
            Ok(reply) => {
                exchange.commit(reply.clone());
                info!(reply_len = reply.len(), "exchange completed");
                Ok(reply)
            }
            Err(e) => {
                warn!(
                    policy = ?self.options.failure_policy,
                    "upstream call failed; no reply stored"
                );
                Err(e.into())
            }
        }
    }

    pub async fn transcript_len(&self) -> usize {
        self.transcript.lock().await.len()
    }

    #[cfg(test)]
    pub async fn transcript_snapshot(&self) -> Vec<Message> {
        self.transcript.lock().await.snapshot()
    }
}

/// An exchange in flight, holding the transcript lock.
///
/// Under [`FailurePolicy::Rollback`] the transcript is restored on drop unless
/// [`PendingExchange::commit`] ran, which covers upstream errors as well as a
/// handler future dropped mid-call.
struct PendingExchange<'a> {
    transcript: MutexGuard<'a, Transcript>,
    before: usize,
    rollback: bool,
}

impl<'a> PendingExchange<'a> {
    fn begin(transcript: MutexGuard<'a, Transcript>, policy: FailurePolicy) -> Self {
        let before = transcript.len();
        Self { transcript, before, rollback: policy == FailurePolicy::Rollback }
    }

    fn commit(&mut self, reply: String) {
        self.transcript.append(Role::Chatbot, reply);
        self.rollback = false;
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if self.rollback && self.transcript.len() > self.before {
            self.transcript.rollback_to(self.before);
            debug!(transcript_len = self.before, "rolled back unfinished exchange");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Completion client that replays queued results and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        replies: std::sync::Mutex<VecDeque<Result<String, UpstreamError>>>,
        pub(crate) requests: std::sync::Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn with(replies: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(replies.into()),
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn recorded(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::Malformed("script exhausted".into())))
        }
    }

    /// Echoes the user message after a short delay, to widen race windows.
    struct SlowEcho;

    #[async_trait]
    impl CompletionClient for SlowEcho {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(format!("echo: {}", request.message))
        }
    }

    /// Never answers, so the exchange stays in flight until cancelled.
    struct Hang;

    #[async_trait]
    impl CompletionClient for Hang {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, UpstreamError> {
            std::future::pending().await
        }
    }

    async fn cancel_in_flight(relay: &Arc<Relay>) {
        let task = {
            let relay = Arc::clone(relay);
            tokio::spawn(async move { relay.handle_chat_request(Some("hi")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
    }

    pub(crate) fn upstream_failure() -> UpstreamError {
        UpstreamError::Status { status: 503, body: "unavailable".into() }
    }

    pub(crate) fn options() -> RelayOptions {
        RelayOptions {
            model: "command-r-plus".into(),
            system_prompt: "sys".into(),
            max_turns: None,
            failure_policy: FailurePolicy::Keep,
        }
    }

    #[tokio::test]
    async fn empty_or_missing_message_is_rejected_without_mutation() {
        let client = ScriptedClient::with(vec![]);
        let relay = Relay::new(client.clone(), options());

        assert!(matches!(relay.handle_chat_request(None).await, Err(RelayError::Validation)));
        assert!(matches!(relay.handle_chat_request(Some("")).await, Err(RelayError::Validation)));

        assert_eq!(relay.transcript_len().await, 1);
        assert!(client.recorded().is_empty());
    }

    #[tokio::test]
    async fn successful_exchange_appends_user_then_chatbot() {
        let client = ScriptedClient::with(vec![Ok("**hi**".into())]);
        let relay = Relay::new(client.clone(), options());

        let reply = relay.handle_chat_request(Some("hello")).await.unwrap();
        assert_eq!(reply, "**hi**");

        let transcript = relay.transcript_snapshot().await;
        assert_eq!(
            transcript,
            vec![
                Message::new(Role::System, "sys"),
                Message::new(Role::User, "hello"),
                Message::new(Role::Chatbot, "**hi**"),
            ]
        );
    }

    #[tokio::test]
    async fn user_message_is_appended_before_upstream_call() {
        let client = ScriptedClient::with(vec![Ok("reply".into())]);
        let relay = Relay::new(client.clone(), options());
        relay.handle_chat_request(Some("hello")).await.unwrap();

        let sent = client.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "command-r-plus");
        assert_eq!(sent[0].message, "hello");
        assert_eq!(sent[0].chat_history.first().map(|m| m.role), Some(Role::System));
        assert_eq!(sent[0].chat_history.last(), Some(&Message::new(Role::User, "hello")));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_exchange_leaves_dangling_user_message() {
        let client = ScriptedClient::with(vec![Err(upstream_failure()), Ok("second".into())]);
        let relay = Relay::new(client.clone(), options());

        let err = relay.handle_chat_request(Some("first")).await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
        assert_eq!(relay.transcript_len().await, 2);
        assert!(logs_contain("upstream call failed"));

        relay.handle_chat_request(Some("again")).await.unwrap();
        let sent = client.recorded();
        let history: Vec<&str> = sent[1].chat_history.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(history, vec!["sys", "first", "again"]);
        assert_eq!(relay.transcript_len().await, 4);
    }

    #[tokio::test]
    async fn rollback_policy_discards_failed_exchange() {
        let client = ScriptedClient::with(vec![Err(upstream_failure())]);
        let relay = Relay::new(
            client,
            RelayOptions { failure_policy: FailurePolicy::Rollback, ..options() },
        );

        assert!(relay.handle_chat_request(Some("first")).await.is_err());
        assert_eq!(relay.transcript_snapshot().await, vec![Message::new(Role::System, "sys")]);
    }

    #[tokio::test]
    async fn rollback_policy_discards_cancelled_exchange() {
        let relay = Arc::new(Relay::new(
            Arc::new(Hang),
            RelayOptions { failure_policy: FailurePolicy::Rollback, ..options() },
        ));

        cancel_in_flight(&relay).await;
        assert_eq!(relay.transcript_snapshot().await, vec![Message::new(Role::System, "sys")]);
    }

    #[tokio::test]
    async fn keep_policy_leaves_cancelled_user_message() {
        let relay = Arc::new(Relay::new(Arc::new(Hang), options()));

        cancel_in_flight(&relay).await;
        let roles: Vec<Role> = relay.transcript_snapshot().await.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[tokio::test]
    async fn system_message_stays_unique_across_exchanges() {
        let client = ScriptedClient::with(vec![
            Ok("a".into()),
            Err(upstream_failure()),
            Ok("c".into()),
        ]);
        let relay = Relay::new(client, options());
        for text in ["one", "two", "three"] {
            let _ = relay.handle_chat_request(Some(text)).await;
        }

        let transcript = relay.transcript_snapshot().await;
        assert_eq!(transcript[0], Message::new(Role::System, "sys"));
        assert_eq!(transcript.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(transcript.len(), 6);
    }

    #[tokio::test]
    async fn context_window_bounds_upstream_history_only() {
        let replies = (0..4).map(|i| Ok(format!("a{i}"))).collect();
        let client = ScriptedClient::with(replies);
        let relay = Relay::new(client.clone(), RelayOptions { max_turns: Some(1), ..options() });

        for i in 0..4 {
            relay.handle_chat_request(Some(format!("q{i}").as_str())).await.unwrap();
        }

        for request in client.recorded() {
            assert!(request.chat_history.len() <= 3);
            assert_eq!(request.chat_history[0].role, Role::System);
        }
        let last: Vec<String> = client.recorded()[3]
            .chat_history
            .iter()
            .map(|m| m.message.clone())
            .collect();
        assert_eq!(last, vec!["sys", "q3"]);
        assert_eq!(relay.transcript_len().await, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_exchanges_never_interleave() {
        let relay = Arc::new(Relay::new(Arc::new(SlowEcho), options()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    relay.handle_chat_request(Some(format!("msg-{i}").as_str())).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let transcript = relay.transcript_snapshot().await;
        assert_eq!(transcript.len(), 33);
        for pair in transcript[1..].chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Chatbot);
            assert_eq!(pair[1].message, format!("echo: {}", pair[0].message));
        }
    }
}
