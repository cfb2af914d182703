//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::relay::Relay;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Owner of the process-wide transcript.
    pub relay: Arc<Relay>,
}
