//! Axum router construction.
//!
//! [`build`] assembles the application router:
//! - middleware layers (CORS, per-request trace-ID span)
//! - optional Swagger UI / OpenAPI document (disable with `PARLEY_ENABLE_SWAGGER=false`)
//! - health route
//! - the `/chat` relay route

mod chat;
pub mod doc;
mod health;

use axum::{middleware, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new().merge(health::router()).merge(chat::router());

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Test helpers ───────────────────────────────────────────────────────────────
