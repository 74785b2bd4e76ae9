//! HTTP route handlers for the registration service.
//!
//! - `register`: the gated registration endpoint
//! - `csrf`: CSRF token issuance
//! - `health`: health, readiness, metrics and version endpoints

pub mod csrf;
pub mod health;
pub mod register;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::security_headers::security_headers_middleware;
use crate::state::AppState;

/// Builds the application router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/api/csrf-token", get(csrf::issue_token))
        .route("/api/register", any(register::dispatch))
        .route("/api/register/", any(register::dispatch))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(security_headers_middleware))
}
