use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: checks DB connectivity with timeout protection
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    // Add timeout to prevent hanging readiness checks
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => {
            tracing::warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "not ready: database unavailable").into_response()
        }
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// Pipeline counters as a JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    Json(snapshot)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let counters = [
        ("requests_total", "Requests to the registration endpoint", m.requests_total),
        ("admitted", "Requests admitted by the security gate", m.admitted),
        ("rate_limited", "Requests rejected by the rate limiter", m.rate_limited),
        ("csrf_missing", "Requests rejected for a missing CSRF token", m.csrf_missing),
        ("csrf_invalid", "Requests rejected for an invalid CSRF token", m.csrf_invalid),
        ("malformed_bodies", "Bodies that could not be decoded", m.malformed_bodies),
        ("validation_failures", "Registrations rejected by validation", m.validation_failures),
        ("conflicts", "Registrations for an existing email", m.conflicts),
        ("registrations_created", "Users created", m.registrations_created),
        ("tokens_issued", "CSRF tokens issued", m.tokens_issued),
    ];
    let mut body = String::new();
    for (name, help, value) in counters {
        body.push_str(&format!(
            "# HELP signup_guard_{name} {help}\n# TYPE signup_guard_{name} counter\nsignup_guard_{name} {value}\n"
        ));
    }
    body.push_str(&format!(
        "# HELP signup_guard_uptime_seconds Uptime seconds\n# TYPE signup_guard_uptime_seconds gauge\nsignup_guard_uptime_seconds {}\n",
        m.uptime_seconds
    ));
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info plus the active pipeline limits (JSON)
pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    let cfg = &state.config;
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "limits": {
            "rate_limit_max_requests": cfg.rate_limit.max_requests,
            "rate_limit_window_seconds": cfg.rate_limit.window_seconds,
            "csrf_max_age_seconds": cfg.csrf.max_age_seconds,
            "hashing_iterations": cfg.hashing.iterations,
        }
    });
    (StatusCode::OK, Json(body))
}
