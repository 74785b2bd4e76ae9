use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Issues a fresh CSRF token for the registration form.
///
/// Not gated: a client has to be able to fetch a token before its first
/// registration attempt.
pub async fn issue_token(State(state): State<AppState>) -> impl IntoResponse {
    let token = state.gate.csrf().issue();
    state.metrics.inc_tokens_issued();
    Json(json!({ "csrf_token": token }))
}
