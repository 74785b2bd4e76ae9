//! The registration endpoint.
//!
//! Method dispatch is an explicit table resolved before anything else runs: an
//! unlisted method is answered with 405 without touching the rate limiter. A
//! listed method then passes the security gate, and only then is its handler
//! invoked.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::db::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::middleware::{InboundRequest, MaybeRemoteAddr};
use crate::parser::{self, Fields};
use crate::state::AppState;
use crate::validation::{sanitize_for_logging, sanitize_map};

pub const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Fields stored without sanitizing; escaping would change the secret the
/// user typed.
const UNSANITIZED_FIELDS: [&str; 1] = ["password"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMethod {
    Post,
    Options,
}

impl RegistrationMethod {
    const TABLE: [(Method, RegistrationMethod); 2] =
        [(Method::POST, RegistrationMethod::Post), (Method::OPTIONS, RegistrationMethod::Options)];

    pub fn resolve(method: &Method) -> Option<Self> {
        Self::TABLE.iter().find(|(m, _)| m == method).map(|(_, handler)| *handler)
    }
}

/// Entry point for every request to the registration path.
pub async fn dispatch(
    State(state): State<AppState>,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.inc_requests();

    let Some(handler) = RegistrationMethod::resolve(&method) else {
        return AppError::MethodNotAllowed { allow: ALLOWED_METHODS }.into_response();
    };

    let request = InboundRequest { method, headers, remote_ip: remote.map(|a| a.ip()), body };
    if let Some(rejection) = AppError::from_gate(state.gate.check(&request).await) {
        return rejection.into_response();
    }

    match handler {
        RegistrationMethod::Post => match register(&state, request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
        RegistrationMethod::Options => preflight(),
    }
}

async fn register(state: &AppState, request: InboundRequest) -> AppResult<Response> {
    let content_type = request.content_type();
    let fields = parser::decode_body(&content_type, request.body).await.map_err(|e| {
        state.metrics.inc_malformed();
        e
    })?;

    // Rules see what the client sent; escaping first would turn a valid
    // apostrophe into an entity the name rule rejects.
    let result = state.validator.validate_registration(&fields);
    if !result.is_valid {
        state.metrics.inc_validation_failures();
        tracing::debug!(errors = result.error_count(), "Registration rejected by validation");
        return Err(AppError::Validation(result));
    }
    let fields = sanitize_fields(fields);

    let email = text(&fields, "email");
    if db::user_exists(&state.db, &email).await? {
        return Err(conflict(state, &email));
    }

    let hasher = state.hasher;
    let password = text(&fields, "password");
    // PBKDF2 is CPU-bound; keep it off the async workers
    let credential = tokio::task::spawn_blocking(move || hasher.hash(&password)).await?;

    let new_user = NewUser {
        email,
        first_name: text(&fields, "first_name"),
        last_name: text(&fields, "last_name"),
        credential,
    };
    let user_id = match db::create_user(&state.db, &new_user).await {
        Ok(id) => id,
        // a concurrent registration for the same email won the insert
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(conflict(state, &new_user.email));
        }
        Err(e) => return Err(e.into()),
    };
    state.metrics.inc_registrations();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user_id": user_id,
            "message": "Registration successful!",
        })),
    )
        .into_response())
}

fn conflict(state: &AppState, email: &str) -> AppError {
    state.metrics.inc_conflicts();
    tracing::info!(email = %sanitize_for_logging(email), "Registration for existing email");
    AppError::Conflict { field: "email".to_string(), message: "User already exists!".to_string() }
}

/// Sanitizes every field except the ones listed in `UNSANITIZED_FIELDS`.
fn sanitize_fields(mut fields: Fields) -> Fields {
    let kept: Vec<(String, Value)> = UNSANITIZED_FIELDS
        .iter()
        .filter_map(|name| fields.remove(*name).map(|v| (name.to_string(), v)))
        .collect();
    let mut sanitized = sanitize_map(fields);
    sanitized.extend(kept);
    sanitized
}

// Only called after validation, which guarantees these are non-empty strings.
// Sanitizing keeps a string a string.
fn text(fields: &Fields, name: &str) -> String {
    fields.get(name).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type, X-CSRFToken"),
    );
    response
}
