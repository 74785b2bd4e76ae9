//! Security headers middleware for HTTP responses.
//!
//! Every response, success or error, leaves with the same fixed set of
//! hardening headers. JSON responses are additionally marked non-cacheable so
//! tokens and error details are not stored by intermediaries.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// The fixed hardening headers, in the order they are applied.
pub const HARDENING_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "Deny"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
];

pub fn apply_hardening_headers(headers: &mut HeaderMap) {
    for (name, value) in HARDENING_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
}

/// Adds the hardening headers to all responses.
///
/// # Arguments
///
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware in the chain
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    apply_hardening_headers(headers);

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|ct| {
            ct.to_str()
                .map_err(|e| {
                    tracing::warn!("Invalid UTF-8 in Content-Type header: {}", e);
                    e
                })
                .ok()
        })
        .map(|s| s.starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    res
}
