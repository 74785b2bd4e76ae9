//! The security gate every mutating request passes before its handler runs.
//!
//! Order is fixed: the rate limiter runs first so over-quota clients are turned
//! away before any HMAC work, then the CSRF token is verified. `OPTIONS`
//! requests skip the CSRF step.

use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderMap, Method};

use super::csrf::{token_from_form, token_from_headers, token_from_multipart, CsrfTokenService};
use super::ip::ClientIdentity;
use super::rate_limit::{RateDecision, RateLimiter};
use crate::metrics::Metrics;
use crate::validation::sanitize_for_logging;

/// The parts of an inbound request the gate and the body decoder look at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub remote_ip: Option<IpAddr>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn content_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    pub fn client_identity(&self) -> ClientIdentity {
        ClientIdentity::from_headers(&self.headers, self.remote_ip)
    }

    /// Header first, then the `csrfmiddlewaretoken` field of a url-encoded or
    /// multipart form body. A body that does not decode has no token.
    pub async fn csrf_token(&self) -> Option<String> {
        if let Some(token) = token_from_headers(&self.headers) {
            return Some(token);
        }
        let content_type = self.content_type();
        if content_type.contains("application/x-www-form-urlencoded") {
            token_from_form(&self.body)
        } else if content_type.contains("multipart/form-data") {
            token_from_multipart(&self.headers, self.body.clone()).await
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    Missing,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Proceed,
    RateLimited { retry_after_seconds: u64 },
    CsrfRejected(CsrfRejection),
}

#[derive(Clone)]
pub struct SecurityGate {
    limiter: RateLimiter,
    csrf: Arc<CsrfTokenService>,
    metrics: Metrics,
}

impl SecurityGate {
    pub fn new(limiter: RateLimiter, csrf: Arc<CsrfTokenService>, metrics: Metrics) -> Self {
        Self { limiter, csrf, metrics }
    }

    pub fn csrf(&self) -> &CsrfTokenService {
        &self.csrf
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn check(&self, request: &InboundRequest) -> GateOutcome {
        let identity = request.client_identity();

        if let RateDecision::Limited { retry_after_seconds } = self.limiter.check(&identity).await {
            self.metrics.inc_rate_limited();
            tracing::warn!(
                target: "audit",
                client = %sanitize_for_logging(identity.as_str()),
                method = %request.method,
                "Rate limit exceeded"
            );
            return GateOutcome::RateLimited { retry_after_seconds };
        }
        self.metrics.inc_admitted();

        if request.method == Method::OPTIONS {
            return GateOutcome::Proceed;
        }

        let Some(token) = request.csrf_token().await else {
            self.metrics.inc_csrf_missing();
            tracing::warn!(
                target: "audit",
                client = %sanitize_for_logging(identity.as_str()),
                "CSRF token missing"
            );
            return GateOutcome::CsrfRejected(CsrfRejection::Missing);
        };

        if !self.csrf.verify(&token) {
            self.metrics.inc_csrf_invalid();
            tracing::warn!(
                target: "audit",
                client = %sanitize_for_logging(identity.as_str()),
                "CSRF token invalid"
            );
            return GateOutcome::CsrfRejected(CsrfRejection::Invalid);
        }

        GateOutcome::Proceed
    }
}
