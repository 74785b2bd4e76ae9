//! Cross-Site Request Forgery (CSRF) protection.
//!
//! Tokens are stateless: `"{issued_at}:{nonce}:{signature}"` where the signature
//! is HMAC-SHA256 over `"{issued_at}:{nonce}"` keyed with a process-wide secret.
//! Verification recomputes the signature and checks the token age; nothing is
//! stored server-side and expiry is the only way a token stops being valid.

use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::CsrfConfig;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "X-CSRFToken";
/// Form field consulted when the header is absent.
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 86_400;

const NONCE_LEN: usize = 32;
const SECRET_LEN: usize = 32;

/// Issues and verifies signed, time-bound anti-forgery tokens.
pub struct CsrfTokenService {
    secret: SecretBox<[u8]>,
    max_age_seconds: i64,
}

impl std::fmt::Debug for CsrfTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfTokenService")
            .field("secret", &"<redacted>")
            .field("max_age_seconds", &self.max_age_seconds)
            .finish()
    }
}

impl CsrfTokenService {
    pub fn new(secret: Vec<u8>, max_age_seconds: i64) -> Self {
        Self { secret: SecretBox::new(secret.into_boxed_slice()), max_age_seconds }
    }

    /// Builds a service with a freshly generated secret. Tokens issued by it do
    /// not survive a restart and are not accepted by other instances.
    pub fn with_random_secret(max_age_seconds: i64) -> Self {
        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(secret, max_age_seconds)
    }

    pub fn from_config(cfg: &CsrfConfig) -> Self {
        match cfg.secret.as_deref() {
            Some(secret) => {
                tracing::info!("Using configured CSRF signing secret");
                Self::new(secret.as_bytes().to_vec(), cfg.max_age_seconds)
            }
            None => {
                tracing::warn!(
                    "No csrf.secret configured; generated an ephemeral secret. Tokens will not survive restarts."
                );
                Self::with_random_secret(cfg.max_age_seconds)
            }
        }
    }

    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    /// Issues a token stamped with the current time.
    pub fn issue(&self) -> String {
        self.issue_at(chrono::Utc::now().timestamp())
    }

    pub fn issue_at(&self, issued_at: i64) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let message = format!("{}:{}", issued_at, hex::encode(nonce));
        let signature = hex::encode(self.sign(&message));
        format!("{}:{}", message, signature)
    }

    /// Checks a token against the current time. Never panics; any defect is `false`.
    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> bool {
        let mut parts = token.split(':');
        let (Some(timestamp), Some(nonce), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        let Ok(issued_at) = timestamp.parse::<i64>() else {
            return false;
        };
        // compared as canonical lowercase hex text
        let expected = hex::encode(self.sign(&format!("{}:{}", timestamp, nonce)));
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return false;
        }

        now.saturating_sub(issued_at) <= self.max_age_seconds
    }

    fn sign(&self, message: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.expose_secret()).expect("HMAC accepts any key size");
        mac.update(message.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Reads the token from the `X-CSRFToken` header. Empty values count as absent.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reads the token from a url-encoded form body.
pub fn token_from_form(body: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == CSRF_FORM_FIELD)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads the `csrfmiddlewaretoken` text field of a multipart body. An
/// undecodable body or a blank field counts as absent.
pub async fn token_from_multipart(headers: &HeaderMap, body: Bytes) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let fields = crate::parser::decode_body(content_type, body).await.ok()?;
    fields
        .get(CSRF_FORM_FIELD)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
