use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

const UNKNOWN_CLIENT: &str = "0.0.0.0";

/// Rate-limit key for a client, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer address.
    pub fn from_headers(headers: &HeaderMap, fallback: Option<IpAddr>) -> Self {
        if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
            if let Some(first) = h.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
                return Self::new(first);
            }
        }
        if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
            let h = h.trim();
            if !h.is_empty() {
                return Self::new(h);
            }
        }
        match fallback {
            Some(ip) => Self::new(ip.to_string()),
            None => Self::new(UNKNOWN_CLIENT),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional extractor for remote socket address. Unlike `ConnectInfo`, this never rejects
/// if the connection info extension is absent (e.g. in tests or custom services).
#[derive(Clone, Copy, Debug, Default)]
pub struct MaybeRemoteAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeRemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await {
            Ok(ConnectInfo(addr)) => Ok(MaybeRemoteAddr(Some(addr))),
            Err(_) => Ok(MaybeRemoteAddr(None)),
        }
    }
}
