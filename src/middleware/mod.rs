//! Security components that run before request handlers.
//!
//! This module groups the client identification, rate limiting, CSRF token
//! handling and response hardening used by the registration endpoint. The
//! [`gate::SecurityGate`] ties the rate limiter and the CSRF service together
//! into the single check handlers call.

pub mod csrf;
pub mod gate;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;

pub use csrf::CsrfTokenService;
pub use gate::{CsrfRejection, GateOutcome, InboundRequest, SecurityGate};
pub use ip::{ClientIdentity, MaybeRemoteAddr};
pub use rate_limit::{CounterStore, MemoryCounterStore, RateLimiter};
