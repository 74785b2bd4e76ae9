//! # Signup Guard
//!
//! A registration backend that puts every sign-up request through a security
//! pipeline before a user record is created.
//!
//! ## Request pipeline
//!
//! 1. The HTTP method is resolved against an explicit dispatch table
//!    (`POST`, `OPTIONS`); anything else is answered with 405.
//! 2. The [`middleware::SecurityGate`] applies the per-client fixed-window
//!    rate limit, then verifies the CSRF token (skipped for `OPTIONS`).
//! 3. The body is decoded ([`parser`]), sanitized and validated
//!    ([`validation`]).
//! 4. The password is derived with PBKDF2 ([`credentials`]) and the user is
//!    stored ([`db`]).
//!
//! ## Core Components
//!
//! - [`config`]: Layered configuration (embedded defaults, file, environment)
//! - [`credentials`]: PBKDF2 credential hashing and verification
//! - [`db`]: SQLite schema and user persistence
//! - [`error`]: Error type and JSON error responses
//! - [`metrics`]: Pipeline counters
//! - [`middleware`]: Client identity, rate limiting, CSRF, security gate and headers
//! - [`parser`]: Request body decoding
//! - [`routes`]: HTTP handlers and router
//! - [`state`]: Shared application state
//! - [`validation`]: Registration rules and HTML sanitizing

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod parser;
pub mod routes;
pub mod state;
pub mod validation;

#[cfg(test)]
mod tests;
