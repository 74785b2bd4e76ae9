//! Integration tests for the registration service.
//!
//! - **api_tests**: the full pipeline over the router (gate, parsing, validation, persistence)
//! - **config_tests**: configuration defaults, layering and validation
//! - **db_tests**: schema and user persistence
//! - **error_tests**: error status codes and response bodies
//! - **health_api_tests**: health, readiness, metrics and version endpoints

pub mod api_tests;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::middleware::CsrfTokenService;
use crate::state::AppState;

pub(crate) const TEST_SECRET: &[u8] = b"test-secret-test-secret-test-secret!";

/// A single-connection in-memory database with the schema applied.
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

/// Defaults with a low iteration count so registrations stay fast.
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hashing.iterations = 1_000;
    config
}

pub(crate) async fn test_state() -> AppState {
    let csrf = Arc::new(CsrfTokenService::new(TEST_SECRET.to_vec(), 86_400));
    AppState::with_csrf(memory_pool().await, test_config(), csrf)
}
