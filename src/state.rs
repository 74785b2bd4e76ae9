use std::sync::Arc;

use crate::config::AppConfig;
use crate::credentials::CredentialHasher;
use crate::metrics::Metrics;
use crate::middleware::{CsrfTokenService, MemoryCounterStore, RateLimiter, SecurityGate};
use crate::validation::InputValidator;

/// The shared application state.
///
/// Cloned into every handler. The CSRF secret and the counter store are the
/// only state shared across requests; everything else is read-only.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Pipeline counters.
    pub metrics: Metrics,
    /// Rate limiter followed by CSRF verification.
    pub gate: SecurityGate,
    /// In-process rate counters, kept here so the cleanup task can reach them.
    pub counters: MemoryCounterStore,
    pub hasher: CredentialHasher,
    pub validator: InputValidator,
}

impl AppState {
    /// Creates a new `AppState` with an in-memory counter store and a CSRF
    /// service built from `config.csrf`.
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let csrf = Arc::new(CsrfTokenService::from_config(&config.csrf));
        Self::with_csrf(db, config, csrf)
    }

    /// Like [`AppState::new`] but with a caller-provided CSRF service.
    pub fn with_csrf(db: sqlx::SqlitePool, config: AppConfig, csrf: Arc<CsrfTokenService>) -> Self {
        let metrics = Metrics::new();
        let counters = MemoryCounterStore::new();
        let limiter = RateLimiter::from_config(Arc::new(counters.clone()), &config.rate_limit);
        let gate = SecurityGate::new(limiter, csrf, metrics.clone());

        Self {
            db,
            hasher: CredentialHasher::new(config.hashing.iterations),
            validator: InputValidator::new(),
            config: Arc::new(config),
            metrics,
            gate,
            counters,
        }
    }
}
