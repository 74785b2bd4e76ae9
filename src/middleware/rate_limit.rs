//! Fixed-window, per-client request limiting.
//!
//! Each client identity gets a counter that starts at 1 on its first request and
//! lives for one window. Requests are admitted while the counter is below the
//! ceiling; a rejected request does not touch the counter. Windows are not
//! sliding, so a client can burst up to twice the ceiling across a window
//! boundary.

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::ip::ClientIdentity;
use crate::config::RateLimitConfig;

/// A counter owned by a [`CounterStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCounter {
    pub count: u64,
    pub window_started_at: Instant,
    pub expires_at: Instant,
}

/// Result of an atomic conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// The counter was below the ceiling and now holds `count`.
    Incremented { count: u64 },
    /// The counter already reached the ceiling and was left unchanged.
    AtCeiling { count: u64, retry_after: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store holding rate counters.
///
/// `increment_below` must be atomic per key: two concurrent calls for the same
/// key can never both observe a count below the ceiling and both increment past it.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// The live counter for `key`; expired counters read as absent.
    async fn get(&self, key: &str) -> Result<Option<RateCounter>, CounterStoreError>;

    /// Increments `key` if its live count is below `ceiling`, starting a fresh
    /// window of length `ttl` when the key is absent or expired.
    async fn increment_below(
        &self,
        key: &str,
        ceiling: u64,
        ttl: Duration,
    ) -> Result<CounterUpdate, CounterStoreError>;

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError>;
}

/// In-process counter store. A single mutex serializes every read-increment.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, RateCounter>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired counter.
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, c| c.expires_at > now);
        let removed = before - counters.len();
        if removed > 0 {
            tracing::debug!("Evicted {} expired rate counters", removed);
        }
    }

    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<RateCounter>, CounterStoreError> {
        let now = Instant::now();
        let counters = self.counters.lock().await;
        Ok(counters.get(key).filter(|c| c.expires_at > now).copied())
    }

    async fn increment_below(
        &self,
        key: &str,
        ceiling: u64,
        ttl: Duration,
    ) -> Result<CounterUpdate, CounterStoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        match counters.get_mut(key) {
            Some(counter) if counter.expires_at > now => {
                if counter.count >= ceiling {
                    return Ok(CounterUpdate::AtCeiling {
                        count: counter.count,
                        retry_after: counter.expires_at.saturating_duration_since(now),
                    });
                }
                counter.count += 1;
                Ok(CounterUpdate::Incremented { count: counter.count })
            }
            _ => {
                counters.insert(
                    key.to_string(),
                    RateCounter { count: 1, window_started_at: now, expires_at: now + ttl },
                );
                Ok(CounterUpdate::Incremented { count: 1 })
            }
        }
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        self.counters.lock().await.remove(key);
        Ok(())
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u64 },
    Limited { retry_after_seconds: u64 },
}

/// Per-client fixed-window rate limiter over a shared [`CounterStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    /// Creates a new `RateLimiter`.
    ///
    /// # Arguments
    ///
    /// * `store` - The shared counter store.
    /// * `max_requests` - The maximum number of requests admitted per window.
    /// * `window_seconds` - The length of the window in seconds.
    pub fn new(store: Arc<dyn CounterStore>, max_requests: u64, window_seconds: u64) -> Self {
        Self { store, max_requests, window: Duration::from_secs(window_seconds) }
    }

    pub fn from_config(store: Arc<dyn CounterStore>, cfg: &RateLimitConfig) -> Self {
        Self::new(store, cfg.max_requests, cfg.window_seconds)
    }

    fn key(identity: &ClientIdentity) -> String {
        format!("rate_limit:{}", identity.as_str())
    }

    /// Counts a request from `identity` and decides whether it may proceed.
    ///
    /// A failing store rejects the request.
    pub async fn check(&self, identity: &ClientIdentity) -> RateDecision {
        let key = Self::key(identity);
        match self.store.increment_below(&key, self.max_requests, self.window).await {
            Ok(CounterUpdate::Incremented { count }) => {
                RateDecision::Allowed { remaining: self.max_requests.saturating_sub(count) }
            }
            Ok(CounterUpdate::AtCeiling { retry_after, .. }) => RateDecision::Limited {
                // round up so clients never retry a moment too early
                retry_after_seconds: retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
            },
            Err(e) => {
                tracing::error!("Rate counter store failed, rejecting request: {}", e);
                RateDecision::Limited { retry_after_seconds: self.window.as_secs() }
            }
        }
    }

    pub async fn admit(&self, identity: &ClientIdentity) -> bool {
        matches!(self.check(identity).await, RateDecision::Allowed { .. })
    }

    /// Clears the counter for `identity`.
    pub async fn reset(&self, identity: &ClientIdentity) -> Result<(), CounterStoreError> {
        self.store.reset(&Self::key(identity)).await
    }

    /// The live counter for `identity`, if its window is open.
    pub async fn counter(&self, identity: &ClientIdentity) -> Option<RateCounter> {
        self.store.get(&Self::key(identity)).await.ok().flatten()
    }

    /// Requests counted against `identity` in its current window.
    pub async fn current_count(&self, identity: &ClientIdentity) -> u64 {
        self.counter(identity).await.map(|c| c.count).unwrap_or(0)
    }
}

/// A background task that periodically evicts expired counters.
pub async fn cleanup_task(store: MemoryCounterStore, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        store.cleanup_expired().await;
    }
}
