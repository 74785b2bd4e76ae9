use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for the registration pipeline
#[derive(Clone)]
pub struct Metrics {
    pub requests_total: Arc<AtomicU64>,
    pub admitted: Arc<AtomicU64>,
    pub rate_limited: Arc<AtomicU64>,
    pub csrf_missing: Arc<AtomicU64>,
    pub csrf_invalid: Arc<AtomicU64>,
    pub malformed_bodies: Arc<AtomicU64>,
    pub validation_failures: Arc<AtomicU64>,
    pub conflicts: Arc<AtomicU64>,
    pub registrations_created: Arc<AtomicU64>,
    pub tokens_issued: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            admitted: Arc::new(AtomicU64::new(0)),
            rate_limited: Arc::new(AtomicU64::new(0)),
            csrf_missing: Arc::new(AtomicU64::new(0)),
            csrf_invalid: Arc::new(AtomicU64::new(0)),
            malformed_bodies: Arc::new(AtomicU64::new(0)),
            validation_failures: Arc::new(AtomicU64::new(0)),
            conflicts: Arc::new(AtomicU64::new(0)),
            registrations_created: Arc::new(AtomicU64::new(0)),
            tokens_issued: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_csrf_missing(&self) {
        self.csrf_missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_csrf_invalid(&self) {
        self.csrf_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_bodies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_registrations(&self) {
        self.registrations_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tokens_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            csrf_missing: self.csrf_missing.load(Ordering::Relaxed),
            csrf_invalid: self.csrf_invalid.load(Ordering::Relaxed),
            malformed_bodies: self.malformed_bodies.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            registrations_created: self.registrations_created.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub admitted: u64,
    pub rate_limited: u64,
    pub csrf_missing: u64,
    pub csrf_invalid: u64,
    pub malformed_bodies: u64,
    pub validation_failures: u64,
    pub conflicts: u64,
    pub registrations_created: u64,
    pub tokens_issued: u64,
    pub uptime_seconds: u64,
}
