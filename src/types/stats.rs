//! Run statistics exposed to reporting collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::HeimdallError;
use crate::telemetry;

/// Point-in-time snapshot of the counters.
///
/// Counters only; no keys or payloads. Counters are monotonic for the
/// lifetime of a run and only go back to zero on an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Calls entering the facade, cache hits included.
    pub total_requests: u64,
    /// Requests delayed by admission control plus upstream 429 responses.
    pub throttled_count: u64,
    pub cache_hits: u64,
    /// Real (non-mocked) upstream invocations, retries included.
    pub real_call_count: u64,
    /// Terminal errors returned to callers.
    pub error_count: u64,
    /// Callers that shared another caller's in-flight call.
    pub dedup_joins: u64,
    /// Attempts beyond the first.
    pub retries: u64,
    pub mocked_calls: u64,
    pub admission_timeouts: u64,
}

/// Lock-free counters behind [`Statistics`]. Also forwards to `metrics`.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    total_requests: AtomicU64,
    throttled: AtomicU64,
    cache_hits: AtomicU64,
    real_calls: AtomicU64,
    errors: AtomicU64,
    dedup_joins: AtomicU64,
    retries: AtomicU64,
    mocked_calls: AtomicU64,
    admission_timeouts: AtomicU64,
}

impl StatsRecorder {
    pub fn request(&self, pattern: &str) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::REQUESTS_TOTAL, "pattern" => pattern.to_owned()).increment(1);
    }

    pub fn cache_hit(&self, pattern: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn cache_miss(&self, pattern: &str) {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn dedup_join(&self, pattern: &str) {
        self.dedup_joins.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::DEDUP_JOINS_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn throttled(&self, pattern: &str) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::THROTTLED_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn admission_wait(&self, pattern: &str, waited: Duration) {
        metrics::histogram!(telemetry::ADMISSION_WAIT_SECONDS, "pattern" => pattern.to_owned())
            .record(waited.as_secs_f64());
    }

    pub fn retry(&self, pattern: &str) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::RETRIES_TOTAL, "pattern" => pattern.to_owned()).increment(1);
    }

    pub fn real_call(&self, pattern: &str) {
        self.real_calls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::REAL_CALLS_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn mocked_call(&self, pattern: &str) {
        self.mocked_calls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::MOCKED_CALLS_TOTAL, "pattern" => pattern.to_owned())
            .increment(1);
    }

    pub fn error(&self, pattern: &str, err: &HeimdallError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if matches!(err, HeimdallError::AdmissionTimeout { .. }) {
            self.admission_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!(telemetry::ERRORS_TOTAL,
            "pattern" => pattern.to_owned(),
            "stage" => err.stage().as_str(),
        )
        .increment(1);
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            throttled_count: self.throttled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            real_call_count: self.real_calls.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            mocked_calls: self.mocked_calls.load(Ordering::Relaxed),
            admission_timeouts: self.admission_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.throttled,
            &self.cache_hits,
            &self.real_calls,
            &self.errors,
            &self.dedup_joins,
            &self.retries,
            &self.mocked_calls,
            &self.admission_timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
