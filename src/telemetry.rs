//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `pattern`: the endpoint policy pattern the request resolved to
//! - `stage`: pipeline stage that produced an error ("admission", "retry", ...)

/// Total calls entering the facade (cache hits included).
///
/// Labels: `pattern`.
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Total cache hits.
///
/// Labels: `pattern`.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total cache misses.
///
/// Labels: `pattern`.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Callers that attached to an identical in-flight call instead of issuing one.
///
/// Labels: `pattern`.
pub const DEDUP_JOINS_TOTAL: &str = "heimdall_dedup_joins_total";

/// Requests delayed by admission control or rate limited by the upstream.
///
/// Labels: `pattern`.
pub const THROTTLED_TOTAL: &str = "heimdall_throttled_total";

/// Time spent waiting for admission, in seconds.
///
/// Labels: `pattern`.
pub const ADMISSION_WAIT_SECONDS: &str = "heimdall_admission_wait_seconds";

/// Total retry attempts (not counting the initial attempt).
///
/// Labels: `pattern`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Real calls issued to the upstream.
///
/// Labels: `pattern`.
pub const REAL_CALLS_TOTAL: &str = "heimdall_real_calls_total";

/// Mocked calls executed.
///
/// Labels: `pattern`.
pub const MOCKED_CALLS_TOTAL: &str = "heimdall_mocked_calls_total";

/// Terminal errors returned to callers.
///
/// Labels: `pattern`, `stage`.
pub const ERRORS_TOTAL: &str = "heimdall_errors_total";
