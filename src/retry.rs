//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`with_retry()`] wraps one logical request: each attempt is
//! `{admission -> real call}`. Only upstream failures classified as
//! transient by [`RetryConfig::is_retryable()`] are retried; anything else
//! propagates on the attempt that produced it without consuming budget.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NetworkErrorKind, UpstreamError};
use crate::types::policy::duration_ms;
use crate::{HeimdallError, Result};

/// Largest fraction by which jitter may shorten a delay.
const JITTER_FRACTION: f64 = 0.1;

/// Which upstream failures count as transient.
///
/// Upstream rate limiting (HTTP 429) is always transient and is not
/// listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientErrors {
    /// HTTP statuses to retry. Default: 408, 500, 502, 503, 504.
    #[serde(default = "default_transient_statuses")]
    pub statuses: Vec<u16>,
    /// Network failure classes to retry. Default: all of them.
    #[serde(default = "default_transient_network")]
    pub network: Vec<NetworkErrorKind>,
}

fn default_transient_statuses() -> Vec<u16> {
    vec![408, 500, 502, 503, 504]
}

fn default_transient_network() -> Vec<NetworkErrorKind> {
    vec![
        NetworkErrorKind::Timeout,
        NetworkErrorKind::Connect,
        NetworkErrorKind::Reset,
        NetworkErrorKind::Dns,
        NetworkErrorKind::Other,
    ]
}

impl Default for TransientErrors {
    fn default() -> Self {
        Self {
            statuses: default_transient_statuses(),
            network: default_transient_network(),
        }
    }
}

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use heimdall::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200))
///     .backoff_multiplier(2.0)
///     .jitter(false);
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay. Default: 500ms.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Growth factor per attempt. Default: 1.5.
    pub backoff_multiplier: f64,
    /// Maximum delay between attempts. Default: 30s.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Whether to shorten delays by a random factor (at most 10%). Default: true.
    pub jitter: bool,
    pub transient: TransientErrors,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            jitter: true,
            transient: TransientErrors::default(),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the maximum delay between attempts.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Replace the transient error classes.
    pub fn transient(mut self, transient: TransientErrors) -> Self {
        self.transient = transient;
        self
    }

    /// Delay before attempt `attempt` (1-based; attempt 1 has no delay).
    ///
    /// `base_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`.
    /// Does NOT include jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Upper bound of any single backoff delay under this config.
    pub fn max_backoff(&self) -> Duration {
        self.delay_for_attempt(self.max_attempts.max(2))
    }

    /// Delay actually slept before `attempt`.
    ///
    /// The computed backoff, lengthened to an upstream `retry_after` hint
    /// when the hint asks for more, and never above
    /// [`max_backoff()`](Self::max_backoff). Jitter only ever shortens the
    /// delay.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        let delay = retry_after
            .map_or(computed, |hint| hint.max(computed))
            .min(self.max_backoff());
        if self.jitter && !delay.is_zero() {
            delay.mul_f64(1.0 - rand::random::<f64>() * JITTER_FRACTION)
        } else {
            delay
        }
    }

    /// Whether `err` should be retried.
    pub fn is_retryable(&self, err: &UpstreamError) -> bool {
        match err {
            UpstreamError::RateLimited { .. } => true,
            UpstreamError::Status { status, .. } => self.transient.statuses.contains(status),
            UpstreamError::Network { kind, .. } => self.transient.network.contains(kind),
            UpstreamError::Other(_) => false,
        }
    }

    /// Reject configs that would make backoff undefined.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HeimdallError::Configuration(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(HeimdallError::Configuration(format!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(HeimdallError::Configuration(
                "retry base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Shared retry loop
// ============================================================================

/// Why a single attempt failed.
#[derive(Debug, Clone)]
pub enum AttemptError {
    /// The real call failed; subject to retry classification.
    Upstream(UpstreamError),
    /// Terminal failure before the real call (e.g. admission timeout).
    Abort(HeimdallError),
}

impl From<UpstreamError> for AttemptError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

impl From<HeimdallError> for AttemptError {
    fn from(err: HeimdallError) -> Self {
        Self::Abort(err)
    }
}

/// Execute an attempt closure with retry logic.
///
/// `attempt` receives the 1-based attempt number. Transient upstream
/// errors are retried up to `config.max_attempts` with exponential
/// backoff; on exhaustion the last error is returned unchanged inside
/// [`HeimdallError::RetryExhausted`]. A non-retryable upstream error on the
/// first attempt returns [`HeimdallError::NonRetryable`] immediately; after
/// earlier transient failures it ends the loop as `RetryExhausted`.
/// [`AttemptError::Abort`] errors are returned as-is.
///
/// Successive delays never decrease and never exceed
/// [`RetryConfig::max_backoff()`].
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, endpoint: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut previous_delay = Duration::ZERO;
    let mut n = 1;
    loop {
        let err = match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Abort(e)) => return Err(e),
            Err(AttemptError::Upstream(e)) => e,
        };

        if !config.is_retryable(&err) && n == 1 {
            return Err(HeimdallError::NonRetryable {
                endpoint: endpoint.to_owned(),
                attempts: n,
                error: err,
            });
        }

        if n >= max_attempts || !config.is_retryable(&err) {
            warn!(endpoint, attempts = n, error = %err, "retries exhausted");
            return Err(HeimdallError::RetryExhausted {
                endpoint: endpoint.to_owned(),
                attempts: n,
                last_error: err,
            });
        }

        let delay = config
            .effective_delay(n + 1, err.retry_after())
            .max(previous_delay);
        previous_delay = delay;
        warn!(
            endpoint,
            attempt = n,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(RetryConfig::new().delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn huge_attempt_numbers_cap_at_max_delay() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_never_lengthens_a_delay() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .jitter(true);
        for _ in 0..100 {
            let d = config.effective_delay(2, None);
            assert!(d <= Duration::from_millis(150));
            assert!(d >= Duration::from_millis(135));
        }
    }

    #[test]
    fn hint_lengthens_but_never_exceeds_max_backoff() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .backoff_multiplier(2.0)
            .jitter(false);
        // max_attempts 3: bound is 100ms * 2^2
        assert_eq!(config.max_backoff(), Duration::from_millis(400));
        assert_eq!(
            config.effective_delay(2, Some(Duration::from_millis(50))),
            Duration::from_millis(200)
        );
        assert_eq!(
            config.effective_delay(2, Some(Duration::from_millis(300))),
            Duration::from_millis(300)
        );
        assert_eq!(
            config.effective_delay(2, Some(Duration::from_secs(20))),
            Duration::from_millis(400)
        );
        assert_eq!(config.effective_delay(9, None), Duration::from_millis(400));
    }

    #[test]
    fn multiplier_below_one_is_rejected() {
        let config = RetryConfig::new().backoff_multiplier(0.5);
        assert!(config.validate().is_err());
    }
}
