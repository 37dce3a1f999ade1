use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use heimdall::retry::{AttemptError, TransientErrors, with_retry};
use heimdall::{HeimdallError, NetworkErrorKind, RetryConfig, UpstreamError};
use tokio::time::Instant;

/// Fails N times, then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> UpstreamError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> UpstreamError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }

    async fn call(&self) -> Result<&'static str, AttemptError> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)().into());
        }
        Ok("ok")
    }
}

fn quick() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(3)
        .base_delay(Duration::from_millis(10))
        .jitter(false)
}

#[tokio::test(start_paused = true)]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, || UpstreamError::RateLimited {
        retry_after: None,
    }));

    let result = with_retry(&quick(), "/api/users", |_| inner.call()).await;

    assert_eq!(result, Ok("ok"));
    assert_eq!(inner.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts_with_last_error() {
    let inner = Arc::new(FailThenSucceed::new(10, || {
        UpstreamError::network(NetworkErrorKind::Timeout, "timed out")
    }));

    let err = with_retry(&quick(), "/api/users", |_| inner.call())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        HeimdallError::RetryExhausted {
            endpoint: "/api/users".into(),
            attempts: 3,
            last_error: UpstreamError::network(NetworkErrorKind::Timeout, "timed out"),
        }
    );
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn does_not_retry_permanent_errors() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        UpstreamError::from_status(422, None, "validation failed")
    }));

    let err = with_retry(&quick().max_attempts(5), "/api/users", |_| inner.call())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HeimdallError::NonRetryable { attempts: 1, .. }
    ));
    assert_eq!(inner.call_count(), 1); // no retry
}

#[tokio::test(start_paused = true)]
async fn abort_errors_pass_through_untouched() {
    let calls = AtomicU32::new(0);
    let timeout = HeimdallError::AdmissionTimeout {
        endpoint: "/api/users".into(),
        waited: Duration::from_secs(3),
    };

    let err = with_retry(&quick(), "/api/users", |_| {
        calls.fetch_add(1, Ordering::Relaxed);
        let timeout = timeout.clone();
        async move { Err::<(), _>(AttemptError::Abort(timeout)) }
    })
    .await
    .unwrap_err();

    assert_eq!(err, timeout);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn respects_retry_after_duration() {
    let inner = Arc::new(FailThenSucceed::new(1, || UpstreamError::RateLimited {
        retry_after: Some(Duration::from_millis(750)),
    }));
    let config = RetryConfig::new()
        .max_attempts(4)
        .base_delay(Duration::from_millis(100))
        .backoff_multiplier(2.0)
        .jitter(false);

    let start = Instant::now();
    let result = with_retry(&config, "/api/users", |_| inner.call()).await;

    assert!(result.is_ok());
    // Waited for the hint, not the 200ms computed backoff.
    assert_eq!(start.elapsed(), Duration::from_millis(750));
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_is_capped_at_max_backoff() {
    let inner = Arc::new(FailThenSucceed::new(1, || UpstreamError::RateLimited {
        retry_after: Some(Duration::from_secs(3_600)),
    }));
    let config = RetryConfig::new()
        .max_attempts(3)
        .base_delay(Duration::from_millis(100))
        .backoff_multiplier(2.0)
        .jitter(false);

    let start = Instant::now();
    with_retry(&config, "/api/users", |_| inner.call())
        .await
        .unwrap();
    assert_eq!(start.elapsed(), config.max_backoff());
    assert_eq!(start.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn delays_never_decrease_after_a_long_hint() {
    let config = RetryConfig::new()
        .max_attempts(3)
        .base_delay(Duration::from_millis(100))
        .backoff_multiplier(1.5)
        .jitter(false);
    let starts = std::sync::Mutex::new(Vec::new());

    let result = with_retry(&config, "/api/users", |n| {
        starts.lock().unwrap().push(Instant::now());
        async move {
            match n {
                1 => Err(AttemptError::Upstream(UpstreamError::RateLimited {
                    retry_after: Some(Duration::from_secs(20)),
                })),
                2 => Err(AttemptError::Upstream(UpstreamError::RateLimited {
                    retry_after: None,
                })),
                _ => Ok("ok"),
            }
        }
    })
    .await;
    assert_eq!(result, Ok("ok"));

    let starts = starts.into_inner().unwrap();
    let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
    // The 20s hint is cut to the bound, and the unhinted retry does not drop
    // back to the shorter computed delay.
    let bound = config.max_backoff();
    assert!(bound < Duration::from_secs(1));
    assert_eq!(gaps, vec![bound, bound]);
}

#[tokio::test(start_paused = true)]
async fn permanent_error_after_transient_ones_ends_as_exhausted() {
    let result = with_retry(&quick(), "/api/users", |n| async move {
        let err = if n == 1 {
            UpstreamError::from_status(503, None, "unavailable")
        } else {
            UpstreamError::from_status(404, None, "gone")
        };
        Err::<(), _>(AttemptError::Upstream(err))
    })
    .await;

    assert_eq!(
        result.unwrap_err(),
        HeimdallError::RetryExhausted {
            endpoint: "/api/users".into(),
            attempts: 2,
            last_error: UpstreamError::from_status(404, None, "gone"),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn sleeps_follow_the_backoff_schedule() {
    let config = RetryConfig::new()
        .max_attempts(4)
        .base_delay(Duration::from_millis(100))
        .backoff_multiplier(2.0)
        .jitter(false);
    let starts = std::sync::Mutex::new(Vec::new());

    let _ = with_retry(&config, "/api/users", |_| {
        starts.lock().unwrap().push(Instant::now());
        async { Err::<(), _>(AttemptError::Upstream(UpstreamError::from_status(503, None, ""))) }
    })
    .await;

    let starts = starts.into_inner().unwrap();
    let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_config_no_retry() {
    let inner = Arc::new(FailThenSucceed::new(1, || UpstreamError::RateLimited {
        retry_after: None,
    }));

    let err = with_retry(&RetryConfig::disabled(), "/api/users", |_| inner.call())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(1));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_numbers_are_one_based() {
    let seen = std::sync::Mutex::new(Vec::new());
    let _ = with_retry(&quick(), "/a", |n| {
        seen.lock().unwrap().push(n);
        async { Err::<(), _>(AttemptError::Upstream(UpstreamError::RateLimited { retry_after: None })) }
    })
    .await;
    assert_eq!(seen.into_inner().unwrap(), vec![1, 2, 3]);
}

// ============================================================================
// Delay calculation
// ============================================================================

#[test]
fn delays_are_monotonic_and_bounded() {
    let config = RetryConfig::new()
        .max_attempts(6)
        .base_delay(Duration::from_millis(500))
        .backoff_multiplier(1.5)
        .max_delay(Duration::from_secs(60))
        .jitter(false);

    let delays: Vec<Duration> = (2..=config.max_attempts)
        .map(|n| config.delay_for_attempt(n))
        .collect();
    let bound = Duration::from_secs_f64(0.5 * 1.5f64.powi(5));

    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert!(delays.iter().all(|d| *d <= bound));
    assert_eq!(config.max_backoff(), bound);
}

#[test]
fn max_delay_caps_growth() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_secs(1))
        .backoff_multiplier(10.0)
        .max_delay(Duration::from_secs(5));
    assert_eq!(config.delay_for_attempt(2), Duration::from_secs(5));
    assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
}

#[test]
fn jittered_delay_stays_within_ten_percent_below() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_secs(1))
        .backoff_multiplier(2.0);
    for _ in 0..200 {
        let d = config.effective_delay(3, None);
        assert!(d <= Duration::from_secs(4));
        assert!(d >= Duration::from_millis(3_600));
    }
}

#[test]
fn transient_classes_are_configurable() {
    let config = RetryConfig::new().transient(TransientErrors {
        statuses: vec![503],
        network: vec![NetworkErrorKind::Timeout],
    });

    assert!(config.is_retryable(&UpstreamError::RateLimited { retry_after: None }));
    assert!(config.is_retryable(&UpstreamError::from_status(503, None, "")));
    assert!(!config.is_retryable(&UpstreamError::from_status(502, None, "")));
    assert!(config.is_retryable(&UpstreamError::network(NetworkErrorKind::Timeout, "")));
    assert!(!config.is_retryable(&UpstreamError::network(NetworkErrorKind::Dns, "")));
    assert!(!config.is_retryable(&UpstreamError::Other("boom".into())));
}

#[test]
fn default_transient_statuses() {
    let config = RetryConfig::new();
    for status in [408, 500, 502, 503, 504] {
        assert!(config.is_retryable(&UpstreamError::from_status(status, None, "")));
    }
    for status in [400, 401, 403, 404, 409, 422] {
        assert!(!config.is_retryable(&UpstreamError::from_status(status, None, "")));
    }
}

#[test]
fn validation_rejects_zero_attempts() {
    assert!(RetryConfig::new().max_attempts(0).validate().is_err());
    assert!(RetryConfig::new().validate().is_ok());
}
