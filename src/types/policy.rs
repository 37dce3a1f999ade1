//! Per-endpoint rate limit policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{HeimdallError, Result};

/// Scheduling priority among callers waiting on the same endpoint.
///
/// Priority only breaks ties between queued waiters; it never lets a
/// request past the window or burst ceilings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied to every request whose endpoint matches `pattern`.
///
/// Patterns are either exact endpoints (`/api/health`) or globs where `*`
/// matches any run of characters (`/api/*`, `https://*.stripe.com/*`).
///
/// Serialised with durations in milliseconds, as it appears in policy files:
///
/// ```toml
/// [[endpoints]]
/// pattern = "/api/*"
/// max_requests_per_window = 60
/// window_duration_ms = 60000
/// burst_limit = 5
/// burst_window_ms = 1000
/// cooldown_ms = 10000
/// cache_ttl_ms = 300000
/// priority = "high"
/// mocking_required = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    #[serde(alias = "namePattern", alias = "name_pattern")]
    pub pattern: String,
    #[serde(alias = "maxRequestsPerWindow")]
    pub max_requests_per_window: u32,
    #[serde(
        rename = "window_duration_ms",
        alias = "windowDurationMs",
        with = "duration_ms"
    )]
    pub window: Duration,
    #[serde(alias = "burstLimit")]
    pub burst_limit: u32,
    /// Burst-detection interval. Default: 1s.
    #[serde(
        rename = "burst_window_ms",
        alias = "burstWindowMs",
        with = "duration_ms",
        default = "default_burst_window"
    )]
    pub burst_window: Duration,
    /// Extra penalty added when the burst limit blocks a request.
    #[serde(
        rename = "cooldown_ms",
        alias = "cooldownMs",
        with = "duration_ms",
        default
    )]
    pub cooldown: Duration,
    #[serde(default)]
    pub priority: Priority,
    #[serde(
        rename = "cache_ttl_ms",
        alias = "cacheTtlMs",
        with = "duration_ms",
        default = "default_cache_ttl"
    )]
    pub cache_ttl: Duration,
    #[serde(default, alias = "mockingRequired")]
    pub mocking_required: bool,
}

fn default_burst_window() -> Duration {
    Duration::from_secs(1)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(30)
}

impl EndpointPolicy {
    /// Policy allowing `max_requests` per `window`, with the burst limit
    /// equal to the window limit (i.e. no separate burst ceiling).
    pub fn new(pattern: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            max_requests_per_window: max_requests,
            window,
            burst_limit: max_requests,
            burst_window: default_burst_window().min(window),
            cooldown: Duration::ZERO,
            priority: Priority::Low,
            cache_ttl: default_cache_ttl(),
            mocking_required: false,
        }
    }

    /// Fallback applied when no registered pattern matches: low priority,
    /// short TTL, no mocking requirement, tight limits.
    pub fn conservative_default() -> Self {
        Self::new("*", 60, Duration::from_secs(60))
            .burst(5, Duration::from_secs(1))
            .cooldown(Duration::from_secs(5))
    }

    /// Set the burst ceiling and its detection interval.
    pub fn burst(mut self, limit: u32, window: Duration) -> Self {
        self.burst_limit = limit;
        self.burst_window = window;
        self
    }

    /// Set the burst penalty.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the priority class.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the response cache TTL. Zero disables caching for this endpoint.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Require (or stop requiring) mocked responses for this endpoint.
    pub fn mocking_required(mut self, required: bool) -> Self {
        self.mocking_required = required;
        self
    }

    /// Upper bound of a single admission wait under this policy.
    pub fn max_admission_wait(&self) -> Duration {
        self.window.max(self.burst_window) + self.cooldown
    }

    /// Reject policies that would make throttle decisions undefined.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(HeimdallError::Configuration(format!(
                "invalid policy '{}': {reason}",
                self.pattern
            )))
        };
        if self.pattern.trim().is_empty() {
            return Err(HeimdallError::Configuration(
                "policy pattern must not be empty".to_string(),
            ));
        }
        if self.max_requests_per_window == 0 {
            return fail("max_requests_per_window must be positive");
        }
        if self.window.is_zero() {
            return fail("window_duration_ms must be positive");
        }
        if self.burst_limit == 0 {
            return fail("burst_limit must be positive");
        }
        if self.burst_window.is_zero() {
            return fail("burst_window_ms must be positive");
        }
        if self.burst_window > self.window {
            return fail("burst_window_ms must not exceed window_duration_ms");
        }
        Ok(())
    }
}

/// Serde adapter: `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_low_to_high() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn default_policy_is_valid_and_low_priority() {
        let policy = EndpointPolicy::conservative_default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.priority, Priority::Low);
        assert!(!policy.mocking_required);
    }

    #[test]
    fn burst_window_longer_than_window_is_rejected() {
        let policy = EndpointPolicy::new("/a", 10, Duration::from_secs(1))
            .burst(2, Duration::from_secs(5));
        assert!(matches!(
            policy.validate(),
            Err(HeimdallError::Configuration(_))
        ));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let policy = EndpointPolicy::new("/a", 0, Duration::from_secs(1));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn max_admission_wait_includes_cooldown() {
        let policy = EndpointPolicy::new("/a", 10, Duration::from_secs(60))
            .cooldown(Duration::from_secs(10));
        assert_eq!(policy.max_admission_wait(), Duration::from_secs(70));
    }
}
