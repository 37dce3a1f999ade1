//! Heimdall error types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pipeline stage that produced a terminal error.
///
/// Reports use this to attribute failures: an admission timeout is a
/// capacity problem, a retry exhaustion is an upstream problem, a policy
/// violation is a test-setup problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Admission,
    Retry,
    Policy,
    Configuration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Retry => "retry",
            Self::Policy => "policy",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failed run should count against the infrastructure or the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Capacity, retries or configuration: the run is inconclusive.
    Infrastructure,
    /// The upstream rejected the request for a non-transient reason.
    Test,
}

/// Transport-level failure classes an injected request can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Reset,
    Dns,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Reset => "connection reset",
            Self::Dns => "dns",
            Self::Other => "network",
        };
        f.write_str(s)
    }
}

/// Failure reported by the real call (the injected request function).
///
/// Heimdall never builds requests itself; the caller maps whatever its
/// client returns into one of these so the retry engine can classify it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("rate limited by upstream, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{kind} error: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Build an error from an HTTP status. 429 becomes [`UpstreamError::RateLimited`].
    pub fn from_status(
        status: u16,
        retry_after: Option<Duration>,
        message: impl Into<String>,
    ) -> Self {
        if status == 429 {
            Self::RateLimited { retry_after }
        } else {
            Self::Status {
                status,
                message: message.into(),
            }
        }
    }

    /// Shorthand for a network failure.
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// True if the upstream itself throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Upstream-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if let Some(status) = err.status() {
            UpstreamError::from_status(status.as_u16(), None, message)
        } else if err.is_timeout() {
            UpstreamError::network(NetworkErrorKind::Timeout, message)
        } else if err.is_connect() {
            UpstreamError::network(NetworkErrorKind::Connect, message)
        } else if err.is_request() || err.is_body() {
            UpstreamError::network(NetworkErrorKind::Other, message)
        } else {
            UpstreamError::Other(message)
        }
    }
}

/// Heimdall error types.
///
/// Every variant is terminal: admission waits and retries are handled
/// internally and only surface here once their bounds are exceeded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HeimdallError {
    #[error("admission to {endpoint} not granted within {waited:?}")]
    AdmissionTimeout { endpoint: String, waited: Duration },

    #[error("{endpoint} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        endpoint: String,
        attempts: u32,
        last_error: UpstreamError,
    },

    #[error("{endpoint} failed with non-retryable error: {error}")]
    NonRetryable {
        endpoint: String,
        attempts: u32,
        error: UpstreamError,
    },

    #[error("{endpoint} must be mocked in this environment")]
    MockRequired { endpoint: String },

    #[error("{endpoint} may not be mocked in this environment")]
    MockForbidden { endpoint: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HeimdallError {
    /// Which pipeline stage produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::AdmissionTimeout { .. } => Stage::Admission,
            Self::RetryExhausted { .. } | Self::NonRetryable { .. } => Stage::Retry,
            Self::MockRequired { .. } | Self::MockForbidden { .. } => Stage::Policy,
            Self::Configuration(_) => Stage::Configuration,
        }
    }

    /// Infrastructure failure vs. test failure.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NonRetryable { .. } | Self::MockRequired { .. } | Self::MockForbidden { .. } => {
                FailureClass::Test
            }
            _ => FailureClass::Infrastructure,
        }
    }

    /// Number of real-call attempts made, `None` if none were made.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetryExhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// The underlying upstream error, unchanged.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::RetryExhausted { last_error, .. } => Some(last_error),
            Self::NonRetryable { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
