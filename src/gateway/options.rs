//! Per-call overrides.

use std::time::Duration;

use crate::types::Priority;

/// Overrides applied to a single call on top of the resolved policy.
///
/// ```rust
/// # use heimdall::{CallOptions, Priority};
/// # use std::time::Duration;
/// let options = CallOptions::new()
///     .priority(Priority::High)
///     .max_wait(Duration::from_secs(30));
/// assert!(!options.mocked);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Queue priority; defaults to the policy's priority.
    pub priority: Option<Priority>,
    /// Cache TTL for this result; defaults to the policy's TTL.
    pub cache_ttl: Option<Duration>,
    /// Give up admission after this long with `AdmissionTimeout`.
    /// `None` waits as long as the policy requires.
    pub max_wait: Option<Duration>,
    /// Skip the cache lookup. The fresh result is still stored.
    pub bypass_cache: bool,
    /// The request returns a mocked response: no admission, no upstream budget.
    pub mocked: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn mocked(mut self) -> Self {
        self.mocked = true;
        self
    }
}
