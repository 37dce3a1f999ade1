//! The rate-limit facade.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::CallOptions;
use crate::cache::{CachedKey, Deduplicator, TtlCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::profile::EnvironmentProfile;
use crate::registry::PolicyRegistry;
use crate::request::Request;
use crate::retry::{AttemptError, with_retry};
use crate::throttle::ThrottleController;
use crate::types::stats::StatsRecorder;
use crate::types::{EndpointPolicy, RequestKey, Statistics};
use crate::{HeimdallError, Result};

struct Inner<V> {
    profile: EnvironmentProfile,
    registry: PolicyRegistry,
    cache: Arc<TtlCache<V>>,
    inflight: Deduplicator<V>,
    throttle: ThrottleController,
    stats: StatsRecorder,
}

/// Admission-controlled access to external endpoints for one test run.
///
/// Every call goes through the same pipeline:
/// policy resolution, cache lookup, in-flight deduplication, admission,
/// then the real call with retries. Results of
/// [`call_with_policy()`](Self::call_with_policy) are cached per
/// [`RequestKey`] for the policy's TTL.
///
/// Cheap to clone; clones share all state. Independent runs in one process
/// use independent gatekeepers.
pub struct Gatekeeper<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Gatekeeper<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Gatekeeper<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        profile: EnvironmentProfile,
        registry: PolicyRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(TtlCache::new(profile.max_cache_entries, Arc::clone(&clock)));
        Self {
            inner: Arc::new(Inner {
                profile,
                registry,
                cache,
                inflight: Deduplicator::new(),
                throttle: ThrottleController::new(clock),
                stats: StatsRecorder::default(),
            }),
        }
    }

    /// Build from `HEIMDALL_ENV` and the standard policy file locations.
    pub fn from_env() -> Result<Self> {
        let profile = Config::profile_from_env()?;
        super::Heimdall::builder().profile(profile).build()
    }

    /// [`call_with_policy()`](Self::call_with_policy) with default options.
    pub async fn call<R>(&self, key: impl Into<RequestKey>, request: R) -> Result<V>
    where
        R: Request<Output = V> + 'static,
    {
        self.call_with_policy(key, request, CallOptions::default())
            .await
    }

    /// Perform a cacheable data call.
    ///
    /// A fresh cached value is returned without touching the network.
    /// Otherwise the caller joins an identical in-flight call if there is
    /// one, or starts it: wait for admission, execute `request`, retry
    /// transient failures. A successful result is cached and handed to
    /// every attached caller; a failure is handed to all of them unchanged
    /// and nothing is cached.
    pub async fn call_with_policy<R>(
        &self,
        key: impl Into<RequestKey>,
        request: R,
        options: CallOptions,
    ) -> Result<V>
    where
        R: Request<Output = V> + 'static,
    {
        let key = key.into();
        let policy = self.inner.registry.resolve_policy(key.endpoint());
        let pattern = policy.pattern.clone();
        let stats = &self.inner.stats;
        stats.request(&pattern);

        if let Err(e) = self.inner.check_mocking(&key, &policy, &options) {
            stats.error(&pattern, &e);
            return Err(e);
        }

        if !options.bypass_cache {
            if let Some(value) = self.inner.cache.get(&key) {
                debug!(key = %key, pattern = %pattern, "cache hit");
                stats.cache_hit(&pattern);
                return Ok(value);
            }
        }

        let ttl = options.cache_ttl.unwrap_or(policy.cache_ttl);
        let lookup_cache = Arc::clone(&self.inner.cache);
        let settle_cache = Arc::clone(&self.inner.cache);
        let settle_key = key.clone();
        let leader = Arc::clone(&self.inner);
        let leader_key = key.clone();

        let pending = self.inner.inflight.join_or_start_with(
            &key,
            || {
                if options.bypass_cache {
                    None
                } else {
                    lookup_cache.get(&key)
                }
            },
            move || async move { leader.run(&leader_key, &policy, &request, &options).await },
            move |result| {
                if let Ok(value) = result {
                    settle_cache.put(settle_key, value.clone(), ttl);
                }
            },
        );

        if pending.is_ready() {
            debug!(key = %key, pattern = %pattern, "cache hit");
            stats.cache_hit(&pattern);
        } else {
            stats.cache_miss(&pattern);
        }
        if pending.is_joined() {
            debug!(key = %key, pattern = %pattern, "joined in-flight call");
            stats.dedup_join(&pattern);
        }

        let result = pending.wait().await;
        if let Err(e) = &result {
            stats.error(&pattern, e);
        }
        result
    }

    /// Perform a side-effecting action (e.g. a browser navigation).
    ///
    /// Same admission and retry pipeline as
    /// [`call_with_policy()`](Self::call_with_policy), but the result is
    /// neither cached nor shared: every invocation executes.
    pub async fn navigate_with_policy<R>(
        &self,
        target: impl Into<RequestKey>,
        request: R,
        options: CallOptions,
    ) -> Result<R::Output>
    where
        R: Request,
    {
        let key = target.into();
        let policy = self.inner.registry.resolve_policy(key.endpoint());
        let stats = &self.inner.stats;
        stats.request(&policy.pattern);

        let result = match self.inner.check_mocking(&key, &policy, &options) {
            Ok(()) => self.inner.run(&key, &policy, &request, &options).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            stats.error(&policy.pattern, e);
        }
        result
    }

    /// Point-in-time statistics snapshot.
    pub fn get_statistics(&self) -> Statistics {
        self.inner.stats.snapshot()
    }

    /// Clear cache, in-flight map, window history and statistics.
    ///
    /// Callers already attached to an in-flight call still receive its
    /// result, but it is not cached.
    pub fn reset(&self) {
        self.inner.cache.clear();
        self.inner.inflight.clear();
        self.inner.throttle.reset();
        self.inner.stats.reset();
        info!(environment = %self.inner.profile.environment, "gatekeeper reset");
    }

    /// Fresh cached keys with their remaining TTL.
    pub fn cached_entries(&self) -> Vec<CachedKey> {
        self.inner.cache.cached_keys()
    }

    /// In-flight keys with their waiter counts.
    pub fn in_flight(&self) -> Vec<(RequestKey, usize)> {
        self.inner.inflight.snapshot()
    }

    /// Drop a single cached response.
    pub fn invalidate(&self, key: impl Into<RequestKey>) {
        self.inner.cache.invalidate(&key.into());
    }

    /// The active profile.
    pub fn profile(&self) -> &EnvironmentProfile {
        &self.inner.profile
    }

    /// The policy that governs `endpoint`.
    pub fn resolve_policy(&self, endpoint: &str) -> EndpointPolicy {
        self.inner.registry.resolve_policy(endpoint)
    }

    /// Purge expired cache entries every `every` until the handle is
    /// aborted or the gatekeeper is dropped.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.inner.cache.spawn_sweeper(every)
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn check_mocking(
        &self,
        key: &RequestKey,
        policy: &EndpointPolicy,
        options: &CallOptions,
    ) -> Result<()> {
        if options.mocked && self.profile.real_calls_only {
            return Err(HeimdallError::MockForbidden {
                endpoint: key.endpoint().to_owned(),
            });
        }
        if !options.mocked && self.profile.requires_mock(policy) {
            return Err(HeimdallError::MockRequired {
                endpoint: key.endpoint().to_owned(),
            });
        }
        Ok(())
    }

    /// Admission plus real call, retried per the profile's retry config.
    async fn run<R>(
        &self,
        key: &RequestKey,
        policy: &EndpointPolicy,
        request: &R,
        options: &CallOptions,
    ) -> Result<R::Output>
    where
        R: Request,
    {
        let pattern = policy.pattern.as_str();
        let priority = options.priority.unwrap_or(policy.priority);
        let mocked = options.mocked;
        let max_wait = options.max_wait;

        with_retry(&self.profile.retry, key.endpoint(), |attempt| async move {
            if attempt > 1 {
                self.stats.retry(pattern);
            }

            if mocked {
                self.stats.mocked_call(pattern);
            } else {
                let admitted = self
                    .throttle
                    .acquire(policy, priority, max_wait)
                    .await
                    .map_err(|e| retarget(e, key))?;
                if admitted.throttled {
                    self.stats.throttled(pattern);
                }
                self.stats.admission_wait(pattern, admitted.waited);
                debug!(
                    key = %key,
                    pattern,
                    attempt,
                    waited_ms = admitted.waited.as_millis() as u64,
                    "admitted"
                );
                self.stats.real_call(pattern);
            }

            let result = request.execute().await;
            if let Err(e) = &result {
                if e.is_rate_limited() {
                    self.stats.throttled(pattern);
                }
            }
            result.map_err(AttemptError::from)
        })
        .await
    }
}

/// Report admission timeouts against the requested endpoint, not the pattern.
fn retarget(err: HeimdallError, key: &RequestKey) -> HeimdallError {
    match err {
        HeimdallError::AdmissionTimeout { waited, .. } => HeimdallError::AdmissionTimeout {
            endpoint: key.endpoint().to_owned(),
            waited,
        },
        other => other,
    }
}

impl<V> std::fmt::Debug for Gatekeeper<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("environment", &self.inner.profile.environment)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}
