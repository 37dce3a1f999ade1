//! Canonical profiles, one per [`Environment`].

use std::time::Duration;

use super::{Environment, EnvironmentProfile};
use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::retry::RetryConfig;
use crate::types::{EndpointPolicy, Priority};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);

/// Build the canonical profile for `environment`.
pub(super) fn canonical(environment: Environment) -> EnvironmentProfile {
    match environment {
        Environment::Development => development(),
        Environment::Ci => ci(),
        Environment::ProductionVerification => production_verification(),
        Environment::Load => load(),
    }
}

/// Permissive: high limits, short delays, mocking optional.
fn development() -> EnvironmentProfile {
    EnvironmentProfile {
        environment: Environment::Development,
        endpoints: vec![
            EndpointPolicy::new("/api/*", 300, MINUTE)
                .burst(20, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(300))
                .priority(Priority::Medium),
            EndpointPolicy::new("https://*", 100, MINUTE)
                .burst(10, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(300)),
            EndpointPolicy::new("/*", 600, MINUTE)
                .burst(50, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(60)),
        ],
        default_policy: EndpointPolicy::conservative_default(),
        mocking_enabled: false,
        real_calls_only: false,
        max_parallel_workers: 4,
        retry: RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(5)),
        max_cache_entries: DEFAULT_MAX_ENTRIES,
    }
}

/// Conservative: low limits, longer delays, external endpoints mocked,
/// minimal parallelism.
fn ci() -> EnvironmentProfile {
    EnvironmentProfile {
        environment: Environment::Ci,
        endpoints: vec![
            EndpointPolicy::new("/api/*", 60, MINUTE)
                .burst(5, Duration::from_secs(1))
                .cooldown(Duration::from_secs(10))
                .cache_ttl(Duration::from_secs(300))
                .priority(Priority::Medium),
            EndpointPolicy::new("https://*", 30, MINUTE)
                .burst(3, Duration::from_secs(1))
                .cooldown(Duration::from_secs(10))
                .cache_ttl(Duration::from_secs(300))
                .mocking_required(true),
            EndpointPolicy::new("http://*", 30, MINUTE)
                .burst(3, Duration::from_secs(1))
                .cooldown(Duration::from_secs(10))
                .cache_ttl(Duration::from_secs(300))
                .mocking_required(true),
        ],
        default_policy: EndpointPolicy::conservative_default(),
        mocking_enabled: true,
        real_calls_only: false,
        max_parallel_workers: 2,
        retry: RetryConfig::new()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(30)),
        max_cache_entries: DEFAULT_MAX_ENTRIES,
    }
}

/// Strictest: real calls only, smallest windows, single worker.
fn production_verification() -> EnvironmentProfile {
    EnvironmentProfile {
        environment: Environment::ProductionVerification,
        endpoints: vec![
            EndpointPolicy::new("/api/*", 10, MINUTE)
                .burst(2, Duration::from_secs(1))
                .cooldown(Duration::from_secs(10))
                .cache_ttl(Duration::from_secs(60))
                .priority(Priority::High),
            EndpointPolicy::new("https://*", 5, MINUTE)
                .burst(1, Duration::from_secs(1))
                .cooldown(Duration::from_secs(10))
                .cache_ttl(Duration::from_secs(60)),
        ],
        default_policy: EndpointPolicy::new("*", 5, MINUTE)
            .burst(1, Duration::from_secs(1))
            .cooldown(Duration::from_secs(10))
            .cache_ttl(Duration::from_secs(10)),
        mocking_enabled: false,
        real_calls_only: true,
        max_parallel_workers: 1,
        retry: RetryConfig::new()
            .base_delay(Duration::from_secs(2))
            .backoff_multiplier(2.0)
            .max_delay(Duration::from_secs(60)),
        max_cache_entries: DEFAULT_MAX_ENTRIES,
    }
}

/// Sustained throughput: large windows, mocking mandatory externally.
fn load() -> EnvironmentProfile {
    EnvironmentProfile {
        environment: Environment::Load,
        endpoints: vec![
            EndpointPolicy::new("/api/*", 10_000, HOUR)
                .burst(200, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(30)),
            EndpointPolicy::new("https://*", 1_000, HOUR)
                .burst(50, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(30))
                .mocking_required(true),
            EndpointPolicy::new("http://*", 1_000, HOUR)
                .burst(50, Duration::from_secs(1))
                .cache_ttl(Duration::from_secs(30))
                .mocking_required(true),
        ],
        default_policy: EndpointPolicy::new("*", 1_000, MINUTE)
            .burst(50, Duration::from_secs(1))
            .cache_ttl(Duration::from_secs(30)),
        mocking_enabled: true,
        real_calls_only: false,
        max_parallel_workers: 8,
        retry: RetryConfig::new()
            .base_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(10)),
        max_cache_entries: 10_000,
    }
}
