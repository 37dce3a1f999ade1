//! Builder for configuring gatekeeper instances

use std::sync::Arc;

use tracing::info;

use super::Gatekeeper;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::profile::{EnvironmentProfile, load_profile};
use crate::retry::RetryConfig;
use crate::types::EndpointPolicy;
use crate::{HeimdallError, Result};

/// Main entry point for creating gatekeeper instances.
pub struct Heimdall;

impl Heimdall {
    /// Create a new builder for configuring a gatekeeper.
    pub fn builder() -> HeimdallBuilder {
        HeimdallBuilder::new()
    }
}

/// Builder for configuring gatekeeper instances.
///
/// A profile source is required: an environment name, a ready
/// [`EnvironmentProfile`], or a policy file [`Config`] (optionally combined
/// with an environment name for files that do not declare one).
pub struct HeimdallBuilder {
    environment: Option<String>,
    profile: Option<EnvironmentProfile>,
    config: Option<Config>,
    policies: Vec<EndpointPolicy>,
    retry: Option<RetryConfig>,
    max_cache_entries: Option<usize>,
    clock: Option<Arc<dyn Clock>>,
}

impl HeimdallBuilder {
    pub fn new() -> Self {
        Self {
            environment: None,
            profile: None,
            config: None,
            policies: Vec::new(),
            retry: None,
            max_cache_entries: None,
            clock: None,
        }
    }

    /// Select the canonical profile for an environment name.
    pub fn environment(mut self, name: impl Into<String>) -> Self {
        self.environment = Some(name.into());
        self
    }

    /// Use a fully built profile. Takes precedence over `environment` and `config`.
    pub fn profile(mut self, profile: EnvironmentProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Overlay a parsed policy file on its environment's canonical profile.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Add a policy, replacing any profile policy with the same pattern.
    pub fn policy(mut self, policy: EndpointPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Override the profile's retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Override the profile's cache capacity.
    pub fn max_cache_entries(mut self, n: usize) -> Self {
        self.max_cache_entries = Some(n);
        self
    }

    /// Set the time source (default: [`SystemClock`]).
    ///
    /// Admission waits sleep on tokio's timer, so a custom clock must advance
    /// with tokio time if throttling is exercised.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn resolve_profile(&mut self) -> Result<EnvironmentProfile> {
        if let Some(profile) = self.profile.take() {
            return Ok(profile);
        }
        if let Some(config) = self.config.take() {
            return config.into_profile(self.environment.as_deref());
        }
        match &self.environment {
            Some(name) => load_profile(name),
            None => Err(HeimdallError::Configuration(
                "no environment selected: call environment(), profile() or config()".to_string(),
            )),
        }
    }

    /// Build the gatekeeper.
    ///
    /// Fails with [`HeimdallError::Configuration`] on an unknown environment
    /// or an invalid policy table.
    pub fn build<V>(mut self) -> Result<Gatekeeper<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut profile = self.resolve_profile()?;

        for policy in std::mem::take(&mut self.policies) {
            match profile
                .endpoints
                .iter_mut()
                .find(|p| p.pattern == policy.pattern)
            {
                Some(existing) => *existing = policy,
                None => profile.endpoints.push(policy),
            }
        }
        if let Some(retry) = self.retry.take() {
            profile.retry = retry;
        }
        if let Some(n) = self.max_cache_entries {
            profile.max_cache_entries = n;
        }
        profile.validate()?;

        let registry = profile.registry()?;
        let clock = self.clock.take().unwrap_or_else(|| Arc::new(SystemClock));

        info!(
            environment = %profile.environment,
            policies = registry.len(),
            max_cache_entries = profile.max_cache_entries,
            mocking_enabled = profile.mocking_enabled,
            real_calls_only = profile.real_calls_only,
            "gatekeeper ready"
        );

        Ok(Gatekeeper::new(profile, registry, clock))
    }
}

impl Default for HeimdallBuilder {
    fn default() -> Self {
        Self::new()
    }
}
