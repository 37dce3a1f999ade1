//! Environment profiles.
//!
//! Exactly one [`EnvironmentProfile`] is active per run. It is selected by
//! environment name at startup and never changes afterwards. Unknown names
//! are a [`HeimdallError::Configuration`] error: there is no fallback.

mod presets;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::registry::PolicyRegistry;
use crate::retry::RetryConfig;
use crate::types::EndpointPolicy;
use crate::{HeimdallError, Result};

/// Declared test environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Development,
    Ci,
    ProductionVerification,
    Load,
}

impl Environment {
    /// All environments with a canonical profile.
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Ci,
        Environment::ProductionVerification,
        Environment::Load,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Ci => "ci",
            Self::ProductionVerification => "production-verification",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = HeimdallError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == name)
            .ok_or_else(|| {
                HeimdallError::Configuration(format!(
                    "unknown environment '{}' (expected one of: development, ci, \
                     production-verification, load)",
                    s.trim()
                ))
            })
    }
}

/// Complete configuration for one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentProfile {
    pub environment: Environment,
    /// Endpoint policy table.
    pub endpoints: Vec<EndpointPolicy>,
    /// Applied when no pattern in `endpoints` matches.
    pub default_policy: EndpointPolicy,
    /// Endpoints whose policy has `mocking_required` must be called mocked.
    pub mocking_enabled: bool,
    /// Mocked calls are rejected.
    pub real_calls_only: bool,
    pub max_parallel_workers: usize,
    pub retry: RetryConfig,
    pub max_cache_entries: usize,
}

impl EnvironmentProfile {
    /// The canonical profile for `environment`.
    pub fn canonical(environment: Environment) -> Self {
        presets::canonical(environment)
    }

    /// Whether calls under `policy` must be mocked in this profile.
    pub fn requires_mock(&self, policy: &EndpointPolicy) -> bool {
        self.mocking_enabled && policy.mocking_required
    }

    /// Reject profiles with undefined limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_workers == 0 {
            return Err(HeimdallError::Configuration(
                "max_parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.max_cache_entries == 0 {
            return Err(HeimdallError::Configuration(
                "cache max_entries must be at least 1".to_string(),
            ));
        }
        self.retry.validate()?;
        // Policy validation and duplicate detection.
        self.registry().map(|_| ())
    }

    /// Compile the endpoint table into a registry.
    pub fn registry(&self) -> Result<PolicyRegistry> {
        PolicyRegistry::with_default(self.endpoints.clone(), self.default_policy.clone())
    }
}

/// Select the canonical profile for an environment name.
///
/// ```rust
/// let profile = heimdall::load_profile("ci").unwrap();
/// assert_eq!(profile.max_parallel_workers, 2);
///
/// assert!(heimdall::load_profile("nonexistent").is_err());
/// ```
pub fn load_profile(name: &str) -> Result<EnvironmentProfile> {
    let environment: Environment = name.parse()?;
    let profile = EnvironmentProfile::canonical(environment);
    info!(
        environment = %environment,
        endpoints = profile.endpoints.len(),
        workers = profile.max_parallel_workers,
        "loaded environment profile"
    );
    Ok(profile)
}
