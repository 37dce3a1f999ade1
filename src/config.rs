//! Policy file loading.
//!
//! A policy file overlays the canonical profile of its environment:
//! anything it leaves unset keeps the profile's value, and a non-empty
//! `[[endpoints]]` table replaces the profile's table wholesale.
//!
//! File resolution order:
//! 1. Explicit path (error if it does not exist)
//! 2. `HEIMDALL_CONFIG`
//! 3. `~/.heimdall/config.toml`
//!
//! With no file, the canonical profile for the environment is used as-is.
//! The environment comes from the file's `environment` key, or
//! `HEIMDALL_ENV` when the file does not set one.
//!
//! ```toml
//! environment = "ci"
//! max_parallel_workers = 2
//!
//! [cache]
//! max_entries = 500
//!
//! [retry]
//! max_attempts = 4
//! base_delay_ms = 1000
//! transient_statuses = [502, 503]
//!
//! [[endpoints]]
//! pattern = "/api/*"
//! max_requests_per_window = 60
//! window_duration_ms = 60000
//! burst_limit = 5
//! cooldown_ms = 10000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::NetworkErrorKind;
use crate::profile::{Environment, EnvironmentProfile};
use crate::types::EndpointPolicy;
use crate::{HeimdallError, Result};

/// Environment variable naming the active environment.
pub const ENV_VAR: &str = "HEIMDALL_ENV";
/// Environment variable pointing at a policy file.
pub const CONFIG_PATH_VAR: &str = "HEIMDALL_CONFIG";

/// Parsed policy file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, alias = "environmentName")]
    pub environment: Option<Environment>,
    #[serde(default, alias = "maxParallelWorkers")]
    pub max_parallel_workers: Option<usize>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub endpoints: Vec<EndpointPolicy>,
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default, alias = "maxEntries")]
    pub max_entries: Option<usize>,
}

/// `[retry]` section. Unset keys keep the profile's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default, alias = "retryAttempts")]
    pub max_attempts: Option<u32>,
    #[serde(default, alias = "baseDelayMs")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, alias = "backoffMultiplier")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, alias = "maxDelayMs")]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub jitter: Option<bool>,
    #[serde(default)]
    pub transient_statuses: Option<Vec<u16>>,
    #[serde(default)]
    pub transient_network: Option<Vec<NetworkErrorKind>>,
}

impl Config {
    /// Load a policy file from the standard locations.
    ///
    /// Returns `Ok(None)` if no explicit path is given and no file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Option<Self>> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(None);
        };
        Self::from_file(&path).map(Some)
    }

    /// Load a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HeimdallError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        debug!(path = %path.display(), "loaded policy file");
        Self::from_toml_str(&content).map_err(|e| match e {
            HeimdallError::Configuration(msg) => {
                HeimdallError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse a policy file from a string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            HeimdallError::Configuration(format!("failed to parse policy file: {e}"))
        })
    }

    /// Resolve the active profile from the process environment.
    ///
    /// Reads `HEIMDALL_CONFIG` / `~/.heimdall/config.toml` and
    /// `HEIMDALL_ENV`. Fails if no environment is declared anywhere.
    pub fn profile_from_env() -> Result<EnvironmentProfile> {
        let config = Self::load(None)?.unwrap_or_default();
        let env_var = std::env::var(ENV_VAR).ok();
        config.into_profile(env_var.as_deref())
    }

    /// Overlay this file on the canonical profile of its environment.
    ///
    /// `fallback_env` is used when the file does not name one. The result
    /// is validated.
    pub fn into_profile(self, fallback_env: Option<&str>) -> Result<EnvironmentProfile> {
        let environment = match (self.environment, fallback_env) {
            (Some(env), _) => env,
            (None, Some(name)) => name.parse()?,
            (None, None) => {
                return Err(HeimdallError::Configuration(format!(
                    "no environment declared: set {ENV_VAR} or `environment` in the policy file"
                )));
            }
        };

        let mut profile = EnvironmentProfile::canonical(environment);
        if let Some(workers) = self.max_parallel_workers {
            profile.max_parallel_workers = workers;
        }
        if let Some(max_entries) = self.cache.max_entries {
            profile.max_cache_entries = max_entries;
        }
        self.retry.apply(&mut profile.retry);
        if !self.endpoints.is_empty() {
            profile.endpoints = self.endpoints;
        }

        profile.validate()?;
        Ok(profile)
    }

    /// Resolve the config file path, if any.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(path) = std::env::var_os(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(HeimdallError::Configuration(format!(
                "{CONFIG_PATH_VAR} points to a missing file: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        Ok(None)
    }
}

impl RetrySection {
    fn apply(self, retry: &mut crate::RetryConfig) {
        if let Some(n) = self.max_attempts {
            retry.max_attempts = n;
        }
        if let Some(ms) = self.base_delay_ms {
            retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(m) = self.backoff_multiplier {
            retry.backoff_multiplier = m;
        }
        if let Some(ms) = self.max_delay_ms {
            retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(jitter) = self.jitter {
            retry.jitter = jitter;
        }
        if let Some(statuses) = self.transient_statuses {
            retry.transient.statuses = statuses;
        }
        if let Some(network) = self.transient_network {
            retry.transient.network = network;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.environment.is_none());
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("enviroment = \"ci\"").unwrap_err();
        assert!(matches!(err, HeimdallError::Configuration(_)));
    }

    #[test]
    fn unknown_environment_in_file_is_rejected() {
        assert!(Config::from_toml_str("environment = \"staging\"").is_err());
    }

    #[test]
    fn missing_environment_is_an_error() {
        let err = Config::default().into_profile(None).unwrap_err();
        assert!(err.to_string().contains(ENV_VAR));
    }
}
