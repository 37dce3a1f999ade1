//! Endpoint policy registry: maps concrete endpoints to their policy.
//!
//! Resolution picks the most specific matching pattern:
//! 1. **Exact** patterns beat every wildcard pattern
//! 2. Among wildcards, more literal characters win (`/api/users/*` beats `/api/*`)
//! 3. Remaining ties go to the earliest registered pattern
//!
//! No match resolves to the registry's default policy, which is
//! [`EndpointPolicy::conservative_default()`] unless configured otherwise.
//!
//! The registry is read-only after construction. Resolutions are memoised
//! in a bounded moka cache; since the table never changes, memo entries
//! never go stale.

use std::cmp::Ordering;

use crate::types::EndpointPolicy;
use crate::{HeimdallError, Result};

/// Default maximum number of memoised endpoint resolutions.
const DEFAULT_MEMO_MAX: u64 = 4_096;

/// A compiled name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Glob(Vec<String>),
}

impl Pattern {
    fn compile(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('*') {
            Self::Glob(raw.split('*').map(str::to_owned).collect())
        } else {
            Self::Exact(raw.to_owned())
        }
    }

    fn matches(&self, endpoint: &str) -> bool {
        match self {
            Self::Exact(p) => p == endpoint,
            Self::Glob(parts) => glob_match(parts, endpoint),
        }
    }

    /// Specificity rank; greater is more specific.
    fn rank(&self) -> (bool, usize) {
        match self {
            Self::Exact(p) => (true, p.len()),
            Self::Glob(parts) => (false, parts.iter().map(String::len).sum()),
        }
    }
}

/// Match `endpoint` against literal `parts` separated by `*` wildcards.
fn glob_match(parts: &[String], endpoint: &str) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return endpoint.is_empty(),
    };
    let Some(mut remaining) = endpoint.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

/// Read-only table of endpoint policies.
pub struct PolicyRegistry {
    entries: Vec<(Pattern, EndpointPolicy)>,
    default: EndpointPolicy,
    resolved: moka::sync::Cache<String, Option<usize>>,
}

impl PolicyRegistry {
    /// Build a registry from a policy table.
    ///
    /// Fails with [`HeimdallError::Configuration`] if a policy is invalid
    /// or a pattern is registered twice.
    pub fn new(policies: Vec<EndpointPolicy>) -> Result<Self> {
        Self::with_default(policies, EndpointPolicy::conservative_default())
    }

    /// Build a registry with a custom fallback policy.
    pub fn with_default(policies: Vec<EndpointPolicy>, default: EndpointPolicy) -> Result<Self> {
        default.validate()?;
        let mut entries: Vec<(Pattern, EndpointPolicy)> = Vec::with_capacity(policies.len());
        for policy in policies {
            policy.validate()?;
            let pattern = Pattern::compile(&policy.pattern);
            if entries.iter().any(|(p, _)| *p == pattern) {
                return Err(HeimdallError::Configuration(format!(
                    "duplicate endpoint pattern '{}'",
                    policy.pattern
                )));
            }
            entries.push((pattern, policy));
        }
        Ok(Self {
            entries,
            default,
            resolved: moka::sync::Cache::new(DEFAULT_MEMO_MAX),
        })
    }

    /// Resolve the policy for a concrete endpoint.
    pub fn resolve_policy(&self, endpoint: &str) -> EndpointPolicy {
        let idx = self
            .resolved
            .get_with_by_ref(endpoint, || self.find(endpoint));
        match idx {
            Some(i) => self.entries[i].1.clone(),
            None => self.default.clone(),
        }
    }

    /// The fallback policy.
    pub fn default_policy(&self) -> &EndpointPolicy {
        &self.default
    }

    /// Registered policies in registration order.
    pub fn policies(&self) -> impl Iterator<Item = &EndpointPolicy> {
        self.entries.iter().map(|(_, p)| p)
    }

    /// Number of registered patterns (the default is not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, endpoint: &str) -> Option<usize> {
        let mut best: Option<(usize, (bool, usize))> = None;
        for (i, (pattern, _)) in self.entries.iter().enumerate() {
            if !pattern.matches(endpoint) {
                continue;
            }
            let rank = pattern.rank();
            let better = match &best {
                None => true,
                Some((_, best_rank)) => rank.cmp(best_rank) == Ordering::Greater,
            };
            if better {
                best = Some((i, rank));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.entries.len())
            .field("default", &self.default.pattern)
            .finish()
    }
}
