//! Build identification from vergen git metadata.

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");
const GIT_DIRTY: Option<&str> = option_env!("VERGEN_GIT_DIRTY");

/// What was built, for `heimdall --version` and run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    /// `None` when built outside a git checkout.
    pub branch: Option<&'static str>,
    pub sha: Option<&'static str>,
    pub dirty: bool,
}

impl BuildInfo {
    /// Metadata captured at compile time.
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: GIT_BRANCH,
            sha: GIT_SHA,
            dirty: GIT_DIRTY == Some("true"),
        }
    }

    /// Short commit hash (7 chars), if known.
    pub fn short_sha(&self) -> Option<&'static str> {
        self.sha.map(|sha| &sha[..7.min(sha.len())])
    }
}

/// `{version}` or `{version}+{branch}.{sha}[.dirty]` when git metadata
/// was available at build time.
pub fn version_string() -> String {
    let info = BuildInfo::current();
    match (info.branch, info.short_sha()) {
        (Some(branch), Some(sha)) => {
            let dirty = if info.dirty { ".dirty" } else { "" };
            format!("{}+{branch}.{sha}{dirty}", info.version)
        }
        _ => info.version.to_string(),
    }
}
