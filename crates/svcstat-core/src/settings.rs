//! Engine configuration.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL_SECS;
use crate::diff::DEFAULT_MAX_COMMITS;
use crate::extract::DEFAULT_CONCURRENCY;
use crate::provenance::{DEFAULT_INSPECT_TIMEOUT, DEFAULT_PULL_TIMEOUT};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 14;

/// Settings for wiring an [`Engine`](crate::accessor::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Clone of the repository whose configuration history defines releases.
    pub repo_dir: PathBuf,
    /// Parent directory for per-component source clones.
    pub component_repos_dir: PathBuf,
    /// Directory holding registry credential files, if any.
    pub pull_secret_dir: Option<PathBuf>,
    pub lookback_days: i64,
    pub cache_ttl_secs: i64,
    pub pull_timeout_secs: u64,
    pub inspect_timeout_secs: u64,
    /// Commits scanned per component when walking between two source SHAs.
    pub max_commits: usize,
    /// Provenance lookups in flight per release.
    pub provenance_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            repo_dir: PathBuf::from("."),
            component_repos_dir: std::env::temp_dir().join("svcstat-component-repos"),
            pull_secret_dir: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            cache_ttl_secs: DEFAULT_TTL_SECS,
            pull_timeout_secs: DEFAULT_PULL_TIMEOUT.as_secs(),
            inspect_timeout_secs: DEFAULT_INSPECT_TIMEOUT.as_secs(),
            max_commits: DEFAULT_MAX_COMMITS,
            provenance_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Defaults overridden by `SVCSTAT_*` environment variables.
    ///
    /// Unparseable numeric values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        EngineConfig {
            repo_dir: env_or("SVCSTAT_REPO_DIR", defaults.repo_dir),
            component_repos_dir: env_or("SVCSTAT_COMPONENT_REPOS_DIR", defaults.component_repos_dir),
            pull_secret_dir: std::env::var("SVCSTAT_PULL_SECRET_DIR").ok().map(PathBuf::from),
            lookback_days: env_or("SVCSTAT_LOOKBACK_DAYS", defaults.lookback_days),
            cache_ttl_secs: env_or("SVCSTAT_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            pull_timeout_secs: env_or("SVCSTAT_PULL_TIMEOUT_SECS", defaults.pull_timeout_secs),
            inspect_timeout_secs: env_or("SVCSTAT_INSPECT_TIMEOUT_SECS", defaults.inspect_timeout_secs),
            max_commits: env_or("SVCSTAT_MAX_COMMITS", defaults.max_commits),
            provenance_concurrency: env_or(
                "SVCSTAT_PROVENANCE_CONCURRENCY",
                defaults.provenance_concurrency,
            ),
        }
    }

    pub fn with_repo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = dir.into();
        self
    }

    pub fn with_component_repos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.component_repos_dir = dir.into();
        self
    }

    pub fn with_pull_secret_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pull_secret_dir = Some(dir.into());
        self
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: i64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn lookback(&self) -> Duration {
        Duration::days(self.lookback_days)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::seconds(self.cache_ttl_secs)
    }

    pub fn pull_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn inspect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.inspect_timeout_secs)
    }
}
