//! Read-side facade over discovery, diffing and CI correlation.
//!
//! [`ReleaseAccessor`] is the surface a front end talks to. [`Engine`] does
//! the work on every call; [`CachingReleaseAccessor`] wraps any accessor with
//! time-bounded caches. Derived operations are provided methods that go back
//! through `self`, so a caching wrapper also serves them from its caches.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, info_span, warn, Instrument};

use crate::cache::FreshnessCache;
use crate::ci::{CiCorrelator, CiRuleSet, JobRunSource};
use crate::clock::{Clock, SystemClock};
use crate::component_git::GitComponentRepos;
use crate::config::KNOWN_ENVIRONMENTS;
use crate::diff::DiffEngine;
use crate::discovery::ReleaseDiscovery;
use crate::domain::diff::EnvironmentReleaseDiff;
use crate::domain::error::{Result, SvcstatError};
use crate::domain::release::{split_environment_release_name, EnvironmentRelease, Release};
use crate::extract::ComponentExtractor;
use crate::git::GitWorkTree;
use crate::provenance::{PodmanInspector, ProvenanceResolver};
use crate::registry::ComponentRegistry;
use crate::settings::EngineConfig;

#[async_trait]
pub trait ReleaseAccessor: Send + Sync {
    async fn list_environments(&self) -> Result<Vec<String>>;

    /// Releases of one environment, newest first.
    async fn list_environment_releases(&self, environment: &str) -> Result<Vec<EnvironmentRelease>>;

    /// Changes taking `other` to `release`.
    async fn diff_environment_releases(
        &self,
        release: &EnvironmentRelease,
        other: &EnvironmentRelease,
    ) -> Result<EnvironmentReleaseDiff>;

    /// Look up `<environment>---<release>`.
    async fn get_environment_release(&self, name: &str) -> Result<EnvironmentRelease> {
        let (environment, _) = split_environment_release_name(name)
            .ok_or_else(|| SvcstatError::not_found("environment release", name))?;
        self.list_environment_releases(environment)
            .await?
            .into_iter()
            .find(|release| release.name == name)
            .ok_or_else(|| SvcstatError::not_found("environment release", name))
    }

    async fn get_environment_release_diff(
        &self,
        name: &str,
        other_name: &str,
    ) -> Result<EnvironmentReleaseDiff> {
        let release = self.get_environment_release(name).await?;
        let other = self.get_environment_release(other_name).await?;
        self.diff_environment_releases(&release, &other).await
    }

    /// Releases of every environment, in environment order.
    async fn list_all_environment_releases(&self) -> Result<Vec<EnvironmentRelease>> {
        let mut all = Vec::new();
        for environment in self.list_environments().await? {
            all.extend(self.list_environment_releases(&environment).await?);
        }
        Ok(all)
    }

    /// Distinct releases seen by any environment, newest first.
    async fn list_releases(&self) -> Result<Vec<Release>> {
        let mut seen = BTreeSet::new();
        let mut releases: Vec<Release> = self
            .list_all_environment_releases()
            .await?
            .iter()
            .map(EnvironmentRelease::release)
            .filter(|release| seen.insert(release.name.clone()))
            .collect();
        releases.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(releases)
    }
}

/// Uncached accessor that walks history on every call.
pub struct Engine {
    environments: Vec<String>,
    discovery: ReleaseDiscovery,
    diff: DiffEngine,
    correlator: CiCorrelator,
    job_runs: Option<Arc<dyn JobRunSource>>,
    lookback: Duration,
}

impl Engine {
    pub fn new(discovery: ReleaseDiscovery, diff: DiffEngine, correlator: CiCorrelator) -> Self {
        Self {
            environments: KNOWN_ENVIRONMENTS.iter().map(|e| e.to_string()).collect(),
            discovery,
            diff,
            correlator,
            job_runs: None,
            lookback: Duration::days(crate::settings::DEFAULT_LOOKBACK_DAYS),
        }
    }

    pub fn with_job_runs(mut self, job_runs: Arc<dyn JobRunSource>) -> Self {
        self.job_runs = Some(job_runs);
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Wire the git, podman and registry adapters described by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = Arc::new(ComponentRegistry::builtin());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut inspector = PodmanInspector::new();
        if let Some(dir) = &config.pull_secret_dir {
            inspector = inspector.with_pull_secret_dir(dir);
        }
        let resolver = Arc::new(
            ProvenanceResolver::new(Arc::new(inspector))
                .with_timeouts(config.pull_timeout(), config.inspect_timeout()),
        );
        let extractor = Arc::new(
            ComponentExtractor::new(registry.clone(), resolver)
                .with_concurrency(config.provenance_concurrency),
        );
        let discovery = ReleaseDiscovery::new(
            Arc::new(GitWorkTree::new(&config.repo_dir)),
            extractor,
            clock,
        );
        let diff = DiffEngine::new(Arc::new(GitComponentRepos::new(
            &config.component_repos_dir,
            registry,
        )))
        .with_max_commits(config.max_commits);

        Ok(Self::new(discovery, diff, CiCorrelator::new(CiRuleSet::builtin()?))
            .with_lookback(config.lookback()))
    }
}

#[async_trait]
impl ReleaseAccessor for Engine {
    async fn list_environments(&self) -> Result<Vec<String>> {
        Ok(self.environments.clone())
    }

    async fn list_environment_releases(&self, environment: &str) -> Result<Vec<EnvironmentRelease>> {
        let span = info_span!("list_environment_releases", environment = %environment);
        async move {
            info!("listing environment releases");
            let runs = match &self.job_runs {
                Some(source) => match source.list_job_runs(environment).await {
                    Ok(runs) => runs,
                    Err(e) => {
                        warn!(error = %e, "failed to list job runs, continuing without CI results");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            let mut releases = self.discovery.list_releases(environment, self.lookback).await?;
            self.correlator.correlate(&mut releases, &runs);
            Ok(releases)
        }
        .instrument(span)
        .await
    }

    async fn diff_environment_releases(
        &self,
        release: &EnvironmentRelease,
        other: &EnvironmentRelease,
    ) -> Result<EnvironmentReleaseDiff> {
        Ok(self.diff.diff(release, other).await)
    }
}

/// Accessor that serves repeated calls from per-key caches.
pub struct CachingReleaseAccessor<A> {
    inner: A,
    environments: FreshnessCache<(), Vec<String>>,
    releases: FreshnessCache<String, Vec<EnvironmentRelease>>,
    diffs: FreshnessCache<(String, String), EnvironmentReleaseDiff>,
}

impl<A: ReleaseAccessor> CachingReleaseAccessor<A> {
    pub fn new(inner: A, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            environments: FreshnessCache::new(ttl, clock.clone()),
            releases: FreshnessCache::new(ttl, clock.clone()),
            diffs: FreshnessCache::new(ttl, clock),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ReleaseAccessor> ReleaseAccessor for CachingReleaseAccessor<A> {
    async fn list_environments(&self) -> Result<Vec<String>> {
        self.environments
            .get_or_refresh(&(), || self.inner.list_environments())
            .await
    }

    async fn list_environment_releases(&self, environment: &str) -> Result<Vec<EnvironmentRelease>> {
        self.releases
            .get_or_refresh(&environment.to_string(), || {
                self.inner.list_environment_releases(environment)
            })
            .await
    }

    async fn diff_environment_releases(
        &self,
        release: &EnvironmentRelease,
        other: &EnvironmentRelease,
    ) -> Result<EnvironmentReleaseDiff> {
        let key = (release.name.clone(), other.name.clone());
        self.diffs
            .get_or_refresh(&key, || self.inner.diff_environment_releases(release, other))
            .await
    }
}
