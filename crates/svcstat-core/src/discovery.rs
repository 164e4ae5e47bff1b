//! Release discovery: replay configuration history into environment releases.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::clock::Clock;
use crate::config::{is_known_environment, ConfigResolver, INTERESTING_FILES};
use crate::domain::component::ImageReference;
use crate::domain::error::{Result, SvcstatError};
use crate::domain::release::{make_release_name, EnvironmentRelease};
use crate::extract::ComponentExtractor;
use crate::git::{GitCommit, SourceRepository};

/// Only commits touching this path can change a release.
pub const CONFIG_PATH_PREFIX: &str = "config";

type DeclaredComponents = BTreeMap<String, Option<ImageReference>>;

/// Walks the source repository and yields the releases an environment saw.
pub struct ReleaseDiscovery {
    repo: Arc<dyn SourceRepository>,
    config: ConfigResolver,
    extractor: Arc<ComponentExtractor>,
    clock: Arc<dyn Clock>,
}

impl ReleaseDiscovery {
    pub fn new(
        repo: Arc<dyn SourceRepository>,
        extractor: Arc<ComponentExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            config: ConfigResolver::new(),
            extractor,
            clock,
        }
    }

    /// Releases of `environment` within `lookback`, newest first.
    ///
    /// Commits that do not look like reviewed merges are ignored, as are
    /// merges that leave the environment's component images unchanged. A
    /// commit whose configuration cannot be read under the current schema
    /// is logged and skipped.
    pub async fn list_releases(
        &self,
        environment: &str,
        lookback: Duration,
    ) -> Result<Vec<EnvironmentRelease>> {
        if !is_known_environment(environment) {
            return Err(SvcstatError::UnknownEnvironment(environment.to_string()));
        }
        let span = info_span!("list_releases", environment = %environment);
        async move {
            let accepted = self.walk(environment, lookback).await?;
            info!(release_count = accepted.len(), "found environment releases");

            let mut releases = Vec::with_capacity(accepted.len());
            for (commit, declared) in accepted {
                let components = self.extractor.resolve(declared).await;
                releases.push(EnvironmentRelease::new(
                    environment,
                    make_release_name(commit.committed_at, &commit.sha),
                    commit.sha,
                    components,
                ));
            }
            releases.reverse();
            Ok(releases)
        }
        .instrument(span)
        .await
    }

    /// Accepted commits, oldest first, with the images each declares.
    async fn walk(
        &self,
        environment: &str,
        lookback: Duration,
    ) -> Result<Vec<(GitCommit, DeclaredComponents)>> {
        let since = self.clock.now() - lookback;
        let mut commits = self.repo.list_commits(CONFIG_PATH_PREFIX, since).await?;
        commits.reverse();
        debug!(commit_count = commits.len(), since = %since, "walking configuration history");

        let mut prev_files = None;
        let mut prev_doc: Option<Value> = None;
        let mut prev_declared: Option<DeclaredComponents> = None;
        let mut accepted = Vec::new();

        for commit in commits {
            if !commit.looks_like_reviewed_merge() {
                continue;
            }

            let snapshot = self
                .repo
                .checkout_and_read(&commit.sha, &INTERESTING_FILES)
                .await?;
            if prev_files.as_ref() == Some(&snapshot.files) {
                continue;
            }
            prev_files = Some(snapshot.files.clone());

            let doc = match self.config.resolve(&snapshot, environment) {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(SvcstatError::Config(message)) => {
                    warn!(commit = %commit.sha, error = %message, "skipping commit with unreadable configuration");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if prev_doc.as_ref() == Some(&doc) {
                continue;
            }

            let declared = match self.extractor.declared_components(&doc) {
                Ok(declared) => declared,
                Err(SvcstatError::Config(message)) => {
                    warn!(commit = %commit.sha, error = %message, "skipping commit with unreadable components");
                    continue;
                }
                Err(e) => return Err(e),
            };
            prev_doc = Some(doc);
            if prev_declared.as_ref() == Some(&declared) {
                debug!(commit = %commit.sha, "no component change");
                continue;
            }
            prev_declared = Some(declared.clone());
            accepted.push((commit, declared));
        }
        Ok(accepted)
    }
}
