//! Per-component source repositories, cloned lazily for commit-range lookups.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, info_span, Instrument};

use crate::domain::error::{Result, SvcstatError};
use crate::git::{parse_log, run_git, GitCommit, LOG_FORMAT};
use crate::registry::ComponentRegistry;

/// History of a component's own source repository.
#[async_trait]
pub trait ComponentGitAccessor: Send + Sync {
    /// Commits reachable from `newer_sha` down to, but excluding, `older_sha`,
    /// newest first. Fails if `older_sha` is not met within `max_commits`.
    async fn commits_between(
        &self,
        component: &str,
        newer_sha: &str,
        older_sha: &str,
        max_commits: usize,
    ) -> Result<Vec<GitCommit>>;
}

/// Cut a newest-first log at `older_sha`.
pub(crate) fn take_until(
    log: Vec<GitCommit>,
    older_sha: &str,
    max_commits: usize,
) -> Result<Vec<GitCommit>> {
    let mut commits = Vec::new();
    for commit in log.into_iter().take(max_commits) {
        if commit.sha == older_sha {
            return Ok(commits);
        }
        commits.push(commit);
    }
    Err(SvcstatError::Git(format!(
        "older SHA {older_sha} not found within {max_commits} commits"
    )))
}

/// Clones of every component repository under one parent directory.
pub struct GitComponentRepos {
    parent_dir: PathBuf,
    registry: Arc<ComponentRegistry>,
    repo_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GitComponentRepos {
    pub fn new(parent_dir: impl Into<PathBuf>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            parent_dir: parent_dir.into(),
            registry,
            repo_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn repo_dir(&self, component: &str) -> PathBuf {
        self.parent_dir.join(component.replace(' ', "-"))
    }

    fn repo_lock(&self, component: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .repo_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(component.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Clone on first use, otherwise fetch the default branch.
    async fn sync(&self, component: &str) -> Result<PathBuf> {
        let definition = self
            .registry
            .get(component)
            .ok_or_else(|| SvcstatError::not_found("component", component))?;
        let repo_url = definition.repo_url.as_deref().ok_or_else(|| {
            SvcstatError::Git(format!("component {component:?} has no repository"))
        })?;
        let branch = definition.default_branch.as_deref().unwrap_or("main");
        let repo_dir = self.repo_dir(component);

        match tokio::fs::metadata(&repo_dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(SvcstatError::Git(format!(
                    "repository path {} is not a directory",
                    repo_dir.display()
                )));
            }
            Ok(_) => {
                info!(branch = %branch, "fetching latest from origin");
                let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
                run_git(&repo_dir, &["fetch", "--quiet", "origin", &refspec]).await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(branch = %branch, "cloning repository");
                tokio::fs::create_dir_all(&self.parent_dir).await?;
                let target = component.replace(' ', "-");
                run_git(
                    &self.parent_dir,
                    &["clone", "--quiet", "--no-checkout", "--branch", branch, repo_url, &target],
                )
                .await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(repo_dir)
    }
}

#[async_trait]
impl ComponentGitAccessor for GitComponentRepos {
    async fn commits_between(
        &self,
        component: &str,
        newer_sha: &str,
        older_sha: &str,
        max_commits: usize,
    ) -> Result<Vec<GitCommit>> {
        let lock = self.repo_lock(component);
        let span = info_span!("component_git", component = %component, newer = %newer_sha, older = %older_sha);
        async move {
            let _guard = lock.lock().await;
            let repo_dir = self.sync(component).await?;

            let limit = format!("--max-count={max_commits}");
            let raw = run_git(&repo_dir, &["log", LOG_FORMAT, &limit, newer_sha]).await?;
            take_until(parse_log(&raw)?, older_sha, max_commits)
        }
        .instrument(span)
        .await
    }
}
