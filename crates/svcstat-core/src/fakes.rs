//! In-memory fakes for the engine's ports (testing only)
//!
//! Provides `FakeClock`, `FakeImageInspector`, `FakeComponentGit`,
//! `MemoryJobRunSource` and `MemorySourceRepository`, which satisfy the trait
//! contracts without git, podman or network access.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::ci::JobRunSource;
use crate::clock::Clock;
use crate::component_git::{take_until, ComponentGitAccessor};
use crate::domain::error::{ProvenanceError, Result, SvcstatError};
use crate::domain::job_run::JobRun;
use crate::git::{GitCommit, RepoSnapshot, SourceRepository};
use crate::provenance::ImageInspector;

/// Build a commit with `parents` synthetic parent SHAs.
pub fn commit(sha: &str, parents: usize, committed_at: DateTime<Utc>, message: &str) -> GitCommit {
    GitCommit {
        sha: sha.to_string(),
        parents: (0..parents).map(|i| format!("{sha}-parent-{i}")).collect(),
        committed_at,
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// FakeClock
// ---------------------------------------------------------------------------

/// Manually advanced clock.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// FakeImageInspector
// ---------------------------------------------------------------------------

/// Scripted inspector that counts calls per pull spec.
///
/// Pull specs without a scripted document fail to pull.
#[derive(Debug, Default)]
pub struct FakeImageInspector {
    documents: Mutex<HashMap<String, Value>>,
    pull_failures: Mutex<HashMap<String, String>>,
    pulls: Mutex<HashMap<String, usize>>,
    inspects: Mutex<HashMap<String, usize>>,
    pull_delay: Option<StdDuration>,
}

impl FakeImageInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pull sleeps for `delay` first.
    pub fn with_pull_delay(mut self, delay: StdDuration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    pub fn set_document(&self, pull_spec: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(pull_spec.to_string(), document);
    }

    /// Script an image built at `created` (RFC 3339) from `source_sha`.
    pub fn set_source(&self, pull_spec: &str, source_sha: &str, created: &str) {
        self.set_document(
            pull_spec,
            json!({
                "Created": created,
                "Config": {"Labels": {"vcs-ref": source_sha}}
            }),
        );
    }

    pub fn fail_pull(&self, pull_spec: &str, message: &str) {
        self.pull_failures
            .lock()
            .unwrap()
            .insert(pull_spec.to_string(), message.to_string());
    }

    pub fn pull_count(&self, pull_spec: &str) -> usize {
        self.pulls.lock().unwrap().get(pull_spec).copied().unwrap_or(0)
    }

    pub fn inspect_count(&self, pull_spec: &str) -> usize {
        self.inspects
            .lock()
            .unwrap()
            .get(pull_spec)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_pulls(&self) -> usize {
        self.pulls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ImageInspector for FakeImageInspector {
    async fn pull(&self, pull_spec: &str) -> std::result::Result<(), ProvenanceError> {
        *self
            .pulls
            .lock()
            .unwrap()
            .entry(pull_spec.to_string())
            .or_default() += 1;
        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.pull_failures.lock().unwrap().get(pull_spec).cloned();
        if let Some(message) = failure {
            return Err(ProvenanceError::PullFailed {
                pull_spec: pull_spec.to_string(),
                message,
            });
        }
        if !self.documents.lock().unwrap().contains_key(pull_spec) {
            return Err(ProvenanceError::PullFailed {
                pull_spec: pull_spec.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        Ok(())
    }

    async fn inspect(&self, pull_spec: &str) -> std::result::Result<Value, ProvenanceError> {
        *self
            .inspects
            .lock()
            .unwrap()
            .entry(pull_spec.to_string())
            .or_default() += 1;
        self.documents
            .lock()
            .unwrap()
            .get(pull_spec)
            .cloned()
            .ok_or_else(|| ProvenanceError::InspectFailed {
                pull_spec: pull_spec.to_string(),
                message: "image not known".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// FakeComponentGit
// ---------------------------------------------------------------------------

/// Per-component commit histories, newest first.
#[derive(Debug, Default)]
pub struct FakeComponentGit {
    histories: Mutex<HashMap<String, Vec<GitCommit>>>,
    calls: Mutex<usize>,
}

impl FakeComponentGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, component: &str, newest_first: Vec<GitCommit>) {
        self.histories
            .lock()
            .unwrap()
            .insert(component.to_string(), newest_first);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ComponentGitAccessor for FakeComponentGit {
    async fn commits_between(
        &self,
        component: &str,
        newer_sha: &str,
        older_sha: &str,
        max_commits: usize,
    ) -> Result<Vec<GitCommit>> {
        *self.calls.lock().unwrap() += 1;
        let histories = self.histories.lock().unwrap();
        let history = histories
            .get(component)
            .ok_or_else(|| SvcstatError::Git(format!("no repository for {component:?}")))?;
        let start = history
            .iter()
            .position(|c| c.sha == newer_sha)
            .ok_or_else(|| SvcstatError::Git(format!("unknown revision {newer_sha}")))?;
        take_until(history[start..].to_vec(), older_sha, max_commits)
    }
}

// ---------------------------------------------------------------------------
// MemoryJobRunSource
// ---------------------------------------------------------------------------

/// Job runs keyed by environment; optionally failing every call.
#[derive(Debug, Default)]
pub struct MemoryJobRunSource {
    runs: Mutex<HashMap<String, Vec<JobRun>>>,
    failure: Mutex<Option<String>>,
}

impl MemoryJobRunSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_runs(&self, environment: &str, runs: Vec<JobRun>) {
        self.runs
            .lock()
            .unwrap()
            .insert(environment.to_string(), runs);
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl JobRunSource for MemoryJobRunSource {
    async fn list_job_runs(&self, environment: &str) -> Result<Vec<JobRun>> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(SvcstatError::CiResults(message));
        }
        Ok(self
            .runs
            .lock()
            .unwrap()
            .get(environment)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemorySourceRepository
// ---------------------------------------------------------------------------

/// Linear history where every commit touches the configuration path.
#[derive(Debug, Default)]
pub struct MemorySourceRepository {
    /// Oldest first.
    commits: Mutex<Vec<(GitCommit, BTreeMap<String, Vec<u8>>)>>,
    checkouts: Mutex<usize>,
}

impl MemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit whose tree holds exactly `files`.
    pub fn push_commit(&self, commit: GitCommit, files: &[(&str, &str)]) {
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
            .collect();
        self.commits.lock().unwrap().push((commit, files));
    }

    pub fn checkouts(&self) -> usize {
        *self.checkouts.lock().unwrap()
    }
}

#[async_trait]
impl SourceRepository for MemorySourceRepository {
    async fn list_commits(&self, _path_prefix: &str, since: DateTime<Utc>) -> Result<Vec<GitCommit>> {
        let commits = self.commits.lock().unwrap();
        Ok(commits
            .iter()
            .rev()
            .filter(|(commit, _)| commit.committed_at >= since)
            .map(|(commit, _)| commit.clone())
            .collect())
    }

    async fn checkout_and_read(&self, commit: &str, paths: &[&str]) -> Result<RepoSnapshot> {
        *self.checkouts.lock().unwrap() += 1;
        let commits = self.commits.lock().unwrap();
        let (_, tree) = commits
            .iter()
            .find(|(c, _)| c.sha == commit)
            .ok_or_else(|| SvcstatError::Git(format!("unknown revision {commit}")))?;
        let files = paths
            .iter()
            .filter_map(|path| tree.get(*path).map(|bytes| (path.to_string(), bytes.clone())))
            .collect();
        Ok(RepoSnapshot {
            commit: commit.to_string(),
            files,
        })
    }
}
