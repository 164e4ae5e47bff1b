//! Access to the source repository whose config history defines releases.
//!
//! The repository has a single working tree. Every operation that moves it
//! goes through [`GitWorkTree::checkout_and_read`], which holds an exclusive
//! lock and puts the original HEAD back before returning. Listing commits
//! takes the same lock and logs from the original HEAD.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::error::{Result, SvcstatError};

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
/// `git log` format matching [`parse_log`].
pub(crate) const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%cI%x1f%B%x1e";

/// A commit as read from `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub parents: Vec<String>,
    pub committed_at: DateTime<Utc>,
    pub message: String,
}

impl GitCommit {
    pub fn first_line(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Two parents, or a subject ending in a parenthetical such as `(#1234)`
    /// the way squash merges are titled.
    pub fn looks_like_reviewed_merge(&self) -> bool {
        self.parents.len() == 2 || self.first_line().trim_end().ends_with(')')
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }
}

/// File contents of the repository at one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub commit: String,
    /// Repository-relative path to bytes; files absent at the commit are omitted.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl RepoSnapshot {
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

/// Read access to the source repository's history.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Commits touching `path_prefix` committed after `since`, newest first.
    async fn list_commits(&self, path_prefix: &str, since: DateTime<Utc>)
        -> Result<Vec<GitCommit>>;

    /// Check out `commit` and read `paths` from the working tree.
    async fn checkout_and_read(&self, commit: &str, paths: &[&str]) -> Result<RepoSnapshot>;
}

/// Parse output produced with [`LOG_FORMAT`].
pub(crate) fn parse_log(raw: &str) -> Result<Vec<GitCommit>> {
    let mut commits = Vec::new();
    for record in raw.split(RECORD_SEP) {
        let record = record.trim_start_matches('\n');
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, FIELD_SEP);
        let (Some(sha), Some(parents), Some(date), Some(message)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SvcstatError::Git(format!(
                "malformed git log record: {record:?}"
            )));
        };
        let committed_at = DateTime::parse_from_rfc3339(date.trim())
            .map_err(|e| SvcstatError::Git(format!("bad commit date {date:?}: {e}")))?
            .with_timezone(&Utc);
        commits.push(GitCommit {
            sha: sha.trim().to_string(),
            parents: parents.split_whitespace().map(str::to_string).collect(),
            committed_at,
            message: message.trim_end_matches('\n').to_string(),
        });
    }
    Ok(commits)
}

/// Run `git` in `dir`, returning stdout.
pub(crate) async fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SvcstatError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SvcstatError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// A local clone whose working tree is replayed to historical commits.
pub struct GitWorkTree {
    repo_dir: PathBuf,
    lock: Mutex<()>,
}

impl GitWorkTree {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Branch name if HEAD is attached, otherwise the commit sha.
    async fn current_head(&self) -> Result<String> {
        if let Ok(branch) = run_git(&self.repo_dir, &["symbolic-ref", "--quiet", "--short", "HEAD"]).await {
            let branch = branch.trim();
            if !branch.is_empty() {
                return Ok(branch.to_string());
            }
        }
        let sha = run_git(&self.repo_dir, &["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }

    async fn checkout(&self, target: &str) -> Result<()> {
        run_git(
            &self.repo_dir,
            &["-c", "advice.detachedHead=false", "checkout", "--quiet", "--force", target],
        )
        .await
        .map(|_| ())
    }

    async fn read_files(&self, commit: &str, paths: &[&str]) -> Result<RepoSnapshot> {
        self.checkout(commit).await?;
        let mut files = BTreeMap::new();
        for path in paths {
            match tokio::fs::read(self.repo_dir.join(path)).await {
                Ok(bytes) => {
                    files.insert(path.to_string(), bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(RepoSnapshot {
            commit: commit.to_string(),
            files,
        })
    }
}

#[async_trait]
impl SourceRepository for GitWorkTree {
    async fn list_commits(
        &self,
        path_prefix: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GitCommit>> {
        // No replay can move HEAD while this is held.
        let _guard = self.lock.lock().await;
        let head = self.current_head().await?;
        let since = format!("--since={}", since.to_rfc3339());
        let raw = run_git(
            &self.repo_dir,
            &["log", LOG_FORMAT, &since, &head, "--", path_prefix],
        )
        .await?;
        parse_log(&raw)
    }

    async fn checkout_and_read(&self, commit: &str, paths: &[&str]) -> Result<RepoSnapshot> {
        let _guard = self.lock.lock().await;
        let original = self.current_head().await?;
        debug!(commit = %commit, original_head = %original, "checking out source repository");

        let result = self.read_files(commit, paths).await;

        if let Err(e) = self.checkout(&original).await {
            warn!(error = %e, original_head = %original, "failed to restore source repository HEAD");
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }
}
