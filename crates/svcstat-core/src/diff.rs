//! Diff engine: attribute component image changes to merged pull/merge requests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info_span, Instrument};

use crate::component_git::ComponentGitAccessor;
use crate::domain::component::{RepositoryHost, ResolvedComponent};
use crate::domain::diff::{ComponentChange, ComponentDiff, EnvironmentReleaseDiff};
use crate::domain::release::EnvironmentRelease;
use crate::git::GitCommit;

/// Upper bound on commits scanned when walking from one source SHA to another.
pub const DEFAULT_MAX_COMMITS: usize = 1000;

fn github_pr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Merge pull request #(\d+)").expect("valid regex"))
}

fn gitlab_mr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"See merge request .*!(\d+)").expect("valid regex"))
}

fn issue_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9]+-\d+\b").expect("valid regex"))
}

/// Third line of the message (the body after a blank line), else a fallback
/// naming the commit.
pub fn change_summary(commit: &GitCommit) -> String {
    let lines: Vec<&str> = commit.message.splitn(4, '\n').collect();
    match lines.get(2) {
        Some(line) => line.to_string(),
        None => format!("Hash: {}, Message: {}", commit.sha, commit.first_line()),
    }
}

/// Tracker keys such as `ARO-1234` mentioned in the message, first occurrence order.
pub fn issue_references(message: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    issue_regex()
        .find_iter(message)
        .map(|m| m.as_str().to_string())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

fn request_number(host: RepositoryHost, message: &str) -> Option<u64> {
    let re = match host {
        RepositoryHost::GitHub => github_pr_regex(),
        RepositoryHost::GitLab => gitlab_mr_regex(),
    };
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Compares two environment releases component by component.
pub struct DiffEngine {
    git: Arc<dyn ComponentGitAccessor>,
    max_commits: usize,
}

impl DiffEngine {
    pub fn new(git: Arc<dyn ComponentGitAccessor>) -> Self {
        Self {
            git,
            max_commits: DEFAULT_MAX_COMMITS,
        }
    }

    pub fn with_max_commits(mut self, max_commits: usize) -> Self {
        self.max_commits = max_commits;
        self
    }

    /// Changes that take `other` to `release`.
    ///
    /// Every component present in both releases is classified. A component
    /// is left out only when its source range is empty. Components whose
    /// history cannot be walked get the unavailable sentinel rather than
    /// failing the whole diff.
    pub async fn diff(
        &self,
        release: &EnvironmentRelease,
        other: &EnvironmentRelease,
    ) -> EnvironmentReleaseDiff {
        let span = info_span!(
            "diff",
            environment_release = %release.name,
            other_environment_release = %other.name
        );
        async move {
            let mut different_components = BTreeMap::new();
            for (name, component) in &release.components {
                let Some(other_component) = other.components.get(name) else {
                    continue;
                };
                if let Some(diff) = self.diff_component(component, other_component).await {
                    different_components.insert(name.clone(), diff);
                }
            }
            EnvironmentReleaseDiff {
                name: release.name.clone(),
                other_environment_release_name: other.name.clone(),
                different_components,
            }
        }
        .instrument(span)
        .await
    }

    async fn diff_component(
        &self,
        component: &ResolvedComponent,
        other: &ResolvedComponent,
    ) -> Option<ComponentDiff> {
        let name = component.name.as_str();
        let Some(repo_url) = component.repo_url.as_deref() else {
            return Some(ComponentDiff::unavailable(name, "No known repository link"));
        };
        let Some(sha) = component.source_sha() else {
            return Some(ComponentDiff::unavailable(
                name,
                "target environment release has no SHA",
            ));
        };
        let Some(other_sha) = other.source_sha() else {
            return Some(ComponentDiff::unavailable(
                name,
                "source environment release has no SHA",
            ));
        };

        if sha == other_sha {
            return None;
        }

        let commits = match self
            .git
            .commits_between(name, sha, other_sha, self.max_commits)
            .await
        {
            Ok(commits) => commits,
            Err(e) => {
                return Some(ComponentDiff::unavailable(
                    name,
                    format!(
                        "failed to get diff for component {name:?}, curr={sha:?}, other={other_sha:?}: {e}"
                    ),
                ))
            }
        };
        if commits.is_empty() {
            debug!(component = %name, "source SHAs are identical");
            return None;
        }

        let host = RepositoryHost::detect(repo_url);
        let mut diff = ComponentDiff {
            name: name.to_string(),
            number_of_changes: 0,
            changes: Vec::new(),
        };
        for commit in commits.iter().filter(|c| c.is_merge()) {
            diff.number_of_changes += 1;
            let change = match host {
                Some(host) => ComponentChange::PrMerge {
                    sha: commit.sha.clone(),
                    number: request_number(host, &commit.message),
                    summary: change_summary(commit),
                    provider: host,
                    issue_references: issue_references(&commit.message),
                },
                None => ComponentChange::unavailable(format!(
                    "unrecognised repository host for {repo_url}"
                )),
            };
            diff.changes.push(change);
        }
        Some(diff)
    }
}
