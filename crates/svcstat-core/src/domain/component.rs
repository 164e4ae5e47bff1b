//! Container images, their provenance and the per-release component view.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ProvenanceError;

/// A container image pinned by content digest.
///
/// Equality is structural; the value is the memoisation key for provenance
/// lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub digest: String,
}

impl ImageReference {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            digest: digest.into(),
        }
    }

    /// Reject references with any empty field.
    pub fn validate(&self) -> Result<(), ProvenanceError> {
        if self.registry.is_empty() {
            return Err(ProvenanceError::InvalidReference(
                "container registry is missing".to_string(),
            ));
        }
        if self.repository.is_empty() {
            return Err(ProvenanceError::InvalidReference(
                "container repository is missing".to_string(),
            ));
        }
        if self.digest.is_empty() {
            return Err(ProvenanceError::InvalidReference(
                "container digest is missing".to_string(),
            ));
        }
        Ok(())
    }

    /// `registry/repository@digest`, after validation.
    pub fn pull_spec(&self) -> Result<String, ProvenanceError> {
        self.validate()?;
        Ok(format!(
            "{}/{}@{}",
            self.registry, self.repository, self.digest
        ))
    }
}

/// Build metadata recovered from an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_creation_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "sourceSHA",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_sha: Option<String>,
}

/// Source hosting flavour, which decides link layout and merge message format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryHost {
    GitHub,
    GitLab,
}

impl RepositoryHost {
    pub fn detect(repo_url: &str) -> Option<Self> {
        if repo_url.contains("github.com") {
            Some(RepositoryHost::GitHub)
        } else if repo_url.contains("gitlab") {
            Some(RepositoryHost::GitLab)
        } else {
            None
        }
    }

    /// Browse URL for the tree at `sha`.
    pub fn permanent_url(&self, repo_url: &str, sha: &str) -> String {
        let base = repo_url.trim_end_matches('/');
        match self {
            RepositoryHost::GitHub => format!("{base}/tree/{sha}/"),
            RepositoryHost::GitLab => format!("{base}/-/tree/{sha}/"),
        }
    }
}

/// A component as deployed by one environment release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedComponent {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageReference>,

    #[serde(flatten)]
    pub provenance: ImageProvenance,

    /// Why provenance could not be resolved, when it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_error: Option<String>,

    #[serde(default, rename = "repoURL", skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    #[serde(
        default,
        rename = "permanentURLForSourceSHA",
        skip_serializing_if = "Option::is_none"
    )]
    pub permanent_url_for_source_sha: Option<String>,
}

impl ResolvedComponent {
    pub fn source_sha(&self) -> Option<&str> {
        self.provenance
            .source_sha
            .as_deref()
            .filter(|sha| !sha.is_empty())
    }

    /// Whether the image is older than `threshold` at `now`.
    ///
    /// Components without a known build time are never reported stale.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.provenance.image_creation_time {
            Some(created) => now.signed_duration_since(created) > threshold,
            None => false,
        }
    }
}
