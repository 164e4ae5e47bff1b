//! Component-level differences between two environment releases.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::component::RepositoryHost;

/// Sentinel for "not computed, see the `Unavailable` change".
pub const CHANGES_UNAVAILABLE: i32 = -1;

/// One attributed change to a component between two releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "changeType")]
pub enum ComponentChange {
    #[serde(rename = "PRMerge", rename_all = "camelCase")]
    PrMerge {
        sha: String,
        /// PR (GitHub) or MR (GitLab) number, when the merge message names one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        number: Option<u64>,
        summary: String,
        provider: RepositoryHost,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        issue_references: Vec<String>,
    },
    Unavailable { reason: String },
}

impl ComponentChange {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ComponentChange::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDiff {
    pub name: String,
    /// Merge commits found, or [`CHANGES_UNAVAILABLE`]. Never read -1 as zero.
    pub number_of_changes: i32,
    #[serde(default)]
    pub changes: Vec<ComponentChange>,
}

impl ComponentDiff {
    pub fn unavailable(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            number_of_changes: CHANGES_UNAVAILABLE,
            changes: vec![ComponentChange::unavailable(reason)],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.number_of_changes == CHANGES_UNAVAILABLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReleaseDiff {
    pub name: String,
    pub other_environment_release_name: String,
    #[serde(default)]
    pub different_components: BTreeMap<String, ComponentDiff>,
}
