//! Releases, environment releases and their naming scheme.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::component::{ImageReference, ResolvedComponent};
use crate::domain::error::{Result, SvcstatError};
use crate::domain::job_run::JobRunResult;

const ENVIRONMENT_RELEASE_SEPARATOR: &str = "---";
const SHORT_SHA_LEN: usize = 5;

/// `<environment>---<release>`.
pub fn make_environment_release_name(environment: &str, release: &str) -> String {
    format!("{environment}{ENVIRONMENT_RELEASE_SEPARATOR}{release}")
}

/// Split `<environment>---<release>` into its two parts.
pub fn split_environment_release_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split(ENVIRONMENT_RELEASE_SEPARATOR);
    let environment = parts.next()?;
    let release = parts.next()?;
    if parts.next().is_some() || environment.is_empty() || release.is_empty() {
        return None;
    }
    Some((environment, release))
}

/// `<RFC3339 commit time in UTC>-<short sha>`.
///
/// Lexical order of names produced here matches commit time order.
pub fn make_release_name(commit_time: DateTime<Utc>, sha: &str) -> String {
    let short: String = sha.chars().take(SHORT_SHA_LEN).collect();
    format!(
        "{}-{}",
        commit_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        short
    )
}

/// Parse a release name back into its commit time and short sha.
pub fn split_release_name(name: &str) -> Result<(DateTime<Utc>, &str)> {
    let (time, sha) = name
        .rsplit_once('-')
        .ok_or_else(|| SvcstatError::InvalidReleaseName(name.to_string()))?;
    let time = DateTime::parse_from_rfc3339(time)
        .map_err(|e| SvcstatError::InvalidReleaseName(format!("{name}: {e}")))?
        .with_timezone(&Utc);
    Ok((time, sha))
}

/// A synthetic checkpoint inferred from a reviewed-merge commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub sha: String,
}

/// The resolved, environment-scoped state of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRelease {
    /// `<environment>---<release>`.
    pub name: String,
    pub release_name: String,
    pub sha: String,
    pub environment: String,
    #[serde(default)]
    pub components: BTreeMap<String, ResolvedComponent>,
    #[serde(default)]
    pub blocking_job_run_results: BTreeMap<String, Vec<JobRunResult>>,
    #[serde(default)]
    pub informing_job_run_results: BTreeMap<String, Vec<JobRunResult>>,
}

impl EnvironmentRelease {
    pub fn new(
        environment: &str,
        release_name: String,
        sha: String,
        components: BTreeMap<String, ResolvedComponent>,
    ) -> Self {
        Self {
            name: make_environment_release_name(environment, &release_name),
            release_name,
            sha,
            environment: environment.to_string(),
            components,
            blocking_job_run_results: BTreeMap::new(),
            informing_job_run_results: BTreeMap::new(),
        }
    }

    /// Commit time encoded in the release name.
    pub fn release_time(&self) -> Result<DateTime<Utc>> {
        split_release_name(&self.release_name).map(|(time, _)| time)
    }

    pub fn release(&self) -> Release {
        Release {
            name: self.release_name.clone(),
            sha: self.sha.clone(),
        }
    }

    /// Component name to image reference, the identity used for collapsing.
    pub fn image_set(&self) -> BTreeMap<&str, Option<&ImageReference>> {
        self.components
            .iter()
            .map(|(name, component)| (name.as_str(), component.image.as_ref()))
            .collect()
    }
}

/// Names of components whose image differs from `previous`, sorted.
///
/// Every component counts as changed when there is no previous release.
pub fn changed_components(
    current: &EnvironmentRelease,
    previous: Option<&EnvironmentRelease>,
) -> Vec<String> {
    let Some(previous) = previous else {
        return current.components.keys().cloned().collect();
    };
    current
        .components
        .iter()
        .filter(|(name, component)| {
            previous.components.get(name.as_str()).map(|p| &p.image) != Some(&component.image)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ImageProvenance;
    use crate::domain::job_run::JobOutcome;

    fn component(name: &str, digest: Option<&str>) -> ResolvedComponent {
        ResolvedComponent {
            name: name.to_string(),
            image: digest.map(|d| ImageReference::new("quay.io", "org/repo", d)),
            provenance: ImageProvenance {
                image_creation_time: None,
                source_sha: digest.map(|d| format!("src-{d}")),
            },
            provenance_error: None,
            repo_url: Some("https://github.com/org/repo".to_string()),
            permanent_url_for_source_sha: None,
        }
    }

    #[test]
    fn environment_release_name_roundtrip() {
        let name = make_environment_release_name("int", "2024-05-01T10:00:00Z-abcde");
        assert_eq!(name, "int---2024-05-01T10:00:00Z-abcde");
        assert_eq!(
            split_environment_release_name(&name),
            Some(("int", "2024-05-01T10:00:00Z-abcde"))
        );
        assert_eq!(split_environment_release_name("int"), None);
        assert_eq!(split_environment_release_name("a---b---c"), None);
    }

    #[test]
    fn release_name_encodes_time_and_short_sha() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let name = make_release_name(time, "0123456789abcdef");
        assert_eq!(name, "2024-05-01T10:00:00Z-01234");

        let (parsed, sha) = split_release_name(&name).unwrap();
        assert_eq!(parsed, time);
        assert_eq!(sha, "01234");
    }

    #[test]
    fn release_names_sort_by_time() {
        let earlier = make_release_name(
            DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z").unwrap().with_timezone(&Utc),
            "fffff",
        );
        let later = make_release_name(
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc),
            "00000",
        );
        assert!(earlier < later);
    }

    #[test]
    fn split_release_name_rejects_garbage() {
        assert!(matches!(
            split_release_name("not-a-release"),
            Err(SvcstatError::InvalidReleaseName(_))
        ));
        assert!(split_release_name("nodash").is_err());
    }

    #[test]
    fn changed_components_compares_images() {
        let mut older = BTreeMap::new();
        older.insert("Frontend".to_string(), component("Frontend", Some("sha256:aaa")));
        older.insert("Backend".to_string(), component("Backend", Some("sha256:111")));
        let older = EnvironmentRelease::new("int", "r1".to_string(), "s1".to_string(), older);

        let mut newer = BTreeMap::new();
        newer.insert("Frontend".to_string(), component("Frontend", Some("sha256:bbb")));
        newer.insert("Backend".to_string(), component("Backend", Some("sha256:111")));
        newer.insert("Maestro".to_string(), component("Maestro", Some("sha256:m")));
        let newer = EnvironmentRelease::new("int", "r2".to_string(), "s2".to_string(), newer);

        assert_eq!(
            changed_components(&newer, Some(&older)),
            vec!["Frontend".to_string(), "Maestro".to_string()]
        );
        assert_eq!(changed_components(&older, None).len(), 2);
    }

    #[test]
    fn environment_release_json_roundtrip() {
        let mut components = BTreeMap::new();
        components.insert("Frontend".to_string(), component("Frontend", Some("sha256:aaa")));
        components.insert("ACR Pull".to_string(), component("ACR Pull", None));
        let mut release = EnvironmentRelease::new(
            "int",
            "2024-05-01T10:00:00Z-abcde".to_string(),
            "abcde12345".to_string(),
            components,
        );
        release.blocking_job_run_results.insert(
            "bare-minimum".to_string(),
            vec![JobRunResult {
                job_name: "periodic-create".to_string(),
                overall_result: JobOutcome::Succeeded,
                url: "https://prow.example/1".to_string(),
            }],
        );

        let json = serde_json::to_string(&release).expect("serialize");
        let parsed: EnvironmentRelease = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, release);

        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["name"], "int---2024-05-01T10:00:00Z-abcde");
        assert_eq!(raw["releaseName"], "2024-05-01T10:00:00Z-abcde");
        assert!(raw["components"]["ACR Pull"].get("image").is_none());
        assert!(raw["components"]["ACR Pull"].get("sourceSHA").is_none());
        assert_eq!(
            raw["blockingJobRunResults"]["bare-minimum"][0]["overallResult"],
            "S"
        );
    }
}
