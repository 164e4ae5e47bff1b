//! CI correlation: attach job runs to the release that was live when they started.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::error::{Result, SvcstatError};
use crate::domain::job_run::{JobRun, JobRunResult};
use crate::domain::release::EnvironmentRelease;

pub const CATCH_ALL_PATTERN: &str = ".*";

/// How much a job's outcome should weigh when judging a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCategory {
    Blocking,
    Informing,
}

/// Assigns a variant label and category to job names matching any pattern.
#[derive(Debug, Clone)]
pub struct CiRule {
    pub variant: String,
    pub category: JobCategory,
    pub patterns: Vec<Regex>,
}

impl CiRule {
    pub fn new(variant: &str, category: JobCategory, patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| SvcstatError::CiRules(format!("{variant}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            variant: variant.to_string(),
            category,
            patterns,
        })
    }

    pub fn matches(&self, job: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(job))
    }
}

/// Ordered rules; the first match wins.
#[derive(Debug, Clone)]
pub struct CiRuleSet {
    rules: Vec<CiRule>,
}

impl CiRuleSet {
    /// Rejects a rule list whose last rule is not the `.*` catch-all.
    pub fn new(rules: Vec<CiRule>) -> Result<Self> {
        let has_catch_all = rules.last().is_some_and(|rule| {
            rule.patterns
                .iter()
                .any(|re| re.as_str() == CATCH_ALL_PATTERN)
        });
        if !has_catch_all {
            return Err(SvcstatError::CiRules(format!(
                "last rule must match {CATCH_ALL_PATTERN:?}"
            )));
        }
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(vec![
            CiRule::new(
                "bare-minimum",
                JobCategory::Blocking,
                &["periodic-ci-Azure-ARO-HCP-main-periodic-create-aro-hcp-in-.*"],
            )?,
            CiRule::new(
                "e2e-parallel",
                JobCategory::Informing,
                &["periodic-ci-Azure-ARO-HCP-main-periodic-.*-e2e-parallel"],
            )?,
            CiRule::new("unknown", JobCategory::Informing, &[CATCH_ALL_PATTERN])?,
        ])
    }

    pub fn classify(&self, job: &str) -> Option<&CiRule> {
        self.rules.iter().find(|rule| rule.matches(job))
    }
}

/// Source of CI job runs for an environment.
#[async_trait]
pub trait JobRunSource: Send + Sync {
    async fn list_job_runs(&self, environment: &str) -> Result<Vec<JobRun>>;
}

/// Buckets job runs onto releases.
pub struct CiCorrelator {
    rules: CiRuleSet,
}

impl CiCorrelator {
    pub fn new(rules: CiRuleSet) -> Self {
        Self { rules }
    }

    /// Append each run to the release whose interval
    /// `[release time, next newer release time)` contains its start time.
    ///
    /// `releases` must be newest first. The newest release's interval has no
    /// upper bound. Runs older than every release are dropped.
    pub fn correlate(&self, releases: &mut [EnvironmentRelease], runs: &[JobRun]) {
        let mut starts = Vec::with_capacity(releases.len());
        for release in releases.iter() {
            match release.release_time() {
                Ok(time) => starts.push(Some(time)),
                Err(e) => {
                    warn!(environment_release = %release.name, error = %e, "release has no usable time");
                    starts.push(None);
                }
            }
        }

        let mut attached = 0usize;
        for run in runs {
            let Some(started_at) = run.started_at() else {
                debug!(job = %run.job, timestamp_ms = run.timestamp_ms, "job run has no valid start time");
                continue;
            };
            let Some(index) = release_for(&starts, started_at) else {
                continue;
            };
            let Some(rule) = self.rules.classify(&run.job) else {
                info!(job = %run.job, "no matching CI rule for job run");
                continue;
            };

            let release = &mut releases[index];
            let buckets = match rule.category {
                JobCategory::Blocking => &mut release.blocking_job_run_results,
                JobCategory::Informing => &mut release.informing_job_run_results,
            };
            buckets
                .entry(rule.variant.clone())
                .or_default()
                .push(JobRunResult::from(run));
            attached += 1;
        }
        debug!(attached, total = runs.len(), "correlated job runs");
    }
}

/// Index of the newest release that started at or before `at`.
fn release_for(starts: &[Option<DateTime<Utc>>], at: DateTime<Utc>) -> Option<usize> {
    let mut upper: Option<DateTime<Utc>> = None;
    for (index, start) in starts.iter().enumerate() {
        let Some(start) = *start else {
            continue;
        };
        let below_upper = upper.map_or(true, |upper| at < upper);
        if start <= at && below_upper {
            return Some(index);
        }
        upper = Some(start);
    }
    None
}
