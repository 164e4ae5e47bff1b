//! CI job runs and their outcomes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Overall outcome of a CI job run, encoded on the wire as a single letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobOutcome {
    Succeeded,
    Running,
    InfrastructureFailure,
    InstallFailure,
    UpgradeFailure,
    TestFailure,
    FailureBeforeSetup,
    Aborted,
    Unknown,
}

impl JobOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "S",
            JobOutcome::Running => "R",
            JobOutcome::InfrastructureFailure => "N",
            JobOutcome::InstallFailure => "I",
            JobOutcome::UpgradeFailure => "U",
            JobOutcome::TestFailure => "F",
            JobOutcome::FailureBeforeSetup => "n",
            JobOutcome::Aborted => "A",
            JobOutcome::Unknown => "f",
        }
    }

    /// Map a wire code to an outcome; unrecognised codes become `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "S" => JobOutcome::Succeeded,
            "R" => JobOutcome::Running,
            "N" => JobOutcome::InfrastructureFailure,
            "I" => JobOutcome::InstallFailure,
            "U" => JobOutcome::UpgradeFailure,
            "F" => JobOutcome::TestFailure,
            "n" => JobOutcome::FailureBeforeSetup,
            "A" => JobOutcome::Aborted,
            _ => JobOutcome::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

impl From<String> for JobOutcome {
    fn from(code: String) -> Self {
        JobOutcome::from_code(&code)
    }
}

impl From<JobOutcome> for String {
    fn from(outcome: JobOutcome) -> Self {
        outcome.code().to_string()
    }
}

/// A job run as reported by the CI results service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job: String,
    /// Start time in epoch milliseconds.
    pub timestamp_ms: i64,
    pub overall_result: JobOutcome,
    pub url: String,
}

impl JobRun {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// A job run attached to an environment release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunResult {
    pub job_name: String,
    pub overall_result: JobOutcome,
    pub url: String,
}

impl From<&JobRun> for JobRunResult {
    fn from(run: &JobRun) -> Self {
        Self {
            job_name: run.job.clone(),
            overall_result: run.overall_result,
            url: run.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes_are_case_sensitive() {
        assert_eq!(JobOutcome::from_code("N"), JobOutcome::InfrastructureFailure);
        assert_eq!(JobOutcome::from_code("n"), JobOutcome::FailureBeforeSetup);
        assert_eq!(JobOutcome::from_code("f"), JobOutcome::Unknown);
        assert_eq!(JobOutcome::from_code("zzz"), JobOutcome::Unknown);
    }

    #[test]
    fn outcome_serializes_as_code() {
        let json = serde_json::to_string(&JobOutcome::UpgradeFailure).unwrap();
        assert_eq!(json, "\"U\"");
        let parsed: JobOutcome = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(parsed, JobOutcome::Aborted);
    }

    #[test]
    fn started_at_uses_milliseconds() {
        let run = JobRun {
            job: "job".to_string(),
            timestamp_ms: 1_700_000_000_123,
            overall_result: JobOutcome::Running,
            url: String::new(),
        };
        let started = run.started_at().unwrap();
        assert_eq!(started.timestamp(), 1_700_000_000);
        assert_eq!(started.timestamp_subsec_millis(), 123);
    }
}
