//! Sippy job-run client
//!
//! Sippy indexes periodic CI jobs per "release"; for this platform those
//! releases are the deployment environments. Only the first page of the
//! `jobs/runs` listing is read.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use svcstat_core::{JobOutcome, JobRun, JobRunSource};
use tracing::{debug, info};

use crate::error::{CiClientError, Result};

pub const DEFAULT_BASE_URL: &str = "https://sippy.dptools.openshift.org";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const JOB_RUNS_PATH: &str = "api/jobs/runs";

/// Map an environment to the release name the CI results service uses.
pub fn ci_release_name(environment: &str) -> Result<&'static str> {
    match environment {
        "int" => Ok("aro-integration"),
        "stg" => Ok("aro-stage"),
        "prod" => Ok("aro-production"),
        other => Err(CiClientError::UnknownEnvironment(other.to_string())),
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SippyConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SippyConfig {
    fn default() -> Self {
        SippyConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SippyConfig {
    /// `SVCSTAT_SIPPY_URL` overrides the public instance.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SVCSTAT_SIPPY_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        config
    }

    pub fn new(base_url: &str) -> Self {
        SippyConfig {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }
}

/// One page of the job-run listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRunPage {
    #[serde(default)]
    pub rows: Vec<JobRunRow>,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub total_rows: i64,
}

impl JobRunPage {
    pub fn is_partial(&self) -> bool {
        self.total_rows != self.page_size
    }
}

/// The subset of a Sippy job-run row the engine uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRunRow {
    #[serde(default)]
    pub job: String,
    /// Start time, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub overall_result: String,
    #[serde(default)]
    pub url: String,
}

impl From<JobRunRow> for JobRun {
    fn from(row: JobRunRow) -> Self {
        JobRun {
            job: row.job,
            timestamp_ms: row.timestamp,
            overall_result: JobOutcome::from_code(&row.overall_result),
            url: row.url,
        }
    }
}

/// HTTP client for the Sippy job-run API
pub struct SippyClient {
    config: SippyConfig,
    http_client: reqwest::Client,
}

impl SippyClient {
    pub fn new(config: SippyConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("svcstat-ci/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(SippyClient {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SippyConfig::from_env())
    }

    pub fn config(&self) -> &SippyConfig {
        &self.config
    }

    /// `<base>/api/jobs/runs?release=<release>&period=default`
    pub fn job_runs_url(&self, release: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            JOB_RUNS_PATH
        );
        let mut url = Url::parse(&raw).map_err(|e| CiClientError::InvalidUrl(format!("{raw}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("release", release)
            .append_pair("period", "default");
        Ok(url)
    }

    /// Fetch the job runs recorded against a CI release name.
    pub async fn fetch_page(&self, release: &str) -> Result<JobRunPage> {
        let url = self.job_runs_url(release)?;
        debug!(url = %url, "fetching CI job runs");

        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CiClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        let page: JobRunPage = serde_json::from_slice(&body)?;
        if page.is_partial() {
            info!(
                release = %release,
                page_size = page.page_size,
                total_rows = page.total_rows,
                "more than one page of CI results"
            );
        }
        Ok(page)
    }

    /// Job runs for an environment, in service order.
    pub async fn job_runs_for_environment(&self, environment: &str) -> Result<Vec<JobRun>> {
        let release = ci_release_name(environment)?;
        let page = self.fetch_page(release).await?;
        Ok(page.rows.into_iter().map(JobRun::from).collect())
    }
}

#[async_trait]
impl JobRunSource for SippyClient {
    async fn list_job_runs(&self, environment: &str) -> svcstat_core::Result<Vec<JobRun>> {
        Ok(self.job_runs_for_environment(environment).await?)
    }
}
