//! Error types for the CI results client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiClientError {
    /// No CI release is published for this environment
    #[error("no CI release for environment {0:?}")]
    UnknownEnvironment(String),

    #[error("invalid CI results URL: {0}")]
    InvalidUrl(String),

    /// Transport failure or timeout
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("error getting CI results (status={status}) for: {url}")]
    Status { status: u16, url: String },

    #[error("error parsing CI results: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CiClientError {
    fn from(err: reqwest::Error) -> Self {
        CiClientError::Http(err.to_string())
    }
}

impl From<CiClientError> for svcstat_core::SvcstatError {
    fn from(err: CiClientError) -> Self {
        svcstat_core::SvcstatError::CiResults(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CiClientError>;
