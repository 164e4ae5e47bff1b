//! Error taxonomy for the release engine.

/// Failure of an image provenance lookup.
///
/// Failed lookups are memoised and returned to every later caller for the
/// same image reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("pull of {pull_spec} timed out after {seconds}s")]
    PullTimeout { pull_spec: String, seconds: u64 },

    #[error("inspect of {pull_spec} timed out after {seconds}s")]
    InspectTimeout { pull_spec: String, seconds: u64 },

    #[error("pull of {pull_spec} failed: {message}")]
    PullFailed { pull_spec: String, message: String },

    #[error("inspect of {pull_spec} failed: {message}")]
    InspectFailed { pull_spec: String, message: String },
}

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SvcstatError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("invalid release name: {0}")]
    InvalidReleaseName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("provenance error: {0}")]
    Provenance(#[from] ProvenanceError),

    #[error("CI rule error: {0}")]
    CiRules(String),

    #[error("CI results error: {0}")]
    CiResults(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvcstatError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        SvcstatError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether this is a lookup miss rather than an internal failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SvcstatError::NotFound { .. })
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SvcstatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        let err = SvcstatError::not_found("environment release", "int---2024");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "environment release not found: int---2024"
        );

        let err = SvcstatError::Git("checkout failed".to_string());
        assert!(!err.is_not_found());
    }

    #[test]
    fn provenance_error_converts_and_keeps_message() {
        let err: SvcstatError = ProvenanceError::PullTimeout {
            pull_spec: "quay.io/a/b@sha256:aaa".to_string(),
            seconds: 300,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("provenance error"));
        assert!(msg.contains("timed out after 300s"));
    }

    #[test]
    fn unknown_environment_display() {
        let err = SvcstatError::UnknownEnvironment("dev".to_string());
        assert!(err.to_string().contains("unknown environment: dev"));
    }
}
