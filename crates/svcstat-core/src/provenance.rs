//! Image provenance: which source commit an image was built from, and when.
//!
//! Inspection shells out to `podman`, pulling the image first since inspect
//! only reads local storage. Results, including failures, are memoised per
//! image reference for the life of the resolver.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::domain::component::{ImageProvenance, ImageReference};
use crate::domain::error::ProvenanceError;

pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_INSPECT_TIMEOUT: Duration = Duration::from_secs(90);

/// Registry prefixes that need credentials, and the file holding them.
const CREDENTIAL_FILES: [(&str, &str); 3] = [
    ("quay.io/app-sre/", "quay-repository-app-sre-dockerconfig.json"),
    ("quay.io/acm-d/", "quay-repository-acm-d-dockerconfig.json"),
    ("arohcpsvcdev.azurecr.io/", "arohcpsvcdev-dockerconfig.json"),
];

/// Credential file name for a pull spec, if its registry needs one.
pub fn credential_file_for(pull_spec: &str) -> Option<&'static str> {
    CREDENTIAL_FILES
        .iter()
        .find(|(prefix, _)| pull_spec.starts_with(prefix))
        .map(|(_, file)| *file)
}

/// Container tooling able to fetch and describe an image.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    /// Make the image available locally.
    async fn pull(&self, pull_spec: &str) -> Result<(), ProvenanceError>;

    /// Inspect document for a previously pulled image.
    async fn inspect(&self, pull_spec: &str) -> Result<Value, ProvenanceError>;
}

/// Read provenance out of an inspect document.
///
/// Missing labels or an unparseable creation time leave the field unset.
pub fn parse_inspect(inspect: &Value) -> ImageProvenance {
    let source_sha = inspect
        .pointer("/Config/Labels/vcs-ref")
        .and_then(Value::as_str)
        .map(str::to_string);
    let image_creation_time = inspect
        .get("Created")
        .and_then(Value::as_str)
        .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
        .map(|t| t.with_timezone(&Utc));
    ImageProvenance {
        image_creation_time,
        source_sha,
    }
}

/// [`ImageInspector`] backed by the `podman` CLI.
#[derive(Debug, Clone, Default)]
pub struct PodmanInspector {
    pull_secret_dir: Option<PathBuf>,
}

impl PodmanInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pull_secret_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pull_secret_dir = Some(dir.into());
        self
    }

    fn authfile(&self, pull_spec: &str) -> Option<PathBuf> {
        let dir = self.pull_secret_dir.as_ref()?;
        credential_file_for(pull_spec).map(|file| dir.join(file))
    }

    async fn podman(&self, args: &[&str]) -> Result<Vec<u8>, String> {
        let output = Command::new("podman")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to start podman: {e}"))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ImageInspector for PodmanInspector {
    async fn pull(&self, pull_spec: &str) -> Result<(), ProvenanceError> {
        let authfile = self.authfile(pull_spec);
        let authfile = authfile.as_ref().map(|p| p.to_string_lossy().into_owned());
        let mut args = vec!["pull", "--quiet", pull_spec];
        if let Some(authfile) = authfile.as_deref() {
            args.extend(["--authfile", authfile]);
        }

        let start = Instant::now();
        self.podman(&args)
            .await
            .map_err(|message| {
                info!(pull_spec = %pull_spec, duration_ms = start.elapsed().as_millis() as u64, "failed to pull image");
                ProvenanceError::PullFailed {
                    pull_spec: pull_spec.to_string(),
                    message,
                }
            })?;
        info!(pull_spec = %pull_spec, duration_ms = start.elapsed().as_millis() as u64, "pulled image");
        Ok(())
    }

    async fn inspect(&self, pull_spec: &str) -> Result<Value, ProvenanceError> {
        let failed = |message: String| ProvenanceError::InspectFailed {
            pull_spec: pull_spec.to_string(),
            message,
        };

        let stdout = self.podman(&["inspect", pull_spec]).await.map_err(failed)?;
        let documents: Vec<Value> = serde_json::from_slice(&stdout)
            .map_err(|e| failed(format!("failed to parse inspect output: {e}")))?;
        documents
            .into_iter()
            .next()
            .ok_or_else(|| failed("no content".to_string()))
    }
}

type Memo = Arc<OnceCell<Result<ImageProvenance, ProvenanceError>>>;

/// Memoising provenance lookup with bounded pull and inspect times.
///
/// Concurrent requests for the same reference share one lookup; different
/// references proceed in parallel.
pub struct ProvenanceResolver {
    inspector: Arc<dyn ImageInspector>,
    pull_timeout: Duration,
    inspect_timeout: Duration,
    results: StdMutex<HashMap<ImageReference, Memo>>,
}

impl ProvenanceResolver {
    pub fn new(inspector: Arc<dyn ImageInspector>) -> Self {
        Self {
            inspector,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
            inspect_timeout: DEFAULT_INSPECT_TIMEOUT,
            results: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_timeouts(mut self, pull: Duration, inspect: Duration) -> Self {
        self.pull_timeout = pull;
        self.inspect_timeout = inspect;
        self
    }

    fn memo(&self, image: &ImageReference) -> Memo {
        let mut results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.entry(image.clone()).or_default().clone()
    }

    /// Provenance for `image`; the first outcome is returned to every caller.
    pub async fn resolve(&self, image: &ImageReference) -> Result<ImageProvenance, ProvenanceError> {
        let memo = self.memo(image);
        memo.get_or_init(|| self.lookup(image)).await.clone()
    }

    async fn lookup(&self, image: &ImageReference) -> Result<ImageProvenance, ProvenanceError> {
        let pull_spec = image.pull_spec()?;
        debug!(pull_spec = %pull_spec, "resolving image provenance");

        tokio::time::timeout(self.pull_timeout, self.inspector.pull(&pull_spec))
            .await
            .map_err(|_| ProvenanceError::PullTimeout {
                pull_spec: pull_spec.clone(),
                seconds: self.pull_timeout.as_secs(),
            })??;

        let inspect = tokio::time::timeout(self.inspect_timeout, self.inspector.inspect(&pull_spec))
            .await
            .map_err(|_| ProvenanceError::InspectTimeout {
                pull_spec: pull_spec.clone(),
                seconds: self.inspect_timeout.as_secs(),
            })??;

        Ok(parse_inspect(&inspect))
    }
}
