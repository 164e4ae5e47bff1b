//! Image provenance memoisation and time bounds.

use std::sync::Arc;
use std::time::Duration;

use svcstat_core::fakes::FakeImageInspector;
use svcstat_core::{ImageReference, ProvenanceError, ProvenanceResolver};

const FRONTEND: &str = "arohcpsvcdev.azurecr.io/arohcpfrontend@sha256:aaa";

fn frontend() -> ImageReference {
    ImageReference::new("arohcpsvcdev.azurecr.io", "arohcpfrontend", "sha256:aaa")
}

#[tokio::test]
async fn concurrent_callers_share_one_pull() {
    let inspector = Arc::new(FakeImageInspector::new().with_pull_delay(Duration::from_millis(20)));
    inspector.set_source(FRONTEND, "abc123", "2024-05-01T10:00:00Z");
    let resolver = Arc::new(ProvenanceResolver::new(inspector.clone()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move { resolver.resolve(&frontend()).await }));
    }
    for handle in handles {
        let provenance = handle.await.unwrap().unwrap();
        assert_eq!(provenance.source_sha.as_deref(), Some("abc123"));
    }

    assert_eq!(inspector.pull_count(FRONTEND), 1);
    assert_eq!(inspector.inspect_count(FRONTEND), 1);
}

#[tokio::test]
async fn failures_are_memoised_too() {
    let inspector = Arc::new(FakeImageInspector::new());
    inspector.fail_pull(FRONTEND, "unauthorized");
    let resolver = ProvenanceResolver::new(inspector.clone());

    let first = resolver.resolve(&frontend()).await.unwrap_err();
    // Even once the registry recovers, the cached failure is returned.
    inspector.set_source(FRONTEND, "abc123", "2024-05-01T10:00:00Z");
    let second = resolver.resolve(&frontend()).await.unwrap_err();

    assert_eq!(first, second);
    assert!(matches!(first, ProvenanceError::PullFailed { message, .. } if message == "unauthorized"));
    assert_eq!(inspector.pull_count(FRONTEND), 1);
    assert_eq!(inspector.inspect_count(FRONTEND), 0);
}

#[tokio::test]
async fn distinct_references_resolve_independently() {
    let inspector = Arc::new(FakeImageInspector::new());
    inspector.set_source(FRONTEND, "abc123", "2024-05-01T10:00:00Z");
    let resolver = ProvenanceResolver::new(inspector.clone());

    let other = ImageReference::new("arohcpsvcdev.azurecr.io", "arohcpfrontend", "sha256:bbb");
    assert!(resolver.resolve(&frontend()).await.is_ok());
    assert!(resolver.resolve(&other).await.is_err());
    assert_eq!(inspector.total_pulls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_pull_times_out_and_is_memoised() {
    let inspector = Arc::new(FakeImageInspector::new().with_pull_delay(Duration::from_secs(600)));
    inspector.set_source(FRONTEND, "abc123", "2024-05-01T10:00:00Z");
    let resolver = ProvenanceResolver::new(inspector.clone());

    let err = resolver.resolve(&frontend()).await.unwrap_err();
    assert_eq!(
        err,
        ProvenanceError::PullTimeout {
            pull_spec: FRONTEND.to_string(),
            seconds: 300,
        }
    );

    let again = resolver.resolve(&frontend()).await.unwrap_err();
    assert_eq!(err, again);
    assert_eq!(inspector.pull_count(FRONTEND), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_timeouts_apply() {
    let inspector = Arc::new(FakeImageInspector::new().with_pull_delay(Duration::from_secs(20)));
    inspector.set_source(FRONTEND, "abc123", "2024-05-01T10:00:00Z");
    let resolver = ProvenanceResolver::new(inspector)
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(5));

    let err = resolver.resolve(&frontend()).await.unwrap_err();
    assert!(err.to_string().contains("timed out after 10s"));
}
