//! Release discovery over scripted configuration histories.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use svcstat_core::config::{BASE_CONFIG_PATH, OVERLAY_CONFIG_PATH};
use svcstat_core::fakes::{commit, FakeClock, FakeImageInspector, MemorySourceRepository};
use svcstat_core::{
    ComponentExtractor, ComponentRegistry, ProvenanceResolver, ReleaseDiscovery, SvcstatError,
};

fn base_config(frontend_digest: &str, replicas: u32) -> String {
    format!(
        r#"defaults:
  availabilityZoneCount: {{{{ .ev2.availabilityZoneCount }}}}
  frontend:
    image:
      registry: ignored.example
      repository: ignored
      digest: {frontend_digest}
  maestro:
    image:
      digest: sha256:maestro
    replicas: {replicas}
"#
    )
}

fn overlay_config(prod_region: &str) -> String {
    format!(
        r#"clouds:
  public:
    environments:
      int:
        defaults:
          region: uksouth
      prod:
        defaults:
          region: {prod_region}
"#
    )
}

struct Harness {
    now: DateTime<Utc>,
    repo: Arc<MemorySourceRepository>,
    inspector: Arc<FakeImageInspector>,
    discovery: ReleaseDiscovery,
}

fn harness() -> Harness {
    let now = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let repo = Arc::new(MemorySourceRepository::new());
    let inspector = Arc::new(FakeImageInspector::new());
    let extractor = Arc::new(ComponentExtractor::new(
        Arc::new(ComponentRegistry::builtin()),
        Arc::new(ProvenanceResolver::new(inspector.clone())),
    ));
    let discovery = ReleaseDiscovery::new(repo.clone(), extractor, Arc::new(FakeClock::new(now)));
    Harness {
        now,
        repo,
        inspector,
        discovery,
    }
}

fn files<'a>(base: &'a str, overlay: &'a str) -> [(&'static str, &'a str); 2] {
    [(BASE_CONFIG_PATH, base), (OVERLAY_CONFIG_PATH, overlay)]
}

#[tokio::test]
async fn no_op_commits_collapse_into_one_release() {
    let h = harness();
    let overlay = overlay_config("eastus");

    h.repo.push_commit(
        commit("c1aaaaaaaa", 1, h.now - Duration::hours(10), "add frontend (#1)"),
        &files(&base_config("sha256:one", 1), &overlay),
    );
    // Non-image setting changes.
    h.repo.push_commit(
        commit("c2bbbbbbbb", 1, h.now - Duration::hours(9), "scale maestro (#2)"),
        &files(&base_config("sha256:one", 3), &overlay),
    );
    // Another environment's overlay changes.
    h.repo.push_commit(
        commit("c3cccccccc", 2, h.now - Duration::hours(8), "Merge pull request #3 from a/b"),
        &files(&base_config("sha256:one", 3), &overlay_config("westus")),
    );
    // Direct push that is not a reviewed merge.
    h.repo.push_commit(
        commit("cXdddddddd", 1, h.now - Duration::hours(7), "wip bump"),
        &files(&base_config("sha256:wip", 3), &overlay_config("westus")),
    );
    h.repo.push_commit(
        commit("c4eeeeeeee", 1, h.now - Duration::hours(6), "bump frontend (#4)"),
        &files(&base_config("sha256:two", 3), &overlay_config("westus")),
    );

    let releases = h
        .discovery
        .list_releases("int", Duration::days(14))
        .await
        .unwrap();

    let shas: Vec<&str> = releases.iter().map(|r| r.sha.as_str()).collect();
    assert_eq!(shas, vec!["c4eeeeeeee", "c1aaaaaaaa"]);
    assert_eq!(releases[0].name, "int---2024-05-31T18:00:00Z-c4eee");
    assert_eq!(releases[1].release_name, "2024-05-31T14:00:00Z-c1aaa");
    assert_eq!(
        releases[0].components["Frontend"].image.as_ref().unwrap().digest,
        "sha256:two"
    );
    assert_eq!(
        releases[0].components["Frontend"]
            .image
            .as_ref()
            .unwrap()
            .registry,
        "arohcpsvcdev.azurecr.io"
    );
    assert!(releases[0].release_time().unwrap() > releases[1].release_time().unwrap());
}

#[tokio::test]
async fn schema_drift_is_skipped_and_walk_continues() {
    let h = harness();
    let overlay = overlay_config("eastus");

    h.repo.push_commit(
        commit("d1aaaaaaaa", 1, h.now - Duration::hours(5), "first (#1)"),
        &files(&base_config("sha256:one", 1), &overlay),
    );
    h.repo.push_commit(
        commit("d2bbbbbbbb", 1, h.now - Duration::hours(4), "old schema (#2)"),
        &files("defaults:\n  frontend: [not, a, mapping]\n", &overlay),
    );
    h.repo.push_commit(
        commit("d3cccccccc", 1, h.now - Duration::hours(3), "broken yaml (#3)"),
        &files("defaults: {frontend: [\n", &overlay),
    );
    h.repo.push_commit(
        commit("d4dddddddd", 1, h.now - Duration::hours(2), "bump (#4)"),
        &files(&base_config("sha256:two", 1), &overlay),
    );

    let releases = h
        .discovery
        .list_releases("int", Duration::days(14))
        .await
        .unwrap();
    let shas: Vec<&str> = releases.iter().map(|r| r.sha.as_str()).collect();
    assert_eq!(shas, vec!["d4dddddddd", "d1aaaaaaaa"]);
}

#[tokio::test]
async fn commits_before_environment_config_are_ignored() {
    let h = harness();
    h.repo.push_commit(
        commit("e1aaaaaaaa", 1, h.now - Duration::hours(5), "base only (#1)"),
        &[(BASE_CONFIG_PATH, base_config("sha256:one", 1).as_str())],
    );
    h.repo.push_commit(
        commit("e2bbbbbbbb", 1, h.now - Duration::hours(4), "add overlay (#2)"),
        &files(&base_config("sha256:one", 1), &overlay_config("eastus")),
    );

    let releases = h
        .discovery
        .list_releases("int", Duration::days(14))
        .await
        .unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].sha, "e2bbbbbbbb");

    // "stg" has no overlay entry at all.
    let releases = h
        .discovery
        .list_releases("stg", Duration::days(14))
        .await
        .unwrap();
    assert!(releases.is_empty());
}

#[tokio::test]
async fn lookback_window_bounds_history() {
    let h = harness();
    let overlay = overlay_config("eastus");
    h.repo.push_commit(
        commit("f1aaaaaaaa", 1, h.now - Duration::days(20), "ancient (#1)"),
        &files(&base_config("sha256:old", 1), &overlay),
    );
    h.repo.push_commit(
        commit("f2bbbbbbbb", 1, h.now - Duration::days(1), "recent (#2)"),
        &files(&base_config("sha256:new", 1), &overlay),
    );

    let releases = h
        .discovery
        .list_releases("int", Duration::days(14))
        .await
        .unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].sha, "f2bbbbbbbb");
}

#[tokio::test]
async fn unknown_environment_is_an_error_not_a_walk() {
    let h = harness();
    h.repo.push_commit(
        commit("g1aaaaaaaa", 1, h.now - Duration::hours(1), "x (#1)"),
        &files(&base_config("sha256:one", 1), &overlay_config("eastus")),
    );

    let err = h
        .discovery
        .list_releases("dev", Duration::days(14))
        .await
        .unwrap_err();
    assert!(matches!(err, SvcstatError::UnknownEnvironment(env) if env == "dev"));
    assert_eq!(h.repo.checkouts(), 0);
}

#[tokio::test]
async fn shared_images_are_inspected_once_across_releases() {
    let h = harness();
    let overlay = overlay_config("eastus");
    h.inspector.set_source(
        "quay.io/redhat-user-workloads/maestro-rhtap-tenant/maestro/maestro@sha256:maestro",
        "maestro-sha",
        "2024-05-01T00:00:00Z",
    );
    h.repo.push_commit(
        commit("h1aaaaaaaa", 1, h.now - Duration::hours(3), "one (#1)"),
        &files(&base_config("sha256:one", 1), &overlay),
    );
    h.repo.push_commit(
        commit("h2bbbbbbbb", 1, h.now - Duration::hours(2), "two (#2)"),
        &files(&base_config("sha256:two", 1), &overlay),
    );

    let releases = h
        .discovery
        .list_releases("int", Duration::days(14))
        .await
        .unwrap();
    assert_eq!(releases.len(), 2);
    let maestro = "quay.io/redhat-user-workloads/maestro-rhtap-tenant/maestro/maestro@sha256:maestro";
    assert_eq!(h.inspector.pull_count(maestro), 1);
    assert_eq!(
        releases[1].components["Maestro"].source_sha(),
        Some("maestro-sha")
    );
}
