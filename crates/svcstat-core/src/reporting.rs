//! Markdown rendering of environment releases.

use chrono::{DateTime, Utc};

use crate::domain::component::ResolvedComponent;
use crate::domain::release::{changed_components, EnvironmentRelease};
use crate::registry::ComponentRegistry;

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    match elapsed.num_days() {
        d if d >= 2 => format!("{d} days ago"),
        1 => "1 day ago".to_string(),
        _ => match elapsed.num_hours() {
            h if h >= 2 => format!("{h} hours ago"),
            _ => "recently".to_string(),
        },
    }
}

fn render_component_md(
    out: &mut String,
    component: &ResolvedComponent,
    registry: &ComponentRegistry,
    now: DateTime<Utc>,
) {
    let repo = component.repo_url.as_deref().unwrap_or("");
    out.push_str(&format!("### [{}]({})\n", component.name, repo));
    out.push_str(&format!("* {repo}\n"));

    let pull_spec = match &component.image {
        Some(image) => image.pull_spec().unwrap_or_else(|e| format!("ERROR: {e}")),
        None => "ERROR: no image".to_string(),
    };
    out.push_str(&format!("* Pull Spec: {pull_spec}\n"));

    match component.provenance.image_creation_time {
        Some(created) => {
            let threshold = registry
                .get(&component.name)
                .and_then(|d| d.freshness_threshold);
            let stale = threshold.is_some_and(|t| component.is_stale(now, t));
            out.push_str(&format!(
                "  * Image built {}.{}\n",
                age(now, created),
                if stale { " **Stale**" } else { "" }
            ));
        }
        None => out.push_str("  * Image built an unknown time ago.\n"),
    }

    match (component.source_sha(), &component.provenance_error) {
        (Some(sha), _) => out.push_str(&format!(
            "* Commit: [{}]({})\n",
            sha,
            component.permanent_url_for_source_sha.as_deref().unwrap_or("")
        )),
        (None, Some(err)) => out.push_str(&format!("* Commit: ERROR: {err}\n")),
        (None, None) => out.push_str("* Commit: unknown\n"),
    }
    out.push('\n');
}

/// A "Release" document: components changed since `previous`, then the full
/// component list.
pub fn render_environment_release_md(
    current: &EnvironmentRelease,
    previous: Option<&EnvironmentRelease>,
    registry: &ComponentRegistry,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Release {}\n\n", current.release_name));

    out.push_str("## Diff\n\n");
    let changed = changed_components(current, previous);
    if changed.is_empty() {
        out.push_str("*No Changes*\n\n");
    } else {
        for name in &changed {
            if let Some(component) = current.components.get(name) {
                render_component_md(&mut out, component, registry, now);
            }
        }
    }

    out.push_str("## Content\n\n");
    for component in current.components.values() {
        render_component_md(&mut out, component, registry, now);
    }
    out
}

/// One bullet per release of `environment` naming what changed; `releases`
/// newest first.
pub fn render_release_summary_md(environment: &str, releases: &[EnvironmentRelease]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {environment} Releases\n\n"));
    if releases.is_empty() {
        out.push_str("*No Releases*\n");
        return out;
    }
    for (i, release) in releases.iter().enumerate() {
        let changed = changed_components(release, releases.get(i + 1));
        let changed = if changed.is_empty() {
            "no component changes".to_string()
        } else {
            changed.join(", ")
        };
        out.push_str(&format!(
            "* {} (`{}`): {}\n",
            release.release_name, release.sha, changed
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{ImageProvenance, ImageReference};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn release(name: &str, digest: &str, built: DateTime<Utc>) -> EnvironmentRelease {
        let mut components = BTreeMap::new();
        components.insert(
            "Frontend".to_string(),
            ResolvedComponent {
                name: "Frontend".to_string(),
                image: Some(ImageReference::new(
                    "arohcpsvcdev.azurecr.io",
                    "arohcpfrontend",
                    digest,
                )),
                provenance: ImageProvenance {
                    image_creation_time: Some(built),
                    source_sha: Some(format!("sha-{digest}")),
                },
                provenance_error: None,
                repo_url: Some("https://github.com/Azure/ARO-HCP".to_string()),
                permanent_url_for_source_sha: Some(format!(
                    "https://github.com/Azure/ARO-HCP/tree/sha-{digest}/"
                )),
            },
        );
        components.insert(
            "ACR Pull".to_string(),
            ResolvedComponent {
                name: "ACR Pull".to_string(),
                image: None,
                provenance: ImageProvenance::default(),
                provenance_error: None,
                repo_url: None,
                permanent_url_for_source_sha: None,
            },
        );
        EnvironmentRelease::new("int", name.to_string(), format!("{name}-sha"), components)
    }

    #[test]
    fn release_document_lists_changes_then_content() {
        let now = Utc::now();
        let registry = ComponentRegistry::builtin();
        let older = release("r1", "sha256:a", now - Duration::days(10));
        let newer = release("r2", "sha256:b", now - Duration::days(1));

        let md = render_environment_release_md(&newer, Some(&older), &registry, now);
        assert!(md.starts_with("# Release r2\n\n## Diff\n\n### [Frontend]"));
        let content = md.split("## Content").nth(1).unwrap();
        assert!(content.contains("### [ACR Pull]()"));
        assert!(content.contains("Image built 1 day ago."));
        assert!(md.contains("* Commit: [sha-sha256:b](https://github.com/Azure/ARO-HCP/tree/sha-sha256:b/)"));
    }

    #[test]
    fn unchanged_release_says_so_and_flags_stale_images() {
        let now = Utc::now();
        let registry = ComponentRegistry::builtin();
        let older = release("r1", "sha256:a", now - Duration::days(10));
        let same = release("r2", "sha256:a", now - Duration::days(10));

        let md = render_environment_release_md(&same, Some(&older), &registry, now);
        assert!(md.contains("*No Changes*"));
        assert!(md.contains("Image built 10 days ago. **Stale**"));
    }

    #[test]
    fn summary_has_one_bullet_per_release() {
        let now = Utc::now();
        let releases = vec![
            release("r2", "sha256:b", now),
            release("r1", "sha256:a", now),
        ];
        let md = render_release_summary_md("int", &releases);
        assert!(md.starts_with("# int Releases\n\n"));
        assert!(md.contains("* r2 (`r2-sha`): Frontend\n"));
        assert!(md.contains("* r1 (`r1-sha`): ACR Pull, Frontend\n"));
    }
}
