//! Component extraction from a merged environment configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::component::{ImageReference, RepositoryHost, ResolvedComponent};
use crate::domain::error::{Result, SvcstatError};
use crate::provenance::ProvenanceResolver;
use crate::registry::ComponentRegistry;

/// Component name and the location of its section in the merged configuration.
pub const COMPONENT_SECTIONS: [(&str, &str); 10] = [
    ("Cluster Service", "/clustersService"),
    ("Hypershift", "/hypershift"),
    ("Backend", "/backend"),
    ("Backplane", "/backplaneAPI"),
    ("Frontend", "/frontend"),
    ("OcMirror", "/imageSync/ocMirror"),
    ("Maestro", "/maestro"),
    ("Management Prometheus Spec", "/mgmt/prometheus/prometheusSpec"),
    ("ACR Pull", "/acrPull"),
    ("Service Prometheus Spec", "/svc/prometheus/prometheusSpec"),
];

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    registry: String,
    #[serde(default)]
    repository: String,
    #[serde(default)]
    digest: String,
}

/// Turns merged configuration into resolved components.
pub struct ComponentExtractor {
    registry: Arc<ComponentRegistry>,
    resolver: Arc<ProvenanceResolver>,
    concurrency: usize,
}

impl ComponentExtractor {
    pub fn new(registry: Arc<ComponentRegistry>, resolver: Arc<ProvenanceResolver>) -> Self {
        Self {
            registry,
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Maximum number of provenance lookups in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Components present in `doc` and their images, without provenance.
    ///
    /// A section that exists with the wrong shape is an error; the caller
    /// treats it as a configuration written under an older schema.
    pub fn declared_components(
        &self,
        doc: &Value,
    ) -> Result<BTreeMap<String, Option<ImageReference>>> {
        let mut declared = BTreeMap::new();
        for (name, pointer) in COMPONENT_SECTIONS {
            let Some(section) = doc.pointer(pointer) else {
                continue;
            };
            let section = match section {
                Value::Object(section) => section,
                Value::Null => continue,
                _ => {
                    return Err(SvcstatError::Config(format!(
                        "{name}: section {pointer} is not a mapping"
                    )))
                }
            };
            let image = match section.get("image") {
                None | Some(Value::Null) => None,
                Some(raw) => Some(self.image_reference(name, raw)?),
            };
            declared.insert(name.to_string(), image);
        }
        Ok(declared)
    }

    fn image_reference(&self, name: &str, raw: &Value) -> Result<ImageReference> {
        let config = ImageConfig::deserialize(raw).map_err(|e| {
            SvcstatError::Config(format!("{name}: malformed image configuration: {e}"))
        })?;
        let mut image = ImageReference::new(config.registry, config.repository, config.digest);
        match self.registry.pull_location(name) {
            Ok((registry, repository)) => {
                image.registry = registry.to_string();
                image.repository = repository.to_string();
            }
            Err(e) => {
                image.registry = format!("missing image pull location for {name:?}: {e}");
            }
        }
        Ok(image)
    }

    /// Attach provenance and source links to declared components.
    pub async fn resolve(
        &self,
        declared: BTreeMap<String, Option<ImageReference>>,
    ) -> BTreeMap<String, ResolvedComponent> {
        stream::iter(declared)
            .map(|(name, image)| async move {
                let component = self.resolve_one(&name, image).await;
                (name, component)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn resolve_one(&self, name: &str, image: Option<ImageReference>) -> ResolvedComponent {
        let repo_url = self
            .registry
            .get(name)
            .and_then(|definition| definition.repo_url.clone());
        let mut component = ResolvedComponent {
            name: name.to_string(),
            image: None,
            provenance: Default::default(),
            provenance_error: None,
            repo_url,
            permanent_url_for_source_sha: None,
        };

        let Some(image) = image else {
            return component;
        };
        match self.resolver.resolve(&image).await {
            Ok(provenance) => component.provenance = provenance,
            Err(e) => {
                debug!(component = %name, error = %e, "image provenance unavailable");
                component.provenance_error = Some(e.to_string());
            }
        }
        component.image = Some(image);

        if let (Some(repo_url), Some(sha)) = (component.repo_url.as_deref(), component.source_sha()) {
            component.permanent_url_for_source_sha =
                RepositoryHost::detect(repo_url).map(|host| host.permanent_url(repo_url, sha));
        }
        component
    }

    /// [`declared_components`](Self::declared_components) then [`resolve`](Self::resolve).
    pub async fn extract(&self, doc: &Value) -> Result<BTreeMap<String, ResolvedComponent>> {
        let declared = self.declared_components(doc)?;
        Ok(self.resolve(declared).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeImageInspector;
    use serde_json::json;

    fn extractor(inspector: Arc<FakeImageInspector>) -> ComponentExtractor {
        ComponentExtractor::new(
            Arc::new(ComponentRegistry::builtin()),
            Arc::new(ProvenanceResolver::new(inspector)),
        )
    }

    #[test]
    fn declared_components_skip_absent_sections() {
        let doc = json!({
            "frontend": {"image": {"registry": "ignored", "repository": "ignored", "digest": "sha256:f"}},
            "acrPull": {},
            "imageSync": {"ocMirror": {"image": {"digest": "sha256:o"}}}
        });
        let declared = extractor(Arc::new(FakeImageInspector::new()))
            .declared_components(&doc)
            .unwrap();

        assert_eq!(declared.len(), 3);
        assert_eq!(
            declared["Frontend"],
            Some(ImageReference::new(
                "arohcpsvcdev.azurecr.io",
                "arohcpfrontend",
                "sha256:f"
            ))
        );
        assert_eq!(declared["ACR Pull"], None);
        assert_eq!(
            declared["OcMirror"].as_ref().unwrap().repository,
            "image-sync/oc-mirror"
        );
        assert!(!declared.contains_key("Backend"));
    }

    #[test]
    fn wrong_shape_is_config_error() {
        let doc = json!({"backend": {"image": "quay.io/x@sha256:1"}});
        let err = extractor(Arc::new(FakeImageInspector::new()))
            .declared_components(&doc)
            .unwrap_err();
        assert!(matches!(err, SvcstatError::Config(msg) if msg.contains("Backend")));

        let doc = json!({"maestro": ["not", "a", "mapping"]});
        assert!(extractor(Arc::new(FakeImageInspector::new()))
            .declared_components(&doc)
            .is_err());
    }

    #[test]
    fn unregistered_component_records_missing_pull_location() {
        let extractor = ComponentExtractor::new(
            Arc::new(ComponentRegistry::new([])),
            Arc::new(ProvenanceResolver::new(Arc::new(FakeImageInspector::new()))),
        );
        let doc = json!({"frontend": {"image": {"digest": "sha256:f"}}});
        let declared = extractor.declared_components(&doc).unwrap();
        let image = declared["Frontend"].as_ref().unwrap();
        assert!(image.registry.starts_with("missing image pull location for \"Frontend\""));
    }

    #[tokio::test]
    async fn extract_attaches_provenance_and_links() {
        let inspector = Arc::new(FakeImageInspector::new());
        inspector.set_source(
            "arohcpsvcdev.azurecr.io/arohcpfrontend@sha256:f",
            "abc123",
            "2024-05-01T10:00:00Z",
        );
        let doc = json!({
            "frontend": {"image": {"digest": "sha256:f"}},
            "backend": {"image": {"digest": "sha256:b"}},
            "acrPull": {"image": {"digest": "sha256:a"}}
        });
        let components = extractor(inspector.clone()).extract(&doc).await.unwrap();

        let frontend = &components["Frontend"];
        assert_eq!(frontend.source_sha(), Some("abc123"));
        assert_eq!(
            frontend.permanent_url_for_source_sha.as_deref(),
            Some("https://github.com/Azure/ARO-HCP/tree/abc123/")
        );

        let backend = &components["Backend"];
        assert!(backend.source_sha().is_none());
        assert!(backend.provenance_error.is_some());
        assert!(backend.image.is_some());

        let acr = &components["ACR Pull"];
        assert!(acr.repo_url.is_none());
        assert!(acr.permanent_url_for_source_sha.is_none());
    }
}
