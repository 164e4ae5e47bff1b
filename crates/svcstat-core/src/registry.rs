//! Static knowledge about the components a platform deploys.
//!
//! The registry is built once at startup and shared by reference; nothing
//! here is global state.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SvcstatError};

/// Where a component's source lives and where its image is pulled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub name: String,
    /// Source repository; `None` when no browsable repository is known.
    pub repo_url: Option<String>,
    pub default_branch: Option<String>,
    pub image_registry: String,
    pub image_repository: String,
    /// How old an image may get before it is considered in need of an update.
    #[serde(skip)]
    pub freshness_threshold: Option<Duration>,
}

impl ComponentDefinition {
    pub fn new(name: &str, image_registry: &str, image_repository: &str) -> Self {
        Self {
            name: name.to_string(),
            repo_url: None,
            default_branch: None,
            image_registry: image_registry.to_string(),
            image_repository: image_repository.to_string(),
            freshness_threshold: None,
        }
    }

    pub fn with_repo(mut self, repo_url: &str, default_branch: &str) -> Self {
        self.repo_url = Some(repo_url.to_string());
        self.default_branch = Some(default_branch.to_string());
        self
    }

    pub fn with_freshness(mut self, threshold: Duration) -> Self {
        self.freshness_threshold = Some(threshold);
        self
    }
}

/// Lookup table keyed by canonical component name.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentDefinition>,
}

impl ComponentRegistry {
    pub fn new(definitions: impl IntoIterator<Item = ComponentDefinition>) -> Self {
        Self {
            components: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    /// The components of the ARO HCP service platform.
    pub fn builtin() -> Self {
        let org = Duration::days(5);
        let company = Duration::days(5);
        let world = Duration::days(60);

        Self::new([
            ComponentDefinition::new(
                "ACM Operator",
                "arohcpsvcdev.azurecr.io",
                "rhacm2/acm-operator-bundle",
            )
            .with_repo("https://github.com/stolostron/acm-operator-bundle", "main"),
            ComponentDefinition::new("ACR Pull", "mcr.microsoft.com", "aks/msi-acrpull"),
            ComponentDefinition::new("Backend", "arohcpsvcdev.azurecr.io", "arohcpbackend")
                .with_repo("https://github.com/Azure/ARO-HCP", "main")
                .with_freshness(org),
            ComponentDefinition::new("Backplane", "quay.io", "app-sre/backplane-api")
                .with_repo("https://gitlab.cee.redhat.com/service/backplane-api", "master"),
            ComponentDefinition::new("Cluster Service", "quay.io", "app-sre/uhc-clusters-service")
                .with_repo(
                    "https://gitlab.cee.redhat.com/service/uhc-clusters-service",
                    "master",
                )
                .with_freshness(org),
            ComponentDefinition::new("Frontend", "arohcpsvcdev.azurecr.io", "arohcpfrontend")
                .with_repo("https://github.com/Azure/ARO-HCP", "main")
                .with_freshness(org),
            ComponentDefinition::new("Hypershift", "quay.io", "acm-d/rhtap-hypershift-operator")
                .with_repo("https://github.com/openshift/hypershift", "main")
                .with_freshness(company),
            ComponentDefinition::new(
                "Maestro",
                "quay.io",
                "redhat-user-workloads/maestro-rhtap-tenant/maestro/maestro",
            )
            .with_repo("https://github.com/openshift-online/maestro/", "main"),
            ComponentDefinition::new(
                "MCE",
                "arohcpsvcdev.azurecr.io",
                "multicluster-engine/mce-operator-bundle",
            )
            .with_repo("https://github.com/stolostron/mce-operator-bundle", "main"),
            ComponentDefinition::new("OcMirror", "arohcpsvcdev.azurecr.io", "image-sync/oc-mirror")
                .with_repo("https://github.com/openshift/oc-mirror", "main"),
            ComponentDefinition::new(
                "Package Operator Package",
                "quay.io",
                "package-operator/package-operator-package",
            )
            .with_repo("https://github.com/package-operator/package-operator", "main"),
            ComponentDefinition::new(
                "Package Operator Manager",
                "quay.io",
                "package-operator/package-operator-manager",
            )
            .with_repo("https://github.com/package-operator/package-operator", "main"),
            ComponentDefinition::new(
                "Package Operator Remote Phase Manager",
                "quay.io",
                "package-operator/remote-phase-manager",
            )
            .with_repo("https://github.com/package-operator/package-operator", "main"),
            ComponentDefinition::new(
                "Management Prometheus Spec",
                "mcr.microsoft.com/oss/v2",
                "prometheus/prometheus",
            )
            .with_freshness(world),
            ComponentDefinition::new(
                "Service Prometheus Spec",
                "mcr.microsoft.com/oss/v2",
                "prometheus/prometheus",
            )
            .with_freshness(world),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDefinition> {
        self.components.get(name)
    }

    /// Registry and repository an image for `name` is pulled from.
    pub fn pull_location(&self, name: &str) -> Result<(&str, &str)> {
        self.get(name)
            .map(|d| (d.image_registry.as_str(), d.image_repository.as_str()))
            .ok_or_else(|| SvcstatError::not_found("image pull location", name))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.components.values()
    }
}
