//! svcstat core: release history and component diff engine
//!
//! Reconstructs the releases each environment has run from the history of a
//! configuration repository, resolves which source commit built every
//! deployed image, and attributes image changes between two releases to the
//! merged pull/merge requests that caused them.
//!
//! ## Key Components
//!
//! - `ReleaseDiscovery`: replays config history into environment releases
//! - `ConfigResolver`: base config merged with the per-environment overlay
//! - `ProvenanceResolver`: memoised image pull and inspect
//! - `DiffEngine`: merge commits between two component source SHAs
//! - `CiCorrelator`: job runs bucketed onto the release live when they started
//! - `ReleaseAccessor`: the facade, plain (`Engine`) or cached

pub mod accessor;
pub mod cache;
pub mod ci;
pub mod clock;
pub mod component_git;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod domain;
pub mod extract;
pub mod fakes;
pub mod git;
pub mod provenance;
pub mod registry;
pub mod reporting;
pub mod settings;
pub mod telemetry;

pub use accessor::{CachingReleaseAccessor, Engine, ReleaseAccessor};
pub use cache::FreshnessCache;
pub use ci::{CiCorrelator, CiRule, CiRuleSet, JobCategory, JobRunSource};
pub use clock::{Clock, SystemClock};
pub use component_git::{ComponentGitAccessor, GitComponentRepos};
pub use config::{deep_merge, ConfigResolver, KNOWN_ENVIRONMENTS};
pub use diff::DiffEngine;
pub use discovery::ReleaseDiscovery;
pub use domain::{
    changed_components, make_environment_release_name, make_release_name,
    split_environment_release_name, split_release_name, ComponentChange, ComponentDiff,
    EnvironmentRelease, EnvironmentReleaseDiff, ImageProvenance, ImageReference, JobOutcome,
    JobRun, JobRunResult, ProvenanceError, Release, RepositoryHost, ResolvedComponent, Result,
    SvcstatError, CHANGES_UNAVAILABLE,
};
pub use extract::ComponentExtractor;
pub use git::{GitCommit, GitWorkTree, RepoSnapshot, SourceRepository};
pub use provenance::{ImageInspector, PodmanInspector, ProvenanceResolver};
pub use registry::{ComponentDefinition, ComponentRegistry};
pub use reporting::{render_environment_release_md, render_release_summary_md};
pub use settings::EngineConfig;
