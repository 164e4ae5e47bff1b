//! Domain models for svcstat.
//!
//! Canonical definitions for the core entities:
//! - `ImageReference` / `ImageProvenance`: a pinned image and what built it
//! - `ResolvedComponent`: a component as deployed by one environment release
//! - `EnvironmentRelease`: the environment-scoped state of a release
//! - `ComponentDiff`: attributed changes between two environment releases
//! - `JobRunResult`: CI outcomes bucketed onto a release

pub mod component;
pub mod diff;
pub mod error;
pub mod job_run;
pub mod release;

pub use component::{ImageProvenance, ImageReference, RepositoryHost, ResolvedComponent};
pub use diff::{ComponentChange, ComponentDiff, EnvironmentReleaseDiff, CHANGES_UNAVAILABLE};
pub use error::{ProvenanceError, Result, SvcstatError};
pub use job_run::{JobOutcome, JobRun, JobRunResult};
pub use release::{
    changed_components, make_environment_release_name, make_release_name,
    split_environment_release_name, split_release_name, EnvironmentRelease, Release,
};
