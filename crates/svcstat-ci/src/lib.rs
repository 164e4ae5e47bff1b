//! svcstat-ci: CI results service client
//!
//! Fetches the periodic job runs recorded for an environment so the engine
//! can attach them to the release that was live when each run started.
//! The service groups runs by its own release names, see [`ci_release_name`].

pub mod error;
pub mod sippy;

pub use error::{CiClientError, Result};
pub use sippy::{ci_release_name, JobRunPage, JobRunRow, SippyClient, SippyConfig};
