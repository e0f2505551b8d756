//! Fatal error taxonomy for impact runs.
//!
//! A failing test suite is not an error: it is a [`TestStatus`] value.
//!
//! [`TestStatus`]: crate::core::types::TestStatus

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImpactError {
    /// Configuration could not be read or decoded.
    #[error("load config {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Checkout of the target or a dependent failed.
    #[error("fetch {url} at ref '{reference}'")]
    Fetch {
        url: String,
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    /// Manifest edit, module listing, or graph re-resolution failed.
    #[error("substitute modules in {}", .dir.display())]
    Substitution {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The scratch workspace could not be created.
    #[error("create workspace")]
    Workspace(#[source] std::io::Error),
}

impl ImpactError {
    pub fn is_config(&self) -> bool {
        matches!(self, ImpactError::Config { .. })
    }
}
