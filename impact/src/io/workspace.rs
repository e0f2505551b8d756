//! Scratch workspace for one impact run.
//!
//! Holds the released target checkout and one checkout per dependent. The
//! directory is removed when the [`Workspace`] is dropped, on every exit path,
//! unless [`Workspace::persist`] was called.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use crate::error::ImpactError;

const WORKSPACE_PREFIX: &str = "impact-";

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    guard: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh workspace under the system temp dir, or under `base` when given.
    pub fn create(base: Option<&Path>) -> Result<Self, ImpactError> {
        let mut builder = Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(ImpactError::Workspace)?;
        let root = dir.path().to_path_buf();
        debug!(root = %root.display(), "workspace created");
        Ok(Self {
            root,
            guard: Some(dir),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keep the directory on disk after this value is dropped.
    pub fn persist(&mut self) {
        if let Some(guard) = self.guard.take() {
            let root = guard.keep();
            info!(root = %root.display(), "workspace will be kept");
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.guard.is_none()
    }

    /// Checkout location of the released target.
    pub fn released_dir(&self) -> PathBuf {
        self.root.join("released")
    }

    /// Checkout location of the dependent at `index` (configuration order).
    pub fn dependent_dir(&self, index: usize, repo_url: &str) -> PathBuf {
        self.root
            .join("dependents")
            .join(build_checkout_name(index, repo_url))
    }
}

/// `NN-<repo name>`, e.g. `01-opentelemetry-go-contrib` (1-based index).
pub fn build_checkout_name(index: usize, repo_url: &str) -> String {
    format!("{:02}-{}", index + 1, repo_slug(repo_url))
}

fn repo_slug(repo_url: &str) -> String {
    let name = repo_url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");
    let slug: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "repo".to_string()
    } else {
        slug
    }
}
