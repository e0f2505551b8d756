//! Git adapter: shallow single-ref checkouts.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::error::ImpactError;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command};

/// Checks out one ref of a repository into a fresh directory.
pub trait Fetcher {
    fn fetch(&self, url: &str, reference: &str, dest: &Path) -> Result<(), ImpactError>;
}

/// [`Fetcher`] that runs `git clone --depth 1 --branch <ref>`.
///
/// Shallow by-ref cloning only reaches branch and tag heads, not arbitrary commits.
#[derive(Debug, Clone, Default)]
pub struct GitFetcher {
    timeout: Option<Duration>,
}

impl GitFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Fetcher for GitFetcher {
    #[instrument(skip_all, fields(url = %url, reference = %reference, dest = %dest.display()))]
    fn fetch(&self, url: &str, reference: &str, dest: &Path) -> Result<(), ImpactError> {
        let clone = || -> Result<()> {
            ensure_clone_target(url, reference, dest)?;
            info!("cloning");
            let mut cmd = Command::new("git");
            cmd.args(["clone", "--depth", "1", "--branch", reference, url])
                .arg(dest);
            let output = run_command(cmd, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES)
                .context("run git clone")?;
            output.ensure_success("git clone")?;
            debug!("clone complete");
            Ok(())
        };
        clone().map_err(|source| ImpactError::Fetch {
            url: url.to_string(),
            reference: reference.to_string(),
            source,
        })
    }
}

/// Validate clone inputs before touching git.
///
/// `dest` must be absent or an empty directory.
pub fn ensure_clone_target(url: &str, reference: &str, dest: &Path) -> Result<()> {
    if url.trim().is_empty() {
        bail!("repository url is empty");
    }
    if reference.trim().is_empty() {
        bail!("ref is empty");
    }
    if !dest.exists() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        return Ok(());
    }
    if !dest.is_dir() {
        bail!("destination {} exists and is not a directory", dest.display());
    }
    let mut entries =
        fs::read_dir(dest).with_context(|| format!("read {}", dest.display()))?;
    if entries.next().is_some() {
        bail!("destination {} is not empty", dest.display());
    }
    Ok(())
}
