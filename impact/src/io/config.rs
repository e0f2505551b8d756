//! Impact run configuration (JSON).
//!
//! Decoding is structural only: every field has a default, so a missing value
//! becomes an empty string and fails later at the point of use (an empty ref
//! fails the checkout, an empty source path fails substitution).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ImpactError;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImpactConfig {
    pub target: TargetConfig,
    pub dependents: Vec<DependentConfig>,
    pub run: RunSettings,
}

/// The library under evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    pub repo_url: String,
    /// Resolved modules starting with this prefix are substitution candidates.
    pub module_prefix: String,
    /// Branch or tag of the released version.
    pub released_ref: String,
    /// Local checkout holding the modified version.
    pub modified_local_path: PathBuf,
    /// Module path of the repository root. Empty means `module_prefix`.
    pub module_root: String,
}

impl TargetConfig {
    pub fn module_root(&self) -> &str {
        if self.module_root.is_empty() {
            &self.module_prefix
        } else {
            &self.module_root
        }
    }
}

/// A downstream repository whose tests measure the impact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DependentConfig {
    pub repo_url: String,
    /// Module directory relative to the repository root.
    pub module_path: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

/// What the driver does when one dependent's pipeline errors.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Abort the whole run on the first error.
    #[default]
    FailFast,
    /// Record the error for that dependent and continue with the next one.
    BestEffort,
}

/// Knobs for a run. Read from the optional `run` section, overridable from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunSettings {
    pub policy: RunPolicy,
    /// Deadline for one `go test` invocation. `None` waits indefinitely.
    pub test_timeout_secs: Option<u64>,
    /// Deadline for checkout and module-graph commands. `None` waits indefinitely.
    pub command_timeout_secs: Option<u64>,
    /// Exit with a distinct code when any dependent regresses.
    pub fail_on_regression: bool,
    /// Leave the workspace on disk after the run.
    pub keep_workspace: bool,
}

/// Command-line overrides for [`RunSettings`]. `None`/`false` keeps the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub policy: Option<RunPolicy>,
    pub test_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
    pub fail_on_regression: bool,
    pub keep_workspace: bool,
}

impl RunSettings {
    pub fn apply_overrides(mut self, overrides: &RunOverrides) -> Result<Self> {
        if let Some(policy) = overrides.policy {
            self.policy = policy;
        }
        if let Some(secs) = overrides.test_timeout_secs {
            self.test_timeout_secs = Some(secs);
        }
        if let Some(secs) = overrides.command_timeout_secs {
            self.command_timeout_secs = Some(secs);
        }
        self.fail_on_regression |= overrides.fail_on_regression;
        self.keep_workspace |= overrides.keep_workspace;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.test_timeout_secs == Some(0) {
            bail!("run.test_timeout_secs must be > 0");
        }
        if self.command_timeout_secs == Some(0) {
            bail!("run.command_timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs.map(Duration::from_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Read and decode a configuration file.
pub fn load_config(path: &Path) -> Result<ImpactConfig, ImpactError> {
    let load = || -> Result<ImpactConfig> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg = parse_config(&contents)?;
        cfg.run.validate()?;
        Ok(cfg)
    };
    load().map_err(|source| ImpactError::Config {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_config(contents: &str) -> Result<ImpactConfig> {
    serde_json::from_str(contents).context("parse config json")
}
