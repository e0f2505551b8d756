//! Go module-graph adapter (`go mod edit`, `go mod tidy`, `go list -m`).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::types::ResolvedModule;
use crate::io::process::{CommandOutput, DEFAULT_OUTPUT_LIMIT_BYTES, describe, run_command};

/// Capture limit for JSON reads of the manifest and module graph, which are parsed whole.
pub const GRAPH_OUTPUT_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// Module path plus optional version, as used on either side of a `replace`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModuleVersion {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version")]
    pub version: String,
}

/// One `replace` directive from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplaceDirective {
    #[serde(rename = "Old")]
    pub old: ModuleVersion,
    #[serde(rename = "New")]
    pub new: ModuleVersion,
}

impl ReplaceDirective {
    /// Local replacements point at a directory and carry no version.
    pub fn is_local(&self) -> bool {
        self.new.version.is_empty()
    }
}

/// Operations on a module manifest and its resolved dependency graph.
pub trait ModuleTool {
    /// `replace` directives currently declared in `dir`'s manifest.
    fn replacements(&self, dir: &Path) -> Result<Vec<ReplaceDirective>>;
    fn drop_replacement(&self, dir: &Path, old: &ModuleVersion) -> Result<()>;
    fn add_replacement(&self, dir: &Path, module: &str, local: &Path) -> Result<()>;
    /// Re-resolve the graph from the manifest.
    fn tidy(&self, dir: &Path) -> Result<()>;
    fn list_modules(&self, dir: &Path) -> Result<Vec<ResolvedModule>>;
}

/// [`ModuleTool`] backed by the `go` command.
#[derive(Debug, Clone, Default)]
pub struct GoModTool {
    timeout: Option<Duration>,
}

impl GoModTool {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn go(&self, dir: &Path, args: &[&str]) -> Result<()> {
        self.go_limited(dir, args, DEFAULT_OUTPUT_LIMIT_BYTES)?;
        Ok(())
    }

    /// Run a `go` command whose stdout is parsed as JSON and must arrive whole.
    fn go_json(&self, dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
        let (mut output, label) = self.go_limited(dir, args, GRAPH_OUTPUT_LIMIT_BYTES)?;
        output.complete_stdout(&label)?;
        Ok(std::mem::take(&mut output.stdout))
    }

    fn go_limited(
        &self,
        dir: &Path,
        args: &[&str],
        output_limit_bytes: usize,
    ) -> Result<(CommandOutput, String)> {
        let mut cmd = Command::new("go");
        cmd.args(args).current_dir(dir);
        let label = describe(&cmd);
        let output = run_command(cmd, self.timeout, output_limit_bytes)
            .with_context(|| format!("run {label}"))?;
        output.ensure_success(&label)?;
        Ok((output, label))
    }
}

impl ModuleTool for GoModTool {
    fn replacements(&self, dir: &Path) -> Result<Vec<ReplaceDirective>> {
        let json = self.go_json(dir, &["mod", "edit", "-json"])?;
        parse_manifest_replacements(&json)
    }

    #[instrument(skip_all, fields(module = %old.path))]
    fn drop_replacement(&self, dir: &Path, old: &ModuleVersion) -> Result<()> {
        self.go(dir, &["mod", "edit", &dropreplace_arg(old)])?;
        Ok(())
    }

    #[instrument(skip_all, fields(module = %module, local = %local.display()))]
    fn add_replacement(&self, dir: &Path, module: &str, local: &Path) -> Result<()> {
        self.go(dir, &["mod", "edit", &replace_arg(module, local)])?;
        Ok(())
    }

    #[instrument(skip_all, fields(dir = %dir.display()))]
    fn tidy(&self, dir: &Path) -> Result<()> {
        self.go(dir, &["mod", "tidy"])?;
        debug!("module graph re-resolved");
        Ok(())
    }

    fn list_modules(&self, dir: &Path) -> Result<Vec<ResolvedModule>> {
        let json = self.go_json(dir, &["list", "-m", "-json", "all"])?;
        parse_module_stream(&json)
    }
}

pub fn dropreplace_arg(old: &ModuleVersion) -> String {
    if old.version.is_empty() {
        format!("-dropreplace={}", old.path)
    } else {
        format!("-dropreplace={}@{}", old.path, old.version)
    }
}

pub fn replace_arg(module: &str, local: &Path) -> String {
    format!("-replace={}={}", module, local.display())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Manifest {
    #[serde(rename = "Replace")]
    replace: Option<Vec<ReplaceDirective>>,
}

/// Parse `go mod edit -json` output into its `replace` directives.
pub fn parse_manifest_replacements(json: &[u8]) -> Result<Vec<ReplaceDirective>> {
    let manifest: Manifest = serde_json::from_slice(json).context("parse go mod edit -json")?;
    Ok(manifest.replace.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ModuleRecord {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Main", default)]
    main: bool,
}

/// Parse the concatenated JSON objects printed by `go list -m -json all`.
pub fn parse_module_stream(json: &[u8]) -> Result<Vec<ResolvedModule>> {
    let mut modules = Vec::new();
    for record in serde_json::Deserializer::from_slice(json).into_iter::<ModuleRecord>() {
        let record = record.context("parse go list -m -json record")?;
        modules.push(ResolvedModule {
            path: record.path,
            main: record.main,
        });
    }
    Ok(modules)
}
