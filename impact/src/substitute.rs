//! Module substitution for a dependent checkout.
//!
//! Every application starts from a reset (drop local replacements, re-resolve)
//! so the three phases can reuse one checkout without stale redirects leaking
//! from one phase into the next.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::substitution::{SubstitutionPlan, SubstitutionWarning, plan_substitutions};
use crate::error::ImpactError;
use crate::io::gomod::ModuleTool;

/// Where to point target modules for one phase.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionRequest<'a> {
    pub module_dir: &'a Path,
    pub source: &'a Path,
    pub prefix: &'a str,
    pub root: &'a str,
}

/// What one application changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// Absolute source tree the replacements point into.
    pub source: PathBuf,
    /// Modules whose local replacement was dropped by the reset.
    pub dropped: Vec<String>,
    pub plan: SubstitutionPlan,
    pub warning: Option<SubstitutionWarning>,
}

/// Drop every local `replace` directive and re-resolve the module graph.
///
/// Returns the modules whose replacement was dropped. Non-local (version)
/// replacements declared by the dependent itself are left untouched.
#[instrument(skip_all, fields(module_dir = %module_dir.display()))]
pub fn reset_substitutions<M: ModuleTool>(tool: &M, module_dir: &Path) -> Result<Vec<String>> {
    let mut dropped = Vec::new();
    let directives = tool
        .replacements(module_dir)
        .context("read manifest replacements")?;
    for directive in directives {
        if !directive.is_local() {
            continue;
        }
        tool.drop_replacement(module_dir, &directive.old)
            .with_context(|| format!("drop replacement for {}", directive.old.path))?;
        dropped.push(directive.old.path);
    }
    debug!(dropped = dropped.len(), "local replacements dropped");
    tool.tidy(module_dir)
        .context("re-resolve module graph after reset")?;
    Ok(dropped)
}

/// Redirect every resolved module matching the prefix to `request.source`.
#[instrument(skip_all, fields(module_dir = %request.module_dir.display(), source = %request.source.display(), prefix = request.prefix))]
pub fn apply_substitution<M: ModuleTool>(
    tool: &M,
    request: SubstitutionRequest<'_>,
) -> Result<SubstitutionReport, ImpactError> {
    let apply = || -> Result<SubstitutionReport> {
        let source = resolve_source(request.source)?;
        let dropped = reset_substitutions(tool, request.module_dir)?;

        let modules = tool
            .list_modules(request.module_dir)
            .context("list resolved modules")?;
        let plan = plan_substitutions(&modules, request.prefix, request.root, &source, |manifest| {
            manifest.is_file()
        });
        for replacement in &plan.replacements {
            info!(
                module = %replacement.module,
                local = %replacement.local_path.display(),
                "adding replacement"
            );
            tool.add_replacement(
                request.module_dir,
                &replacement.module,
                &replacement.local_path,
            )
            .with_context(|| format!("replace {}", replacement.module))?;
        }

        let warning = plan.warning(request.prefix, request.root);
        if let Some(warning) = &warning {
            warn!(%warning, "substitution incomplete");
        }

        tool.tidy(request.module_dir)
            .context("re-resolve module graph after substitution")?;
        Ok(SubstitutionReport {
            source,
            dropped,
            plan,
            warning,
        })
    };
    apply().map_err(|source| ImpactError::Substitution {
        dir: request.module_dir.to_path_buf(),
        source,
    })
}

fn resolve_source(source: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(source)
        .with_context(|| format!("resolve source path '{}'", source.display()))?;
    if !absolute.is_dir() {
        bail!("source path {} is not a directory", absolute.display());
    }
    Ok(absolute)
}
