//! Deterministic planning of module substitutions.
//!
//! Given a dependent's resolved module graph, decides which target modules get
//! redirected to a local source tree. The filesystem check for `go.mod` is
//! injected so planning stays pure and testable.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::types::ResolvedModule;

/// Manifest file that marks a directory as a module root.
pub const MANIFEST_FILE: &str = "go.mod";

/// A single substitution directive: `module => local_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub module: String,
    pub local_path: PathBuf,
}

/// Non-fatal signals raised while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionWarning {
    /// No resolved module starts with the prefix.
    NoPrefixMatch { prefix: String },
    /// Every prefix match lies outside the module root, so none maps into the source tree.
    OutsideModuleRoot {
        prefix: String,
        root: String,
        modules: Vec<String>,
    },
    /// Modules under the root matched the prefix but none had a manifest in the source tree.
    NoLocalManifest {
        prefix: String,
        missing: usize,
        outside_root: usize,
    },
}

impl fmt::Display for SubstitutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstitutionWarning::NoPrefixMatch { prefix } => {
                write!(f, "no modules matched prefix: {prefix}")
            }
            SubstitutionWarning::OutsideModuleRoot {
                prefix,
                root,
                modules,
            } => write!(
                f,
                "{} module(s) matched prefix {prefix} but none is under module root {root}: {}",
                modules.len(),
                modules.join(", ")
            ),
            SubstitutionWarning::NoLocalManifest {
                prefix,
                missing,
                outside_root,
            } => {
                write!(
                    f,
                    "{missing} module(s) matched prefix {prefix} but none has a local {MANIFEST_FILE}"
                )?;
                if *outside_root > 0 {
                    write!(f, " ({outside_root} more outside the module root)")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of planning: what gets replaced and what was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionPlan {
    /// Module paths that start with the prefix.
    pub candidates: Vec<String>,
    /// Directives to add, in resolved-graph order.
    pub replacements: Vec<Replacement>,
    /// Candidates not nested under the module root.
    pub outside_root: Vec<String>,
    /// Candidates under the root whose source directory has no manifest.
    pub missing_manifest: Vec<String>,
}

impl SubstitutionPlan {
    /// Warning for a plan that redirects nothing, naming why.
    pub fn warning(&self, prefix: &str, root: &str) -> Option<SubstitutionWarning> {
        if self.candidates.is_empty() {
            return Some(SubstitutionWarning::NoPrefixMatch {
                prefix: prefix.to_string(),
            });
        }
        if !self.replacements.is_empty() {
            return None;
        }
        if self.missing_manifest.is_empty() {
            return Some(SubstitutionWarning::OutsideModuleRoot {
                prefix: prefix.to_string(),
                root: root.to_string(),
                modules: self.outside_root.clone(),
            });
        }
        Some(SubstitutionWarning::NoLocalManifest {
            prefix: prefix.to_string(),
            missing: self.missing_manifest.len(),
            outside_root: self.outside_root.len(),
        })
    }
}

/// Sub-path of `module` below `root`, without the leading `/`.
///
/// Returns `None` when `module` is not `root` itself or nested under it
/// (`example.com/otelx` is not under `example.com/otel`).
pub fn module_subpath<'a>(module: &'a str, root: &str) -> Option<&'a str> {
    let rest = module.strip_prefix(root)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('/')
}

/// Directory inside `source` that should hold `module`'s manifest.
pub fn local_module_dir(source: &Path, subpath: &str) -> PathBuf {
    if subpath.is_empty() {
        source.to_path_buf()
    } else {
        source.join(subpath)
    }
}

/// Plan substitutions for every non-main module starting with `prefix`.
pub fn plan_substitutions<F: Fn(&Path) -> bool>(
    modules: &[ResolvedModule],
    prefix: &str,
    root: &str,
    source: &Path,
    has_manifest: F,
) -> SubstitutionPlan {
    let mut plan = SubstitutionPlan::default();
    for module in modules {
        if module.main || !module.path.starts_with(prefix) {
            continue;
        }
        plan.candidates.push(module.path.clone());

        let Some(subpath) = module_subpath(&module.path, root) else {
            plan.outside_root.push(module.path.clone());
            continue;
        };
        let local_path = local_module_dir(source, subpath);
        if has_manifest(&local_path.join(MANIFEST_FILE)) {
            plan.replacements.push(Replacement {
                module: module.path.clone(),
                local_path,
            });
        } else {
            plan.missing_manifest.push(module.path.clone());
        }
    }
    plan
}
