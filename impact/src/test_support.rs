//! Scripted collaborators for driving substitution and sequencing without git or go.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::core::substitution::MANIFEST_FILE;
use crate::core::types::{ResolvedModule, TestResult, TestStatus};
use crate::error::ImpactError;
use crate::io::git::{Fetcher, ensure_clone_target};
use crate::io::gomod::{ModuleTool, ModuleVersion, ReplaceDirective};
use crate::io::gotest::TestRunner;

/// Write an empty module manifest under each of `subdirs` (`""` is `root` itself).
pub fn write_manifests(root: &Path, subdirs: &[&str]) -> Result<()> {
    for sub in subdirs {
        let dir = root.join(sub);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        fs::write(dir.join(MANIFEST_FILE), "module scripted\n")
            .with_context(|| format!("write manifest in {}", dir.display()))?;
    }
    Ok(())
}

/// One recorded module-tool or test-runner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoCall {
    Replacements(PathBuf),
    DropReplacement { dir: PathBuf, module: String },
    AddReplacement { dir: PathBuf, module: String, local: PathBuf },
    Tidy(PathBuf),
    ListModules(PathBuf),
    Test(PathBuf),
}

/// Local replacements that were active when a test suite ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub dir: PathBuf,
    pub replacements: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default)]
struct GoState {
    graph: Vec<ResolvedModule>,
    initial: Vec<ReplaceDirective>,
    manifests: BTreeMap<PathBuf, Vec<ReplaceDirective>>,
    results: VecDeque<TestStatus>,
    calls: Vec<GoCall>,
    runs: Vec<TestRun>,
    fail_tidy_under: Option<PathBuf>,
}

impl GoState {
    fn manifest(&mut self, dir: &Path) -> &mut Vec<ReplaceDirective> {
        let initial = self.initial.clone();
        self.manifests.entry(dir.to_path_buf()).or_insert(initial)
    }

    fn directives(&self, dir: &Path) -> &[ReplaceDirective] {
        self.manifests.get(dir).unwrap_or(&self.initial)
    }
}

/// In-memory module manifests plus a queue of scripted test verdicts.
///
/// Clones share state, so one clone can serve as the [`ModuleTool`] and another
/// as the [`TestRunner`] while assertions read from a third.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGo {
    state: Rc<RefCell<GoState>>,
}

impl ScriptedGo {
    /// Every checkout resolves to `graph`.
    pub fn new(graph: Vec<ResolvedModule>) -> Self {
        let go = Self::default();
        go.state.borrow_mut().graph = graph;
        go
    }

    /// Directives every manifest starts with before the first edit.
    pub fn with_initial_replacements(self, directives: Vec<ReplaceDirective>) -> Self {
        self.state.borrow_mut().initial = directives;
        self
    }

    /// Verdicts handed out by successive test runs, across all checkouts.
    pub fn with_results(self, results: impl IntoIterator<Item = TestStatus>) -> Self {
        self.state.borrow_mut().results.extend(results);
        self
    }

    /// Make `tidy` fail for any directory under `dir`.
    pub fn fail_tidy_under(self, dir: impl Into<PathBuf>) -> Self {
        self.state.borrow_mut().fail_tidy_under = Some(dir.into());
        self
    }

    pub fn calls(&self) -> Vec<GoCall> {
        self.state.borrow().calls.clone()
    }

    pub fn test_runs(&self) -> Vec<TestRun> {
        self.state.borrow().runs.clone()
    }

    /// Local replacements currently declared in `dir`'s manifest.
    pub fn local_replacements(&self, dir: &Path) -> BTreeMap<String, PathBuf> {
        local_map(self.state.borrow().directives(dir))
    }

    /// All directives (local or pinned) currently declared in `dir`'s manifest.
    pub fn replacement_count(&self, dir: &Path) -> usize {
        self.state.borrow().directives(dir).len()
    }

    /// Error if scripted verdicts were left unconsumed.
    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.state.borrow().results.len();
        if remaining > 0 {
            bail!("{remaining} scripted test result(s) were never consumed");
        }
        Ok(())
    }
}

fn local_map(directives: &[ReplaceDirective]) -> BTreeMap<String, PathBuf> {
    directives
        .iter()
        .filter(|directive| directive.is_local())
        .map(|directive| {
            (
                directive.old.path.clone(),
                PathBuf::from(&directive.new.path),
            )
        })
        .collect()
}

impl ModuleTool for ScriptedGo {
    fn replacements(&self, dir: &Path) -> Result<Vec<ReplaceDirective>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::Replacements(dir.to_path_buf()));
        Ok(state.manifest(dir).clone())
    }

    fn drop_replacement(&self, dir: &Path, old: &ModuleVersion) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::DropReplacement {
            dir: dir.to_path_buf(),
            module: old.path.clone(),
        });
        state.manifest(dir).retain(|directive| directive.old != *old);
        Ok(())
    }

    fn add_replacement(&self, dir: &Path, module: &str, local: &Path) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::AddReplacement {
            dir: dir.to_path_buf(),
            module: module.to_string(),
            local: local.to_path_buf(),
        });
        let manifest = state.manifest(dir);
        manifest.retain(|directive| directive.old.path != module);
        manifest.push(ReplaceDirective {
            old: ModuleVersion {
                path: module.to_string(),
                version: String::new(),
            },
            new: ModuleVersion {
                path: local.display().to_string(),
                version: String::new(),
            },
        });
        Ok(())
    }

    fn tidy(&self, dir: &Path) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::Tidy(dir.to_path_buf()));
        if state
            .fail_tidy_under
            .as_deref()
            .is_some_and(|prefix| dir.starts_with(prefix))
        {
            bail!("go: updates to go.mod needed");
        }
        Ok(())
    }

    fn list_modules(&self, dir: &Path) -> Result<Vec<ResolvedModule>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::ListModules(dir.to_path_buf()));
        Ok(state.graph.clone())
    }
}

impl TestRunner for ScriptedGo {
    fn run(&self, module_dir: &Path) -> TestResult {
        let mut state = self.state.borrow_mut();
        state.calls.push(GoCall::Test(module_dir.to_path_buf()));
        let replacements = local_map(state.directives(module_dir));
        state.runs.push(TestRun {
            dir: module_dir.to_path_buf(),
            replacements,
        });
        let status = state
            .results
            .pop_front()
            .unwrap_or_else(|| TestStatus::CouldNotRun("no scripted result".to_string()));
        TestResult::new(status, Duration::from_secs(1))
    }
}

/// One recorded fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub url: String,
    pub reference: String,
    pub dest: PathBuf,
}

/// [`Fetcher`] that materializes scripted files instead of cloning.
///
/// Destination checks are the real ones, so a reused or non-empty checkout
/// directory fails here exactly as it would with git.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    files: BTreeMap<String, Vec<(PathBuf, String)>>,
    failing: BTreeSet<String>,
    fetched: RefCell<Vec<Fetch>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `contents` at `relative` inside every checkout of `url`.
    pub fn with_file(mut self, url: &str, relative: &str, contents: &str) -> Self {
        self.files
            .entry(url.to_string())
            .or_default()
            .push((PathBuf::from(relative), contents.to_string()));
        self
    }

    /// Add a module manifest in `subdir` of every checkout of `url`.
    pub fn with_module(self, url: &str, subdir: &str, module: &str) -> Self {
        let relative = Path::new(subdir).join(MANIFEST_FILE);
        let contents = format!("module {module}\n");
        self.with_file(url, &relative.to_string_lossy(), &contents)
    }

    /// Fetches of `url` fail after destination checks pass.
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<Fetch> {
        self.fetched.borrow().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, reference: &str, dest: &Path) -> Result<(), ImpactError> {
        self.fetched.borrow_mut().push(Fetch {
            url: url.to_string(),
            reference: reference.to_string(),
            dest: dest.to_path_buf(),
        });
        let populate = || -> Result<()> {
            ensure_clone_target(url, reference, dest)?;
            if self.failing.contains(url) {
                bail!("remote: repository not found");
            }
            fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;
            for (relative, contents) in self.files.get(url).into_iter().flatten() {
                let path = dest.join(relative);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
            }
            Ok(())
        };
        populate().map_err(|source| ImpactError::Fetch {
            url: url.to_string(),
            reference: reference.to_string(),
            source,
        })
    }
}
