//! Three-phase experiment for one dependent: baseline, released, modified.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::core::outcome::{Outcome, classify};
use crate::core::types::{Phase, TestResult};
use crate::io::config::DependentConfig;
use crate::io::git::Fetcher;
use crate::io::gomod::ModuleTool;
use crate::io::gotest::TestRunner;
use crate::report::Reporter;
use crate::substitute::{SubstitutionRequest, apply_substitution};

/// External collaborators of a run.
#[derive(Debug, Clone)]
pub struct Tools<F, M, T> {
    pub fetcher: F,
    pub modules: M,
    pub tests: T,
}

/// Target trees the released and modified phases point at.
#[derive(Debug, Clone, Copy)]
pub struct TargetSources<'a> {
    pub released: &'a Path,
    pub modified: &'a Path,
    pub prefix: &'a str,
    pub root: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResults {
    pub baseline: TestResult,
    pub released: TestResult,
    pub modified: TestResult,
}

impl PhaseResults {
    pub fn get(&self, phase: Phase) -> &TestResult {
        match phase {
            Phase::Baseline => &self.baseline,
            Phase::Released => &self.released,
            Phase::Modified => &self.modified,
        }
    }

    /// Classification uses released and modified only.
    pub fn outcome(&self) -> Outcome {
        classify(self.released.passed(), self.modified.passed())
    }

    /// Phases whose suite could not run at all.
    pub fn tooling_faults(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|phase| self.get(*phase).could_not_run())
            .collect()
    }

    /// The outcome compares a suite that never ran: released or modified is a tooling fault.
    pub fn comparison_is_inconclusive(&self) -> bool {
        self.released.could_not_run() || self.modified.could_not_run()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentVerdict {
    pub phases: PhaseResults,
    pub outcome: Outcome,
}

/// Check out `dependent` into `checkout` and run the three phases in order.
///
/// Fetch and substitution failures abort this dependent with an error. Test
/// failures never do: they are recorded and classified.
#[instrument(skip_all, fields(repo = %dependent.repo_url, module_path = %dependent.module_path))]
pub fn run_dependent<F, M, T, W>(
    tools: &Tools<F, M, T>,
    dependent: &DependentConfig,
    checkout: &Path,
    sources: TargetSources<'_>,
    reporter: &mut Reporter<W>,
) -> Result<DependentVerdict>
where
    F: Fetcher,
    M: ModuleTool,
    T: TestRunner,
    W: Write,
{
    let module_dir = module_dir_in(checkout, &dependent.module_path)?;
    tools
        .fetcher
        .fetch(&dependent.repo_url, &dependent.reference, checkout)?;
    if !module_dir.is_dir() {
        bail!(
            "module path '{}' not found in {}",
            dependent.module_path,
            dependent.repo_url
        );
    }

    reporter.phase_started(Phase::Baseline)?;
    let baseline = run_phase(tools, &module_dir, Phase::Baseline, reporter)?;

    reporter.phase_started(Phase::Released)?;
    substitute(tools, &module_dir, sources.released, sources, reporter)?;
    let released = run_phase(tools, &module_dir, Phase::Released, reporter)?;

    reporter.phase_started(Phase::Modified)?;
    substitute(tools, &module_dir, sources.modified, sources, reporter)?;
    let modified = run_phase(tools, &module_dir, Phase::Modified, reporter)?;

    let phases = PhaseResults {
        baseline,
        released,
        modified,
    };
    let outcome = phases.outcome();
    info!(%outcome, "dependent classified");
    reporter.dependent_summary(&phases, outcome)?;
    Ok(DependentVerdict { phases, outcome })
}

/// Join a configured module path onto the checkout, refusing paths that leave it.
fn module_dir_in(checkout: &Path, module_path: &str) -> Result<PathBuf> {
    let relative = Path::new(module_path);
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("module path '{module_path}' must stay inside the repository checkout");
            }
        }
    }
    Ok(checkout.join(relative))
}

fn substitute<F, M: ModuleTool, T, W: Write>(
    tools: &Tools<F, M, T>,
    module_dir: &Path,
    source: &Path,
    sources: TargetSources<'_>,
    reporter: &mut Reporter<W>,
) -> Result<()> {
    reporter.substitution_started(sources.prefix)?;
    let report = apply_substitution(
        &tools.modules,
        SubstitutionRequest {
            module_dir,
            source,
            prefix: sources.prefix,
            root: sources.root,
        },
    )?;
    reporter.substitution_applied(&report)?;
    Ok(())
}

fn run_phase<F, M, T: TestRunner, W: Write>(
    tools: &Tools<F, M, T>,
    module_dir: &Path,
    phase: Phase,
    reporter: &mut Reporter<W>,
) -> Result<TestResult> {
    let result = tools.tests.run(module_dir);
    info!(%phase, verdict = result.label(), "phase finished");
    reporter.phase_finished(&result)?;
    Ok(result)
}
