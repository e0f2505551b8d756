//! Run driver: fetch the released target once, then sequence every dependent.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{error, info, instrument};

use crate::core::outcome::Outcome;
use crate::exit_codes;
use crate::io::config::{DependentConfig, ImpactConfig, RunPolicy, RunSettings};
use crate::io::git::Fetcher;
use crate::io::gomod::ModuleTool;
use crate::io::gotest::TestRunner;
use crate::io::workspace::Workspace;
use crate::report::Reporter;
use crate::sequence::{DependentVerdict, TargetSources, Tools, run_dependent};

/// Result for one dependent, in configuration order.
#[derive(Debug)]
pub struct DependentReport {
    pub index: usize,
    pub dependent: DependentConfig,
    pub result: Result<DependentVerdict>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub dependents: Vec<DependentReport>,
}

/// Outcome counts across a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub unchanged: usize,
    pub regression: usize,
    pub improvement: usize,
    pub unchanged_fail: usize,
    pub errored: usize,
    /// Classified dependents with at least one phase that could not run.
    pub tooling_faults: usize,
    /// Classified dependents whose released or modified phase could not run.
    pub inconclusive: usize,
}

impl RunSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Unchanged => self.unchanged,
            Outcome::Regression => self.regression,
            Outcome::Improvement => self.improvement,
            Outcome::UnchangedFail => self.unchanged_fail,
        }
    }
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.dependents.len(),
            ..RunSummary::default()
        };
        for report in &self.dependents {
            let verdict = match &report.result {
                Ok(verdict) => verdict,
                Err(_) => {
                    summary.errored += 1;
                    continue;
                }
            };
            match verdict.outcome {
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Regression => summary.regression += 1,
                Outcome::Improvement => summary.improvement += 1,
                Outcome::UnchangedFail => summary.unchanged_fail += 1,
            }
            if !verdict.phases.tooling_faults().is_empty() {
                summary.tooling_faults += 1;
            }
            if verdict.phases.comparison_is_inconclusive() {
                summary.inconclusive += 1;
            }
        }
        summary
    }

    /// Process exit code for a completed run.
    ///
    /// Errored dependents (best-effort runs) win over regressions. With the
    /// regression gate on, a released or modified suite that could not run
    /// fails the run instead of counting as a regression.
    pub fn exit_code(&self, fail_on_regression: bool) -> i32 {
        let summary = self.summary();
        if summary.errored > 0 || (fail_on_regression && summary.inconclusive > 0) {
            exit_codes::FAILED
        } else if fail_on_regression && summary.regression > 0 {
            exit_codes::REGRESSION
        } else {
            exit_codes::OK
        }
    }
}

/// Evaluate every dependent against the released and modified target.
///
/// The released checkout is fetched once per run; its failure aborts the run
/// regardless of policy. Each dependent gets its own checkout directory.
#[instrument(skip_all, fields(dependents = config.dependents.len(), policy = ?settings.policy))]
pub fn run_impact<F, M, T, W>(
    config: &ImpactConfig,
    settings: &RunSettings,
    workspace: &Workspace,
    tools: &Tools<F, M, T>,
    reporter: &mut Reporter<W>,
) -> Result<RunReport>
where
    F: Fetcher,
    M: ModuleTool,
    T: TestRunner,
    W: Write,
{
    reporter.run_started(workspace.root(), chrono::Utc::now())?;

    let target = &config.target;
    let released_dir = workspace.released_dir();
    tools
        .fetcher
        .fetch(&target.repo_url, &target.released_ref, &released_dir)
        .context("fetch released target")?;
    info!(released = %released_dir.display(), "released target checked out");

    let sources = TargetSources {
        released: &released_dir,
        modified: &target.modified_local_path,
        prefix: &target.module_prefix,
        root: target.module_root(),
    };

    let total = config.dependents.len();
    let mut report = RunReport::default();
    for (index, dependent) in config.dependents.iter().enumerate() {
        reporter.dependent_header(index, total, dependent)?;
        let checkout = workspace.dependent_dir(index, &dependent.repo_url);
        let result = match run_dependent(tools, dependent, &checkout, sources, reporter) {
            Ok(verdict) => Ok(verdict),
            Err(err) => {
                error!(repo = %dependent.repo_url, err = %format!("{err:#}"), "dependent failed");
                if settings.policy == RunPolicy::FailFast {
                    return Err(err.context(format!("dependent {}", dependent.repo_url)));
                }
                reporter.dependent_failed(&err)?;
                Err(err)
            }
        };
        report.dependents.push(DependentReport {
            index,
            dependent: dependent.clone(),
            result,
        });
    }

    reporter.run_summary(&report)?;
    Ok(report)
}
