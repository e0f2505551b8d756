//! Human-readable progress and summary output on stdout.
//!
//! Diagnostics go through `tracing` on stderr; this module owns the product
//! output and writes to any [`Write`] so tests can capture it.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::core::outcome::Outcome;
use crate::core::types::{Phase, TestResult, TestStatus, format_duration};
use crate::io::config::DependentConfig;
use crate::run::RunReport;
use crate::sequence::PhaseResults;
use crate::substitute::SubstitutionReport;

const RULE: &str = "================================================";

pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn run_started(&mut self, workspace: &Path, started_at: DateTime<Utc>) -> Result<()> {
        writeln!(self.out, "Workspace: {}", workspace.display())?;
        writeln!(
            self.out,
            "Started  : {}",
            started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        Ok(())
    }

    pub fn workspace_kept(&mut self, workspace: &Path) -> Result<()> {
        writeln!(self.out, "Workspace kept at: {}", workspace.display())?;
        Ok(())
    }

    /// Banner for the dependent at `index` (0-based) of `total`.
    pub fn dependent_header(
        &mut self,
        index: usize,
        total: usize,
        dependent: &DependentConfig,
    ) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(
            self.out,
            "Dependent: {} ({}/{})",
            dependent.repo_url,
            index + 1,
            total
        )?;
        writeln!(self.out, "Module   : {}", dependent.module_path)?;
        writeln!(self.out, "Ref      : {}", dependent.reference)?;
        writeln!(self.out, "{RULE}")?;
        Ok(())
    }

    pub fn phase_started(&mut self, phase: Phase) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "--- {phase} ---")?;
        Ok(())
    }

    pub fn substitution_started(&mut self, prefix: &str) -> Result<()> {
        writeln!(self.out, "Applying replacements for prefix: {prefix}")?;
        Ok(())
    }

    pub fn substitution_applied(&mut self, report: &SubstitutionReport) -> Result<()> {
        for replacement in &report.plan.replacements {
            writeln!(
                self.out,
                "  replace {} => {}",
                replacement.module,
                replacement.local_path.display()
            )?;
        }
        if let Some(warning) = &report.warning {
            writeln!(self.out, "  WARNING: {warning}")?;
        }
        Ok(())
    }

    pub fn phase_finished(&mut self, result: &TestResult) -> Result<()> {
        match &result.status {
            TestStatus::Passed => writeln!(self.out, "✔ PASS")?,
            TestStatus::Failed => writeln!(self.out, "✘ FAIL")?,
            TestStatus::CouldNotRun(reason) => {
                writeln!(self.out, "⚠ ERROR (could not run: {reason})")?;
            }
        }
        writeln!(self.out, "Duration: {}", format_duration(result.duration))?;
        Ok(())
    }

    pub fn dependent_summary(&mut self, phases: &PhaseResults, outcome: Outcome) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Summary:")?;
        for phase in Phase::ALL {
            writeln!(
                self.out,
                "{:<9}: {}",
                phase.label(),
                phases.get(phase).label()
            )?;
        }
        writeln!(self.out, "Outcome  : {outcome}")?;
        let faults = phases.tooling_faults();
        if !faults.is_empty() {
            let names: Vec<&str> = faults.iter().map(|phase| phase.label()).collect();
            writeln!(
                self.out,
                "  NOTE: tests could not run in: {}",
                names.join(", ")
            )?;
        }
        Ok(())
    }

    pub fn dependent_failed(&mut self, err: &anyhow::Error) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "ERROR: {err:#}")?;
        Ok(())
    }

    pub fn run_summary(&mut self, report: &RunReport) -> Result<()> {
        let summary = report.summary();
        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "Run summary: {} dependent(s)", summary.total)?;
        for entry in &report.dependents {
            let verdict = match &entry.result {
                Ok(verdict) => verdict.outcome.label(),
                Err(_) => "ERROR",
            };
            writeln!(
                self.out,
                "  [{}] {} ({}): {verdict}",
                entry.index + 1,
                entry.dependent.repo_url,
                entry.dependent.module_path
            )?;
        }
        for outcome in Outcome::ALL {
            writeln!(
                self.out,
                "{:<16}: {}",
                outcome.label(),
                summary.count(outcome)
            )?;
        }
        if summary.errored > 0 {
            writeln!(self.out, "{:<16}: {}", "ERRORED", summary.errored)?;
        }
        if summary.tooling_faults > 0 {
            writeln!(
                self.out,
                "{} dependent(s) had phases that could not run",
                summary.tooling_faults
            )?;
        }
        if summary.inconclusive > 0 {
            writeln!(
                self.out,
                "{} dependent(s) inconclusive: released or modified tests could not run",
                summary.inconclusive
            )?;
        }
        writeln!(self.out, "{RULE}")?;
        Ok(())
    }
}
