//! Shared deterministic types for impact core logic.
//!
//! These types are produced by the I/O adapters and consumed by the sequencer
//! and report printer. They carry no handles and are immutable once built.

use std::fmt;
use std::time::Duration;

/// Experiment phase for a single dependent, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Dependent as checked out, no substitution applied.
    Baseline,
    /// Target modules redirected to the released checkout.
    Released,
    /// Target modules redirected to the modified local tree.
    Modified,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Baseline, Phase::Released, Phase::Modified];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Baseline => "Baseline",
            Phase::Released => "Released",
            Phase::Modified => "Modified",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Three-valued result of invoking a dependent's test suite.
///
/// `CouldNotRun` keeps tooling faults (spawn failure, timeout, unexpected exit
/// convention) apart from genuine test failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    CouldNotRun(String),
}

/// Outcome of one test-suite invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub status: TestStatus,
    pub duration: Duration,
}

impl TestResult {
    pub fn new(status: TestStatus, duration: Duration) -> Self {
        Self { status, duration }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub fn could_not_run(&self) -> bool {
        matches!(self.status, TestStatus::CouldNotRun(_))
    }

    /// Short verdict used in summary lines.
    pub fn label(&self) -> &'static str {
        match self.status {
            TestStatus::Passed => "PASS",
            TestStatus::Failed => "FAIL",
            TestStatus::CouldNotRun(_) => "ERROR",
        }
    }
}

/// One entry of a dependent's resolved module graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub path: String,
    /// True for the dependent's own module (never a substitution candidate).
    pub main: bool,
}

impl ResolvedModule {
    pub fn dependency(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            main: false,
        }
    }

    pub fn main(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            main: true,
        }
    }
}

/// Round to whole seconds and render as `1h2m3s` / `4m5s` / `6s`.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if duration.subsec_millis() >= 500 {
        secs += 1;
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
