//! Test-suite adapter for `go test`.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::core::types::{TestResult, TestStatus};
use crate::io::process::{CommandOutput, run_command};

/// Cap on captured test output kept for diagnostics.
pub const TEST_OUTPUT_LIMIT_BYTES: usize = 200_000;

/// Runs a dependent's full test suite. Never errors: tooling faults become
/// [`TestStatus::CouldNotRun`].
pub trait TestRunner {
    fn run(&self, module_dir: &Path) -> TestResult;
}

/// [`TestRunner`] that spawns a configurable command, `go test -count=1 ./...` by default.
///
/// `-count=1` disables the result cache: substitutions change the dependency
/// graph without touching package sources, so cached results would be stale.
#[derive(Debug, Clone)]
pub struct GoTestRunner {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for GoTestRunner {
    fn default() -> Self {
        Self {
            command: default_test_command(),
            timeout: None,
        }
    }
}

pub fn default_test_command() -> Vec<String> {
    ["go", "test", "-count=1", "./..."]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

impl GoTestRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_command(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl TestRunner for GoTestRunner {
    #[instrument(skip_all, fields(module_dir = %module_dir.display()))]
    fn run(&self, module_dir: &Path) -> TestResult {
        let start = Instant::now();
        let status = match self.command.split_first() {
            None => TestStatus::CouldNotRun("empty test command".to_string()),
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).current_dir(module_dir);
                match run_command(cmd, self.timeout, TEST_OUTPUT_LIMIT_BYTES) {
                    Ok(output) => status_from_output(&output),
                    Err(err) => TestStatus::CouldNotRun(format!("{err:#}")),
                }
            }
        };
        let duration = start.elapsed();
        debug!(?status, duration_secs = duration.as_secs_f64(), "test suite finished");
        TestResult::new(status, duration)
    }
}

fn status_from_output(output: &CommandOutput) -> TestStatus {
    let status = status_from_exit(output.status.code(), output.timed_out);
    if let TestStatus::CouldNotRun(reason) = &status {
        warn!(reason = %reason, stderr = %output.stderr_text(), "test suite could not run");
    }
    status
}

/// Map the test tool's exit convention: 0 passed, 1 failed, anything else is a tooling fault.
pub fn status_from_exit(code: Option<i32>, timed_out: bool) -> TestStatus {
    if timed_out {
        return TestStatus::CouldNotRun("timed out".to_string());
    }
    match code {
        Some(0) => TestStatus::Passed,
        Some(1) => TestStatus::Failed,
        Some(other) => TestStatus::CouldNotRun(format!("exit code {other}")),
        None => TestStatus::CouldNotRun("terminated by signal".to_string()),
    }
}
