//! `impact`: measure how a modified Go library changes its dependents' test results.
//!
//! Reads a JSON configuration, checks out the released target and every
//! dependent into a scratch workspace, and prints a per-dependent verdict.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use impact::error::ImpactError;
use impact::exit_codes;
use impact::io::config::{RunOverrides, RunPolicy, load_config};
use impact::io::git::GitFetcher;
use impact::io::gomod::GoModTool;
use impact::io::gotest::GoTestRunner;
use impact::io::workspace::Workspace;
use impact::logging;
use impact::report::Reporter;
use impact::run::run_impact;
use impact::sequence::Tools;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(
    name = "impact",
    version,
    about = "Evaluate the regression impact of a modified Go library on its dependents"
)]
struct Cli {
    /// JSON configuration file.
    config: PathBuf,
    /// What to do when one dependent errors (overrides `run.policy`).
    #[arg(long, value_enum)]
    policy: Option<RunPolicy>,
    /// Deadline for each `go test` invocation, in seconds.
    #[arg(long, value_name = "SECS")]
    test_timeout: Option<u64>,
    /// Deadline for git and `go mod` commands, in seconds.
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,
    /// Exit with code 2 when any dependent regresses.
    #[arg(long)]
    fail_on_regression: bool,
    /// Leave the scratch workspace on disk and print its location.
    #[arg(long)]
    keep_workspace: bool,
}

impl Cli {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            policy: self.policy,
            test_timeout_secs: self.test_timeout,
            command_timeout_secs: self.command_timeout,
            fail_on_regression: self.fail_on_regression,
            keep_workspace: self.keep_workspace,
        }
    }
}

fn main() {
    logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::FAILED
            } else {
                exit_codes::OK
            };
            if let Err(print_err) = err.print() {
                warn!(err = %print_err, "failed to print command-line usage");
            }
            std::process::exit(code);
        }
    };

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            print_error(&err);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

/// Owns the workspace so it is removed before the process exits.
fn run(cli: &Cli) -> Result<i32> {
    let config = load_config(&cli.config)?;
    let settings = config
        .run
        .clone()
        .apply_overrides(&cli.overrides())
        .context("apply command-line overrides")?;
    debug!(?settings, dependents = config.dependents.len(), "config loaded");

    let mut workspace = Workspace::create(None)?;
    if settings.keep_workspace {
        workspace.persist();
    }

    let tools = Tools {
        fetcher: GitFetcher::new(settings.command_timeout()),
        modules: GoModTool::new(settings.command_timeout()),
        tests: GoTestRunner::new(settings.test_timeout()),
    };
    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock());

    let result = run_impact(&config, &settings, &workspace, &tools, &mut reporter);
    if workspace.is_persistent() {
        reporter.workspace_kept(workspace.root())?;
    }
    let report = result?;
    Ok(report.exit_code(settings.fail_on_regression))
}

fn print_error(err: &anyhow::Error) {
    let is_config = err
        .downcast_ref::<ImpactError>()
        .is_some_and(ImpactError::is_config);
    if is_config {
        eprintln!("config error: {err:#}");
    } else {
        eprintln!("error: {err:#}");
    }
}
