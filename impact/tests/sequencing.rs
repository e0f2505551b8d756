//! End-to-end runs over scripted git and go.
//!
//! Each test drives `run_impact` through a real workspace with checkouts
//! materialized by `ScriptedFetcher`, and module edits and test verdicts served
//! by `ScriptedGo`.

use std::path::PathBuf;

use impact::core::outcome::Outcome;
use impact::core::types::TestStatus::{Failed, Passed};
use impact::core::types::{ResolvedModule, TestStatus};
use impact::exit_codes;
use impact::io::config::{DependentConfig, ImpactConfig, RunPolicy, RunSettings, TargetConfig};
use impact::io::workspace::Workspace;
use impact::report::Reporter;
use impact::run::{RunReport, run_impact};
use impact::sequence::Tools;
use impact::test_support::{ScriptedFetcher, ScriptedGo, write_manifests};
use tempfile::TempDir;

const TARGET_URL: &str = "https://example.com/opentelemetry-go.git";
const ROOT: &str = "go.opentelemetry.io/otel";
const SDK: &str = "go.opentelemetry.io/otel/sdk";

struct Fixture {
    temp: TempDir,
    workspace: Workspace,
    modified: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let modified = temp.path().join("modified");
        write_manifests(&modified, &["", "sdk"]).expect("modified tree");
        let workspace = Workspace::create(Some(temp.path())).expect("workspace");
        Self {
            temp,
            workspace,
            modified,
        }
    }

    fn config(&self, dependents: Vec<DependentConfig>) -> ImpactConfig {
        ImpactConfig {
            target: TargetConfig {
                repo_url: TARGET_URL.to_string(),
                module_prefix: ROOT.to_string(),
                released_ref: "v1.28.0".to_string(),
                modified_local_path: self.modified.clone(),
                module_root: String::new(),
            },
            dependents,
            run: RunSettings::default(),
        }
    }

    fn run(
        &self,
        config: &ImpactConfig,
        settings: &RunSettings,
        tools: &Tools<ScriptedFetcher, ScriptedGo, ScriptedGo>,
    ) -> (anyhow::Result<RunReport>, String) {
        let mut reporter = Reporter::new(Vec::new());
        let result = run_impact(config, settings, &self.workspace, tools, &mut reporter);
        let text = String::from_utf8(reporter.into_inner()).expect("utf8");
        (result, text)
    }
}

fn dependent(name: &str) -> DependentConfig {
    DependentConfig {
        repo_url: format!("https://example.com/{name}.git"),
        module_path: "svc".to_string(),
        reference: "main".to_string(),
    }
}

fn fetcher(dependents: &[DependentConfig]) -> ScriptedFetcher {
    let mut fetcher = ScriptedFetcher::new()
        .with_module(TARGET_URL, "", ROOT)
        .with_module(TARGET_URL, "sdk", SDK);
    for dep in dependents {
        fetcher = fetcher.with_module(&dep.repo_url, &dep.module_path, "example.com/svc");
    }
    fetcher
}

fn otel_graph() -> Vec<ResolvedModule> {
    vec![
        ResolvedModule::main("example.com/svc"),
        ResolvedModule::dependency(ROOT),
        ResolvedModule::dependency(SDK),
        ResolvedModule::dependency("github.com/google/uuid"),
    ]
}

fn tools(
    fetcher: ScriptedFetcher,
    go: &ScriptedGo,
) -> Tools<ScriptedFetcher, ScriptedGo, ScriptedGo> {
    Tools {
        fetcher,
        modules: go.clone(),
        tests: go.clone(),
    }
}

fn single_outcome(report: &RunReport) -> Outcome {
    assert_eq!(report.dependents.len(), 1);
    report.dependents[0]
        .result
        .as_ref()
        .expect("dependent evaluated")
        .outcome
}

#[test]
fn passing_everywhere_is_unchanged() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Passed]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    let report = result.expect("run");

    assert_eq!(single_outcome(&report), Outcome::Unchanged);
    assert_eq!(report.exit_code(true), exit_codes::OK);
    assert!(text.contains("Outcome  : UNCHANGED"));
    go.assert_drained().expect("all phases ran");
}

#[test]
fn failing_only_with_modified_is_regression() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Failed]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    let report = result.expect("run");

    assert_eq!(single_outcome(&report), Outcome::Regression);
    assert_eq!(report.exit_code(false), exit_codes::OK);
    assert_eq!(report.exit_code(true), exit_codes::REGRESSION);
    assert!(text.contains("Modified : FAIL"));
}

#[test]
fn passing_only_with_modified_is_improvement() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([Failed, Failed, Passed]);

    let (result, _) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );

    assert_eq!(single_outcome(&result.expect("run")), Outcome::Improvement);
}

#[test]
fn no_prefix_match_warns_and_classifies_on_unsubstituted_runs() {
    let graph = vec![
        ResolvedModule::main("example.com/svc"),
        ResolvedModule::dependency("github.com/google/uuid"),
    ];
    for (results, expected) in [
        ([Passed, Passed, Passed], Outcome::Unchanged),
        ([Failed, Failed, Failed], Outcome::UnchangedFail),
    ] {
        let fx = Fixture::new();
        let deps = vec![dependent("contrib")];
        let go = ScriptedGo::new(graph.clone()).with_results(results);

        let (result, text) = fx.run(
            &fx.config(deps.clone()),
            &RunSettings::default(),
            &tools(fetcher(&deps), &go),
        );

        assert_eq!(single_outcome(&result.expect("run")), expected);
        assert_eq!(
            text.matches("WARNING: no modules matched prefix: go.opentelemetry.io/otel")
                .count(),
            2
        );
        assert!(go.test_runs().iter().all(|run| run.replacements.is_empty()));
    }
}

#[test]
fn modified_substitution_supersedes_released() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Passed]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    result.expect("run");

    let released = fx.workspace.released_dir();
    let runs = go.test_runs();
    assert_eq!(runs.len(), 3);
    assert!(runs[0].replacements.is_empty());
    assert_eq!(runs[1].replacements.len(), 2);
    assert!(runs[1].replacements.values().all(|p| p.starts_with(&released)));
    assert_eq!(runs[2].replacements.len(), 2);
    assert!(
        runs[2]
            .replacements
            .values()
            .all(|p| p.starts_with(&fx.modified))
    );
    assert_eq!(runs[2].replacements.get(SDK), Some(&fx.modified.join("sdk")));

    let baseline = text.find("--- Baseline ---").expect("baseline");
    let released_at = text.find("--- Released ---").expect("released");
    let modified_at = text.find("--- Modified ---").expect("modified");
    assert!(baseline < released_at && released_at < modified_at);
}

#[test]
fn dependents_get_their_own_checkouts() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib"), dependent("contrib")];
    let fetcher = fetcher(&deps);
    let go = ScriptedGo::new(otel_graph()).with_results(vec![Passed; 6]);
    let tools = tools(fetcher, &go);

    let (result, _) = fx.run(&fx.config(deps), &RunSettings::default(), &tools);
    let report = result.expect("run");

    assert_eq!(report.dependents.len(), 2);
    let fetched = tools.fetcher.fetched();
    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched[0].url, TARGET_URL);
    assert_eq!(fetched[0].reference, "v1.28.0");
    assert_ne!(fetched[1].dest, fetched[2].dest);
    assert!(fetched.iter().all(|f| f.dest.starts_with(fx.workspace.root())));
}

#[test]
fn best_effort_records_error_and_continues() {
    let fx = Fixture::new();
    let deps = vec![dependent("broken"), dependent("contrib")];
    let fetcher = fetcher(&deps).failing(&deps[0].repo_url);
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Failed]);
    let settings = RunSettings {
        policy: RunPolicy::BestEffort,
        ..RunSettings::default()
    };

    let (result, text) = fx.run(&fx.config(deps), &settings, &tools(fetcher, &go));
    let report = result.expect("best-effort run completes");

    assert_eq!(report.dependents.len(), 2);
    let err = report.dependents[0].result.as_ref().expect_err("broken");
    assert!(format!("{err:#}").contains("repository not found"));
    let verdict = report.dependents[1].result.as_ref().expect("contrib");
    assert_eq!(verdict.outcome, Outcome::Regression);
    assert_eq!(report.summary().errored, 1);
    assert_eq!(report.exit_code(true), exit_codes::FAILED);
    assert!(text.contains("ERROR: fetch https://example.com/broken.git at ref 'main'"));
    assert!(text.contains("[1] https://example.com/broken.git (svc): ERROR"));
}

#[test]
fn fail_fast_stops_at_first_error() {
    let fx = Fixture::new();
    let deps = vec![dependent("broken"), dependent("contrib")];
    let fetcher = fetcher(&deps).failing(&deps[0].repo_url);
    let go = ScriptedGo::new(otel_graph());
    let tools = tools(fetcher, &go);

    let (result, _) = fx.run(&fx.config(deps), &RunSettings::default(), &tools);

    let err = result.expect_err("fail-fast aborts");
    assert!(format!("{err:#}").contains("dependent https://example.com/broken.git"));
    assert_eq!(tools.fetcher.fetched().len(), 2);
    assert!(go.test_runs().is_empty());
}

#[test]
fn released_fetch_failure_is_fatal_under_any_policy() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let fetcher = fetcher(&deps).failing(TARGET_URL);
    let go = ScriptedGo::new(otel_graph());
    let settings = RunSettings {
        policy: RunPolicy::BestEffort,
        ..RunSettings::default()
    };
    let tools = tools(fetcher, &go);

    let (result, _) = fx.run(&fx.config(deps), &settings, &tools);

    let err = result.expect_err("released fetch fails");
    assert!(format!("{err:#}").contains("fetch released target"));
    assert_eq!(tools.fetcher.fetched().len(), 1);
}

#[test]
fn could_not_run_is_reported_and_counts_as_not_passed() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([
        Passed,
        TestStatus::CouldNotRun("exit code 2".to_string()),
        Passed,
    ]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    let report = result.expect("run");

    assert_eq!(single_outcome(&report), Outcome::Improvement);
    assert_eq!(report.summary().tooling_faults, 1);
    assert!(text.contains("⚠ ERROR (could not run: exit code 2)"));
    assert!(text.contains("Released : ERROR"));
}

#[test]
fn modified_suite_that_could_not_run_fails_the_regression_gate() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([
        Passed,
        Passed,
        TestStatus::CouldNotRun("timed out".to_string()),
    ]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    let report = result.expect("run");

    assert_eq!(report.summary().inconclusive, 1);
    assert_eq!(report.exit_code(true), exit_codes::FAILED);
    assert!(text.contains("1 dependent(s) inconclusive"));
}

#[test]
fn substitution_failure_aborts_dependent() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let checkout = fx.workspace.dependent_dir(0, &deps[0].repo_url);
    let go = ScriptedGo::new(otel_graph())
        .with_results([Passed])
        .fail_tidy_under(&checkout);

    let (result, _) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );

    let err = result.expect_err("tidy fails");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("substitute modules in"));
    assert!(rendered.contains("go: updates to go.mod needed"));
    assert_eq!(go.test_runs().len(), 1);
}

#[test]
fn workspace_is_removed_after_run() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Passed]);

    let (result, text) = fx.run(
        &fx.config(deps.clone()),
        &RunSettings::default(),
        &tools(fetcher(&deps), &go),
    );
    result.expect("run");

    let root = fx.workspace.root().to_path_buf();
    assert!(text.starts_with(&format!("Workspace: {}", root.display())));
    assert!(root.join("released").join("go.mod").is_file());
    let Fixture { temp, workspace, .. } = fx;
    drop(workspace);
    assert!(!root.exists());
    assert!(temp.path().join("modified").is_dir());
}

#[test]
fn explicit_module_root_maps_nested_prefix() {
    let fx = Fixture::new();
    let deps = vec![dependent("contrib")];
    let mut config = fx.config(deps.clone());
    config.target.module_prefix = SDK.to_string();
    config.target.module_root = ROOT.to_string();
    let go = ScriptedGo::new(otel_graph()).with_results([Passed, Passed, Passed]);

    let (result, _) = fx.run(&config, &RunSettings::default(), &tools(fetcher(&deps), &go));
    result.expect("run");

    let runs = go.test_runs();
    let modified: Vec<(&String, &PathBuf)> = runs[2].replacements.iter().collect();
    assert_eq!(modified, vec![(&SDK.to_string(), &fx.modified.join("sdk"))]);
    assert!(!runs[2].replacements.contains_key(ROOT));
}
