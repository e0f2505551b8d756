//! Stable exit codes for the `impact` CLI.

/// Every dependent was evaluated, whatever the outcomes.
pub const OK: i32 = 0;
/// Usage, configuration, workspace or released-target failure, or any
/// dependent that errored under the best-effort policy.
pub const FAILED: i32 = 1;
/// At least one REGRESSION, reported only with `--fail-on-regression`.
pub const REGRESSION: i32 = 2;
