//! Regression-impact evaluation for Go module changes.
//!
//! Runs each dependent's test suite three times: as checked out, against the
//! released target, and against a locally modified target, then classifies the
//! released-to-modified transition.
//!
//! - **[`core`]**: deterministic types, classification and substitution planning.
//! - **[`io`]**: config, workspace, git, `go` module graph and `go test` adapters,
//!   each behind a trait so tests can script them.
//!
//! [`substitute`], [`sequence`] and [`run`] compose those into the pipeline;
//! [`report`] renders it.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
pub mod run;
pub mod sequence;
pub mod substitute;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
