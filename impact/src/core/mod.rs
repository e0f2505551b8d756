//! Pure decision logic for impact runs: no processes, no filesystem writes.

pub mod outcome;
pub mod substitution;
pub mod types;
