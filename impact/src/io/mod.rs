//! I/O adapters for impact runs: configuration, git, the Go toolchain, processes.

pub mod config;
pub mod git;
pub mod gomod;
pub mod gotest;
pub mod process;
pub mod workspace;
