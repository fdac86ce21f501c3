//! I/O helpers for the engine and the `pev` binary.

pub mod config;
pub mod run_report;
