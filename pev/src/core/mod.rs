//! Deterministic, pure logic shared by the reconciliation engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and JSON values and return deterministic outputs suitable
//! for tests.

pub mod check;
pub mod invariants;
pub mod path;
pub mod queue;
pub mod types;
pub mod verify;
