//! Predict-execute-verify reconciliation engine.
//!
//! A domain machine routes over an in-memory domain, builds a queue of typed
//! actions, and drains it through a shared runner: each action's expected
//! effect is predicted before it runs, and the refreshed domain is checked
//! against that prediction afterwards. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (check evaluation, verdict
//!   merging, queue bookkeeping, definition invariants). No I/O.
//! - **[`machine`]**: Routing graphs, the runner state loop and the per-run
//!   context.
//! - **[`registry`]**: The [`registry::ActionRegistry`] seam binding actions
//!   to their predict/execute/verify behavior.
//! - **[`io`]**: Config files and run reports.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
