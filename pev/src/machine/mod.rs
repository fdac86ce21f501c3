//! Domain machines: caller routing graphs composed with the shared runner.
//!
//! A caller describes *when* to act with [`DomainState`]s and guards, builds
//! a queue of actions from a routing state, and transitions into
//! `executingQueue`. The runner then predicts, executes and verifies each
//! action in order and hands control back to routing once the queue drains.

pub mod context;
pub mod domain;
pub mod factory;
pub mod runner;
pub mod state;

pub use context::{Completed, RunInput, RunnerContext};
pub use domain::{BuiltinGuard, DomainState, GuardKey, NoGuards, Transition};
pub use factory::{DomainMachine, MachineBuilder};
pub use runner::{RunOutcome, StallReason, StalledMachineError};
pub use state::{ACTION_FAILURE_STATE, MachineState, TerminalState};
