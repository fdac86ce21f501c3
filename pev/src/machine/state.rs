//! Runner states and terminal outcomes.

use std::fmt;

use serde::Serialize;

/// Name of the optional domain state that receives action failures.
pub const ACTION_FAILURE_STATE: &str = "actionFailure";

/// Position of a running machine.
///
/// `Domain` covers every caller-supplied routing state; the other variants are
/// the shared runner states. Compound states are named `parent.child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineState {
    Domain(String),
    /// Entry of `executingQueue`: a queue has just been built.
    ExecutingQueue,
    StartingQueue,
    Dequeuing,
    Executing,
    Verifying,
    /// Entry of `queueComplete`: the queue drained.
    QueueComplete,
    Persisting,
    Routable,
    Final(TerminalState),
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Domain(name) => write!(f, "{name}"),
            MachineState::ExecutingQueue => write!(f, "executingQueue"),
            MachineState::StartingQueue => write!(f, "executingQueue.startingQueue"),
            MachineState::Dequeuing => write!(f, "executingQueue.dequeuing"),
            MachineState::Executing => write!(f, "runningAction.executing"),
            MachineState::Verifying => write!(f, "runningAction.verifying"),
            MachineState::QueueComplete => write!(f, "queueComplete"),
            MachineState::Persisting => write!(f, "queueComplete.persisting"),
            MachineState::Routable => write!(f, "queueComplete.routable"),
            MachineState::Final(terminal) => write!(f, "{terminal}"),
        }
    }
}

/// State a run stopped in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminalState {
    Done,
    ExecutionFailed,
    VerificationFailed,
    /// A final state of the domain routing graph.
    Domain(String),
}

impl TerminalState {
    pub fn name(&self) -> &str {
        match self {
            TerminalState::Done => "done",
            TerminalState::ExecutionFailed => "executionFailed",
            TerminalState::VerificationFailed => "verificationFailed",
            TerminalState::Domain(name) => name,
        }
    }

    /// True for the canonical failure terminals and a final `actionFailure`.
    pub fn is_failure(&self) -> bool {
        match self {
            TerminalState::ExecutionFailed | TerminalState::VerificationFailed => true,
            TerminalState::Domain(name) => name == ACTION_FAILURE_STATE,
            TerminalState::Done => false,
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
