//! Structural invariants of a machine definition.
//!
//! Validation works on a name-only outline of the routing graph so it can be
//! checked without the closures attached to guards and effects.

use std::collections::HashSet;

pub const GUARD_QUEUE_EMPTY: &str = "queueEmpty";
pub const GUARD_MAX_CYCLES_REACHED: &str = "maxCyclesReached";

/// Guard names owned by the engine.
pub const RESERVED_GUARDS: [&str; 2] = [GUARD_QUEUE_EMPTY, GUARD_MAX_CYCLES_REACHED];

/// State names owned by the shared runner block.
pub const RESERVED_STATES: [&str; 12] = [
    "executingQueue",
    "startingQueue",
    "dequeuing",
    "runningAction",
    "executing",
    "verifying",
    "queueComplete",
    "persisting",
    "routable",
    "done",
    "executionFailed",
    "verificationFailed",
];

/// Transition target, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutline<'a> {
    State(&'a str),
    ExecutingQueue,
    Done,
}

/// Name-only view of one domain state.
#[derive(Debug, Clone)]
pub struct StateOutline<'a> {
    pub name: &'a str,
    pub is_final: bool,
    pub targets: Vec<TargetOutline<'a>>,
    /// Domain guard names referenced by this state's transitions.
    pub guards: Vec<&'static str>,
}

/// Name-only view of a machine definition.
#[derive(Debug, Clone)]
pub struct MachineOutline<'a> {
    pub id: &'a str,
    pub initial: Option<&'a str>,
    pub reentry: Option<&'a str>,
    pub states: Vec<StateOutline<'a>>,
    pub registered_guards: Vec<&'static str>,
    pub has_refresh_context: bool,
}

/// Check machine invariants:
/// - `refresh_context` is configured and the id is non-empty
/// - state names are unique, non-empty, and not runner-reserved
/// - guard names are unique and not engine-reserved
/// - initial/reentry states and all transition targets exist
/// - referenced guards are registered
/// - final states have no transitions, other states have at least one
/// - some transition enters `executingQueue`
pub fn validate_machine(outline: &MachineOutline<'_>) -> Vec<String> {
    let mut errors = Vec::new();

    if outline.id.trim().is_empty() {
        errors.push("machine id must be non-empty".to_string());
    }
    if !outline.has_refresh_context {
        errors.push("refresh_context hook is required".to_string());
    }

    let mut names = HashSet::new();
    for state in &outline.states {
        if state.name.trim().is_empty() {
            errors.push("state name must be non-empty".to_string());
        }
        if !names.insert(state.name) {
            errors.push(format!("duplicate state '{}'", state.name));
        }
        if RESERVED_STATES.contains(&state.name) {
            errors.push(format!(
                "state '{}' collides with a reserved runner state",
                state.name
            ));
        }
    }

    let mut guards = HashSet::new();
    for guard in &outline.registered_guards {
        if !guards.insert(*guard) {
            errors.push(format!("duplicate guard '{}'", guard));
        }
        if RESERVED_GUARDS.contains(guard) {
            errors.push(format!(
                "guard '{}' collides with a reserved engine guard",
                guard
            ));
        }
    }

    match outline.initial {
        None => errors.push("initial state is not set".to_string()),
        Some(initial) if !names.contains(initial) => {
            errors.push(format!("initial state '{}' is not defined", initial));
        }
        Some(_) => {}
    }
    if let Some(reentry) = outline.reentry {
        if !names.contains(reentry) {
            errors.push(format!("reentry state '{}' is not defined", reentry));
        }
    }

    let mut enters_queue = false;
    for state in &outline.states {
        if state.is_final && !state.targets.is_empty() {
            errors.push(format!(
                "{}: final state must not have transitions",
                state.name
            ));
        }
        if !state.is_final && state.targets.is_empty() {
            errors.push(format!(
                "{}: non-final state needs at least one transition",
                state.name
            ));
        }
        for target in &state.targets {
            match target {
                TargetOutline::State(name) if !names.contains(name) => errors.push(format!(
                    "{}: transition targets undefined state '{}'",
                    state.name, name
                )),
                TargetOutline::ExecutingQueue => enters_queue = true,
                _ => {}
            }
        }
        for guard in &state.guards {
            if !guards.contains(guard) {
                errors.push(format!(
                    "{}: guard '{}' is not registered",
                    state.name, guard
                ));
            }
        }
    }

    if !enters_queue {
        errors.push("no transition enters executingQueue".to_string());
    }

    errors
}
