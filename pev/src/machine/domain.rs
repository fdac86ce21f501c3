//! Building blocks for caller-supplied routing graphs.
//!
//! A routing graph is a set of named [`DomainState`]s. Entering a state runs
//! its entry effects, then the first `always` transition whose guard allows it
//! is taken. Targets are other domain states, the shared `executingQueue`, or
//! `done`.

use std::fmt::Debug;
use std::hash::Hash;

use crate::core::invariants::{GUARD_MAX_CYCLES_REACHED, GUARD_QUEUE_EMPTY};
use crate::machine::context::RunnerContext;
use crate::registry::ActionRegistry;

/// Closed set of domain guard names.
pub trait GuardKey: Copy + Eq + Hash + Debug {
    /// Name used in logs and collision checks.
    fn name(&self) -> &'static str;
}

/// Guard key type for routing graphs that only use built-in guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoGuards {}

impl GuardKey for NoGuards {
    fn name(&self) -> &'static str {
        match *self {}
    }
}

/// Guards the engine provides to every routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinGuard {
    QueueEmpty,
    MaxCyclesReached,
}

impl BuiltinGuard {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinGuard::QueueEmpty => GUARD_QUEUE_EMPTY,
            BuiltinGuard::MaxCyclesReached => GUARD_MAX_CYCLES_REACHED,
        }
    }
}

/// Guard attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard<K> {
    Builtin(BuiltinGuard),
    Domain(K),
}

impl<K: GuardKey> Guard<K> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Guard::Builtin(builtin) => builtin.name(),
            Guard::Domain(key) => key.name(),
        }
    }
}

/// Guard predicate over the shared context.
pub type GuardFn<R, C> = Box<dyn Fn(&RunnerContext<R, C>) -> bool>;

/// Context mutation run on state entry or while taking a transition.
pub type Effect<R, C> = Box<dyn Fn(&mut RunnerContext<R, C>)>;

/// Where a transition leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    State(String),
    /// Hand the built queue to the shared runner.
    ExecutingQueue,
    Done,
}

/// Guard-gated `always` transition.
pub struct Transition<R: ActionRegistry, C, K> {
    pub(crate) target: Target,
    pub(crate) guard: Option<Guard<K>>,
    pub(crate) effects: Vec<Effect<R, C>>,
}

impl<R: ActionRegistry, C, K: GuardKey> Transition<R, C, K> {
    fn new(target: Target) -> Self {
        Self {
            target,
            guard: None,
            effects: Vec::new(),
        }
    }

    pub fn to(state: &str) -> Self {
        Self::new(Target::State(state.to_string()))
    }

    pub fn to_queue() -> Self {
        Self::new(Target::ExecutingQueue)
    }

    pub fn to_done() -> Self {
        Self::new(Target::Done)
    }

    /// Gate on a domain guard.
    pub fn when(mut self, key: K) -> Self {
        self.guard = Some(Guard::Domain(key));
        self
    }

    /// Gate on an engine guard.
    pub fn when_builtin(mut self, guard: BuiltinGuard) -> Self {
        self.guard = Some(Guard::Builtin(guard));
        self
    }

    pub fn effect<F>(mut self, effect: F) -> Self
    where
        F: Fn(&mut RunnerContext<R, C>) + 'static,
    {
        self.effects.push(Box::new(effect));
        self
    }
}

/// One named state of a routing graph.
pub struct DomainState<R: ActionRegistry, C, K> {
    pub(crate) name: String,
    pub(crate) entry: Vec<Effect<R, C>>,
    pub(crate) always: Vec<Transition<R, C, K>>,
    pub(crate) is_final: bool,
}

impl<R: ActionRegistry, C, K: GuardKey> DomainState<R, C, K> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entry: Vec::new(),
            always: Vec::new(),
            is_final: false,
        }
    }

    /// A state that ends the run when entered.
    pub fn terminal(name: &str) -> Self {
        Self {
            is_final: true,
            ..Self::new(name)
        }
    }

    /// Run `effect` every time the state is entered, before transitions.
    pub fn on_entry<F>(mut self, effect: F) -> Self
    where
        F: Fn(&mut RunnerContext<R, C>) + 'static,
    {
        self.entry.push(Box::new(effect));
        self
    }

    /// Add a transition; earlier transitions take precedence.
    pub fn always(mut self, transition: Transition<R, C, K>) -> Self {
        self.always.push(transition);
        self
    }}
