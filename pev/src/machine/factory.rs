//! Composition of a routing graph with the shared runner states.

use std::collections::HashMap;

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::invariants::{MachineOutline, StateOutline, TargetOutline, validate_machine};
use crate::io::config::EngineConfig;
use crate::machine::context::{Completed, RunnerContext};
use crate::machine::domain::{BuiltinGuard, DomainState, Guard, GuardFn, GuardKey, Target};
use crate::machine::state::ACTION_FAILURE_STATE;
use crate::registry::ActionRegistry;

type Domain<R> = <R as ActionRegistry>::Domain;

/// Required hook: authoritative post-action domain.
pub type RefreshFn<R, C> = Box<dyn Fn(&C, &Domain<R>) -> Result<Domain<R>>>;
/// Optional best-effort persistence hook.
pub type PersistFn<R, C> = Box<dyn Fn(&C, &Domain<R>) -> Result<()>>;
/// Optional hook run once per queue build.
pub type BeforeQueueFn<R, C> = Box<dyn Fn(&C, &Domain<R>, Option<&str>)>;
/// Optional hook run on every queue completion.
pub type AfterQueueFn<R, C> =
    Box<dyn Fn(&C, &Domain<R>, Option<&str>, &[Completed<R>], Option<&str>)>;

/// Caller-side hooks wired into the runner states.
pub(crate) struct Hooks<R: ActionRegistry, C> {
    pub(crate) refresh_context: RefreshFn<R, C>,
    pub(crate) persist_context: Option<PersistFn<R, C>>,
    pub(crate) before_queue: Option<BeforeQueueFn<R, C>>,
    pub(crate) after_queue: Option<AfterQueueFn<R, C>>,
}

/// Executable machine: routing graph + registry + runner states.
pub struct DomainMachine<R: ActionRegistry, C, K: GuardKey> {
    pub(crate) id: String,
    pub(crate) registry: R,
    pub(crate) guards: HashMap<K, GuardFn<R, C>>,
    pub(crate) states: HashMap<String, DomainState<R, C, K>>,
    pub(crate) initial: String,
    pub(crate) reentry: String,
    pub(crate) hooks: Hooks<R, C>,
    pub(crate) has_action_failure: bool,
    pub(crate) max_routing_steps: u32,
}

impl<R: ActionRegistry, C, K: GuardKey> DomainMachine<R, C, K> {
    pub fn builder(id: &str, registry: R) -> MachineBuilder<R, C, K> {
        MachineBuilder::new(id, registry)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Whether failures route to the domain's `actionFailure` state.
    pub fn has_action_failure(&self) -> bool {
        self.has_action_failure
    }

    pub(crate) fn guard_allows(&self, guard: Option<Guard<K>>, ctx: &RunnerContext<R, C>) -> bool {
        match guard {
            None => true,
            Some(Guard::Builtin(BuiltinGuard::QueueEmpty)) => ctx.queue_empty(),
            Some(Guard::Builtin(BuiltinGuard::MaxCyclesReached)) => ctx.max_cycles_reached(),
            Some(Guard::Domain(key)) => self.guards.get(&key).is_some_and(|guard| guard(ctx)),
        }
    }
}

/// Builder for [`DomainMachine`]; `build` validates the whole definition.
pub struct MachineBuilder<R: ActionRegistry, C, K: GuardKey> {
    id: String,
    registry: R,
    guards: Vec<(K, GuardFn<R, C>)>,
    states: Vec<DomainState<R, C, K>>,
    initial: Option<String>,
    reentry: Option<String>,
    refresh_context: Option<RefreshFn<R, C>>,
    persist_context: Option<PersistFn<R, C>>,
    before_queue: Option<BeforeQueueFn<R, C>>,
    after_queue: Option<AfterQueueFn<R, C>>,
    max_routing_steps: u32,
}

impl<R: ActionRegistry, C, K: GuardKey> MachineBuilder<R, C, K> {
    pub fn new(id: &str, registry: R) -> Self {
        Self {
            id: id.to_string(),
            registry,
            guards: Vec::new(),
            states: Vec::new(),
            initial: None,
            reentry: None,
            refresh_context: None,
            persist_context: None,
            before_queue: None,
            after_queue: None,
            max_routing_steps: EngineConfig::default().max_routing_steps,
        }
    }

    /// Apply engine-wide settings.
    pub fn config(mut self, cfg: &EngineConfig) -> Self {
        self.max_routing_steps = cfg.max_routing_steps;
        self
    }

    pub fn guard<F>(mut self, key: K, guard: F) -> Self
    where
        F: Fn(&RunnerContext<R, C>) -> bool + 'static,
    {
        self.guards.push((key, Box::new(guard)));
        self
    }

    pub fn state(mut self, state: DomainState<R, C, K>) -> Self {
        self.states.push(state);
        self
    }

    /// State the machine enters first.
    pub fn initial(mut self, state: &str) -> Self {
        self.initial = Some(state.to_string());
        self
    }

    /// State entered after a drained queue when cycles remain.
    /// Defaults to the initial state.
    pub fn reentry(mut self, state: &str) -> Self {
        self.reentry = Some(state.to_string());
        self
    }

    pub fn refresh_context<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &R::Domain) -> Result<R::Domain> + 'static,
    {
        self.refresh_context = Some(Box::new(hook));
        self
    }

    pub fn persist_context<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &R::Domain) -> Result<()> + 'static,
    {
        self.persist_context = Some(Box::new(hook));
        self
    }

    pub fn before_queue<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &R::Domain, Option<&str>) + 'static,
    {
        self.before_queue = Some(Box::new(hook));
        self
    }

    pub fn after_queue<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &R::Domain, Option<&str>, &[Completed<R>], Option<&str>) + 'static,
    {
        self.after_queue = Some(Box::new(hook));
        self
    }

    /// Validate the definition and assemble the machine.
    pub fn build(self) -> Result<DomainMachine<R, C, K>> {
        let errors = validate_machine(&self.outline());
        if !errors.is_empty() {
            bail!(
                "invalid machine definition '{}':\n- {}",
                self.id,
                errors.join("\n- ")
            );
        }
        let Some(refresh_context) = self.refresh_context else {
            bail!("refresh_context hook is required");
        };
        let Some(initial) = self.initial else {
            bail!("initial state is not set");
        };
        let reentry = self.reentry.unwrap_or_else(|| initial.clone());
        let has_action_failure = self
            .states
            .iter()
            .any(|state| state.name == ACTION_FAILURE_STATE);

        debug!(
            machine = %self.id,
            states = self.states.len(),
            guards = self.guards.len(),
            has_action_failure,
            "machine built"
        );

        Ok(DomainMachine {
            id: self.id,
            registry: self.registry,
            guards: self.guards.into_iter().collect(),
            states: self
                .states
                .into_iter()
                .map(|state| (state.name.clone(), state))
                .collect(),
            initial,
            reentry,
            hooks: Hooks {
                refresh_context,
                persist_context: self.persist_context,
                before_queue: self.before_queue,
                after_queue: self.after_queue,
            },
            has_action_failure,
            max_routing_steps: self.max_routing_steps,
        })
    }

    fn outline(&self) -> MachineOutline<'_> {
        let states = self
            .states
            .iter()
            .map(|state| StateOutline {
                name: state.name.as_str(),
                is_final: state.is_final,
                targets: state
                    .always
                    .iter()
                    .map(|transition| match &transition.target {
                        Target::State(name) => TargetOutline::State(name.as_str()),
                        Target::ExecutingQueue => TargetOutline::ExecutingQueue,
                        Target::Done => TargetOutline::Done,
                    })
                    .collect(),
                guards: state
                    .always
                    .iter()
                    .filter_map(|transition| match transition.guard {
                        Some(Guard::Domain(key)) => Some(key.name()),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();

        MachineOutline {
            id: self.id.as_str(),
            initial: self.initial.as_deref(),
            reentry: self.reentry.as_deref(),
            states,
            registered_guards: self.guards.iter().map(|(key, _)| key.name()).collect(),
            has_refresh_context: self.refresh_context.is_some(),
        }
    }
}
