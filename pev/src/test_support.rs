//! Test-only helpers: a scripted counter domain and hook recorder.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use crate::core::types::{Prediction, PredictionCheck, VerifyResult};
use crate::machine::context::RunInput;
use crate::machine::domain::{DomainState, GuardKey, Transition};
use crate::machine::factory::MachineBuilder;
use crate::registry::{ActionRegistry, VerifyArgs};

/// In-memory domain reconciled by the counter registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub value: i64,
    pub labels: Vec<String>,
}

/// Create a counter with no labels.
pub fn counter(value: i64) -> Counter {
    Counter {
        value,
        labels: Vec::new(),
    }
}

/// Closed action set for the counter domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CounterAction {
    /// Add `by` to the value; predicts the new value.
    Increment { by: i64 },
    /// Add a label; predicts the label is present.
    Label { name: String },
    /// Predicts an increment but changes nothing.
    Stall,
    /// Fails during execute.
    Boom,
    /// Changes nothing and predicts nothing.
    Noop,
}

pub fn increment(by: i64) -> CounterAction {
    CounterAction::Increment { by }
}

pub fn label(name: &str) -> CounterAction {
    CounterAction::Label {
        name: name.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterOutput {
    pub value: i64,
}

/// Services handed to `execute`; records every call.
#[derive(Debug, Default)]
pub struct CounterServices {
    pub calls: RefCell<Vec<String>>,
}

/// Scripted registry for the counter domain.
///
/// `custom_verdict` is returned from `verify` for every action;
/// `verify_error` makes `verify` fail instead.
#[derive(Debug, Clone, Default)]
pub struct CounterRegistry {
    pub custom_verdict: Option<VerifyResult>,
    pub verify_error: Option<String>,
}

impl CounterRegistry {
    pub fn with_verdict(verdict: VerifyResult) -> Self {
        Self {
            custom_verdict: Some(verdict),
            ..Self::default()
        }
    }

    pub fn with_verify_error(message: &str) -> Self {
        Self {
            verify_error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

impl ActionRegistry for CounterRegistry {
    type Domain = Counter;
    type Action = CounterAction;
    type Services = CounterServices;
    type Output = CounterOutput;

    fn kind(&self, action: &CounterAction) -> &'static str {
        match action {
            CounterAction::Increment { .. } => "increment",
            CounterAction::Label { .. } => "label",
            CounterAction::Stall => "stall",
            CounterAction::Boom => "boom",
            CounterAction::Noop => "noop",
        }
    }

    fn predict(&self, action: &CounterAction, domain: &Counter) -> Option<Prediction> {
        match action {
            CounterAction::Increment { by } => Some(Prediction::new(
                format!("value becomes {}", domain.value + by),
                vec![PredictionCheck::eq("value", domain.value + by)],
            )),
            CounterAction::Label { name } => Some(Prediction::new(
                format!("label {name} applied"),
                vec![PredictionCheck::includes("labels", name.as_str())],
            )),
            CounterAction::Stall => Some(Prediction::new(
                "value moves",
                vec![PredictionCheck::eq("value", domain.value + 1)],
            )),
            CounterAction::Boom | CounterAction::Noop => None,
        }
    }

    fn execute(
        &self,
        action: &CounterAction,
        domain: &mut Counter,
        services: &CounterServices,
    ) -> Result<CounterOutput> {
        services.calls.borrow_mut().push(self.kind(action).to_string());
        match action {
            CounterAction::Increment { by } => domain.value += by,
            CounterAction::Label { name } => domain.labels.push(name.clone()),
            CounterAction::Stall | CounterAction::Noop => {}
            CounterAction::Boom => bail!("boom"),
        }
        Ok(CounterOutput {
            value: domain.value,
        })
    }

    fn verify(&self, _args: VerifyArgs<'_, Self>) -> Result<Option<VerifyResult>> {
        if let Some(message) = &self.verify_error {
            return Err(anyhow!("{message}"));
        }
        Ok(self.custom_verdict.clone())
    }
}

/// Guards available to counter routing graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterGuard {
    BelowTarget,
}

impl GuardKey for CounterGuard {
    fn name(&self) -> &'static str {
        match self {
            CounterGuard::BelowTarget => "belowTarget",
        }
    }
}

/// Shared log of hook calls, used as the runner context.
pub type Recorder = Rc<RefCell<Vec<String>>>;

pub fn recorder() -> Recorder {
    Rc::new(RefCell::new(Vec::new()))
}

pub type CounterBuilder = MachineBuilder<CounterRegistry, Recorder, CounterGuard>;

/// Machine with a `planning` state that queues `actions` on every entry.
///
/// Refresh returns the live domain; every hook appends to the recorder.
pub fn planning_machine(registry: CounterRegistry, actions: Vec<CounterAction>) -> CounterBuilder {
    MachineBuilder::new("counter", registry)
        .state(
            DomainState::<CounterRegistry, Recorder, CounterGuard>::new("planning")
                .on_entry(move |ctx| ctx.enqueue("plan", actions.clone()))
                .always(Transition::to_queue()),
        )
        .initial("planning")
        .refresh_context(|log: &Recorder, domain: &Counter| {
            log.borrow_mut().push("refresh".to_string());
            Ok(domain.clone())
        })
        .persist_context(|log: &Recorder, _domain: &Counter| {
            log.borrow_mut().push("persist".to_string());
            Ok(())
        })
        .before_queue(|log: &Recorder, _domain: &Counter, queue: Option<&str>| {
            log.borrow_mut()
                .push(format!("before:{}", queue.unwrap_or("-")));
        })
        .after_queue(|log, _domain, queue, completed, error| {
            log.borrow_mut().push(format!(
                "after:{}:{}:{}",
                queue.unwrap_or("-"),
                completed.len(),
                error.unwrap_or("-")
            ));
        })
}

/// Run input for a counter machine.
pub fn counter_input(
    value: i64,
    log: &Recorder,
    max_cycles: u32,
) -> RunInput<CounterRegistry, Recorder> {
    RunInput::new(
        counter(value),
        CounterServices::default(),
        Rc::clone(log),
        max_cycles,
    )
}

/// Count recorder entries starting with `prefix`.
pub fn count_events(log: &Recorder, prefix: &str) -> usize {
    log.borrow()
        .iter()
        .filter(|event| event.starts_with(prefix))
        .count()
}
