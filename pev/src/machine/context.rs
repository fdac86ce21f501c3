//! Per-invocation context shared by domain states and runner states.

use anyhow::Result;

use crate::core::queue::ActionQueue;
use crate::core::types::{CompletedAction, Prediction, VerifyResult};
use crate::io::config::EngineConfig;
use crate::registry::ActionRegistry;

/// Completed-action record for a registry.
pub type Completed<R> =
    CompletedAction<<R as ActionRegistry>::Action, <R as ActionRegistry>::Output>;

/// Caller-supplied invocation input.
pub struct RunInput<R: ActionRegistry, C> {
    pub domain: R::Domain,
    pub services: R::Services,
    pub runner_ctx: C,
    pub max_cycles: u32,
}

impl<R: ActionRegistry, C> RunInput<R, C> {
    pub fn new(domain: R::Domain, services: R::Services, runner_ctx: C, max_cycles: u32) -> Self {
        Self {
            domain,
            services,
            runner_ctx,
            max_cycles,
        }
    }

    /// Input whose cycle ceiling comes from `cfg.max_cycles`.
    pub fn with_config(
        domain: R::Domain,
        services: R::Services,
        runner_ctx: C,
        cfg: &EngineConfig,
    ) -> Self {
        Self::new(domain, services, runner_ctx, cfg.max_cycles)
    }
}

/// Mutable state owned by one machine run.
///
/// Domain states read it through guards and change it through entry and
/// transition effects; the runner owns the queue and per-action fields.
pub struct RunnerContext<R: ActionRegistry, C> {
    /// State being reconciled.
    pub domain: R::Domain,
    /// Read-only dependencies for `execute`.
    pub services: R::Services,
    /// Caller context handed to every hook (repository, issue number, ...).
    pub runner_ctx: C,
    pub(crate) queue: ActionQueue<R::Action, R::Domain>,
    pub(crate) execute_result: Option<R::Output>,
    pub(crate) verify_result: Option<VerifyResult>,
    pub(crate) completed_actions: Vec<Completed<R>>,
    pub(crate) error: Option<String>,
    pub(crate) failed_action: Option<R::Action>,
    pub(crate) failure_verdict: Option<VerifyResult>,
}

impl<R: ActionRegistry, C> RunnerContext<R, C> {
    pub fn new(input: RunInput<R, C>) -> Result<Self> {
        Ok(Self {
            domain: input.domain,
            services: input.services,
            runner_ctx: input.runner_ctx,
            queue: ActionQueue::new(input.max_cycles)?,
            execute_result: None,
            verify_result: None,
            completed_actions: Vec::new(),
            error: None,
            failed_action: None,
            failure_verdict: None,
        })
    }

    /// Building step: replace the pending queue with `actions`.
    pub fn enqueue<I>(&mut self, label: impl Into<String>, actions: I)
    where
        I: IntoIterator<Item = R::Action>,
    {
        self.queue.build(Some(label.into()), actions);
    }

    /// Append a single action to the pending queue.
    pub fn push_action(&mut self, action: R::Action) {
        self.queue.push(action);
    }

    pub fn action_queue(&self) -> impl Iterator<Item = &R::Action> {
        self.queue.pending()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_label(&self) -> Option<&str> {
        self.queue.label()
    }

    pub fn current_action(&self) -> Option<&R::Action> {
        self.queue.in_flight().map(|in_flight| &in_flight.action)
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.queue
            .in_flight()
            .and_then(|in_flight| in_flight.prediction.as_ref())
    }

    pub fn pre_action_snapshot(&self) -> Option<&R::Domain> {
        self.queue.in_flight().map(|in_flight| &in_flight.snapshot)
    }

    pub fn execute_result(&self) -> Option<&R::Output> {
        self.execute_result.as_ref()
    }

    pub fn verify_result(&self) -> Option<&VerifyResult> {
        self.verify_result.as_ref()
    }

    pub fn completed_actions(&self) -> &[Completed<R>] {
        &self.completed_actions
    }

    pub fn cycle_count(&self) -> u32 {
        self.queue.cycle_count()
    }

    pub fn max_cycles(&self) -> u32 {
        self.queue.max_cycles()
    }

    pub fn max_cycles_reached(&self) -> bool {
        self.queue.max_cycles_reached()
    }

    /// Message of the most recent execution or verification failure.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Action whose execution or verification failed most recently.
    pub fn failed_action(&self) -> Option<&R::Action> {
        self.failed_action.as_ref()
    }

    /// Verdict of the most recent failure, with its diffs.
    ///
    /// Recorded together with `error` and `failed_action` and kept when a
    /// later action passes; `None` when that failure happened in `execute`.
    /// `verify_result` only describes the action currently being verified.
    pub fn failure_verdict(&self) -> Option<&VerifyResult> {
        self.failure_verdict.as_ref()
    }
}
