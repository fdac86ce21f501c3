//! Generic predict-execute-verify runner.
//!
//! Drives a [`DomainMachine`] one transition at a time: routing states decide
//! when a queue is built, the runner drains it action by action, and the cycle
//! counter bounds how often control returns to routing.

use std::error::Error;
use std::fmt;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::check::evaluate;
use crate::core::types::{CompletedAction, Evaluation, Prediction, VerifyResult};
use crate::core::verify::{default_verdict, merge_verdicts};
use crate::machine::context::{RunInput, RunnerContext};
use crate::machine::domain::{GuardKey, Target};
use crate::machine::factory::DomainMachine;
use crate::machine::state::{ACTION_FAILURE_STATE, MachineState, TerminalState};
use crate::registry::{ActionRegistry, VerifyArgs};

/// Terminal snapshot of a run.
pub struct RunOutcome<R: ActionRegistry, C> {
    pub state: TerminalState,
    pub context: RunnerContext<R, C>,
}

impl<R: ActionRegistry, C> RunOutcome<R, C> {
    pub fn state_name(&self) -> &str {
        self.state.name()
    }

    pub fn is_done(&self) -> bool {
        self.state == TerminalState::Done
    }

    pub fn domain(&self) -> &R::Domain {
        &self.context.domain
    }

    pub fn error(&self) -> Option<&str> {
        self.context.error()
    }
}

/// Why routing could not reach a runner or terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallReason {
    /// No transition of a non-final state was enabled.
    NoEnabledTransition,
    /// Routing moved between domain states too many times in a row.
    RoutingBudgetExhausted { max_routing_steps: u32 },
}

/// Routing got stuck inside the domain graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledMachineError {
    pub machine: String,
    pub state: String,
    pub reason: StallReason,
}

impl fmt::Display for StalledMachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            StallReason::NoEnabledTransition => write!(
                f,
                "machine '{}' stalled in state '{}': no enabled transition",
                self.machine, self.state
            ),
            StallReason::RoutingBudgetExhausted { max_routing_steps } => write!(
                f,
                "machine '{}' stalled in state '{}': exceeded {} routing steps",
                self.machine, self.state, max_routing_steps
            ),
        }
    }
}

impl Error for StalledMachineError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Execution,
    Verification,
}

impl<R: ActionRegistry, C, K: GuardKey> DomainMachine<R, C, K> {
    /// Run the machine from its initial state until it reaches a terminal state.
    ///
    /// Execution and verification failures are reported through the outcome's
    /// terminal state; `Err` is reserved for invalid input and stalled routing.
    #[instrument(skip_all, fields(machine = %self.id, max_cycles = input.max_cycles))]
    pub fn run(&self, input: RunInput<R, C>) -> Result<RunOutcome<R, C>> {
        let mut ctx = RunnerContext::new(input)
            .with_context(|| format!("start machine '{}'", self.id))?;
        let mut state = MachineState::Domain(self.initial.clone());
        info!(initial = %self.initial, "machine started");

        loop {
            debug!(state = %state, cycle = ctx.cycle_count(), "enter state");
            state = match state {
                MachineState::Domain(name) => self.route(&name, &mut ctx)?,
                MachineState::ExecutingQueue => self.enter_executing_queue(&ctx),
                MachineState::StartingQueue => {
                    self.start_before_queue(&ctx);
                    MachineState::Dequeuing
                }
                MachineState::Dequeuing => self.dequeue(&mut ctx)?,
                MachineState::Executing => self.execute_current(&mut ctx)?,
                MachineState::Verifying => self.verify_current(&mut ctx)?,
                MachineState::QueueComplete => self.enter_queue_complete(&mut ctx),
                MachineState::Persisting => {
                    self.persist_best_effort(&ctx, "after queue");
                    MachineState::Routable
                }
                MachineState::Routable => {
                    if ctx.max_cycles_reached() {
                        info!(cycle = ctx.cycle_count(), "max cycles reached");
                        MachineState::Final(TerminalState::Done)
                    } else {
                        MachineState::Domain(self.reentry.clone())
                    }
                }
                MachineState::Final(terminal) => {
                    info!(
                        terminal = %terminal,
                        cycles = ctx.cycle_count(),
                        completed = ctx.completed_actions().len(),
                        error = ctx.error().unwrap_or(""),
                        "machine finished"
                    );
                    return Ok(RunOutcome {
                        state: terminal,
                        context: ctx,
                    });
                }
            };
        }
    }

    /// Follow domain transitions until control leaves the routing graph.
    fn route(&self, name: &str, ctx: &mut RunnerContext<R, C>) -> Result<MachineState> {
        let mut current = name.to_string();
        let mut steps = 0u32;
        loop {
            let state = self
                .states
                .get(&current)
                .ok_or_else(|| anyhow!("machine '{}' has no state '{}'", self.id, current))?;
            for effect in &state.entry {
                effect(ctx);
            }
            if state.is_final {
                return Ok(MachineState::Final(TerminalState::Domain(current)));
            }

            let transition = state
                .always
                .iter()
                .find(|transition| self.guard_allows(transition.guard, ctx))
                .ok_or_else(|| StalledMachineError {
                    machine: self.id.clone(),
                    state: current.clone(),
                    reason: StallReason::NoEnabledTransition,
                })?;
            debug!(
                from = %current,
                to = ?transition.target,
                guard = transition.guard.map(|guard| guard.name()).unwrap_or("always"),
                "domain transition"
            );
            for effect in &transition.effects {
                effect(ctx);
            }

            match &transition.target {
                Target::State(next) => {
                    steps += 1;
                    if steps > self.max_routing_steps {
                        return Err(StalledMachineError {
                            machine: self.id.clone(),
                            state: next.clone(),
                            reason: StallReason::RoutingBudgetExhausted {
                                max_routing_steps: self.max_routing_steps,
                            },
                        }
                        .into());
                    }
                    current = next.clone();
                }
                Target::ExecutingQueue => return Ok(MachineState::ExecutingQueue),
                Target::Done => return Ok(MachineState::Final(TerminalState::Done)),
            }
        }
    }

    /// A queue was built. Entering with no cycles left ends the run.
    fn enter_executing_queue(&self, ctx: &RunnerContext<R, C>) -> MachineState {
        if ctx.max_cycles_reached() {
            warn!(
                cycle = ctx.cycle_count(),
                queue = ctx.queue_label().unwrap_or(""),
                "queue built after max cycles reached; stopping"
            );
            return MachineState::Final(TerminalState::Done);
        }
        info!(
            queue = ctx.queue_label().unwrap_or(""),
            actions = ctx.queue_len(),
            cycle = ctx.cycle_count() + 1,
            "queue built"
        );
        if self.hooks.before_queue.is_some() {
            MachineState::StartingQueue
        } else {
            MachineState::Dequeuing
        }
    }

    fn start_before_queue(&self, ctx: &RunnerContext<R, C>) {
        if let Some(before_queue) = &self.hooks.before_queue {
            before_queue(&ctx.runner_ctx, &ctx.domain, ctx.queue_label());
        }
        self.persist_best_effort(ctx, "before queue");
    }

    fn dequeue(&self, ctx: &mut RunnerContext<R, C>) -> Result<MachineState> {
        let registry = &self.registry;
        let dequeued = ctx
            .queue
            .dequeue(&ctx.domain, |action, domain| registry.predict(action, domain))?;
        let Some(in_flight) = dequeued else {
            return Ok(MachineState::QueueComplete);
        };
        let kind = registry.kind(&in_flight.action);
        let checks = in_flight.prediction.as_ref().map_or(0, |p| p.checks.len());
        debug!(
            action = kind,
            checks,
            remaining = ctx.queue.len(),
            "action dequeued"
        );
        Ok(MachineState::Executing)
    }

    fn execute_current(&self, ctx: &mut RunnerContext<R, C>) -> Result<MachineState> {
        let in_flight = ctx
            .queue
            .in_flight()
            .ok_or_else(|| anyhow!("executing without an action in flight"))?;
        let kind = self.registry.kind(&in_flight.action);
        match self
            .registry
            .execute(&in_flight.action, &mut ctx.domain, &ctx.services)
        {
            Ok(output) => {
                info!(action = kind, "action executed");
                ctx.execute_result = Some(output);
                Ok(MachineState::Verifying)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(action = kind, error = %message, "action execution failed");
                Ok(self.fail(ctx, FailureKind::Execution, message, None))
            }
        }
    }

    fn verify_current(&self, ctx: &mut RunnerContext<R, C>) -> Result<MachineState> {
        let (refreshed, verdict) = {
            let in_flight = ctx
                .queue
                .in_flight()
                .ok_or_else(|| anyhow!("verifying without an action in flight"))?;
            let kind = self.registry.kind(&in_flight.action);
            let execute_result = ctx
                .execute_result
                .as_ref()
                .ok_or_else(|| anyhow!("verifying {kind} without an execute result"))?;

            let refreshed = match (self.hooks.refresh_context)(&ctx.runner_ctx, &ctx.domain) {
                Ok(refreshed) => refreshed,
                Err(err) => {
                    let message = format!("refresh context after {kind}: {err:#}");
                    warn!(action = kind, error = %message, "context refresh failed");
                    let verdict = VerifyResult::failed(message.clone(), Vec::new());
                    return Ok(self.fail(ctx, FailureKind::Verification, message, Some(verdict)));
                }
            };

            let old_value = serde_json::to_value(&in_flight.snapshot)
                .context("serialize pre-action snapshot")?;
            let new_value =
                serde_json::to_value(&refreshed).context("serialize refreshed domain")?;
            let prediction = in_flight.prediction.as_ref();
            let checks = prediction.map_or(&[][..], |p| p.checks.as_slice());
            let evaluation = evaluate(checks, &old_value, &new_value);

            let custom = self.registry.verify(VerifyArgs {
                action: &in_flight.action,
                old_ctx: &in_flight.snapshot,
                new_ctx: &refreshed,
                old_value: &old_value,
                new_value: &new_value,
                prediction,
                prediction_eval: &evaluation,
                prediction_diffs: &evaluation.diffs,
                execute_result,
            });
            let verdict = match custom {
                Ok(custom) => merge_verdicts(prediction, &evaluation, custom),
                Err(err) => verify_error_verdict(prediction, &evaluation, kind, &err),
            };
            debug!(
                action = kind,
                pass = verdict.pass,
                diffs = verdict.diffs.len(),
                "verification evaluated"
            );
            (refreshed, verdict)
        };

        if !verdict.pass {
            warn!(error = %verdict.message, diffs = verdict.diffs.len(), "verification failed");
            let message = verdict.message.clone();
            return Ok(self.fail(ctx, FailureKind::Verification, message, Some(verdict)));
        }

        let finished = ctx
            .queue
            .finish()
            .ok_or_else(|| anyhow!("verified action vanished from the queue"))?;
        let result = ctx
            .execute_result
            .take()
            .ok_or_else(|| anyhow!("verified action has no execute result"))?;
        info!(
            action = self.registry.kind(&finished.action),
            message = %verdict.message,
            "action verified"
        );
        ctx.completed_actions.push(CompletedAction {
            action: finished.action,
            result,
            verified: verdict.pass,
        });
        ctx.verify_result = None;
        ctx.domain = refreshed;
        Ok(MachineState::Dequeuing)
    }

    /// Record a failure and pick the failure target.
    fn fail(
        &self,
        ctx: &mut RunnerContext<R, C>,
        kind: FailureKind,
        message: String,
        verdict: Option<VerifyResult>,
    ) -> MachineState {
        ctx.failed_action = ctx.queue.finish().map(|in_flight| in_flight.action);
        ctx.error = Some(message);
        ctx.failure_verdict = verdict.clone();
        ctx.verify_result = verdict;
        if kind == FailureKind::Execution {
            ctx.execute_result = None;
        }

        if self.has_action_failure {
            // The failed drain still consumes its cycle.
            let cycle = ctx.queue.complete_cycle();
            let dropped = ctx.queue.clear();
            debug!(cycle, dropped, "routing failure to actionFailure");
            return MachineState::Domain(ACTION_FAILURE_STATE.to_string());
        }
        match kind {
            FailureKind::Execution => MachineState::Final(TerminalState::ExecutionFailed),
            FailureKind::Verification => MachineState::Final(TerminalState::VerificationFailed),
        }
    }

    fn enter_queue_complete(&self, ctx: &mut RunnerContext<R, C>) -> MachineState {
        let cycle = ctx.queue.complete_cycle();
        info!(
            queue = ctx.queue_label().unwrap_or(""),
            cycle,
            max_cycles = ctx.max_cycles(),
            completed = ctx.completed_actions().len(),
            "queue complete"
        );
        if let Some(after_queue) = &self.hooks.after_queue {
            after_queue(
                &ctx.runner_ctx,
                &ctx.domain,
                ctx.queue_label(),
                ctx.completed_actions(),
                ctx.error(),
            );
        }
        MachineState::Persisting
    }

    fn persist_best_effort(&self, ctx: &RunnerContext<R, C>, phase: &str) {
        let Some(persist) = &self.hooks.persist_context else {
            return;
        };
        match persist(&ctx.runner_ctx, &ctx.domain) {
            Ok(()) => debug!(phase, "context persisted"),
            Err(err) => warn!(
                phase,
                error = %format!("{err:#}"),
                "persist context failed; continuing"
            ),
        }
    }
}

fn verify_error_verdict(
    prediction: Option<&Prediction>,
    evaluation: &Evaluation,
    kind: &str,
    err: &anyhow::Error,
) -> VerifyResult {
    let base = default_verdict(prediction, evaluation);
    VerifyResult::failed(format!("verify {kind}: {err:#}"), base.diffs)
}
