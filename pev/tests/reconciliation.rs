//! Machine-level tests for full predict-execute-verify runs.
//!
//! These tests drive `DomainMachine::run` over the scripted counter domain to
//! verify end-to-end behavior: queue draining, cycle accounting, verdict
//! merging, failure routing, hook timing and stalled routing.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use pev::core::types::{Prediction, PredictionCheck, VerifyResult};
use pev::io::config::{EngineConfig, load_config};
use pev::io::run_report::{RunReport, write_run_report, write_run_report_for};
use pev::machine::{
    BuiltinGuard, DomainMachine, DomainState, GuardKey, MachineBuilder, NoGuards, RunInput,
    RunnerContext, StallReason, StalledMachineError, TerminalState, Transition,
};
use pev::registry::{ActionRegistry, VerifyArgs};
use pev::test_support::{
    Counter, CounterAction, CounterGuard, CounterOutput, CounterRegistry, CounterServices,
    Recorder, count_events, counter_input, increment, label, planning_machine, recorder,
};

type CounterState = DomainState<CounterRegistry, Recorder, CounterGuard>;
type CounterContext = RunnerContext<CounterRegistry, Recorder>;

fn events(log: &Recorder) -> Vec<String> {
    log.borrow().clone()
}

/// Planning queues `first`, then a single increment once an error is recorded.
fn retrying_planning(first: CounterAction) -> CounterState {
    DomainState::new("planning")
        .on_entry(move |ctx: &mut CounterContext| {
            if ctx.error().is_some() {
                ctx.enqueue("retry", vec![increment(1)]);
            } else {
                ctx.enqueue("plan", vec![first.clone()]);
            }
        })
        .always(Transition::to_queue())
}

#[test]
fn single_increment_reaches_done() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), vec![increment(1)])
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::Done);
    assert_eq!(outcome.domain().value, 1);
    assert_eq!(outcome.context.cycle_count(), 1);
    let completed = outcome.context.completed_actions();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].action, increment(1));
    assert_eq!(completed[0].result, CounterOutput { value: 1 });
    assert!(completed[0].verified);
    assert!(outcome.error().is_none());
    assert_eq!(
        events(&log),
        vec!["before:plan", "persist", "refresh", "after:plan:1:-", "persist"]
    );
}

#[test]
fn execute_error_ends_in_execution_failed() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), vec![CounterAction::Boom])
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state_name(), "executionFailed");
    assert!(outcome.state.is_failure());
    assert_eq!(outcome.error(), Some("boom"));
    assert_eq!(
        outcome.context.failed_action(),
        Some(&CounterAction::Boom)
    );
    assert!(outcome.context.completed_actions().is_empty());
    assert_eq!(outcome.context.cycle_count(), 0);
    assert_eq!(count_events(&log, "after:"), 0);
    assert_eq!(count_events(&log, "refresh"), 0);
}

#[test]
fn queue_is_rebuilt_each_cycle_until_max_cycles() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::default(),
        vec![increment(1), increment(1), increment(1)],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 2)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.context.completed_actions().len(), 6);
    assert_eq!(outcome.context.cycle_count(), 2);
    assert_eq!(outcome.domain().value, 6);
    assert_eq!(count_events(&log, "before:"), 2);
    assert_eq!(count_events(&log, "after:plan:"), 2);
    assert_eq!(events(&log).last().map(String::as_str), Some("persist"));
}

#[test]
fn before_queue_runs_once_per_build_even_when_empty() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), Vec::new())
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(count_events(&log, "before:plan"), 1);
    assert_eq!(count_events(&log, "after:plan:0:-"), 1);
    assert_eq!(outcome.context.cycle_count(), 1);
}

#[test]
fn verdict_without_pass_is_a_failure() {
    let verdict: VerifyResult =
        serde_json::from_value(json!({"message": "looks fine", "diffs": []})).expect("verdict");
    let log = recorder();
    let machine = planning_machine(CounterRegistry::with_verdict(verdict), vec![increment(1)])
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::VerificationFailed);
    assert_eq!(outcome.error(), Some("looks fine"));
    let recorded = outcome.context.verify_result().expect("verify result");
    assert!(!recorded.pass);
    assert!(outcome.context.completed_actions().is_empty());
    assert_eq!(outcome.context.failed_action(), Some(&increment(1)));
}

#[test]
fn custom_pass_cannot_override_failed_prediction() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::with_verdict(VerifyResult::passed("api says ok")),
        vec![CounterAction::Stall],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::VerificationFailed);
    let recorded = outcome.context.verify_result().expect("verify result");
    assert!(!recorded.pass);
    assert_eq!(recorded.diffs.len(), 1);
    assert_eq!(recorded.diffs[0].field, "value");
    assert_eq!(recorded.diffs[0].expected, Some(json!(1)));
    assert_eq!(recorded.diffs[0].actual, Some(json!(0)));
    assert_eq!(
        outcome.error(),
        Some("1 prediction check(s) failed: value eq")
    );
}

#[test]
fn both_failures_are_reported_together() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::with_verdict(VerifyResult::failed("api disagrees", Vec::new())),
        vec![CounterAction::Stall],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(
        outcome.error(),
        Some("api disagrees; 1 prediction check(s) failed: value eq")
    );
}

#[test]
fn action_without_prediction_or_verify_passes() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::default(),
        vec![CounterAction::Noop, label("triaged")],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(3, &log, 1)).expect("run");

    assert!(outcome.is_done());
    let completed = outcome.context.completed_actions();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|entry| entry.verified));
    assert_eq!(outcome.domain().labels, vec!["triaged".to_string()]);
}

#[test]
fn verify_error_is_a_verification_failure() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::with_verify_error("api down"),
        vec![increment(1)],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::VerificationFailed);
    assert_eq!(outcome.error(), Some("verify increment: api down"));
}

#[test]
fn refresh_error_is_a_verification_failure() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), vec![increment(1)])
        .refresh_context(|_log: &Recorder, _domain: &Counter| Err(anyhow!("issue gone")))
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::VerificationFailed);
    assert_eq!(
        outcome.error(),
        Some("refresh context after increment: issue gone")
    );
    assert!(outcome.context.execute_result().is_some());
}

#[test]
fn failure_mid_queue_leaves_remaining_actions_pending() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::default(),
        vec![increment(1), CounterAction::Stall, increment(1)],
    )
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(outcome.state, TerminalState::VerificationFailed);
    assert_eq!(outcome.context.completed_actions().len(), 1);
    assert_eq!(
        outcome.context.failed_action(),
        Some(&CounterAction::Stall)
    );
    assert_eq!(outcome.context.queue_len(), 1);
    assert!(outcome.context.current_action().is_none());
}

#[test]
fn persist_failure_does_not_stop_the_run() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), vec![increment(2)])
        .persist_context(|_log: &Recorder, _domain: &Counter| Err(anyhow!("disk full")))
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.domain().value, 2);
}

#[test]
fn terminal_action_failure_state_receives_failures() {
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::default(),
        vec![increment(1), CounterAction::Boom, increment(1)],
    )
    .state(DomainState::terminal("actionFailure"))
    .build()
    .expect("build");
    assert!(machine.has_action_failure());

    let outcome = machine.run(counter_input(0, &log, 3)).expect("run");

    assert_eq!(outcome.state_name(), "actionFailure");
    assert!(outcome.state.is_failure());
    assert_eq!(outcome.error(), Some("boom"));
    assert_eq!(outcome.context.completed_actions().len(), 1);
    assert_eq!(outcome.context.queue_len(), 0);
    assert_eq!(outcome.context.cycle_count(), 1);
}

#[test]
fn action_failure_can_route_back_into_a_retry() {
    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .state(retrying_planning(CounterAction::Boom))
        .state(DomainState::new("actionFailure").always(Transition::to("planning")))
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .after_queue(|log: &Recorder, _domain, queue, completed, error| {
            log.borrow_mut().push(format!(
                "after:{}:{}:{}",
                queue.unwrap_or("-"),
                completed.len(),
                error.unwrap_or("-")
            ));
        })
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 2)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.domain().value, 1);
    assert_eq!(outcome.context.cycle_count(), 2);
    assert_eq!(outcome.error(), Some("boom"));
    assert_eq!(events(&log), vec!["after:retry:1:boom"]);
}

#[test]
fn failure_record_survives_a_successful_retry() {
    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .state(retrying_planning(CounterAction::Stall))
        .state(DomainState::new("actionFailure").always(Transition::to("planning")))
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 2)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.domain().value, 1);
    assert_eq!(
        outcome.error(),
        Some("1 prediction check(s) failed: value eq")
    );
    assert_eq!(outcome.context.failed_action(), Some(&CounterAction::Stall));
    assert!(outcome.context.verify_result().is_none());
    let verdict = outcome.context.failure_verdict().expect("failure verdict");
    assert!(!verdict.pass);
    assert_eq!(verdict.message, "1 prediction check(s) failed: value eq");
    assert_eq!(verdict.diffs.len(), 1);
    assert_eq!(verdict.diffs[0].field, "value");
    assert_eq!(verdict.diffs[0].actual, Some(json!(0)));

    let report = RunReport::from_outcome(&machine, &outcome).expect("report");
    assert!(report.verify_result.is_none());
    assert_eq!(
        report.failure_verdict.map(|verdict| verdict.diffs.len()),
        Some(1)
    );
}

#[test]
fn execution_failure_replaces_an_earlier_failure_verdict() {
    let log = recorder();
    let machine = MachineBuilder::<CounterRegistry, Recorder, CounterGuard>::new("counter", CounterRegistry::default())
        .state(
            DomainState::new("planning")
                .on_entry(|ctx: &mut CounterContext| {
                    if ctx.error().is_some() {
                        ctx.enqueue("retry", vec![CounterAction::Boom]);
                    } else {
                        ctx.enqueue("plan", vec![CounterAction::Stall]);
                    }
                })
                .always(Transition::to_queue()),
        )
        .state(DomainState::new("actionFailure").always(Transition::to("planning")))
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 3)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.error(), Some("boom"));
    assert_eq!(outcome.context.failed_action(), Some(&CounterAction::Boom));
    assert!(outcome.context.failure_verdict().is_none());
}

#[test]
fn queue_built_after_last_cycle_ends_the_run() {
    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .state(retrying_planning(CounterAction::Boom))
        .state(DomainState::new("actionFailure").always(Transition::to("planning")))
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .before_queue(|log: &Recorder, _domain: &Counter, queue: Option<&str>| {
            log.borrow_mut().push(format!("before:{}", queue.unwrap_or("-")));
        })
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.context.cycle_count(), 1);
    assert!(outcome.context.completed_actions().is_empty());
    assert_eq!(events(&log), vec!["before:plan"]);
}

#[test]
fn zero_max_cycles_is_rejected() {
    let log = recorder();
    let machine = planning_machine(CounterRegistry::default(), vec![increment(1)])
        .build()
        .expect("build");

    let err = machine.run(counter_input(0, &log, 0)).err().expect("error");
    assert!(format!("{err:#}").contains("max_cycles must be > 0"));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ShadowGuard {
    QueueEmpty,
}

impl GuardKey for ShadowGuard {
    fn name(&self) -> &'static str {
        "queueEmpty"
    }
}

#[test]
fn reserved_guard_name_is_rejected_at_build() {
    let err = MachineBuilder::<CounterRegistry, Recorder, ShadowGuard>::new(
        "counter",
        CounterRegistry::default(),
    )
    .guard(ShadowGuard::QueueEmpty, |_ctx| true)
    .state(DomainState::new("planning").always(Transition::to_queue()))
    .initial("planning")
    .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
    .build()
    .err()
    .expect("reserved guard");

    let message = err.to_string();
    assert!(message.starts_with("invalid machine definition 'counter'"));
    assert!(message.contains("guard 'queueEmpty' collides with a reserved engine guard"));
}

#[test]
fn invalid_definitions_report_every_violation() {
    let err = MachineBuilder::<CounterRegistry, Recorder, CounterGuard>::new(
        "counter",
        CounterRegistry::default(),
    )
    .state(
        DomainState::new("planning")
            .always(Transition::to("waiting").when(CounterGuard::BelowTarget)),
    )
    .state(DomainState::new("done").always(Transition::to_done()))
    .initial("planning")
    .build()
    .err()
    .expect("invalid definition");

    let message = err.to_string();
    assert!(message.contains("refresh_context hook is required"));
    assert!(message.contains("undefined state 'waiting'"));
    assert!(message.contains("guard 'belowTarget' is not registered"));
    assert!(message.contains("state 'done' collides with a reserved runner state"));
    assert!(message.contains("no transition enters executingQueue"));
}

#[test]
fn no_enabled_transition_stalls_the_machine() {
    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .guard(CounterGuard::BelowTarget, |ctx: &CounterContext| {
            ctx.domain.value < 0
        })
        .state(DomainState::new("planning").always(Transition::to("waiting")))
        .state(
            DomainState::new("waiting")
                .always(Transition::to_queue().when(CounterGuard::BelowTarget)),
        )
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");

    let err = machine.run(counter_input(0, &log, 1)).err().expect("stall");
    let stalled = err
        .downcast_ref::<StalledMachineError>()
        .expect("stalled machine error");
    assert_eq!(stalled.state, "waiting");
    assert_eq!(stalled.reason, StallReason::NoEnabledTransition);
}

#[test]
fn routing_loops_exhaust_the_step_budget() {
    let log = recorder();
    let cfg = EngineConfig {
        max_routing_steps: 10,
        ..EngineConfig::default()
    };
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .config(&cfg)
        .guard(CounterGuard::BelowTarget, |ctx: &CounterContext| {
            ctx.domain.value < 0
        })
        .state(
            DomainState::new("ping")
                .always(Transition::to_queue().when(CounterGuard::BelowTarget))
                .always(Transition::to("pong")),
        )
        .state(DomainState::new("pong").always(Transition::to("ping")))
        .initial("ping")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");

    let err = machine.run(counter_input(0, &log, 1)).err().expect("stall");
    let stalled = err
        .downcast_ref::<StalledMachineError>()
        .expect("stalled machine error");
    assert_eq!(
        stalled.reason,
        StallReason::RoutingBudgetExhausted {
            max_routing_steps: 10
        }
    );
}

#[test]
fn guards_and_effects_drive_routing() {
    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .guard(CounterGuard::BelowTarget, |ctx: &CounterContext| {
            ctx.domain.value < 3
        })
        .state(
            DomainState::new("routing")
                .always(
                    Transition::to_queue()
                        .when(CounterGuard::BelowTarget)
                        .effect(|ctx: &mut CounterContext| {
                            ctx.enqueue("catch-up", vec![increment(1)]);
                        }),
                )
                .always(Transition::to("settled")),
        )
        .state(DomainState::terminal("settled"))
        .initial("routing")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");

    let outcome = machine.run(counter_input(0, &log, 5)).expect("run");

    assert_eq!(outcome.state, TerminalState::Domain("settled".to_string()));
    assert!(!outcome.state.is_failure());
    assert_eq!(outcome.domain().value, 3);
    assert_eq!(outcome.context.cycle_count(), 3);
}

/// Registry that records the JSON views handed to `verify`.
#[derive(Default)]
struct SnapshotRegistry {
    seen: RefCell<Vec<(Value, Value)>>,
}

impl ActionRegistry for SnapshotRegistry {
    type Domain = Counter;
    type Action = CounterAction;
    type Services = CounterServices;
    type Output = CounterOutput;

    fn kind(&self, _action: &CounterAction) -> &'static str {
        "snapshots"
    }

    fn predict(&self, _action: &CounterAction, domain: &Counter) -> Option<Prediction> {
        Some(Prediction::new(
            "value moves by one",
            vec![
                PredictionCheck::eq("value", domain.value).from_old(),
                PredictionCheck::eq("value", domain.value + 1),
            ],
        ))
    }

    fn execute(
        &self,
        _action: &CounterAction,
        domain: &mut Counter,
        _services: &CounterServices,
    ) -> Result<CounterOutput> {
        domain.value += 1;
        Ok(CounterOutput {
            value: domain.value,
        })
    }

    fn verify(&self, args: VerifyArgs<'_, Self>) -> Result<Option<VerifyResult>> {
        assert!(args.prediction_eval.pass);
        assert_eq!(args.execute_result.value, args.new_ctx.value);
        self.seen
            .borrow_mut()
            .push((args.old_value.clone(), args.new_value.clone()));
        Ok(Some(VerifyResult::passed("snapshots seen")))
    }
}

#[test]
fn snapshot_is_isolated_from_execute_mutations() {
    let machine: DomainMachine<SnapshotRegistry, (), CounterGuard> =
        MachineBuilder::new("snapshots", SnapshotRegistry::default())
            .state(
                DomainState::new("planning")
                    .on_entry(|ctx: &mut RunnerContext<SnapshotRegistry, ()>| {
                        ctx.enqueue("snapshots", vec![CounterAction::Noop, CounterAction::Noop]);
                    })
                    .always(Transition::to_queue()),
            )
            .initial("planning")
            .refresh_context(|_ctx: &(), domain: &Counter| Ok(domain.clone()))
            .build()
            .expect("build");

    let outcome = machine
        .run(RunInput::new(
            pev::test_support::counter(5),
            CounterServices::default(),
            (),
            1,
        ))
        .expect("run");

    assert!(outcome.is_done());
    let seen = machine.registry().seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0["value"], 5);
    assert_eq!(seen[0].1["value"], 6);
    assert_eq!(seen[1].0["value"], 6);
    assert_eq!(seen[1].1["value"], 7);
}

#[test]
fn run_report_captures_terminal_snapshot() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log = recorder();
    let machine = planning_machine(
        CounterRegistry::default(),
        vec![increment(1), CounterAction::Stall],
    )
    .build()
    .expect("build");
    let outcome = machine.run(counter_input(0, &log, 1)).expect("run");

    let report = RunReport::from_outcome(&machine, &outcome).expect("report");
    let paths = write_run_report(temp.path(), &report).expect("write report");

    let raw = fs::read_to_string(&paths.report_path).expect("read report");
    let value: Value = serde_json::from_str(&raw).expect("parse report");
    assert_eq!(value["machine"], "counter");
    assert_eq!(value["state"], "verificationFailed");
    assert_eq!(value["failed"], true);
    assert_eq!(value["failed_action"], "stall");
    assert_eq!(value["completed_actions"][0]["kind"], "increment");
    assert_eq!(value["completed_actions"][0]["result"]["value"], 1);
    assert_eq!(value["domain"]["value"], 1);
    assert_eq!(value["verify_result"]["diffs"][0]["field"], "value");
}

#[test]
fn loaded_config_bounds_cycles_and_places_the_report() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("pev.toml");
    let cfg = EngineConfig {
        max_cycles: 1,
        report_dir: temp.path().join("runs"),
        ..EngineConfig::default()
    };
    fs::write(
        &config_path,
        toml::to_string_pretty(&cfg).expect("serialize config"),
    )
    .expect("write config");
    let cfg = load_config(&config_path).expect("load config");

    let log = recorder();
    let machine = MachineBuilder::new("counter", CounterRegistry::default())
        .config(&cfg)
        .state(retrying_planning(CounterAction::Boom))
        .state(DomainState::new("actionFailure").always(Transition::to("planning")))
        .initial("planning")
        .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
        .build()
        .expect("build");
    let input = RunInput::with_config(
        Counter {
            value: 0,
            labels: Vec::new(),
        },
        CounterServices::default(),
        Rc::clone(&log),
        &cfg,
    );

    let outcome = machine.run(input).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.context.max_cycles(), 1);
    assert_eq!(outcome.context.cycle_count(), 1);
    assert_eq!(outcome.domain().value, 0);

    let report = RunReport::from_outcome(&machine, &outcome).expect("report");
    let paths = write_run_report_for(&cfg, &report).expect("write report");
    assert_eq!(paths.report_path, temp.path().join("runs/counter/report.json"));
    let raw = fs::read_to_string(&paths.report_path).expect("read report");
    let value: Value = serde_json::from_str(&raw).expect("parse report");
    assert_eq!(value["max_cycles"], 1);
    assert_eq!(value["error"], "boom");
}

#[test]
fn hooks_share_the_caller_context() {
    let log: Recorder = Rc::new(RefCell::new(vec!["seeded".to_string()]));
    let machine = planning_machine(CounterRegistry::default(), vec![increment(1)])
        .build()
        .expect("build");

    machine.run(counter_input(0, &log, 1)).expect("run");

    assert_eq!(events(&log).first().map(String::as_str), Some("seeded"));
    assert_eq!(count_events(&log, "refresh"), 1);
}

#[test]
fn builtin_guards_work_without_domain_guards() {
    let log = recorder();
    let machine = MachineBuilder::<CounterRegistry, Recorder, NoGuards>::new(
        "counter",
        CounterRegistry::default(),
    )
    .state(
        DomainState::new("planning")
            .always(
                Transition::to_queue()
                    .when_builtin(BuiltinGuard::QueueEmpty)
                    .effect(|ctx: &mut RunnerContext<CounterRegistry, Recorder>| {
                        ctx.push_action(increment(2));
                    }),
            )
            .always(Transition::to_done()),
    )
    .initial("planning")
    .refresh_context(|_log: &Recorder, domain: &Counter| Ok(domain.clone()))
    .build()
    .expect("build");

    let outcome = machine.run(counter_input(0, &log, 3)).expect("run");

    assert!(outcome.is_done());
    assert_eq!(outcome.domain().value, 6);
    assert_eq!(outcome.context.cycle_count(), 3);
    assert_eq!(outcome.context.queue_label(), None);
}
