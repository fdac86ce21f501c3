//! Action registry abstraction.
//!
//! The [`ActionRegistry`] trait binds each action of a domain's closed action
//! enum to its predict/execute/verify behavior. Implementations dispatch with
//! a `match` on the action, so every action kind is handled at compile time.
//! Tests use scripted registries that mutate in-memory domains instead of
//! calling remote systems.

use std::fmt::Debug;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::core::types::{Diff, Evaluation, Prediction, VerifyResult};

/// Everything a custom `verify` may inspect for one action.
pub struct VerifyArgs<'a, R: ActionRegistry + ?Sized> {
    pub action: &'a R::Action,
    /// Pre-action snapshot.
    pub old_ctx: &'a R::Domain,
    /// Authoritative post-action domain returned by `refresh_context`.
    pub new_ctx: &'a R::Domain,
    /// JSON view of `old_ctx`, as seen by the prediction checks.
    pub old_value: &'a Value,
    /// JSON view of `new_ctx`, as seen by the prediction checks.
    pub new_value: &'a Value,
    pub prediction: Option<&'a Prediction>,
    pub prediction_eval: &'a Evaluation,
    pub prediction_diffs: &'a [Diff],
    pub execute_result: &'a R::Output,
}

/// Per-domain predict/execute/verify behavior.
pub trait ActionRegistry {
    /// State being reconciled. Cloned for pre-action snapshots and serialized
    /// to JSON for field-path checks.
    type Domain: Clone + Debug + Serialize;
    /// Closed set of actions this registry handles.
    type Action: Clone + Debug + Serialize;
    /// Read-only dependencies handed to `execute` (API clients, etc.).
    type Services;
    /// Structured result of a successful `execute`.
    type Output: Clone + Debug + Serialize;

    /// Stable tag for logs and reports.
    fn kind(&self, action: &Self::Action) -> &'static str;

    /// Expected effect of `action`. Must not have side effects.
    fn predict(&self, _action: &Self::Action, _domain: &Self::Domain) -> Option<Prediction> {
        None
    }

    /// Perform the action. The only place side effects are allowed.
    ///
    /// An `Err` is an execution failure.
    fn execute(
        &self,
        action: &Self::Action,
        domain: &mut Self::Domain,
        services: &Self::Services,
    ) -> Result<Self::Output>;

    /// Extra verification beyond prediction checks.
    ///
    /// `Ok(None)` is an implicit pass; an `Err` is a verification failure.
    /// The engine always ANDs the returned verdict with the prediction checks.
    fn verify(&self, _args: VerifyArgs<'_, Self>) -> Result<Option<VerifyResult>> {
        Ok(None)
    }
}
