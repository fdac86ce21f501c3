//! Merge prediction-check evaluation with an action's custom verdict.

use crate::core::types::{Diff, Evaluation, Prediction, VerifyResult};

/// Message used when an action declares no prediction checks.
pub const NO_CHECKS_MESSAGE: &str = "no checks defined";

/// Verdict derived purely from the prediction evaluation.
pub fn default_verdict(prediction: Option<&Prediction>, evaluation: &Evaluation) -> VerifyResult {
    let check_count = prediction.map_or(0, |p| p.checks.len());
    if evaluation.pass {
        if check_count == 0 {
            return VerifyResult::passed(NO_CHECKS_MESSAGE);
        }
        return VerifyResult::passed(format!("{check_count} prediction check(s) passed"));
    }
    VerifyResult::failed(
        failure_message(&evaluation.diffs),
        evaluation.diffs.clone(),
    )
}

/// Final verdict: prediction evaluation AND custom verify.
///
/// A custom pass never overrides failed prediction checks. Diffs from both
/// sources are kept, prediction diffs first.
pub fn merge_verdicts(
    prediction: Option<&Prediction>,
    evaluation: &Evaluation,
    custom: Option<VerifyResult>,
) -> VerifyResult {
    let base = default_verdict(prediction, evaluation);
    let Some(custom) = custom else {
        return base;
    };

    let pass = base.pass && custom.pass;
    let message = match (base.pass, custom.pass) {
        (true, _) => custom.message,
        (false, true) => base.message,
        (false, false) => format!("{}; {}", custom.message, base.message),
    };
    let mut diffs = base.diffs;
    diffs.extend(custom.diffs);
    VerifyResult {
        pass,
        message,
        diffs,
    }
}

fn failure_message(diffs: &[Diff]) -> String {
    if diffs.is_empty() {
        return "prediction checks failed".to_string();
    }
    let fields: Vec<String> = diffs.iter().map(describe_diff).collect();
    format!(
        "{} prediction check(s) failed: {}",
        diffs.len(),
        fields.join(", ")
    )
}

fn describe_diff(diff: &Diff) -> String {
    let comparator = diff.comparator.map_or("check", |c| c.label());
    match &diff.description {
        Some(description) => format!("{} {} ({})", diff.field, comparator, description),
        None => format!("{} {}", diff.field, comparator),
    }
}
