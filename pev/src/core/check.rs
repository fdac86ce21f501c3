//! Prediction check evaluation.
//!
//! Compares a pre-action snapshot and a post-action context against a list of
//! declarative checks. Evaluation is pure: inputs are borrowed immutably and
//! every emitted [`Diff`] owns copies of the values it reports.

use serde_json::{Number, Value};

use crate::core::path::resolve_field;
use crate::core::types::{
    Comparator, Diff, Evaluation, FieldCheck, GroupCheck, GroupOp, PredictionCheck, Side,
};

/// Evaluate `checks` as an implicit `all` group.
pub fn evaluate(checks: &[PredictionCheck], old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    evaluate_all(checks, old_ctx, new_ctx)
}

fn evaluate_check(check: &PredictionCheck, old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    match check {
        PredictionCheck::Field(field) => evaluate_field(field, old_ctx, new_ctx),
        PredictionCheck::Group(group) => evaluate_group(group, old_ctx, new_ctx),
    }
}

fn evaluate_group(group: &GroupCheck, old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    match group.comparator {
        GroupOp::All => evaluate_all(&group.checks, old_ctx, new_ctx),
        GroupOp::Any => evaluate_any(&group.checks, old_ctx, new_ctx),
    }
}

/// Every child must pass; diffs are collected from every failing child.
fn evaluate_all(checks: &[PredictionCheck], old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    let mut pass = true;
    let mut diffs = Vec::new();
    for check in checks {
        let child = evaluate_check(check, old_ctx, new_ctx);
        if !child.pass {
            pass = false;
            diffs.extend(child.diffs);
        }
    }
    Evaluation { pass, diffs }
}

/// One child must pass; diffs are only reported when every alternative fails.
fn evaluate_any(checks: &[PredictionCheck], old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    let mut diffs = Vec::new();
    for check in checks {
        let child = evaluate_check(check, old_ctx, new_ctx);
        if child.pass {
            return Evaluation {
                pass: true,
                diffs: Vec::new(),
            };
        }
        diffs.extend(child.diffs);
    }
    Evaluation { pass: false, diffs }
}

fn evaluate_field(check: &FieldCheck, old_ctx: &Value, new_ctx: &Value) -> Evaluation {
    let source = match check.from {
        Side::Old => old_ctx,
        Side::New => new_ctx,
    };
    let actual = resolve_field(source, &check.field);
    let expected = check.expected.as_ref();

    if compare(check.comparator, actual, expected) {
        return Evaluation {
            pass: true,
            diffs: Vec::new(),
        };
    }

    Evaluation {
        pass: false,
        diffs: vec![Diff {
            field: check.field.clone(),
            expected: check.expected.clone(),
            actual: actual.cloned(),
            comparator: Some(check.comparator),
            description: check.description.clone(),
        }],
    }
}

/// Apply a comparator. `None` stands for an undefined value.
pub fn compare(comparator: Comparator, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match comparator {
        Comparator::Eq => match (actual, expected) {
            (None, None) => true,
            (Some(actual), Some(expected)) => strict_eq(actual, expected),
            _ => false,
        },
        Comparator::Gte => numeric_pair(actual, expected).is_some_and(|(a, e)| a >= e),
        Comparator::Lte => numeric_pair(actual, expected).is_some_and(|(a, e)| a <= e),
        Comparator::Subset => match (actual, expected) {
            (Some(Value::Array(actual)), Some(Value::Array(expected))) => expected
                .iter()
                .all(|item| actual.iter().any(|candidate| strict_eq(candidate, item))),
            _ => false,
        },
        Comparator::Includes => match (actual, expected) {
            (Some(Value::Array(actual)), Some(expected)) => {
                actual.iter().any(|candidate| strict_eq(candidate, expected))
            }
            (Some(Value::String(actual)), Some(Value::String(needle))) => {
                actual.contains(needle.as_str())
            }
            _ => false,
        },
        Comparator::Exists => actual.is_some(),
        Comparator::StartsWith => match (actual, expected) {
            (Some(Value::String(actual)), Some(Value::String(prefix))) => {
                actual.starts_with(prefix.as_str())
            }
            _ => false,
        },
    }
}

/// Equality where numbers compare by value (`1 == 1.0`) and everything else
/// compares structurally.
fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => number_eq(l, r),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| strict_eq(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, a)| r.get(key).is_some_and(|b| strict_eq(a, b)))
        }
        _ => left == right,
    }
}

/// Integers compare exactly; floats fall back to `f64` comparison.
fn number_eq(left: &Number, right: &Number) -> bool {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        return l == r;
    }
    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        return l == r;
    }
    if left.is_f64() || right.is_f64() {
        return matches!((left.as_f64(), right.as_f64()), (Some(l), Some(r)) if l == r);
    }
    false
}

fn numeric_pair(actual: Option<&Value>, expected: Option<&Value>) -> Option<(f64, f64)> {
    let actual = actual?.as_f64()?;
    let expected = expected?.as_f64()?;
    Some((actual, expected))
}
