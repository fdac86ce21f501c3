//! Shared deterministic types for the reconciliation core.
//!
//! These types are the stable contracts between the evaluator, the action
//! registry and the runner. They serialize to the JSON shape used by check
//! files and run reports.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Leaf comparator applied to a single resolved field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    Eq,
    Gte,
    Lte,
    Subset,
    Includes,
    Exists,
    StartsWith,
}

impl Comparator {
    pub fn label(self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Gte => "gte",
            Comparator::Lte => "lte",
            Comparator::Subset => "subset",
            Comparator::Includes => "includes",
            Comparator::Exists => "exists",
            Comparator::StartsWith => "startsWith",
        }
    }
}

/// Boolean grouping of child checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    All,
    Any,
}

/// Which snapshot a field path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Pre-action snapshot.
    Old,
    /// Post-action (refreshed) context.
    #[default]
    New,
}

impl Side {
    fn is_new(&self) -> bool {
        *self == Side::New
    }
}

/// Assertion over one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCheck {
    pub comparator: Comparator,
    pub field: String,
    /// `None` means "undefined"; an explicit JSON `null` is `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Side::is_new")]
    pub from: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `all`/`any` over nested checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCheck {
    pub comparator: GroupOp,
    pub checks: Vec<PredictionCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A declarative expectation about the effect of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionCheck {
    Group(GroupCheck),
    Field(FieldCheck),
}

impl PredictionCheck {
    fn field(comparator: Comparator, field: &str, expected: Option<Value>) -> Self {
        PredictionCheck::Field(FieldCheck {
            comparator,
            field: field.to_string(),
            expected,
            from: Side::New,
            description: None,
        })
    }

    pub fn eq(field: &str, expected: impl Into<Value>) -> Self {
        Self::field(Comparator::Eq, field, Some(expected.into()))
    }

    pub fn gte(field: &str, expected: impl Into<Value>) -> Self {
        Self::field(Comparator::Gte, field, Some(expected.into()))
    }

    pub fn lte(field: &str, expected: impl Into<Value>) -> Self {
        Self::field(Comparator::Lte, field, Some(expected.into()))
    }

    pub fn subset(field: &str, expected: impl Into<Value>) -> Self {
        Self::field(Comparator::Subset, field, Some(expected.into()))
    }

    pub fn includes(field: &str, expected: impl Into<Value>) -> Self {
        Self::field(Comparator::Includes, field, Some(expected.into()))
    }

    pub fn exists(field: &str) -> Self {
        Self::field(Comparator::Exists, field, None)
    }

    pub fn starts_with(field: &str, prefix: &str) -> Self {
        Self::field(Comparator::StartsWith, field, Some(Value::from(prefix)))
    }

    pub fn all(checks: Vec<PredictionCheck>) -> Self {
        PredictionCheck::Group(GroupCheck {
            comparator: GroupOp::All,
            checks,
            description: None,
        })
    }

    pub fn any(checks: Vec<PredictionCheck>) -> Self {
        PredictionCheck::Group(GroupCheck {
            comparator: GroupOp::Any,
            checks,
            description: None,
        })
    }

    /// Resolve the field against the pre-action snapshot. No-op on groups.
    pub fn from_old(mut self) -> Self {
        if let PredictionCheck::Field(check) = &mut self {
            check.from = Side::Old;
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        let description = Some(description.into());
        match &mut self {
            PredictionCheck::Field(check) => check.description = description,
            PredictionCheck::Group(group) => group.description = description,
        }
        self
    }
}

/// Declared expected effect of an action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Prediction {
    pub description: String,
    #[serde(default)]
    pub checks: Vec<PredictionCheck>,
}

impl Prediction {
    pub fn new(description: impl Into<String>, checks: Vec<PredictionCheck>) -> Self {
        Self {
            description: description.into(),
            checks,
        }
    }
}

/// One failed field expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub field: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected: Option<Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<Comparator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Outcome of evaluating a list of prediction checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Evaluation {
    pub pass: bool,
    pub diffs: Vec<Diff>,
}

/// Verdict for a single executed action.
///
/// A serialized verdict without `pass` deserializes as a failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VerifyResult {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<Diff>,
}

impl VerifyResult {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            pass: true,
            message: message.into(),
            diffs: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>, diffs: Vec<Diff>) -> Self {
        Self {
            pass: false,
            message: message.into(),
            diffs,
        }
    }
}

/// Immutable log entry for an action whose verification passed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedAction<A, O> {
    pub action: A,
    pub result: O,
    pub verified: bool,
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
