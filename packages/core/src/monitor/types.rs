//! Core data types for the monitoring pipeline

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Source identifier used for conditions that concern the whole group
/// rather than one probe or feed.
pub const GROUP_SOURCE: &str = "group";

/// The value carried by a single reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadingValue {
    /// A parsed temperature in degrees Fahrenheit.
    Measured { value: f64 },
    /// The source answered, but its wire value is not a usable number.
    Unparsed { raw: String },
    /// The source could not be read at all this cycle.
    Failed { reason: String },
}

/// A single observation of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: String,
    pub name: String,
    pub value: ReadingValue,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn measured(
        id: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: ReadingValue::Measured { value },
            last_updated: Some(at),
        }
    }

    /// Build a reading from a raw wire string. Anything that is not a
    /// finite number (including a missing value) becomes `Unparsed`.
    pub fn from_raw(
        id: impl Into<String>,
        name: impl Into<String>,
        raw: Option<&str>,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        let raw = raw.unwrap_or_default();
        let value = match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => ReadingValue::Measured { value },
            _ => ReadingValue::Unparsed { raw: raw.to_string() },
        };

        Self {
            id: id.into(),
            name: name.into(),
            value,
            last_updated,
        }
    }

    pub fn failed(
        id: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: ReadingValue::Failed { reason: reason.into() },
            last_updated: None,
        }
    }

    /// The parsed value, when there is one.
    pub fn value(&self) -> Option<f64> {
        match self.value {
            ReadingValue::Measured { value } => Some(value),
            _ => None,
        }
    }

    /// Short human form of the value used in reports.
    pub fn display_value(&self) -> String {
        match &self.value {
            ReadingValue::Measured { value } => format!("{:.1}F", value),
            ReadingValue::Unparsed { raw } if raw.trim().is_empty() => "no value".to_string(),
            ReadingValue::Unparsed { raw } => format!("unparseable {:?}", raw),
            ReadingValue::Failed { .. } => "unavailable".to_string(),
        }
    }
}

/// Kinds of conditions the evaluator can raise.
///
/// The declaration order is the order conditions are rendered and raised
/// in within one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    CountMismatch,
    RetrievalError,
    ParseError,
    BelowMin,
    AboveMax,
    Stale,
}

impl ConditionKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::CountMismatch | Self::RetrievalError | Self::BelowMin | Self::AboveMax => {
                Severity::Critical
            }
            Self::ParseError | Self::Stale => Severity::Warning,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CountMismatch => "count-mismatch",
            Self::RetrievalError => "retrieval-error",
            Self::ParseError => "parse-error",
            Self::BelowMin => "below-min",
            Self::AboveMax => "above-max",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    /// Chat marker placed in front of every rendered condition line.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Critical => ":alarm:",
            Self::Warning => ":warning:",
        }
    }
}

/// A classified anomaly raised against one source in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub source: String,
    pub detail: String,
}

impl Condition {
    pub fn new(kind: ConditionKind, source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            detail: detail.into(),
        }
    }

    /// One-line rendering: severity marker, kind label, detail.
    pub fn render(&self) -> String {
        format!(
            "{} [{}] {}",
            self.kind.severity().marker(),
            self.kind,
            self.detail
        )
    }
}

/// Last known value of a source, kept for the report body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceValue {
    pub name: String,
    pub display: String,
}

/// The outcome of one evaluation cycle.
///
/// Conditions are keyed by source and then by kind, so a Sample never holds
/// two conditions of the same kind for the same source and iteration order
/// is fixed (source id, then kind).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Sample {
    pub expected_count: usize,
    pub actual_count: usize,
    conditions: BTreeMap<String, BTreeMap<ConditionKind, Condition>>,
    values: BTreeMap<String, SourceValue>,
}

impl Sample {
    pub fn new(expected_count: usize, actual_count: usize) -> Self {
        Self {
            expected_count,
            actual_count,
            ..Default::default()
        }
    }

    /// Sample for a cycle where the source as a whole could not be fetched.
    pub fn fetch_failed(expected_count: usize, reason: impl fmt::Display) -> Self {
        let mut sample = Self::new(expected_count, 0);
        sample.raise(Condition::new(
            ConditionKind::RetrievalError,
            GROUP_SOURCE,
            format!("could not fetch readings, sources may be down: {}", reason),
        ));
        sample
    }

    /// Add a condition. Returns `false` when the (source, kind) pair is
    /// already present; the first condition is kept.
    pub fn raise(&mut self, condition: Condition) -> bool {
        let by_kind = self.conditions.entry(condition.source.clone()).or_default();
        if by_kind.contains_key(&condition.kind) {
            return false;
        }
        by_kind.insert(condition.kind, condition);
        true
    }

    pub fn record_value(&mut self, id: impl Into<String>, value: SourceValue) {
        self.values.insert(id.into(), value);
    }

    /// All conditions ordered by source id, then kind.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values().flat_map(|by_kind| by_kind.values())
    }

    /// Kinds raised against a single source, in kind order.
    pub fn kinds_for(&self, source: &str) -> Vec<ConditionKind> {
        self.conditions
            .get(source)
            .map(|by_kind| by_kind.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has(&self, source: &str, kind: ConditionKind) -> bool {
        self.conditions
            .get(source)
            .is_some_and(|by_kind| by_kind.contains_key(&kind))
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.values().map(|by_kind| by_kind.len()).sum()
    }

    pub fn is_ok(&self) -> bool {
        self.condition_count() == 0
    }

    /// Per-source last values ordered by source id.
    pub fn values(&self) -> impl Iterator<Item = (&String, &SourceValue)> {
        self.values.iter()
    }
}
