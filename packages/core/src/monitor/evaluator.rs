//! Threshold evaluation of one cycle's readings.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::monitor::{
    error::ThresholdError,
    types::{Condition, ConditionKind, Reading, ReadingValue, Sample, SourceValue, GROUP_SOURCE},
};

/// Safety limits every reading is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    min_temp: f64,
    max_temp: f64,
    stale_after: Duration,
}

impl Thresholds {
    /// Validate and build thresholds. `min_temp` may equal `max_temp` but
    /// never exceed it.
    pub fn new(min_temp: f64, max_temp: f64, stale_after: Duration) -> Result<Self, ThresholdError> {
        for bound in [min_temp, max_temp] {
            if !bound.is_finite() {
                return Err(ThresholdError::NotFinite(bound));
            }
        }
        if min_temp > max_temp {
            return Err(ThresholdError::Inverted { min: min_temp, max: max_temp });
        }
        if stale_after.is_zero() {
            return Err(ThresholdError::ZeroStaleness);
        }

        Ok(Self { min_temp, max_temp, stale_after })
    }

    pub fn min_temp(&self) -> f64 {
        self.min_temp
    }

    pub fn max_temp(&self) -> f64 {
        self.max_temp
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

/// Classifies readings into conditions.
#[derive(Debug, Clone)]
pub struct Evaluator {
    expected_count: usize,
    thresholds: Thresholds,
}

impl Evaluator {
    pub fn new(expected_count: usize, thresholds: Thresholds) -> Self {
        Self { expected_count, thresholds }
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Evaluate one snapshot of readings taken at `now`.
    ///
    /// Readings are processed in a canonical order, so the resulting Sample
    /// does not depend on the order the source returned them in. When a
    /// source id appears twice, the first reading in canonical order wins
    /// for each condition kind and the last one provides the reported value.
    pub fn evaluate(&self, readings: &[Reading], now: DateTime<Utc>) -> Sample {
        let mut sample = Sample::new(self.expected_count, readings.len());

        if readings.len() != self.expected_count {
            sample.raise(Condition::new(
                ConditionKind::CountMismatch,
                GROUP_SOURCE,
                format!(
                    "expected {} sources, got {}",
                    self.expected_count,
                    readings.len()
                ),
            ));
        }

        let mut ordered: Vec<&Reading> = readings.iter().collect();
        ordered.sort_by(|a, b| canonical_order(a, b));

        for reading in ordered {
            sample.record_value(
                reading.id.clone(),
                SourceValue {
                    name: reading.name.clone(),
                    display: reading.display_value(),
                },
            );
            self.check(reading, now, &mut sample);
        }

        tracing::debug!(
            "Evaluated {} readings ({} expected): {} conditions",
            readings.len(),
            self.expected_count,
            sample.condition_count()
        );

        sample
    }

    fn check(&self, reading: &Reading, now: DateTime<Utc>, sample: &mut Sample) {
        let name = &reading.name;

        match &reading.value {
            ReadingValue::Failed { reason } => {
                sample.raise(Condition::new(
                    ConditionKind::RetrievalError,
                    &reading.id,
                    format!("{}: could not read source: {}", name, reason),
                ));
                return;
            }
            ReadingValue::Unparsed { raw } => {
                sample.raise(Condition::new(
                    ConditionKind::ParseError,
                    &reading.id,
                    format!("{}: could not parse value {:?}", name, raw),
                ));
            }
            ReadingValue::Measured { value } => {
                let value = *value;
                if value < self.thresholds.min_temp {
                    sample.raise(Condition::new(
                        ConditionKind::BelowMin,
                        &reading.id,
                        format!(
                            "{} :thermometer: temperature too low - {:.1}F (min {:.1}F)",
                            name, value, self.thresholds.min_temp
                        ),
                    ));
                } else if value > self.thresholds.max_temp {
                    sample.raise(Condition::new(
                        ConditionKind::AboveMax,
                        &reading.id,
                        format!(
                            "{} :thermometer: temperature too high - {:.1}F (max {:.1}F)",
                            name, value, self.thresholds.max_temp
                        ),
                    ));
                }
            }
        }

        match reading.last_updated {
            None => {
                sample.raise(Condition::new(
                    ConditionKind::Stale,
                    &reading.id,
                    format!("{}: no update has ever been reported", name),
                ));
            }
            Some(last_updated) => {
                // A timestamp in the future yields a negative age, which is fresh.
                let Ok(age) = (now - last_updated).to_std() else {
                    return;
                };
                if age > self.thresholds.stale_after {
                    sample.raise(Condition::new(
                        ConditionKind::Stale,
                        &reading.id,
                        format!(
                            "{}: last update at {} is {}s old (limit {}s)",
                            name,
                            last_updated.to_rfc3339(),
                            age.as_secs(),
                            self.thresholds.stale_after.as_secs()
                        ),
                    ));
                }
            }
        }
    }
}

fn canonical_order(a: &Reading, b: &Reading) -> Ordering {
    a.id.cmp(&b.id)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.last_updated.cmp(&b.last_updated))
        .then_with(|| value_order(&a.value, &b.value))
}

/// Total order over reading payloads, down to the failure reason or raw text.
fn value_order(a: &ReadingValue, b: &ReadingValue) -> Ordering {
    fn rank(value: &ReadingValue) -> u8 {
        match value {
            ReadingValue::Measured { .. } => 0,
            ReadingValue::Unparsed { .. } => 1,
            ReadingValue::Failed { .. } => 2,
        }
    }

    match (a, b) {
        (ReadingValue::Measured { value: x }, ReadingValue::Measured { value: y }) => x.total_cmp(y),
        (ReadingValue::Unparsed { raw: x }, ReadingValue::Unparsed { raw: y }) => x.cmp(y),
        (ReadingValue::Failed { reason: x }, ReadingValue::Failed { reason: y }) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
