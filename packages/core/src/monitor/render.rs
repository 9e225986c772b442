//! Text rendering of a Sample for chat channels.
//!
//! The first line always starts with [`OK_MARKER`] or [`ALERT_MARKER`] so a
//! person watching the channel can triage without reading the body.

use std::fmt::Write;

use crate::monitor::types::Sample;

pub const OK_MARKER: &str = "OK";
pub const ALERT_MARKER: &str = "ALERT";

/// Render a full status report: header, one line per condition, then every
/// source's current value sorted by source id.
pub fn render(sample: &Sample) -> String {
    let mut out = String::new();

    if sample.is_ok() {
        let _ = writeln!(
            out,
            "{}: {}/{} sources online",
            OK_MARKER, sample.actual_count, sample.expected_count
        );
    } else {
        let _ = writeln!(
            out,
            "{}: {} condition(s), {}/{} sources reporting",
            ALERT_MARKER,
            sample.condition_count(),
            sample.actual_count,
            sample.expected_count
        );
        for condition in sample.conditions() {
            let _ = writeln!(out, "{}", condition.render());
        }
    }

    out.push_str("Current values:");
    let mut any = false;
    for (_, value) in sample.values() {
        any = true;
        let _ = write!(out, "\n{} :thermometer: {}", value.name, value.display);
    }
    if !any {
        out.push_str(" none");
    }

    out
}
