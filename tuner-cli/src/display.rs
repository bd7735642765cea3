//! Console formatting of tuner readings.

use tuner_core::{TunerReading, TuningResult, TuningStatus};

/// Prints only when the (note, status) pair changes.
///
/// The pipeline emits one reading per frame; a steady note would otherwise
/// scroll the same line ~20 times a second.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last: Option<(Option<String>, TuningStatus)>,
}

impl ChangeFilter {
    /// Returns the line to print, or `None` if nothing changed.
    pub fn update(&mut self, reading: &TunerReading) -> Option<String> {
        let key = (reading.result.note.clone(), reading.result.status);
        if self.last.as_ref() == Some(&key) {
            return None;
        }
        self.last = Some(key);
        Some(format_reading(reading))
    }
}

pub fn status_label(status: TuningStatus) -> &'static str {
    match status {
        TuningStatus::Default => "--",
        TuningStatus::Tuned => "in tune",
        TuningStatus::TooLow => "low",
        TuningStatus::WayTooLow => "way too low",
        TuningStatus::TooHigh => "high",
        TuningStatus::WayTooHigh => "way too high",
    }
}

pub fn format_reading(reading: &TunerReading) -> String {
    let TuningResult {
        note,
        status,
        expected_frequency_hz,
        diff_frequency_hz,
        diff_cents,
    } = &reading.result;

    match note {
        Some(note) => format!(
            "{:<2} {:>8.2} Hz  target {:>8.2} Hz  diff {:+6.2} Hz {:+7.1} c  {}",
            note,
            reading.estimate.frequency_hz,
            expected_frequency_hz,
            diff_frequency_hz,
            diff_cents,
            status_label(*status)
        ),
        None => format!("{:<2} (no pitch)", status_label(*status)),
    }
}
