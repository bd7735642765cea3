//! # Musical Tuning Module
//!
//! Maps an estimated frequency onto the 12-tone equal-tempered grid rooted at
//! the instrument's reference pitch and classifies how far off it is.
//!
//! ## Features
//! - Instrument profiles selected from a static table
//! - Nearest-semitone note name and expected frequency
//! - Signed Hz and cents deviation
//! - Discrete tuning status for display

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// MIDI note number of the reference pitch (A4).
const REFERENCE_MIDI_NOTE: i64 = 69;

/// Deviation in Hz still considered in tune.
const TUNED_TOLERANCE_HZ: f64 = 0.3;

/// Deviation in Hz beyond which a note is way off.
const CLOSE_TOLERANCE_HZ: f64 = 1.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Supported instrument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    /// Fretted six-string guitar.
    #[default]
    Guitar,
}

impl InstrumentType {
    /// All instrument types, in table order.
    pub const ALL: [InstrumentType; 1] = [InstrumentType::Guitar];

    /// The built-in profile for this instrument.
    pub fn profile(self) -> &'static InstrumentProfile {
        &PROFILES[self as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            InstrumentType::Guitar => "guitar",
        }
    }
}

impl std::str::FromStr for InstrumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentType::ALL
            .into_iter()
            .find(|instrument| instrument.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown instrument '{s}'"))
    }
}

/// Statically built instrument profiles, indexed by `InstrumentType`.
///
/// Adding an instrument means adding a variant and a table entry here.
static PROFILES: Lazy<Vec<InstrumentProfile>> = Lazy::new(|| {
    InstrumentType::ALL
        .iter()
        .map(|instrument| match instrument {
            InstrumentType::Guitar => InstrumentProfile {
                min_pitch_hz: 80.0,
                max_pitch_hz: 1050.0,
                reference_pitch_hz: 440.0,
                note_names: NOTE_NAMES.map(String::from),
            },
        })
        .collect()
});

/// Pitch range and note naming for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Lowest accepted frequency (exclusive), in Hz.
    pub min_pitch_hz: f64,
    /// Highest accepted frequency (exclusive), in Hz.
    pub max_pitch_hz: f64,
    /// Frequency of A4, in Hz.
    pub reference_pitch_hz: f64,
    /// The 12 semitone names, starting at C.
    pub note_names: [String; 12],
}

impl Default for InstrumentProfile {
    fn default() -> Self {
        InstrumentType::default().profile().clone()
    }
}

impl InstrumentProfile {
    /// Same profile with A4 moved to `reference_pitch_hz` (e.g. 442 Hz).
    pub fn with_reference_pitch(mut self, reference_pitch_hz: f64) -> Self {
        self.reference_pitch_hz = reference_pitch_hz;
        self
    }

    /// Whether `frequency_hz` lies strictly inside the playable range.
    pub fn contains(&self, frequency_hz: f64) -> bool {
        frequency_hz > self.min_pitch_hz && frequency_hz < self.max_pitch_hz
    }
}

/// How the observed pitch relates to the nearest note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TuningStatus {
    /// No signal, or the frequency was out of range.
    #[default]
    Default,
    Tuned,
    TooLow,
    WayTooLow,
    TooHigh,
    WayTooHigh,
}

impl TuningStatus {
    /// Classifies a signed deviation `expected - observed`, in Hz.
    ///
    /// A positive deviation means the string sounds flat (too low).
    pub fn from_diff(diff_frequency_hz: f64) -> Self {
        if diff_frequency_hz.abs() <= TUNED_TOLERANCE_HZ {
            TuningStatus::Tuned
        } else if diff_frequency_hz.abs() <= CLOSE_TOLERANCE_HZ {
            if diff_frequency_hz > 0.0 {
                TuningStatus::TooLow
            } else {
                TuningStatus::TooHigh
            }
        } else if diff_frequency_hz > 0.0 {
            TuningStatus::WayTooLow
        } else {
            TuningStatus::WayTooHigh
        }
    }
}

/// Classification of one observed frequency.
///
/// `TuningResult::default()` is the "no note" value: no name, zeroed numbers
/// and [`TuningStatus::Default`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningResult {
    pub note: Option<String>,
    pub status: TuningStatus,
    /// Frequency of the nearest equal-tempered note, in Hz.
    pub expected_frequency_hz: f64,
    /// `expected_frequency_hz - observed`, in Hz.
    pub diff_frequency_hz: f64,
    /// `1200 * ln(expected / observed)`.
    pub diff_cents: f64,
}

impl TuningResult {
    /// Whether this result names a note (i.e. is not the default value).
    pub fn is_note(&self) -> bool {
        self.note.is_some()
    }
}

/// Finds the nearest note to `frequency_hz` and how far off it is.
///
/// # Arguments
/// * `frequency_hz` - Observed fundamental
/// * `profile` - Range, reference pitch and note names to map against
///
/// # Returns
/// * The nearest equal-tempered note, its expected frequency and the offset
///   in Hz and cents. Frequencies outside the profile's range (including 0,
///   negatives and NaN) give the default result.
pub fn classify(frequency_hz: f64, profile: &InstrumentProfile) -> TuningResult {
    if !profile.contains(frequency_hz) {
        return TuningResult::default();
    }

    let semitone_offset = semitones_from_reference(frequency_hz, profile.reference_pitch_hz);
    let note_index = (semitone_offset + REFERENCE_MIDI_NOTE).rem_euclid(12) as usize;

    let expected_frequency_hz = frequency_from_offset(semitone_offset, profile.reference_pitch_hz);
    let diff_frequency_hz = expected_frequency_hz - frequency_hz;
    let diff_cents = 1200.0 * (expected_frequency_hz / frequency_hz).ln();

    TuningResult {
        note: Some(profile.note_names[note_index].clone()),
        status: TuningStatus::from_diff(diff_frequency_hz),
        expected_frequency_hz,
        diff_frequency_hz,
        diff_cents,
    }
}

/// Nearest whole number of semitones between `frequency_hz` and the reference.
///
/// `f64::round` rounds half-way cases away from zero.
fn semitones_from_reference(frequency_hz: f64, reference_pitch_hz: f64) -> i64 {
    (12.0 * (frequency_hz / reference_pitch_hz).log2()).round() as i64
}

/// Equal temperament: `f = reference * 2^(n/12)`.
fn frequency_from_offset(semitone_offset: i64, reference_pitch_hz: f64) -> f64 {
    reference_pitch_hz * 2.0_f64.powf(semitone_offset as f64 / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn guitar() -> &'static InstrumentProfile {
        InstrumentType::Guitar.profile()
    }

    #[test]
    fn test_guitar_profile_table() {
        let profile = guitar();
        assert_eq!(profile.min_pitch_hz, 80.0);
        assert_eq!(profile.max_pitch_hz, 1050.0);
        assert_eq!(profile.reference_pitch_hz, 440.0);
        assert_eq!(profile.note_names[0], "C");
        assert_eq!(profile.note_names[9], "A");
        assert_eq!(&InstrumentProfile::default(), profile);
    }

    #[test]
    fn test_instrument_names() {
        assert_eq!("guitar".parse::<InstrumentType>(), Ok(InstrumentType::Guitar));
        assert_eq!("Guitar".parse::<InstrumentType>(), Ok(InstrumentType::Guitar));
        assert!("ukulele".parse::<InstrumentType>().is_err());
    }

    #[test]
    fn test_reference_pitch_is_tuned_a() {
        let result = classify(440.0, guitar());
        assert_eq!(result.note.as_deref(), Some("A"));
        assert_eq!(result.expected_frequency_hz, 440.0);
        assert_eq!(result.diff_frequency_hz, 0.0);
        assert_eq!(result.diff_cents, 0.0);
        assert_eq!(result.status, TuningStatus::Tuned);
    }

    #[test]
    fn test_sharp_a_is_way_too_high() {
        let result = classify(450.0, guitar());
        assert_eq!(result.note.as_deref(), Some("A"));
        assert_eq!(result.expected_frequency_hz, 440.0);
        assert_eq!(result.diff_frequency_hz, -10.0);
        assert_eq!(result.status, TuningStatus::WayTooHigh);
        assert_relative_eq!(result.diff_cents, 1200.0 * (440.0_f64 / 450.0).ln());
    }

    #[test]
    fn test_open_strings() {
        let strings = [
            (82.41, "E"),
            (110.0, "A"),
            (146.83, "D"),
            (196.0, "G"),
            (246.94, "B"),
            (329.63, "E"),
        ];
        for (freq, name) in strings {
            let result = classify(freq, guitar());
            assert_eq!(result.note.as_deref(), Some(name), "{freq} Hz");
            assert_eq!(result.status, TuningStatus::Tuned, "{freq} Hz");
        }
    }

    #[test]
    fn test_expected_frequency_on_grid() {
        let profile = guitar();
        for freq in [81.0, 123.4, 300.0, 517.7, 1000.0] {
            let result = classify(freq, profile);
            let steps = 12.0 * (result.expected_frequency_hz / profile.reference_pitch_hz).log2();
            assert_abs_diff_eq!(steps, steps.round(), epsilon = 1e-9);
            assert_eq!(result.diff_frequency_hz, result.expected_frequency_hz - freq);
        }
    }

    #[test]
    fn test_out_of_range_is_default() {
        for freq in [0.0, -440.0, 80.0, 79.9, 1050.0, 2000.0, f64::NAN, f64::INFINITY] {
            assert_eq!(classify(freq, guitar()), TuningResult::default(), "{freq} Hz");
        }
        let default = TuningResult::default();
        assert!(!default.is_note());
        assert_eq!(default.status, TuningStatus::Default);
        assert_eq!(default.expected_frequency_hz, 0.0);
        assert_eq!(default.diff_frequency_hz, 0.0);
        assert_eq!(default.diff_cents, 0.0);
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(TuningStatus::from_diff(0.0), TuningStatus::Tuned);
        assert_eq!(TuningStatus::from_diff(0.3), TuningStatus::Tuned);
        assert_eq!(TuningStatus::from_diff(0.31), TuningStatus::TooLow);
        assert_eq!(TuningStatus::from_diff(1.0), TuningStatus::TooLow);
        assert_eq!(TuningStatus::from_diff(1.01), TuningStatus::WayTooLow);

        assert_eq!(TuningStatus::from_diff(-0.3), TuningStatus::Tuned);
        assert_eq!(TuningStatus::from_diff(-0.31), TuningStatus::TooHigh);
        assert_eq!(TuningStatus::from_diff(-1.0), TuningStatus::TooHigh);
        assert_eq!(TuningStatus::from_diff(-1.01), TuningStatus::WayTooHigh);
    }

    #[test]
    fn test_flat_string_reads_too_low() {
        // 0.5 Hz under A2.
        let result = classify(109.5, guitar());
        assert_eq!(result.note.as_deref(), Some("A"));
        assert_eq!(result.status, TuningStatus::TooLow);
        assert!(result.diff_cents > 0.0);
    }

    #[test]
    fn test_semitone_rounding_picks_nearest() {
        // Either side of the A/A# midpoint.
        let just_below_midpoint = 440.0 * 2.0_f64.powf(0.49 / 12.0);
        assert_eq!(classify(just_below_midpoint, guitar()).note.as_deref(), Some("A"));
        let just_above_midpoint = 440.0 * 2.0_f64.powf(0.51 / 12.0);
        assert_eq!(classify(just_above_midpoint, guitar()).note.as_deref(), Some("A#"));
        // Far below the reference the index still wraps correctly.
        assert_eq!(classify(130.81, guitar()).note.as_deref(), Some("C"));
    }

    #[test]
    fn test_custom_reference_pitch() {
        let profile = guitar().clone().with_reference_pitch(442.0);
        let result = classify(442.0, &profile);
        assert_eq!(result.note.as_deref(), Some("A"));
        assert_eq!(result.expected_frequency_hz, 442.0);
        assert_eq!(result.status, TuningStatus::Tuned);
        assert_eq!(classify(440.0, &profile).status, TuningStatus::WayTooLow);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let first = classify(331.7, guitar());
        let second = classify(331.7, guitar());
        assert_eq!(first, second);
        assert_eq!(first.diff_cents.to_bits(), second.diff_cents.to_bits());
        assert_eq!(
            first.diff_frequency_hz.to_bits(),
            second.diff_frequency_hz.to_bits()
        );
    }
}
