//! # Configuration Module
//!
//! Tuner settings loaded from JSON. Every field is optional in the file and
//! falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, TunerError};
use crate::frame::DEFAULT_FRAME_SIZE;
use crate::pipeline::PipelineSettings;
use crate::pitch::{DifferenceMethod, Yin, DEFAULT_THRESHOLD};
use crate::tuning::{InstrumentProfile, InstrumentType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Which built-in profile to tune against.
    pub instrument: InstrumentType,
    /// Overrides the profile's A4 when set.
    pub reference_pitch_hz: Option<f64>,
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// YIN absolute threshold on the normalized difference.
    pub yin_threshold: f64,
    /// Estimates below this confidence are treated as unvoiced; unset means
    /// `1 - yin_threshold`.
    pub min_confidence: Option<f64>,
    pub difference: DifferenceMethod,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentType::default(),
            reference_pitch_hz: None,
            frame_size: DEFAULT_FRAME_SIZE,
            yin_threshold: DEFAULT_THRESHOLD,
            min_confidence: None,
            difference: DifferenceMethod::default(),
        }
    }
}

impl TunerConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: TunerConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        // Lags 1 and 2 are the smallest search that can be interpolated.
        if self.frame_size < 4 {
            return Err(TunerError::InvalidConfig(format!(
                "frame_size must be at least 4, got {}",
                self.frame_size
            )));
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return Err(TunerError::InvalidConfig(format!(
                "yin_threshold must be in (0, 1), got {}",
                self.yin_threshold
            )));
        }
        if let Some(min_confidence) = self.min_confidence {
            if !(0.0..=1.0).contains(&min_confidence) {
                return Err(TunerError::InvalidConfig(format!(
                    "min_confidence must be in [0, 1], got {min_confidence}"
                )));
            }
        }
        if let Some(reference) = self.reference_pitch_hz {
            if !(reference.is_finite() && reference > 0.0) {
                return Err(TunerError::InvalidConfig(format!(
                    "reference_pitch_hz must be positive, got {reference}"
                )));
            }
        }
        Ok(())
    }

    /// The selected instrument profile with the reference override applied.
    pub fn profile(&self) -> InstrumentProfile {
        let profile = self.instrument.profile().clone();
        match self.reference_pitch_hz {
            Some(reference) => profile.with_reference_pitch(reference),
            None => profile,
        }
    }

    pub fn estimator(&self) -> Yin {
        Yin::new(self.yin_threshold).with_method(self.difference)
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            min_confidence: self
                .min_confidence
                .unwrap_or(1.0 - self.yin_threshold),
        }
    }
}
