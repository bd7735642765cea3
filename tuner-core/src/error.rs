//! Error types for the tuner core.

use thiserror::Error;

/// Everything that can stop a tuning run or reject a configuration.
///
/// Out-of-range or unvoiced audio is never an error: it produces the default
/// [`TuningResult`](crate::tuning::TuningResult).
#[derive(Debug, Error)]
pub enum TunerError {
    /// The frame source failed to deliver audio.
    #[error("Frame source failed: {0}")]
    Source(String),

    /// No audio input device is available.
    #[error("No input device available")]
    NoInputDevice,

    /// The input device only offers sample formats we cannot convert.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline was started again after it reached the stopped state.
    #[error("Pipeline has already finished")]
    PipelineFinished,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for tuner operations
pub type Result<T> = std::result::Result<T, TunerError>;
