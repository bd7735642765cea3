// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate is responsible for pitch detection (YIN), mapping pitches to
//! equal-tempered notes, and driving the capture → analysis loop. It is
//! completely headless and contains no display code.

#[cfg(feature = "capture")]
pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod frame;
pub mod pipeline;
pub mod pitch;
pub mod tuning;

pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use frame::{AudioFrame, FrameSource};
pub use pipeline::{PipelineSettings, PipelineState, TunerHandle, TunerPipeline, TunerReading};
pub use pitch::{PitchEstimate, PitchEstimator, Yin};
pub use tuning::{classify, InstrumentProfile, InstrumentType, TuningResult, TuningStatus};
