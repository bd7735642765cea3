//! # Audio Frame Module
//!
//! Fixed-length blocks of mono samples and the seam through which they reach
//! the tuner. Sample-format and channel conversion happen here, before any
//! analysis runs.

use crate::error::Result;

/// Default number of samples per analysis frame.
///
/// 2048 samples at 44.1 kHz (~46ms) leave room for a 1024-sample lag search,
/// enough to resolve the low E string (~82 Hz, period ~535 samples).
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// One captured block of mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A pull-based supplier of audio frames.
///
/// The pipeline calls [`start`](FrameSource::start) once, then
/// [`next_frame`](FrameSource::next_frame) until it returns `Ok(None)` or an
/// error, and finally [`stop`](FrameSource::stop) exactly once.
pub trait FrameSource {
    /// Acquires the underlying resource (device, file, ...).
    fn start(&mut self) -> Result<()>;

    /// Blocks until the next frame is available.
    ///
    /// * `Ok(Some(frame))` - a new frame
    /// * `Ok(None)` - the source has stopped supplying data
    /// * `Err(e)` - the source failed; the run ends
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;

    /// Releases the resource acquired by `start`.
    fn stop(&mut self);
}

/// Accumulates arbitrarily sized sample chunks into fixed-length frames.
///
/// Audio callbacks deliver whatever the driver has; the estimator wants a
/// constant frame length.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Appends `samples` and hands every completed frame to `emit`, oldest first.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        if self.frame_size == 0 {
            return;
        }
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            emit(frame);
        }
    }

    /// Samples waiting for the next frame to fill up.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Averages interleaved multi-channel samples down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Converts signed 16-bit PCM to floats in `[-1.0, 1.0)`.
pub fn pcm16_to_f32(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| s as f32 / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_fixed_frames_in_order() {
        let mut assembler = FrameAssembler::new(4);
        let mut frames = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_drops_incomplete_tail() {
        let mono = downmix(&[1.0, 1.0, 0.25], 2);
        assert_eq!(mono, vec![1.0]);
    }

    #[test]
    fn test_pcm16_conversion_range() {
        let converted = pcm16_to_f32(&[i16::MIN, 0, 16384]);
        assert_eq!(converted, vec![-1.0, 0.0, 0.5]);
    }
}
