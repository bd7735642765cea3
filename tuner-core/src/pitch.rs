//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation with the YIN algorithm
//! (de Cheveigné & Kawahara, 2002).
//!
//! ## Steps
//! 1. Squared-difference function `d(τ)` over lags `1..N/2`
//! 2. Cumulative mean normalized difference `d'(τ)`
//! 3. Absolute threshold: first dip of `d'` below the threshold, with the
//!    global minimum as a best-effort fallback
//! 4. Parabolic interpolation for sub-sample lag accuracy
//! 5. `frequency = sample_rate / τ*`, `confidence = 1 - d'(τ)`

use serde::{Deserialize, Serialize};

use crate::fft::DifferenceFft;
use crate::frame::AudioFrame;

/// Default absolute threshold on `d'(τ)`.
pub const DEFAULT_THRESHOLD: f64 = 0.15;

/// Estimated fundamental frequency of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Frequency in Hz; `0.0` when the frame carried no usable signal.
    pub frequency_hz: f64,
    /// Periodicity at the chosen lag, in `[0, 1]`.
    pub confidence: f64,
}

impl PitchEstimate {
    /// The estimate for silent or degenerate frames.
    pub const SILENT: PitchEstimate = PitchEstimate {
        frequency_hz: 0.0,
        confidence: 0.0,
    };

    /// Whether the estimate is trustworthy enough to classify.
    pub fn is_reliable(&self, min_confidence: f64) -> bool {
        self.frequency_hz > 0.0 && self.confidence >= min_confidence
    }
}

/// Converts one frame into a pitch estimate.
pub trait PitchEstimator {
    /// Estimates the fundamental of `frame`.
    ///
    /// Implementations never fail; frames without a usable pitch come back
    /// with zero frequency or low confidence.
    fn estimate(&mut self, frame: &AudioFrame) -> PitchEstimate;
}

/// How the squared-difference function is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceMethod {
    /// The O(N · maxLag) definition.
    Direct,
    /// FFT autocorrelation; same values within rounding.
    #[default]
    Fft,
}

/// YIN estimator with reusable scratch buffers.
#[derive(Debug)]
pub struct Yin {
    threshold: f64,
    method: DifferenceMethod,
    fft: DifferenceFft,
    signal: Vec<f64>,
    yin_buffer: Vec<f64>,
}

impl Default for Yin {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Yin {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            method: DifferenceMethod::default(),
            fft: DifferenceFft::new(),
            signal: Vec::new(),
            yin_buffer: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: DifferenceMethod) -> Self {
        self.method = method;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn method(&self) -> DifferenceMethod {
        self.method
    }

    /// Runs YIN over raw samples.
    ///
    /// # Arguments
    /// * `samples` - Mono audio, nominally in `[-1.0, 1.0]`
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// * The estimated fundamental and the periodicity at the chosen lag.
    ///   Frames that are too short, silent or non-finite, or that come with
    ///   a zero sample rate, yield [`PitchEstimate::SILENT`]. Aperiodic and
    ///   constant frames yield a best-effort frequency with low confidence.
    pub fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchEstimate {
        let half = samples.len() / 2;
        // Need at least lags 0 and 1.
        if samples.len() < 2 || half < 2 || sample_rate == 0 {
            return PitchEstimate::SILENT;
        }

        self.signal.clear();
        self.signal.extend(samples.iter().map(|&s| s as f64));

        let energy: f64 = self.signal.iter().map(|s| s * s).sum();
        if energy == 0.0 || !energy.is_finite() {
            return PitchEstimate::SILENT;
        }

        // --- Step 1: Difference function ---
        self.yin_buffer.clear();
        self.yin_buffer.resize(half, 0.0);
        match self.method {
            DifferenceMethod::Direct => difference_direct(&self.signal, &mut self.yin_buffer),
            DifferenceMethod::Fft => self.fft.difference(&self.signal, &mut self.yin_buffer),
        }

        // --- Step 2: Cumulative mean normalized difference ---
        cumulative_mean_normalize(&mut self.yin_buffer);

        // --- Step 3: Absolute threshold, global minimum as fallback ---
        let tau = match absolute_threshold(&self.yin_buffer, self.threshold) {
            Some(tau) => tau,
            None => global_minimum(&self.yin_buffer),
        };

        // --- Step 4: Parabolic interpolation ---
        let refined_tau = parabolic_interpolation(&self.yin_buffer, tau);
        if refined_tau <= 0.0 || !refined_tau.is_finite() {
            return PitchEstimate::SILENT;
        }

        // --- Step 5: Frequency and confidence ---
        PitchEstimate {
            frequency_hz: sample_rate as f64 / refined_tau,
            confidence: (1.0 - self.yin_buffer[tau]).clamp(0.0, 1.0),
        }
    }
}

impl PitchEstimator for Yin {
    fn estimate(&mut self, frame: &AudioFrame) -> PitchEstimate {
        self.detect(frame.samples(), frame.sample_rate())
    }
}

/// `out[τ] = Σ_{i=0}^{N-τ-1} (x[i] - x[i+τ])²`, `out[0] = 0`.
fn difference_direct(signal: &[f64], out: &mut [f64]) {
    let n = signal.len();
    out[0] = 0.0;
    for tau in 1..out.len() {
        let mut diff = 0.0;
        for i in 0..(n - tau) {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        out[tau] = diff;
    }
}

/// Turns `d(τ)` into `d'(τ)` in place, with `d'(0) = 1`.
fn cumulative_mean_normalize(yin_buffer: &mut [f64]) {
    yin_buffer[0] = 1.0;
    let mut running_sum = 0.0;
    for tau in 1..yin_buffer.len() {
        running_sum += yin_buffer[tau];
        if running_sum > 0.0 {
            yin_buffer[tau] *= tau as f64 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }
}

/// First lag below `threshold`, walked down to the bottom of its dip.
fn absolute_threshold(yin_buffer: &[f64], threshold: f64) -> Option<usize> {
    let mut tau = (1..yin_buffer.len()).find(|&tau| yin_buffer[tau] < threshold)?;
    while tau + 1 < yin_buffer.len() && yin_buffer[tau + 1] < yin_buffer[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Lowest `d'(τ)` for `τ >= 1`; ties resolve to the smallest lag.
fn global_minimum(yin_buffer: &[f64]) -> usize {
    let mut best = 1;
    for tau in 2..yin_buffer.len() {
        if yin_buffer[tau] < yin_buffer[best] {
            best = tau;
        }
    }
    best
}

/// Fits a parabola through `d'(τ-1), d'(τ), d'(τ+1)` and returns its vertex.
///
/// At the last lag there is no right neighbour and `τ` is returned as is.
fn parabolic_interpolation(yin_buffer: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= yin_buffer.len() {
        return tau as f64;
    }
    let y1 = yin_buffer[tau - 1];
    let y2 = yin_buffer[tau];
    let y3 = yin_buffer[tau + 1];

    let curvature = y1 - 2.0 * y2 + y3;
    if curvature.abs() < f64::EPSILON {
        return tau as f64;
    }
    let shift = (y1 - y3) / (2.0 * curvature);
    // A vertex outside the three points means the fit is meaningless.
    if shift.abs() > 1.0 {
        return tau as f64;
    }
    tau as f64 + shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generate_sine(freq: f64, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32
            })
            .collect()
    }

    /// Deterministic white-ish noise from a linear congruential generator.
    fn generate_noise(num_samples: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..num_samples)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_sine_440_in_1024_samples() {
        let frame = AudioFrame::new(generate_sine(440.0, 44100, 1024), 44100);
        let mut yin = Yin::default();
        let estimate = yin.estimate(&frame);

        assert_relative_eq!(estimate.frequency_hz, 440.0, max_relative = 0.005);
        assert!(
            estimate.confidence > 1.0 - DEFAULT_THRESHOLD,
            "Expected high confidence, got {}",
            estimate.confidence
        );
    }

    #[test]
    fn test_guitar_range_sines() {
        let mut yin = Yin::default();
        for freq in [82.41, 110.0, 146.83, 196.0, 246.94, 329.63, 659.25, 1000.0] {
            let estimate = yin.detect(&generate_sine(freq, 44100, 2048), 44100);
            assert_relative_eq!(estimate.frequency_hz, freq, max_relative = 0.005);
            assert!(estimate.confidence > 0.85, "{freq} Hz: confidence {}", estimate.confidence);
        }
    }

    #[test]
    fn test_harmonic_rich_tone_keeps_fundamental() {
        let sample_rate = 48000;
        let samples: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let w = 2.0 * std::f64::consts::PI * 196.0 * t;
                (w.sin() + 0.6 * (2.0 * w).sin() + 0.4 * (3.0 * w).sin()) as f32
            })
            .collect();
        let estimate = Yin::default().detect(&samples, sample_rate);
        assert_relative_eq!(estimate.frequency_hz, 196.0, max_relative = 0.005);
    }

    #[test]
    fn test_direct_and_fft_agree() {
        let noisy_sine: Vec<f32> = generate_sine(330.0, 44100, 1024)
            .into_iter()
            .zip(generate_noise(1024))
            .map(|(s, n)| s + 0.05 * n)
            .collect();
        let offset_sine: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f64 / 44100.0;
                (0.8 + 0.05 * (2.0 * std::f64::consts::PI * 196.0 * t).sin()) as f32
            })
            .collect();

        let frames: Vec<(&str, Vec<f32>)> = vec![
            ("noisy sine", noisy_sine),
            ("dc offset", offset_sine),
            ("constant 0.5", vec![0.5; 2048]),
            ("constant 1.0", vec![1.0; 2048]),
            ("constant -0.25", vec![-0.25; 2048]),
            ("short constant", vec![0.5; 8]),
            ("4 samples", vec![0.1, 0.9, -0.4, 0.3]),
            ("6 samples", vec![0.1, 0.9, -0.4, 0.3, 0.8, -0.6]),
            ("8 samples", vec![0.1, 0.9, -0.4, 0.3, 0.8, -0.6, 0.2, 0.5]),
        ];

        let mut direct_yin = Yin::default().with_method(DifferenceMethod::Direct);
        let mut fft_yin = Yin::default().with_method(DifferenceMethod::Fft);
        for (name, samples) in &frames {
            let direct = direct_yin.detect(samples, 44100);
            let fft = fft_yin.detect(samples, 44100);
            assert_relative_eq!(direct.frequency_hz, fft.frequency_hz, max_relative = 1e-6);
            assert!(
                (direct.confidence - fft.confidence).abs() < 1e-6,
                "{name}: direct {direct:?}, fft {fft:?}"
            );
        }
    }

    #[test]
    fn test_constant_frame_has_no_confidence() {
        for method in [DifferenceMethod::Direct, DifferenceMethod::Fft] {
            let mut yin = Yin::default().with_method(method);
            for level in [0.5f32, 1.0, -0.25] {
                let estimate = yin.detect(&vec![level; 2048], 44100);
                assert_eq!(estimate.confidence, 0.0, "{method:?} at {level}");
                assert!(!estimate.is_reliable(1.0 - DEFAULT_THRESHOLD));
            }
        }
    }

    #[test]
    fn test_silent_frame() {
        let estimate = Yin::default().detect(&[0.0; 1024], 44100);
        assert_eq!(estimate, PitchEstimate::SILENT);
    }

    #[test]
    fn test_degenerate_frames() {
        let mut yin = Yin::default();
        assert_eq!(yin.detect(&[], 44100), PitchEstimate::SILENT);
        assert_eq!(yin.detect(&[0.5], 44100), PitchEstimate::SILENT);
        assert_eq!(yin.detect(&[0.5, -0.5], 44100), PitchEstimate::SILENT);
        assert_eq!(yin.detect(&generate_sine(440.0, 44100, 256), 0), PitchEstimate::SILENT);
        assert_eq!(yin.detect(&[f32::NAN; 64], 44100), PitchEstimate::SILENT);
    }

    #[test]
    fn test_noise_falls_back_with_low_confidence() {
        let mut yin = Yin::default();
        let estimate = yin.detect(&generate_noise(2048), 44100);

        assert!(estimate.frequency_hz > 0.0, "best-effort frequency expected");
        assert!(estimate.confidence < 0.6, "noise confidence {}", estimate.confidence);
        assert!(!estimate.is_reliable(1.0 - yin.threshold()));
    }

    #[test]
    fn test_cumulative_mean_normalize() {
        let mut buffer = vec![0.0, 2.0, 4.0, 0.0];
        cumulative_mean_normalize(&mut buffer);
        assert_eq!(buffer[0], 1.0);
        assert_relative_eq!(buffer[1], 1.0);
        assert_relative_eq!(buffer[2], 4.0 * 2.0 / 6.0);
        assert_relative_eq!(buffer[3], 0.0);
    }

    #[test]
    fn test_absolute_threshold_walks_to_dip_bottom() {
        let buffer = [1.0, 0.9, 0.12, 0.08, 0.05, 0.07, 0.02];
        assert_eq!(absolute_threshold(&buffer, 0.15), Some(4));
        assert_eq!(absolute_threshold(&buffer, 0.01), None);
        assert_eq!(global_minimum(&buffer), 6);
    }

    #[test]
    fn test_parabolic_interpolation_vertex() {
        // Samples of (x - 2.25)^2 at x = 1, 2, 3.
        let buffer = [9.0, 1.5625, 0.0625, 0.5625];
        assert_relative_eq!(parabolic_interpolation(&buffer, 2), 2.25, epsilon = 1e-12);
        assert_eq!(parabolic_interpolation(&buffer, 3), 3.0);
    }
}
