//! # Fast Fourier Transform (FFT) Module
//!
//! Computes the YIN squared-difference function through an FFT
//! autocorrelation instead of the direct O(N · maxLag) double loop.
//!
//! The squared difference at lag τ expands into two energy terms and one
//! autocorrelation term:
//!
//! ```text
//! d(τ) = Σ x[i]² (i < N-τ)  +  Σ x[i]² (i >= τ)  -  2 · Σ x[i]·x[i+τ]
//! ```
//!
//! The energy terms come from a prefix sum of squares and the autocorrelation
//! from one forward and one inverse transform of the zero-padded frame.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse plans for one transform length.
struct Plans {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

/// Reusable FFT state for the difference function.
///
/// Plans are kept for the last transform length, so a steady frame size
/// is planned once. Only the plans are kept, not the planner, which keeps
/// this type `Send`.
pub struct DifferenceFft {
    plans: Option<Plans>,
    spectrum: Vec<Complex<f64>>,
    energy: Vec<f64>,
}

impl std::fmt::Debug for DifferenceFft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferenceFft")
            .field("transform_len", &self.plans.as_ref().map(|p| p.len))
            .finish()
    }
}

impl Default for DifferenceFft {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferenceFft {
    pub fn new() -> Self {
        Self {
            plans: None,
            spectrum: Vec::new(),
            energy: Vec::new(),
        }
    }

    fn plans_for(&mut self, len: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>) {
        match &self.plans {
            Some(plans) if plans.len == len => (Arc::clone(&plans.forward), Arc::clone(&plans.inverse)),
            _ => {
                let mut planner = FftPlanner::new();
                let forward = planner.plan_fft_forward(len);
                let inverse = planner.plan_fft_inverse(len);
                self.plans = Some(Plans {
                    len,
                    forward: Arc::clone(&forward),
                    inverse: Arc::clone(&inverse),
                });
                (forward, inverse)
            }
        }
    }

    /// Fills `out[τ]` with `d(τ)` for every `τ < out.len()`.
    ///
    /// # Arguments
    /// * `signal` - One analysis frame
    /// * `out` - Destination; its length is the lag range
    ///
    /// `out[0]` is always zero, and values within rounding of zero are
    /// flushed to exactly zero. Lags must stay below the signal length.
    pub fn difference(&mut self, signal: &[f64], out: &mut [f64]) {
        let n = signal.len();
        let max_lag = out.len();
        if n == 0 || max_lag == 0 {
            out.fill(0.0);
            return;
        }
        debug_assert!(max_lag <= n, "lag range exceeds frame length");

        // Padding to at least n + max_lag keeps the circular correlation from
        // wrapping into the lags we read back.
        let transform_len = (n + max_lag).next_power_of_two();
        let (forward, inverse) = self.plans_for(transform_len);

        self.spectrum.clear();
        self.spectrum
            .extend(signal.iter().map(|&sample| Complex { re: sample, im: 0.0 }));
        self.spectrum.resize(transform_len, Complex { re: 0.0, im: 0.0 });

        forward.process(&mut self.spectrum);
        for bin in self.spectrum.iter_mut() {
            *bin = Complex {
                re: bin.norm_sqr(),
                im: 0.0,
            };
        }
        inverse.process(&mut self.spectrum);

        // energy[k] = Σ_{i<k} x[i]²
        self.energy.clear();
        self.energy.push(0.0);
        let mut running = 0.0;
        for &sample in signal {
            running += sample * sample;
            self.energy.push(running);
        }

        let scale = 1.0 / transform_len as f64;
        // Anything at or below the transform's rounding error is an exact
        // match; a constant frame must come out as all zeros.
        let floor = self.energy[n] * transform_len as f64 * f64::EPSILON;
        out[0] = 0.0;
        for tau in 1..max_lag {
            let autocorrelation = self.spectrum[tau].re * scale;
            let head = self.energy[n - tau];
            let tail = self.energy[n] - self.energy[tau];
            let value = head + tail - 2.0 * autocorrelation;
            out[tau] = if value <= floor { 0.0 } else { value };
        }
    }
}
