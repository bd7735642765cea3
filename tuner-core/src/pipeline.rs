//! # Tuner Pipeline Module
//!
//! Drives frame source → pitch estimator → tone mapper, one frame at a time.
//!
//! ## Architecture
//! - **Worker Thread**: one dedicated thread owns the source and the estimator
//! - **Communication**: an unbounded crossbeam channel carries readings to the
//!   single consumer, in frame order
//! - **Cancellation**: an atomic flag checked once per frame
//! - **Release**: the source is stopped exactly once on every exit path

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, TunerError};
use crate::frame::{AudioFrame, FrameSource};
use crate::pitch::{PitchEstimate, PitchEstimator, DEFAULT_THRESHOLD};
use crate::tuning::{classify, InstrumentProfile, TuningResult};

/// Knobs applied between estimation and classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Estimates below this confidence produce the default result.
    pub min_confidence: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_confidence: 1.0 - DEFAULT_THRESHOLD,
        }
    }
}

/// Lifecycle of a pipeline. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

/// What the pipeline emits for every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerReading {
    /// Raw estimator output.
    pub estimate: PitchEstimate,
    /// Classification; the default value when the estimate was unreliable.
    pub result: TuningResult,
}

/// Estimates and classifies a single frame.
pub fn analyse_frame<E: PitchEstimator>(
    estimator: &mut E,
    profile: &InstrumentProfile,
    settings: &PipelineSettings,
    frame: &AudioFrame,
) -> TunerReading {
    let estimate = estimator.estimate(frame);
    let result = if estimate.is_reliable(settings.min_confidence) {
        classify(estimate.frequency_hz, profile)
    } else {
        TuningResult::default()
    };
    TunerReading { estimate, result }
}

/// Owns a source and an estimator and runs them against one profile.
pub struct TunerPipeline<S, E> {
    source: S,
    estimator: E,
    profile: InstrumentProfile,
    settings: PipelineSettings,
    state: PipelineState,
}

/// Holds the started source; stopping it and marking the pipeline stopped
/// happen on drop, so unwinding releases it too.
struct RunningSource<'a, S: FrameSource> {
    source: &'a mut S,
    state: &'a mut PipelineState,
}

impl<S: FrameSource> Drop for RunningSource<'_, S> {
    fn drop(&mut self) {
        info!("Releasing frame source");
        self.source.stop();
        *self.state = PipelineState::Stopped;
    }
}

impl<S: FrameSource, E: PitchEstimator> TunerPipeline<S, E> {
    pub fn new(
        source: S,
        estimator: E,
        profile: InstrumentProfile,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            estimator,
            profile,
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn profile(&self) -> &InstrumentProfile {
        &self.profile
    }

    /// Gives the source back once the pipeline is done with it.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Runs the loop on the calling thread until stopped.
    ///
    /// `emit` receives every reading in frame order and returns `false` when
    /// the consumer is gone. The loop ends when `stop` is set (checked before
    /// each frame), the source runs dry, the consumer hangs up, or the source
    /// fails; only the last case returns an error.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut emit: F) -> Result<()>
    where
        F: FnMut(TunerReading) -> bool,
    {
        if self.state != PipelineState::Idle {
            return Err(TunerError::PipelineFinished);
        }

        if let Err(e) = self.source.start() {
            error!("Failed to start frame source: {}", e);
            self.state = PipelineState::Stopped;
            return Err(e);
        }
        self.state = PipelineState::Running;
        info!("Pipeline running");

        let mut running = RunningSource {
            source: &mut self.source,
            state: &mut self.state,
        };

        let mut frames: u64 = 0;
        loop {
            if stop.load(Ordering::Acquire) {
                info!("Stop requested after {} frames", frames);
                return Ok(());
            }

            match running.source.next_frame() {
                Ok(Some(frame)) => {
                    frames += 1;
                    let reading =
                        analyse_frame(&mut self.estimator, &self.profile, &self.settings, &frame);
                    trace!(
                        "frame {}: {:.2} Hz (confidence {:.2}) -> {:?} {:?}",
                        frames,
                        reading.estimate.frequency_hz,
                        reading.estimate.confidence,
                        reading.result.note,
                        reading.result.status
                    );
                    if !emit(reading) {
                        debug!("Consumer hung up after {} frames", frames);
                        return Ok(());
                    }
                }
                Ok(None) => {
                    info!("Frame source finished after {} frames", frames);
                    return Ok(());
                }
                Err(e) => {
                    error!("Frame source failed after {} frames: {}", frames, e);
                    return Err(e);
                }
            }
        }
    }
}

impl<S, E> TunerPipeline<S, E>
where
    S: FrameSource + 'static,
    E: PitchEstimator + Send + 'static,
{
    /// Starts a pipeline on a dedicated worker thread.
    ///
    /// # Arguments
    /// * `make_source` - Builds the frame source; runs on the worker, so the
    ///   source never crosses threads (cpal streams are not `Send` on every
    ///   platform)
    /// * `estimator` - Pitch estimator, moved to the worker
    /// * `profile` - Instrument profile used for every frame
    /// * `settings` - Confidence gate between estimation and classification
    ///
    /// # Returns
    /// * A [`TunerHandle`] for reading results and stopping the worker
    /// * `Err` only if the thread could not be spawned; failures to build or
    ///   start the source, and frame failures, arrive as a final `Err` on the
    ///   result channel
    pub fn spawn<F>(
        make_source: F,
        estimator: E,
        profile: InstrumentProfile,
        settings: PipelineSettings,
    ) -> Result<TunerHandle>
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let worker = thread::Builder::new()
            .name("tuner-pipeline".into())
            .spawn(move || {
                info!("Pipeline thread started");
                let source = match make_source() {
                    Ok(source) => source,
                    Err(e) => {
                        error!("Could not create frame source: {}", e);
                        let _ = results_tx.send(Err(e));
                        return;
                    }
                };

                let mut pipeline = TunerPipeline::new(source, estimator, profile, settings);
                let outcome = pipeline.run(&worker_stop, |reading| send(&results_tx, reading));
                if let Err(e) = outcome {
                    let _ = results_tx.send(Err(e));
                }
                info!("Pipeline thread finished");
            })?;

        Ok(TunerHandle {
            stop,
            results: results_rx,
            worker: Some(worker),
        })
    }
}

fn send(results: &Sender<Result<TunerReading>>, reading: TunerReading) -> bool {
    results.send(Ok(reading)).is_ok()
}

/// Consumer side of a spawned pipeline.
///
/// Dropping the handle stops the pipeline and waits for the worker.
#[derive(Debug)]
pub struct TunerHandle {
    stop: Arc<AtomicBool>,
    results: Receiver<Result<TunerReading>>,
    worker: Option<JoinHandle<()>>,
}

impl TunerHandle {
    /// Ordered stream of readings; an `Err` is always the last item of a run.
    pub fn results(&self) -> &Receiver<Result<TunerReading>> {
        &self.results
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|worker| worker.is_finished())
    }

    /// Asks the worker to stop after the frame in progress and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Pipeline thread panicked");
            }
        }
    }
}

impl Drop for TunerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
