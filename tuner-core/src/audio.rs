//! # Audio Capture Module
//!
//! A [`FrameSource`] backed by the default input device through CPAL
//! (Cross-Platform Audio Library).
//!
//! ## Features
//! - Automatic input device and configuration selection
//! - `f32`, `i16` and `u16` sample formats
//! - Multi-channel input downmixed to mono
//! - Fixed-length frames handed to the pipeline through a channel

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use std::time::Duration;

use crate::error::{Result, TunerError};
use crate::frame::{downmix, pcm16_to_f32, AudioFrame, FrameAssembler, FrameSource};

/// Sample rate requested from the device when it offers a choice.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Frames buffered between the audio callback and the pipeline.
const FRAME_QUEUE: usize = 16;

/// How long `next_frame` waits before declaring the device stalled.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Messages from the audio callback thread.
enum Capture {
    Frame(Vec<f32>),
    Failed(String),
}

/// Microphone input as a stream of mono frames.
///
/// Nothing touches the device until [`FrameSource::start`]; `stop` pauses
/// and drops the stream.
pub struct CpalFrameSource {
    frame_size: usize,
    sample_rate: u32,
    stream: Option<cpal::Stream>,
    frames: Option<Receiver<Capture>>,
}

impl CpalFrameSource {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            sample_rate: TARGET_SAMPLE_RATE,
            stream: None,
            frames: None,
        }
    }

    /// The negotiated sample rate (the target until started).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl FrameSource for CpalFrameSource {
    fn start(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(TunerError::NoInputDevice)?;

        match device.name() {
            Ok(name) => info!("Using audio input device: {}", name),
            Err(e) => warn!("Input device has no readable name: {}", e),
        }

        let supported_config = select_config(&device)?;
        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.config();
        info!(
            "Selected {} Hz, {} channel(s), {:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream(&device, &config, self.frame_size, frame_tx, to_f32::<f32>)?
            }
            SampleFormat::I16 => {
                build_stream(&device, &config, self.frame_size, frame_tx, pcm16_to_f32)?
            }
            SampleFormat::U16 => {
                build_stream(&device, &config, self.frame_size, frame_tx, to_f32::<u16>)?
            }
            other => return Err(TunerError::UnsupportedFormat(format!("{other:?}"))),
        };
        stream
            .play()
            .map_err(|e| TunerError::Source(e.to_string()))?;

        self.sample_rate = config.sample_rate.0;
        self.stream = Some(stream);
        self.frames = Some(frame_rx);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| TunerError::Source("audio capture not started".into()))?;

        match frames.recv_timeout(STALL_TIMEOUT) {
            Ok(Capture::Frame(samples)) => Ok(Some(AudioFrame::new(samples, self.sample_rate))),
            Ok(Capture::Failed(message)) => Err(TunerError::Source(message)),
            Err(RecvTimeoutError::Timeout) => Err(TunerError::Source(format!(
                "no audio received for {} s",
                STALL_TIMEOUT.as_secs()
            ))),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing stream: {}", e);
            }
            drop(stream);
            info!("Audio stream stopped");
        }
        self.frames = None;
    }
}

impl Drop for CpalFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Picks a stream configuration, preferring the target rate.
fn select_config(device: &cpal::Device) -> Result<SupportedStreamConfig> {
    let configs = device
        .supported_input_configs()
        .map_err(|e| TunerError::Source(e.to_string()))?
        .collect::<Vec<_>>();

    if let Some(config) = find_supported_config(configs, TARGET_SAMPLE_RATE) {
        return Ok(config);
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| TunerError::Source(e.to_string()))?;
    if is_convertible(fallback.sample_format()) {
        Ok(fallback)
    } else {
        Err(TunerError::UnsupportedFormat(format!(
            "{:?}",
            fallback.sample_format()
        )))
    }
}

/// Finds the best supported configuration for the target sample rate.
///
/// # Arguments
/// * `configs` - Ranges reported by the device
/// * `target_rate` - Preferred sample rate in Hz
///
/// # Returns
/// * `Some(config)` at the rate closest to `target_rate`, or `None` when no
///   range has a convertible sample format
///
/// Among convertible ranges the one closest to `target_rate` wins, then the
/// one with fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfig> {
    configs
        .into_iter()
        .filter(|c| is_convertible(c.sample_format()))
        .min_by_key(|c| {
            let min_rate = c.min_sample_rate().0;
            let max_rate = c.max_sample_rate().0;
            let distance = if target_rate < min_rate {
                min_rate - target_rate
            } else {
                target_rate.saturating_sub(max_rate)
            };
            (distance, c.channels())
        })
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            c.with_sample_rate(cpal::SampleRate(rate))
        })
}

fn is_convertible(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

fn to_f32<T>(data: &[T]) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    data.iter().map(|&s| s.to_sample::<f32>()).collect()
}

/// Builds an input stream that converts, downmixes and frames the samples.
fn build_stream<T: SizedSample + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frame_size: usize,
    sender: Sender<Capture>,
    convert: fn(&[T]) -> Vec<f32>,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let mut assembler = FrameAssembler::new(frame_size);
    let error_sender = sender.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix(&convert(data), channels);
                assembler.push(&mono, |frame| {
                    // A full queue means the pipeline is behind; drop the frame.
                    let _ = sender.try_send(Capture::Frame(frame));
                });
            },
            move |err| {
                error!("An error occurred on the audio stream: {}", err);
                let _ = error_sender.try_send(Capture::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| TunerError::Source(e.to_string()))
}
