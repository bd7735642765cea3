//! # Tuner - console front end
//!
//! Listens to the default microphone and prints the nearest note and how far
//! off it is whenever the reading changes.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing and printing
//! - **Pipeline Thread**: audio capture and analysis (`tuner-core`)
//! - **Communication**: crossbeam channels, multiplexed with `select!`

mod display;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};
use tuner_core::{audio::CpalFrameSource, InstrumentType, TunerConfig, TunerPipeline};

use display::ChangeFilter;

#[derive(Debug, Parser)]
#[command(name = "tuner", version, about = "Instrument tuner for the terminal")]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Instrument profile to tune against
    #[arg(short, long)]
    instrument: Option<InstrumentType>,

    /// Frequency of A4 in Hz
    #[arg(short, long)]
    reference: Option<f64>,

    /// Samples per analysis frame
    #[arg(long)]
    frame_size: Option<usize>,

    /// YIN absolute threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum confidence for a reading to be classified (default: 1 - threshold)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Stop after this many seconds (default: until Enter is pressed)
    #[arg(short, long)]
    duration: Option<f64>,
}

/// Merges the config file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<TunerConfig> {
    let mut config = match &args.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TunerConfig::default(),
    };

    if let Some(instrument) = args.instrument {
        config.instrument = instrument;
    }
    if let Some(reference) = args.reference {
        config.reference_pitch_hz = Some(reference);
    }
    if let Some(frame_size) = args.frame_size {
        config.frame_size = frame_size;
    }
    if let Some(threshold) = args.threshold {
        config.yin_threshold = threshold;
    }
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = Some(min_confidence);
    }
    config.validate()?;
    Ok(config)
}

/// A channel that fires once after `duration` seconds, or never.
fn deadline(duration: Option<f64>) -> Result<Receiver<Instant>> {
    match duration {
        Some(seconds) => {
            let timeout = Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("invalid --duration {seconds}"))?;
            Ok(crossbeam_channel::after(timeout))
        }
        None => Ok(crossbeam_channel::never()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;
    log::info!(
        "Tuning {} against A4 = {} Hz",
        config.instrument.name(),
        config.profile().reference_pitch_hz
    );

    let frame_size = config.frame_size;
    let handle = TunerPipeline::spawn(
        move || Ok(CpalFrameSource::new(frame_size)),
        config.estimator(),
        config.profile(),
        config.settings(),
    )?;

    let (enter_tx, enter_rx) = crossbeam_channel::bounded::<()>(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });
    let deadline = deadline(args.duration)?;

    println!("Listening... press Enter to stop.");
    let mut filter = ChangeFilter::default();
    let outcome = loop {
        crossbeam_channel::select! {
            recv(handle.results()) -> msg => match msg {
                Ok(Ok(reading)) => {
                    if let Some(line) = filter.update(&reading) {
                        println!("{line}");
                    }
                }
                Ok(Err(e)) => break Err(e).context("tuning stopped"),
                Err(_) => break Ok(()),
            },
            recv(enter_rx) -> _ => break Ok(()),
            recv(deadline) -> _ => break Ok(()),
        }
    };

    log::info!("Shutting down pipeline...");
    handle.stop();
    outcome
}
