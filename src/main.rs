//! # pcm-pacer - Main Entry Point
//!
//! Transcodes an input to raw PCM and writes it out as fixed-size frames at
//! real-time cadence, ready for a real-time audio sink to consume.
//!
//! ## Startup sequence:
//! 1. Load `.env`, parse command-line flags
//! 2. Set up logging (stderr, so stdout can carry audio)
//! 3. Load configuration, apply flag overrides, validate
//! 4. Run the pipeline until the input ends or a shutdown signal arrives

use anyhow::{Context, Result};
use clap::Parser;
use pcm_pacer::config::AppConfig;
use pcm_pacer::pipeline;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pcm-pacer
#[derive(Parser, Debug)]
#[command(name = "pcm-pacer")]
#[command(about = "Re-emit transcoded PCM audio as fixed-size frames at real-time pace")]
#[command(version)]
struct Args {
    /// Input file, stream URL or capture device handed to the transcoder
    input: String,

    /// Input format for the transcoder (e.g. "alsa" or "jack")
    #[arg(short = 'f', long)]
    input_format: Option<String>,

    /// Output sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Output channel count
    #[arg(long)]
    channels: Option<u16>,

    /// Bits per output sample
    #[arg(long)]
    bits: Option<u16>,

    /// Duration of each paced frame in milliseconds
    #[arg(long)]
    frame_ms: Option<f64>,

    /// Frames to buffer before pacing starts
    #[arg(long)]
    low_water_mark: Option<u32>,

    /// Read the input at its native rate
    #[arg(long)]
    realtime: bool,

    /// Write paced audio to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (defaults to ./pacer.toml if present)
    #[arg(short, long, env = "PACER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose)?;

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!("Starting pcm-pacer v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {}", args.input);

    let summary = pipeline::run(&config, &args.input, wait_for_shutdown())
        .await
        .context("Pacing pipeline failed")?;

    if summary.interrupted {
        info!("Stopped by signal");
    }
    Ok(())
}

/// Command-line flags win over file and environment settings.
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(format) = &args.input_format {
        config.transcoder.input_format = Some(format.clone());
    }
    if let Some(rate) = args.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(channels) = args.channels {
        config.audio.channel_count = channels;
    }
    if let Some(bits) = args.bits {
        config.audio.bits_per_sample = bits;
    }
    if let Some(frame_ms) = args.frame_ms {
        config.audio.frame_duration_ms = frame_ms;
    }
    if let Some(frames) = args.low_water_mark {
        config.audio.low_water_mark_frames = frames;
    }
    if args.realtime {
        config.transcoder.realtime_input = true;
    }
    if let Some(path) = &args.output {
        config.output.path = Some(path.clone());
    }
}

/// Initialize structured logging.
///
/// ## Environment Variables:
/// - `RUST_LOG`: overrides the filter (e.g. "pcm_pacer=trace")
/// - If not set, defaults to "pcm_pacer=info", or "pcm_pacer=debug" with `--verbose`
fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "pcm_pacer=debug" } else { "pcm_pacer=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_and_override() {
        let args = Args::parse_from([
            "pcm-pacer", "-f", "alsa", "--sample-rate", "16000", "--frame-ms", "20",
            "-o", "out.pcm", "hw:0",
        ]);
        assert_eq!(args.input, "hw:0");

        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.transcoder.input_format.as_deref(), Some("alsa"));
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_duration_ms, 20.0);
        assert_eq!(config.audio.channel_count, 1);
        assert_eq!(config.output.path, Some(PathBuf::from("out.pcm")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_input_required() {
        assert!(Args::try_parse_from(["pcm-pacer"]).is_err());
    }
}
