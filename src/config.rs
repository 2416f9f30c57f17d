//! # Configuration Management
//!
//! Loads pacer settings from several sources:
//! - Default values (built into the code)
//! - A TOML file (`pacer.toml` in the working directory, or an explicit path)
//! - Environment variables (with `PACER__` prefix)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Command-line flags (applied by the binary after loading)
//! 2. Environment variables (PACER__AUDIO__SAMPLE_RATE, PACER__OUTPUT__PATH, etc.)
//! 3. Configuration file
//! 4. Default values (defined in the Default impl)

use crate::audio::format::PcmFormat;
use crate::audio::rechunker::RechunkerConfig;
use crate::error::{PacerError, PacerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub transcoder: TranscoderConfig,
    pub output: OutputConfig,
}

/// PCM layout and pacing settings.
///
/// ## Fields:
/// - `sample_rate`: samples per second requested from the transcoder
/// - `bits_per_sample`: sample width, a multiple of 8
/// - `channel_count`: interleaved channels
/// - `frame_duration_ms`: real-time length of each paced frame
/// - `low_water_mark_frames`: frames that must be buffered before any emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channel_count: u16,
    pub frame_duration_ms: f64,
    pub low_water_mark_frames: u32,
}

/// Transcoder process settings.
///
/// ## Fields:
/// - `program`: executable to run (ffmpeg or a compatible wrapper)
/// - `input_format`: forced input demuxer, e.g. "alsa" or "jack"
/// - `realtime_input`: read the input at its native rate instead of as fast as possible
/// - `read_buffer_size`: largest burst read from the transcoder's stdout at once
/// - `channel_capacity`: bursts queued between the reader and the pacer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub program: String,
    #[serde(default)]
    pub input_format: Option<String>,
    pub realtime_input: bool,
    pub read_buffer_size: usize,
    pub channel_capacity: usize,
}

/// Where paced frames go and how often progress is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File to write paced PCM to; stdout when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub progress_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                sample_rate: 48000,        // What RTC audio sources expect
                bits_per_sample: 16,
                channel_count: 1,
                frame_duration_ms: 10.0,   // 960 bytes per frame
                low_water_mark_frames: 1,
            },
            transcoder: TranscoderConfig {
                program: "ffmpeg".to_string(),
                input_format: None,
                realtime_input: false,
                read_buffer_size: 4096,
                channel_capacity: 64,
            },
            output: OutputConfig {
                path: None,
                progress_interval_secs: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// With `path` set the file must exist; otherwise `pacer.toml` is optional.
    ///
    /// ## Environment Variable Examples:
    /// - `PACER__AUDIO__SAMPLE_RATE=44100`
    /// - `PACER__TRANSCODER__PROGRAM=/usr/local/bin/ffmpeg`
    pub fn load(path: Option<&Path>) -> PacerResult<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("pacer").required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(config::Environment::with_prefix("PACER").prefix_separator("__").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Audio parameters go through the same checks the rechunker applies, so a config
    /// that passes here always constructs.
    pub fn validate(&self) -> PacerResult<()> {
        let format = self.pcm_format()?;
        let frame_byte_size = format.frame_byte_size(self.audio.frame_duration_ms)?;
        self.rechunker_config().low_water_mark_bytes(frame_byte_size)?;

        if self.transcoder.program.trim().is_empty() {
            return Err(PacerError::Config("Transcoder program cannot be empty".to_string()));
        }

        if self.transcoder.read_buffer_size == 0 {
            return Err(PacerError::Config("Read buffer size must be greater than 0".to_string()));
        }

        if self.transcoder.channel_capacity == 0 {
            return Err(PacerError::Config("Channel capacity must be greater than 0".to_string()));
        }

        if self.output.progress_interval_secs == 0 {
            return Err(PacerError::Config("Progress interval must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn pcm_format(&self) -> PacerResult<PcmFormat> {
        PcmFormat::new(
            self.audio.sample_rate,
            self.audio.bits_per_sample,
            self.audio.channel_count,
        )
    }

    pub fn rechunker_config(&self) -> RechunkerConfig {
        RechunkerConfig::new(self.audio.frame_duration_ms, self.audio.sample_rate)
            .with_bits_per_sample(self.audio.bits_per_sample)
            .with_channel_count(self.audio.channel_count)
            .with_low_water_mark_frames(self.audio.low_water_mark_frames)
    }
}
