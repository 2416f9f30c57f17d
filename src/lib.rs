//! # pcm-pacer
//!
//! Re-emits a raw PCM byte stream, arriving in irregular bursts from a transcoder,
//! as fixed-size frames delivered at real-time cadence.
//!
//! ## Modules:
//! - **audio**: PCM format, frames, the rechunking buffer and its pacer task
//! - **config**: layered configuration (defaults, TOML file, environment)
//! - **error**: the crate error type
//! - **transcoder**: spawning the external transcoder and reading its output
//! - **output**: writing paced frames to stdout or a file
//! - **state**: counters shared between pipeline tasks
//! - **pipeline**: everything wired together

pub mod audio;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod state;
pub mod transcoder;

pub use audio::format::PcmFormat;
pub use audio::frame::{AudioFrame, FrameSink};
pub use audio::pacer::{Pacer, PacerHandle, PacerReport};
pub use audio::rechunker::{Rechunker, RechunkerConfig};
pub use config::AppConfig;
pub use error::{PacerError, PacerResult};
