//! # Error Handling
//!
//! Custom error type shared by the rechunker, the pacer task and the pipeline plumbing.
//!
//! ## Error Categories:
//! - **Config**: invalid audio parameters or settings, rejected at construction
//! - **BufferUnderflow**: the segment queue ran dry while filling a frame. This means
//!   byte accounting diverged from the queue contents; it is fatal and never retried
//! - **Transcoder**: the transcoder process could not be started or exited badly
//! - **Io**: reading transcoder output or writing paced frames failed
//! - **SinkClosed**: the frame consumer went away
//! - **PacerStopped**: a write arrived after the pacer task ended
//! - **TaskFailed**: a pipeline task panicked or was cancelled before reporting
//!
//! "Not enough data yet" is not an error. It is the rechunker's idle state.

use std::fmt;

/// Errors produced while pacing PCM audio.
///
/// ## Usage Example:
/// ```rust
/// use pcm_pacer::PacerError;
/// let err = PacerError::Config("sample rate must be greater than 0".to_string());
/// assert!(err.is_fatal_config());
/// ```
#[derive(Debug)]
pub enum PacerError {
    /// Construction-time configuration problem
    Config(String),

    /// The pending queue was exhausted before a frame could be filled
    BufferUnderflow {
        /// Frame size that was being assembled
        needed: usize,
        /// Bytes still missing when the queue ran dry
        missing: usize,
    },

    /// Transcoder process failure (spawn error, bad exit status)
    Transcoder(String),

    /// Underlying I/O failure
    Io(std::io::Error),

    /// The frame consumer dropped its receiving end
    SinkClosed,

    /// The pacer task is gone and accepts no more writes
    PacerStopped,

    /// A spawned pipeline task panicked or was cancelled
    TaskFailed(String),
}

impl PacerError {
    /// True for errors raised while validating configuration.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PacerError::Config(_))
    }
}

impl fmt::Display for PacerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PacerError::BufferUnderflow { needed, missing } => write!(
                f,
                "Buffer underflow: queue exhausted with {} of {} frame bytes still missing",
                missing, needed
            ),
            PacerError::Transcoder(msg) => write!(f, "Transcoder error: {}", msg),
            PacerError::Io(err) => write!(f, "I/O error: {}", err),
            PacerError::SinkClosed => write!(f, "Frame sink closed"),
            PacerError::PacerStopped => write!(f, "Pacer stopped accepting writes"),
            PacerError::TaskFailed(msg) => write!(f, "Pipeline task failed: {}", msg),
        }
    }
}

impl std::error::Error for PacerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PacerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Automatic conversion from I/O errors so `?` works on reads and writes.
impl From<std::io::Error> for PacerError {
    fn from(err: std::io::Error) -> Self {
        PacerError::Io(err)
    }
}

/// Automatic conversion from configuration loading errors.
///
/// ## When this happens:
/// - pacer.toml has invalid syntax
/// - an environment override cannot be parsed into the expected type
impl From<config::ConfigError> for PacerError {
    fn from(err: config::ConfigError) -> Self {
        PacerError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, PacerError>`.
pub type PacerResult<T> = Result<T, PacerError>;
