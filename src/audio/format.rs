//! # PCM Format Description
//!
//! Describes the raw PCM layout coming out of the transcoder and derives byte sizes
//! from it. Samples are interleaved, little-endian, signed integers.

use crate::error::{PacerError, PacerResult};
use std::time::Duration;

/// Tolerance when checking that a frame duration covers whole sample frames.
const WHOLE_SAMPLE_EPSILON: f64 = 1e-6;

/// Raw PCM layout: rate, sample width and channel count.
///
/// ## Example:
/// 48 kHz, 16-bit, mono → 2 bytes per sample frame, 960 bytes per 10 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    sample_rate: u32,
    bits_per_sample: u16,
    channel_count: u16,
}

impl PcmFormat {
    /// Create a validated format.
    ///
    /// ## Validation Checks:
    /// 1. **Sample rate**: must be greater than 0
    /// 2. **Bits per sample**: must be a non-zero multiple of 8
    /// 3. **Channel count**: must be greater than 0
    pub fn new(sample_rate: u32, bits_per_sample: u16, channel_count: u16) -> PacerResult<Self> {
        if sample_rate == 0 {
            return Err(PacerError::Config("sample rate must be greater than 0".to_string()));
        }
        if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
            return Err(PacerError::Config(format!(
                "bits per sample must be a non-zero multiple of 8, got {}",
                bits_per_sample
            )));
        }
        if channel_count == 0 {
            return Err(PacerError::Config("channel count must be greater than 0".to_string()));
        }

        Ok(Self {
            sample_rate,
            bits_per_sample,
            channel_count,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Bytes in one sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Bytes in one sample frame across all channels.
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count as usize
    }

    /// Byte size of an audio frame lasting `frame_duration_ms`.
    ///
    /// ## Calculation:
    /// duration_s × sample_rate × bytes_per_sample × channels
    ///
    /// The duration must cover a whole number of sample frames, otherwise the
    /// emitted frames would split samples.
    pub fn frame_byte_size(&self, frame_duration_ms: f64) -> PacerResult<usize> {
        if !frame_duration_ms.is_finite() || frame_duration_ms <= 0.0 {
            return Err(PacerError::Config(format!(
                "frame duration must be a positive number of milliseconds, got {}",
                frame_duration_ms
            )));
        }

        let samples = frame_duration_ms * self.sample_rate as f64 / 1000.0;
        let whole = samples.round();
        if (samples - whole).abs() > WHOLE_SAMPLE_EPSILON {
            return Err(PacerError::Config(format!(
                "{} ms at {} Hz is {} samples; frame duration must span whole samples",
                frame_duration_ms, self.sample_rate, samples
            )));
        }

        // `as usize` saturates, so oversized counts must be caught before the cast
        if whole >= usize::MAX as f64 {
            return Err(PacerError::Config(format!(
                "{} ms at {} Hz is too many samples for one frame",
                frame_duration_ms, self.sample_rate
            )));
        }

        let size = (whole as usize)
            .checked_mul(self.bytes_per_frame())
            .ok_or_else(|| {
                PacerError::Config(format!(
                    "{} ms frames at {} Hz overflow the addressable frame size",
                    frame_duration_ms, self.sample_rate
                ))
            })?;
        if size == 0 {
            return Err(PacerError::Config("frame byte size must be greater than 0".to_string()));
        }
        Ok(size)
    }

    /// Real-time duration covered by `bytes` of audio in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame();
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Raw output format name understood by the transcoder (`s16le`, `s24le`, ...).
    pub fn raw_format_name(&self) -> String {
        format!("s{}le", self.bits_per_sample)
    }
}
