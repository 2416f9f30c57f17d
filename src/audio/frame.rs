//! # Audio Frames and Frame Sinks
//!
//! An [`AudioFrame`] is one fixed-size unit of paced audio. Frames are handed to a
//! [`FrameSink`], the consumer side of the rechunker.

use crate::audio::format::PcmFormat;
use crate::error::{PacerError, PacerResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tokio::sync::mpsc::UnboundedSender;

/// One emitted frame of interleaved PCM bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
    format: PcmFormat,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>, format: PcmFormat) -> Self {
        Self { data, format }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decode the frame as signed 16-bit little-endian samples.
    ///
    /// This is the view a real-time audio source expects (one `i16` per channel
    /// sample, interleaved). Fails for formats that are not 16-bit.
    pub fn samples_i16(&self) -> PacerResult<Vec<i16>> {
        if self.format.bits_per_sample() != 16 {
            return Err(PacerError::Config(format!(
                "cannot view {}-bit audio as 16-bit samples",
                self.format.bits_per_sample()
            )));
        }

        let mut cursor = Cursor::new(self.data.as_slice());
        let mut samples = Vec::with_capacity(self.data.len() / 2);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Peak absolute amplitude in [0.0, 1.0], for 16-bit frames only.
    pub fn peak_level(&self) -> Option<f32> {
        let samples = self.samples_i16().ok()?;
        let peak = samples
            .iter()
            .map(|&s| (s as i32).unsigned_abs())
            .max()
            .unwrap_or(0);
        Some(peak as f32 / 32768.0)
    }
}

/// Consumer of emitted frames.
///
/// Called synchronously from the rechunker, once per frame, in byte order. An error
/// stops pacing and is surfaced to whoever drives the rechunker.
pub trait FrameSink {
    fn on_emit(&mut self, frame: AudioFrame) -> PacerResult<()>;
}

/// Plain callbacks are sinks that never fail.
impl<F> FrameSink for F
where
    F: FnMut(AudioFrame),
{
    fn on_emit(&mut self, frame: AudioFrame) -> PacerResult<()> {
        self(frame);
        Ok(())
    }
}

/// Forward frames to another task. A dropped receiver ends pacing.
impl FrameSink for UnboundedSender<AudioFrame> {
    fn on_emit(&mut self, frame: AudioFrame) -> PacerResult<()> {
        self.send(frame).map_err(|_| PacerError::SinkClosed)
    }
}
