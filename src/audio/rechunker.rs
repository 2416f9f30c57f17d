//! # Rechunking Buffer
//!
//! Accepts PCM bytes in bursts of any size and re-emits them as fixed-size frames,
//! one per frame duration.
//!
//! ## How it works:
//! - Every write becomes an owned segment at the back of a FIFO queue (`write` copies
//!   a borrowed slice, `write_owned` moves a buffer the caller gives up)
//! - A frame is assembled from the head segments once enough bytes are buffered
//! - A segment that overflows the frame leaves its unconsumed tail at the head of
//!   the queue as a new, separately owned segment
//! - After each emission a single-shot timer is armed for one frame duration. When it
//!   fires the rechunker tries again and re-arms on success, so pacing pauses by
//!   itself when input runs dry and resumes on the next write
//!
//! ## State machine:
//! Idle → (write crosses threshold) → Armed → (fire, enough data) → Armed
//!      ← (fire, not enough data) ←
//!
//! The rechunker does no I/O and owns no task. The armed timer is recorded as a
//! deadline; [`crate::audio::pacer::Pacer`] turns that deadline into a real sleep.
//!
//! ## Rust Concepts:
//! - **Generic sink `S`**: any [`FrameSink`] (a closure, a channel sender) receives frames
//! - **VecDeque<Vec<u8>>**: O(1) push at the back and pop/push at the front
//! - **Option<Instant>**: `Some` while a timer is armed; there is never more than one
//! - **&mut self everywhere**: one caller at a time, so no locks are needed

use crate::audio::format::PcmFormat;              // PCM layout and frame sizing
use crate::audio::frame::{AudioFrame, FrameSink}; // Emitted frames and their consumer
use crate::error::{PacerError, PacerResult};      // Config / underflow errors
use std::collections::VecDeque;                   // FIFO of pending segments
use std::time::Duration;
use tokio::time::Instant;                         // Follows tokio's clock, pausable in tests
use tracing::{debug, trace};                      // Structured logging

/// Construction parameters for a [`Rechunker`].
///
/// ## Fields:
/// - `frame_duration_ms`: real-time length of one frame, also the timer period
/// - `sample_rate`, `bits_per_sample`, `channel_count`: PCM layout used to size frames
/// - `low_water_mark_frames`: buffered frames required before any emission
///
/// ## Example:
/// `RechunkerConfig::new(10.0, 48000)` gives 960 byte frames (16-bit mono).
#[derive(Debug, Clone, PartialEq)]
pub struct RechunkerConfig {
    /// Real-time duration of one emitted frame
    pub frame_duration_ms: f64,

    /// Samples per second
    pub sample_rate: u32,

    /// Sample width, 16 unless told otherwise
    pub bits_per_sample: u16,

    /// Interleaved channels, mono unless told otherwise
    pub channel_count: u16,

    /// Buffered frames required before emitting; `None` means one frame
    pub low_water_mark_frames: Option<u32>,
}

impl RechunkerConfig {
    /// Config with the default 16-bit mono layout and a one-frame low-water-mark.
    pub fn new(frame_duration_ms: f64, sample_rate: u32) -> Self {
        Self {
            frame_duration_ms,
            sample_rate,
            bits_per_sample: 16,
            channel_count: 1,
            low_water_mark_frames: None,
        }
    }

    pub fn with_bits_per_sample(mut self, bits_per_sample: u16) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn with_channel_count(mut self, channel_count: u16) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_low_water_mark_frames(mut self, frames: u32) -> Self {
        self.low_water_mark_frames = Some(frames);
        self
    }

    /// Low-water-mark in bytes for frames of `frame_byte_size`.
    ///
    /// Fails with `PacerError::Config` when the product does not fit in `usize`.
    pub fn low_water_mark_bytes(&self, frame_byte_size: usize) -> PacerResult<usize> {
        let frames = self.low_water_mark_frames.unwrap_or(1);
        (frames as usize).checked_mul(frame_byte_size).ok_or_else(|| {
            PacerError::Config(format!(
                "low-water-mark of {} frames of {} bytes overflows the addressable buffer size",
                frames, frame_byte_size
            ))
        })
    }
}

/// Fixed-size frame emitter fed by arbitrary writes.
///
/// ## Invariant:
/// `buffered_bytes` always equals the summed length of the queued segments. Frame
/// assembly trusts it; if the two ever disagree the next emission fails with
/// `PacerError::BufferUnderflow`.
///
/// ## Memory Management:
/// Segments are owned `Vec<u8>`s. A carried tail is copied out of its segment, so no
/// queued bytes ever point into a buffer someone else can still change.
pub struct Rechunker<S> {
    format: PcmFormat,

    /// Timer period between emissions
    frame_duration: Duration,

    /// Exact length of every emitted frame (immutable after construction)
    frame_byte_size: usize,

    /// Buffered bytes required before any emission
    low_water_mark_bytes: usize,

    /// Unconsumed byte runs, oldest first
    pending: VecDeque<Vec<u8>>,
    buffered_bytes: usize,

    /// Deadline of the single armed timer, if any
    timer: Option<Instant>,

    frames_emitted: u64,
    bytes_written: u64,
    sink: S,
}

impl<S: FrameSink> Rechunker<S> {
    /// Build a rechunker, validating the configuration.
    ///
    /// ## Errors:
    /// `PacerError::Config` for a zero sample rate or channel count, a sample width
    /// that is not whole bytes, a frame duration that does not yield a positive,
    /// whole number of samples, or sizes and periods too large to represent.
    pub fn new(config: RechunkerConfig, sink: S) -> PacerResult<Self> {
        let format = PcmFormat::new(config.sample_rate, config.bits_per_sample, config.channel_count)?;
        let frame_byte_size = format.frame_byte_size(config.frame_duration_ms)?;
        let low_water_mark_bytes = config.low_water_mark_bytes(frame_byte_size)?;

        // `as u64` saturates; a period that cannot be added to "now" could never fire
        let frame_duration = Duration::from_micros((config.frame_duration_ms * 1000.0).round() as u64);
        if Instant::now().checked_add(frame_duration).is_none() {
            return Err(PacerError::Config(format!(
                "frame duration of {} ms is too long to schedule",
                config.frame_duration_ms
            )));
        }

        debug!(
            "Rechunker ready: {} byte frames every {:?}, low-water-mark {} bytes",
            frame_byte_size, frame_duration, low_water_mark_bytes
        );

        Ok(Self {
            format,
            frame_duration,
            frame_byte_size,
            low_water_mark_bytes,
            pending: VecDeque::new(),
            buffered_bytes: 0,
            timer: None,
            frames_emitted: 0,
            bytes_written: 0,
            sink,
        })
    }

    /// Queue a copy of a borrowed run of bytes.
    ///
    /// The bytes are copied, so the caller may reuse its buffer right away. If no
    /// timer is armed this may emit one frame synchronously; while a timer is armed
    /// the bytes wait for the next firing.
    pub fn write(&mut self, bytes: &[u8]) -> PacerResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.write_owned(bytes.to_vec())
    }

    /// Queue a buffer the caller hands over, without copying it.
    ///
    /// Same emission behavior as [`Rechunker::write`]. Ownership moves into the queue,
    /// so nothing outside the rechunker can touch the bytes afterwards.
    pub fn write_owned(&mut self, bytes: Vec<u8>) -> PacerResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let len = bytes.len();
        self.pending.push_back(bytes);
        self.buffered_bytes += len;
        self.bytes_written += len as u64;
        trace!("Queued {} bytes ({} buffered)", len, self.buffered_bytes);

        if self.timer.is_none() {
            self.try_emit()?;
        }
        Ok(())
    }

    /// Emit one frame if the low-water-mark and a full frame are both available.
    ///
    /// Returns `Ok(true)` when a frame went to the sink. Both thresholds are checked
    /// on their own, so a low-water-mark below one frame never produces a short frame.
    pub fn try_emit(&mut self) -> PacerResult<bool> {
        if self.buffered_bytes < self.low_water_mark_bytes || self.buffered_bytes < self.frame_byte_size {
            return Ok(false);
        }

        let mut frame = vec![0u8; self.frame_byte_size];
        let mut cursor = 0;

        while cursor < self.frame_byte_size {
            let head = self.pending.pop_front().ok_or(PacerError::BufferUnderflow {
                needed: self.frame_byte_size,
                missing: self.frame_byte_size - cursor,
            })?;

            let take = (self.frame_byte_size - cursor).min(head.len());
            frame[cursor..cursor + take].copy_from_slice(&head[..take]);
            cursor += take;

            if take < head.len() {
                let carried = head[take..].to_vec();
                trace!("Carrying {} bytes to the next frame", carried.len());
                self.pending.push_front(carried);
            }
        }

        self.buffered_bytes -= self.frame_byte_size;
        self.frames_emitted += 1;
        self.sink.on_emit(AudioFrame::new(frame, self.format))?;

        if self.timer.is_none() {
            self.timer = Some(Instant::now() + self.frame_duration);
        }
        Ok(true)
    }

    /// Handle the armed timer firing: disarm, then try to emit again.
    ///
    /// When not enough bytes are buffered the rechunker goes idle and stays that way
    /// until a write satisfies the thresholds again.
    pub fn fire_timer(&mut self) -> PacerResult<()> {
        self.timer = None;
        if !self.try_emit()? {
            debug!(
                "Pacing idle: {} bytes buffered, need {}",
                self.buffered_bytes,
                self.low_water_mark_bytes.max(self.frame_byte_size)
            );
        }
        Ok(())
    }

    /// Take whatever is still queued, disarming the timer.
    ///
    /// A partial tail is never flushed as a short frame.
    pub fn drain_remainder(&mut self) -> Vec<u8> {
        let mut remainder = Vec::with_capacity(self.buffered_bytes);
        for segment in self.pending.drain(..) {
            remainder.extend_from_slice(&segment);
        }
        self.buffered_bytes = 0;
        self.timer = None;
        remainder
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frame_byte_size(&self) -> usize {
        self.frame_byte_size
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn low_water_mark_bytes(&self) -> usize {
        self.low_water_mark_bytes
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// When the armed timer is due to fire.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Total bytes accepted through `write`.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

    type TestRechunker = Rechunker<UnboundedSender<AudioFrame>>;

    /// 10 ms at 48 kHz, 16-bit mono: 960 byte frames.
    fn rechunker(config: RechunkerConfig) -> (TestRechunker, UnboundedReceiver<AudioFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Rechunker::new(config, tx).unwrap(), rx)
    }

    fn default_rechunker() -> (TestRechunker, UnboundedReceiver<AudioFrame>) {
        rechunker(RechunkerConfig::new(10.0, 48000))
    }

    fn collect(rx: &mut UnboundedReceiver<AudioFrame>) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn patterned(len: usize, offset: usize) -> Vec<u8> {
        (0..len).map(|i| ((i + offset) % 251) as u8).collect()
    }

    #[test]
    fn test_three_500_byte_writes() {
        let (mut r, mut rx) = default_rechunker();
        assert_eq!(r.frame_byte_size(), 960);

        r.write(&[1; 500]).unwrap();
        assert!(collect(&mut rx).is_empty());
        assert!(!r.is_timer_armed());

        r.write(&[2; 500]).unwrap();
        let frames = collect(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 960);
        assert!(r.is_timer_armed());

        // Armed timer: the third write only feeds the queue
        r.write(&[3; 500]).unwrap();
        assert!(collect(&mut rx).is_empty());
        assert_eq!(r.buffered_bytes(), 540);
        assert_eq!(r.pending_segments(), 2);
        assert_eq!(r.frames_emitted(), 1);
    }

    #[test]
    fn test_carried_segment_content() {
        let (mut r, mut rx) = default_rechunker();
        r.write(&[1; 500]).unwrap();
        r.write(&[2; 500]).unwrap();
        r.write(&[3; 500]).unwrap();

        let frame = collect(&mut rx).remove(0).into_bytes();
        assert!(frame[..500].iter().all(|&b| b == 1));
        assert!(frame[500..].iter().all(|&b| b == 2));

        let remainder = r.drain_remainder();
        assert_eq!(remainder.len(), 540);
        assert!(remainder[..40].iter().all(|&b| b == 2));
        assert!(remainder[40..].iter().all(|&b| b == 3));
    }

    #[test]
    fn test_single_large_write_drains_on_timer() {
        let (mut r, mut rx) = default_rechunker();
        r.write(&patterned(2000, 0)).unwrap();

        assert_eq!(collect(&mut rx).len(), 1);
        assert_eq!(r.buffered_bytes(), 1040);

        r.fire_timer().unwrap();
        assert_eq!(collect(&mut rx).len(), 1);
        assert_eq!(r.buffered_bytes(), 80);
        assert!(r.is_timer_armed());

        // Not enough left: the timer goes idle without re-arming
        r.fire_timer().unwrap();
        assert!(collect(&mut rx).is_empty());
        assert!(!r.is_timer_armed());
        assert_eq!(r.buffered_bytes(), 80);
    }

    #[test]
    fn test_idle_resumes_on_next_write() {
        let (mut r, mut rx) = default_rechunker();
        r.write(&[0; 1000]).unwrap();
        r.fire_timer().unwrap();
        assert!(!r.is_timer_armed());
        assert_eq!(collect(&mut rx).len(), 1);

        r.write(&[0; 920]).unwrap();
        assert_eq!(collect(&mut rx).len(), 1);
        assert!(r.is_timer_armed());
        assert_eq!(r.buffered_bytes(), 0);
    }

    #[test]
    fn test_byte_order_preserved_across_irregular_writes() {
        let (mut r, mut rx) = default_rechunker();
        let sizes = [1, 959, 3000, 17, 480, 2, 1500, 961, 7];
        let mut input = Vec::new();
        let mut frames = Vec::new();

        for size in sizes {
            let chunk = patterned(size, input.len());
            input.extend_from_slice(&chunk);
            r.write(&chunk).unwrap();
            frames.extend(collect(&mut rx));
            while r.is_timer_armed() {
                r.fire_timer().unwrap();
                frames.extend(collect(&mut rx));
            }
        }

        assert!(frames.iter().all(|f| f.len() == 960));
        let mut output: Vec<u8> = frames.into_iter().flat_map(AudioFrame::into_bytes).collect();
        assert_eq!(output.len() as u64 + r.buffered_bytes() as u64, r.bytes_written());
        output.extend(r.drain_remainder());
        assert_eq!(output, input);
    }

    #[test]
    fn test_at_most_one_emission_per_write() {
        let (mut r, mut rx) = default_rechunker();
        r.write(&[0; 960 * 5]).unwrap();
        assert_eq!(collect(&mut rx).len(), 1);

        let deadline = r.timer_deadline();
        assert!(deadline.is_some());
        for _ in 0..10 {
            r.write(&[0; 960]).unwrap();
        }
        assert!(collect(&mut rx).is_empty());
        // Still the same single timer
        assert_eq!(r.timer_deadline(), deadline);
    }

    #[test]
    fn test_timer_deadline_is_one_frame_out() {
        let (mut r, _rx) = default_rechunker();
        let before = Instant::now();
        r.write(&[0; 960]).unwrap();
        let deadline = r.timer_deadline().unwrap();
        assert!(deadline >= before + Duration::from_millis(10));
    }

    #[test]
    fn test_low_water_mark_gates_emission() {
        let (mut r, mut rx) = rechunker(RechunkerConfig::new(10.0, 48000).with_low_water_mark_frames(3));
        assert_eq!(r.low_water_mark_bytes(), 2880);

        r.write(&[0; 2000]).unwrap();
        assert!(collect(&mut rx).is_empty());
        assert!(!r.try_emit().unwrap());

        r.write(&[0; 880]).unwrap();
        assert_eq!(collect(&mut rx).len(), 1);
        assert_eq!(r.buffered_bytes(), 1920);

        // Below the mark again, so the timer firing emits nothing
        r.fire_timer().unwrap();
        assert!(collect(&mut rx).is_empty());
        assert!(!r.is_timer_armed());
    }

    #[test]
    fn test_zero_low_water_mark_never_emits_short_frame() {
        let (mut r, mut rx) = rechunker(RechunkerConfig::new(10.0, 48000).with_low_water_mark_frames(0));
        r.write(&[0; 959]).unwrap();
        assert!(collect(&mut rx).is_empty());
        r.write(&[0; 1]).unwrap();
        assert_eq!(collect(&mut rx)[0].len(), 960);
    }

    #[test]
    fn test_stereo_frame_size() {
        let config = RechunkerConfig::new(20.0, 48000).with_channel_count(2);
        let (r, _rx) = rechunker(config);
        assert_eq!(r.frame_byte_size(), 3840);
        assert_eq!(r.frame_duration(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel::<AudioFrame>();
        let err = Rechunker::new(RechunkerConfig::new(10.0, 0), tx).err().unwrap();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_zero_channels_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel::<AudioFrame>();
        let config = RechunkerConfig::new(10.0, 48000).with_channel_count(0);
        assert!(Rechunker::new(config, tx).is_err());
    }

    #[test]
    fn test_diverged_accounting_is_underflow() {
        let (mut r, _rx) = default_rechunker();
        r.write(&[0; 100]).unwrap();
        r.buffered_bytes = 960;

        match r.try_emit() {
            Err(PacerError::BufferUnderflow { needed, missing }) => {
                assert_eq!(needed, 960);
                assert_eq!(missing, 860);
            }
            other => panic!("expected underflow, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_closed_sink_surfaces_error() {
        let (mut r, rx) = default_rechunker();
        drop(rx);
        assert!(matches!(r.write(&[0; 960]), Err(PacerError::SinkClosed)));
    }

    #[test]
    fn test_write_owned_moves_buffer_into_queue() {
        let (mut r, mut rx) = rechunker(RechunkerConfig::new(10.0, 48000).with_low_water_mark_frames(2));
        let burst = patterned(1000, 0);
        let address = burst.as_ptr();

        r.write_owned(burst).unwrap();
        assert!(collect(&mut rx).is_empty());
        // The queued segment is the caller's allocation, not a copy
        assert_eq!(r.pending.front().map(|segment| segment.as_ptr()), Some(address));

        r.write_owned(patterned(1000, 1000)).unwrap();
        let frame = collect(&mut rx).remove(0).into_bytes();
        assert_eq!(frame, patterned(960, 0));
        assert_eq!(r.buffered_bytes(), 1040);
        r.write_owned(Vec::new()).unwrap();
        assert_eq!(r.pending_segments(), 2);
    }

    #[test]
    fn test_oversized_frame_duration_is_config_error() {
        let (tx, _rx) = mpsc::unbounded_channel::<AudioFrame>();
        let err = Rechunker::new(RechunkerConfig::new(1e300, 48000), tx).err().unwrap();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_oversized_low_water_mark_is_config_error() {
        let config = RechunkerConfig::new(1e12, 48000).with_low_water_mark_frames(u32::MAX);
        assert!(config.low_water_mark_bytes(96_000_000_000_000).unwrap_err().is_fatal_config());

        let (tx, _rx) = mpsc::unbounded_channel::<AudioFrame>();
        let err = Rechunker::new(config, tx).err().unwrap();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_empty_write_is_noop() {
        let (mut r, _rx) = default_rechunker();
        r.write(&[]).unwrap();
        assert_eq!(r.pending_segments(), 0);
        assert_eq!(r.buffered_bytes(), 0);
    }
}
