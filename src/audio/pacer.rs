//! # Pacer Task
//!
//! Drives a [`Rechunker`] on the tokio runtime. Writes arrive over a channel from any
//! number of [`PacerHandle`]s and are serialized with timer firings inside one task, so
//! the rechunker never sees concurrent access.
//!
//! The armed timer is a single owned `Sleep`. It is created from the rechunker's
//! deadline when one appears and dropped when it fires; a fresh one is created only if
//! the rechunker re-arms.
//!
//! ## Key Features:
//! - **Single writer**: one task owns the rechunker; handles only send buffers
//! - **Zero-copy hand-off**: buffers received from handles move into the rechunker
//! - **Back-pressure**: a bounded channel makes producers wait when the task lags
//! - **Graceful stop**: `run_until` ends on a shutdown future and reports the tail
//!
//! ## Rust Concepts:
//! - **tokio::select!**: waits on shutdown, input and the timer at once
//! - **Pin<Box<Sleep>>**: a `Sleep` must be pinned to be polled by reference
//! - **Guarded branches** (`, if cond`): disabled branches are never polled

use crate::audio::frame::FrameSink;           // Frame consumer bound
use crate::audio::rechunker::Rechunker;       // The synchronous state machine we drive
use crate::error::{PacerError, PacerResult};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;                        // Bounded write channel
use tokio::time::{self, Sleep};               // The one armed timer
use tracing::{debug, info};

/// What happened over a pacer's lifetime.
///
/// ## Fields:
/// - `frames_emitted`: frames handed to the sink
/// - `bytes_written`: bytes received from all handles
/// - `bytes_discarded`: partial tail dropped at the end
/// - `stopped_early`: shutdown cut pacing short
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacerReport {
    pub frames_emitted: u64,
    pub bytes_written: u64,
    pub bytes_discarded: usize,
    pub stopped_early: bool,
}

/// Producer side of a running pacer.
///
/// Cheap to clone; every clone feeds the same task. The pacer treats input as
/// closed once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct PacerHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl PacerHandle {
    /// Push a burst of PCM bytes. Waits only if the channel is full.
    ///
    /// The buffer moves all the way into the rechunker's queue without a copy.
    ///
    /// ## Errors:
    /// `PacerError::PacerStopped` once the pacer task has ended.
    pub async fn write(&self, bytes: Vec<u8>) -> PacerResult<()> {
        self.tx.send(bytes).await.map_err(|_| PacerError::PacerStopped)
    }
}

/// Owns a rechunker and the input channel feeding it.
pub struct Pacer<S> {
    rechunker: Rechunker<S>,
    input: mpsc::Receiver<Vec<u8>>,
}

impl<S: FrameSink> Pacer<S> {
    /// Wrap `rechunker`; `capacity` bounds queued writes not yet handed to it.
    pub fn new(rechunker: Rechunker<S>, capacity: usize) -> (Self, PacerHandle) {
        let (tx, input) = mpsc::channel(capacity.max(1));
        (Self { rechunker, input }, PacerHandle { tx })
    }

    /// Run until every handle is dropped and the last armed timer has fired.
    pub async fn run(self) -> PacerResult<PacerReport> {
        self.run_until(std::future::pending()).await
    }

    /// Run like [`Pacer::run`], but stop as soon as `shutdown` completes.
    ///
    /// Once input closes, frames still fully buffered keep draining at the normal
    /// pace. Whatever cannot fill a frame is discarded and counted in the report.
    pub async fn run_until<F>(mut self, shutdown: F) -> PacerResult<PacerReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        // At most one armed timer exists at any moment
        let mut timer: Option<Pin<Box<Sleep>>> = None;
        let mut input_open = true;
        let mut stopped_early = false;

        loop {
            if timer.is_none() {
                if let Some(deadline) = self.rechunker.timer_deadline() {
                    timer = Some(Box::pin(time::sleep_until(deadline)));
                }
            }
            if !input_open && timer.is_none() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    stopped_early = true;
                    break;
                }
                chunk = self.input.recv(), if input_open => match chunk {
                    Some(bytes) => self.rechunker.write_owned(bytes)?,
                    None => {
                        debug!("Pacer input closed with {} bytes buffered", self.rechunker.buffered_bytes());
                        input_open = false;
                    }
                },
                _ = armed(&mut timer), if timer.is_some() => {
                    timer = None;
                    self.rechunker.fire_timer()?;
                }
            }
        }

        let remainder = self.rechunker.drain_remainder();
        if !remainder.is_empty() {
            info!("Discarding {} byte partial frame", remainder.len());
        }

        Ok(PacerReport {
            frames_emitted: self.rechunker.frames_emitted(),
            bytes_written: self.rechunker.bytes_written(),
            bytes_discarded: remainder.len(),
            stopped_early,
        })
    }
}

/// Wait on the armed timer, or forever when there is none.
async fn armed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
