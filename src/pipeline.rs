//! # Pacing Pipeline
//!
//! Wires the pieces together:
//!
//! transcoder stdout → [`PacerHandle::write`] → pacer task → frame channel → output task
//!
//! A separate task logs progress on a fixed interval. A shutdown signal kills the
//! transcoder and stops pacing at once; the buffered tail is discarded.

use crate::audio::format::PcmFormat;
use crate::audio::pacer::{Pacer, PacerReport};
use crate::audio::rechunker::Rechunker;
use crate::config::AppConfig;
use crate::error::{PacerError, PacerResult};
use crate::output::{open_output, write_frames};
use crate::state::PipelineState;
use crate::transcoder::Transcoder;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::info;

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub pacer: PacerReport,
    pub frames_written: u64,
    pub bytes_read: u64,
    /// True when the shutdown signal ended the run
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Transcode `input` and write it out as paced frames until the input ends or
/// `shutdown` completes.
pub async fn run<F>(config: &AppConfig, input: &str, shutdown: F) -> PacerResult<PipelineSummary>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let format = config.pcm_format()?;
    let state = PipelineState::new();

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let rechunker = Rechunker::new(config.rechunker_config(), frame_tx)?;
    info!(
        "Pacing {} Hz, {}-bit, {} channel(s): {} byte frames every {:?}",
        format.sample_rate(),
        format.bits_per_sample(),
        format.channel_count(),
        rechunker.frame_byte_size(),
        rechunker.frame_duration()
    );
    let (pacer, handle) = Pacer::new(rechunker, config.transcoder.channel_capacity);

    let writer = open_output(config.output.path.as_deref()).await?;
    let mut transcoder = Transcoder::spawn(&config.transcoder, input, &format)?;

    let output_state = state.clone();
    let output_task = tokio::spawn(async move { write_frames(frame_rx, writer, &output_state).await });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut stop_tx = Some(stop_tx);
    let mut pacer_task = tokio::spawn(pacer.run_until(async move {
        // A dropped sender is not a stop request
        if stop_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }));

    let progress_task = tokio::spawn(report_progress(
        state.clone(),
        format,
        Duration::from_secs(config.output.progress_interval_secs),
    ));

    tokio::pin!(shutdown);

    let mut interrupted = false;
    let pump_result = tokio::select! {
        result = transcoder.pump(&handle, &state) => result.map(|_| ()),
        _ = &mut shutdown => {
            info!("Shutdown requested, stopping transcoder");
            interrupted = true;
            transcoder.kill().await;
            Ok(())
        }
    };
    if interrupted {
        request_stop(&mut stop_tx);
    }
    drop(handle);

    // Remaining whole frames drain at the normal pace unless shutdown arrives first
    let pacer_result = tokio::select! {
        result = &mut pacer_task => result,
        _ = &mut shutdown, if !interrupted => {
            info!("Shutdown requested while draining");
            interrupted = true;
            request_stop(&mut stop_tx);
            (&mut pacer_task).await
        }
    };

    progress_task.abort();
    let output_result = output_task.await;

    // Root cause first: a failed output closes the pacer's sink, which stops writes
    let frames_written = output_result.map_err(task_failed)??;
    let report = pacer_result.map_err(task_failed)??;
    pump_result?;

    let summary = PipelineSummary {
        bytes_read: state.snapshot().bytes_in,
        pacer: report,
        frames_written,
        interrupted,
        elapsed: state.uptime(),
    };
    info!(
        "Done: {} frames written, {} bytes read, {} byte tail discarded in {:.1}s",
        summary.frames_written,
        summary.bytes_read,
        summary.pacer.bytes_discarded,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

fn request_stop(stop_tx: &mut Option<oneshot::Sender<()>>) {
    if let Some(tx) = stop_tx.take() {
        let _ = tx.send(());
    }
}

/// A task that never returned its own result panicked or was cancelled.
fn task_failed(err: JoinError) -> PacerError {
    PacerError::TaskFailed(err.to_string())
}

/// Log throughput every `interval` until aborted.
async fn report_progress(state: PipelineState, format: PcmFormat, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let metrics = state.take_report();
        info!(
            "Progress: {} frames ({:.1}s of audio) out, {} bytes backlog, peak {:.0}%",
            metrics.frames_out,
            format.duration_of(metrics.bytes_out as usize).as_secs_f64(),
            metrics.backlog_bytes(),
            metrics.recent_peak * 100.0
        );
    }
}
