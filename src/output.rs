//! # Paced Output
//!
//! Writes frames to stdout or a file in the order and at the moment the pacer emits
//! them. Each frame is flushed on its own so downstream consumers see real-time
//! cadence rather than buffered bursts.

use crate::audio::frame::AudioFrame;
use crate::error::PacerResult;
use crate::state::PipelineState;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Boxed writer for either destination.
pub type OutputWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Open the output: a truncated file at `path`, or stdout.
pub async fn open_output(path: Option<&Path>) -> PacerResult<OutputWriter> {
    match path {
        Some(path) => {
            debug!("Writing paced audio to {}", path.display());
            let file = tokio::fs::File::create(path).await?;
            Ok(Box::new(file))
        }
        None => {
            debug!("Writing paced audio to stdout");
            Ok(Box::new(tokio::io::stdout()))
        }
    }
}

/// Write every frame received until the pacer drops its sender.
///
/// Returns the number of frames written.
pub async fn write_frames<W>(
    mut frames: UnboundedReceiver<AudioFrame>,
    mut writer: W,
    state: &PipelineState,
) -> PacerResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(frame) = frames.recv().await {
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        state.record_frame_out(frame.len(), frame.peak_level());
        written += 1;
    }
    writer.shutdown().await?;
    Ok(written)
}
