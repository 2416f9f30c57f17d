//! # Transcoder Process
//!
//! Spawns the external transcoder (ffmpeg) that turns any input into raw PCM on
//! stdout, and pumps that output into a pacer in whatever bursts the pipe delivers.

use crate::audio::format::PcmFormat;
use crate::audio::pacer::PacerHandle;
use crate::config::TranscoderConfig;
use crate::error::{PacerError, PacerResult};
use crate::state::PipelineState;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Build the transcoder argument list for `input`.
///
/// ## Resulting command:
/// `[-re] [-f <input_format>] -i <input> -vn -f s16le -ac <channels> -ar <rate> pipe:1`
pub fn build_args(config: &TranscoderConfig, input: &str, format: &PcmFormat) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];

    if config.realtime_input {
        args.push("-re".to_string());
    }
    if let Some(input_format) = &config.input_format {
        args.push("-f".to_string());
        args.push(input_format.clone());
    }

    args.extend([
        "-i".to_string(),
        input.to_string(),
        "-vn".to_string(),
        "-f".to_string(),
        format.raw_format_name(),
        "-ac".to_string(),
        format.channel_count().to_string(),
        "-ar".to_string(),
        format.sample_rate().to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// A running transcoder whose stdout carries raw PCM.
pub struct Transcoder {
    child: Child,
    stdout: ChildStdout,
    read_buffer_size: usize,
}

impl Transcoder {
    /// Spawn the configured transcoder for `input`.
    pub fn spawn(config: &TranscoderConfig, input: &str, format: &PcmFormat) -> PacerResult<Self> {
        let args = build_args(config, input, format);
        debug!("Spawning {} {}", config.program, args.join(" "));

        let mut command = Command::new(&config.program);
        command.args(&args);
        Self::spawn_command(command, config.read_buffer_size)
    }

    /// Spawn an already prepared command, capturing its stdout.
    ///
    /// stderr is inherited so transcoder diagnostics reach the console.
    pub fn spawn_command(mut command: Command, read_buffer_size: usize) -> PacerResult<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PacerError::Transcoder(format!("failed to start transcoder: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PacerError::Transcoder("transcoder stdout not captured".to_string()))?;

        info!("Transcoder started (pid {:?})", child.id());
        Ok(Self {
            child,
            stdout,
            read_buffer_size: read_buffer_size.max(1),
        })
    }

    /// Forward stdout to `pacer` until EOF, then check the exit status.
    ///
    /// Returns the number of bytes forwarded.
    pub async fn pump(&mut self, pacer: &PacerHandle, state: &PipelineState) -> PacerResult<u64> {
        let mut buffer = vec![0u8; self.read_buffer_size];
        let mut total = 0u64;

        loop {
            let read = self.stdout.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            pacer.write(buffer[..read].to_vec()).await?;
            state.record_bytes_in(read);
            total += read as u64;
        }

        let status = self.child.wait().await?;
        if !status.success() {
            return Err(PacerError::Transcoder(format!("transcoder exited with {}", status)));
        }

        info!("Transcoder finished after {} bytes", total);
        Ok(total)
    }

    /// Stop the transcoder early.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill transcoder: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFrame;
    use crate::audio::pacer::Pacer;
    use crate::audio::rechunker::{Rechunker, RechunkerConfig};
    use tokio::sync::mpsc;

    fn format() -> PcmFormat {
        PcmFormat::new(48000, 16, 1).unwrap()
    }

    #[test]
    fn test_build_args_defaults() {
        let config = crate::config::AppConfig::default().transcoder;
        let args = build_args(&config, "input.mp3", &format());
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-i", "input.mp3", "-vn", "-f", "s16le",
                "-ac", "1", "-ar", "48000", "pipe:1",
            ]
        );
    }

    #[test]
    fn test_build_args_input_format_and_realtime() {
        let mut config = crate::config::AppConfig::default().transcoder;
        config.input_format = Some("alsa".to_string());
        config.realtime_input = true;

        let args = build_args(&config, "hw:0", &PcmFormat::new(44100, 24, 2).unwrap());
        let joined = args.join(" ");
        assert!(joined.contains("-re -f alsa -i hw:0"));
        assert!(joined.ends_with("-f s24le -ac 2 -ar 44100 pipe:1"));
    }

    #[test]
    fn test_missing_program_is_transcoder_error() {
        let mut config = crate::config::AppConfig::default().transcoder;
        config.program = "/nonexistent/transcoder".to_string();

        // spawn needs a reactor for the child's pipes
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let result = Transcoder::spawn(&config, "input.mp3", &format());
        assert!(matches!(result, Err(PacerError::Transcoder(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pump_feeds_pacer() {
        let (tx, mut rx) = mpsc::unbounded_channel::<AudioFrame>();
        let rechunker = Rechunker::new(RechunkerConfig::new(10.0, 48000), tx).unwrap();
        let (pacer, handle) = Pacer::new(rechunker, 8);
        let pacer_task = tokio::spawn(pacer.run());

        let mut command = Command::new("sh");
        command.arg("-c").arg("head -c 3000 /dev/zero");
        let mut transcoder = Transcoder::spawn_command(command, 512).unwrap();

        let state = PipelineState::new();
        let forwarded = transcoder.pump(&handle, &state).await.unwrap();
        drop(handle);

        assert_eq!(forwarded, 3000);
        assert_eq!(state.snapshot().bytes_in, 3000);

        let report = pacer_task.await.unwrap().unwrap();
        assert_eq!(report.frames_emitted, 3);
        assert_eq!(report.bytes_discarded, 120);
        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().len(), 960);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_reported() {
        let (tx, _rx) = mpsc::unbounded_channel::<AudioFrame>();
        let rechunker = Rechunker::new(RechunkerConfig::new(10.0, 48000), tx).unwrap();
        let (pacer, handle) = Pacer::new(rechunker, 8);
        let _pacer_task = tokio::spawn(pacer.run());

        let mut command = Command::new("sh");
        command.arg("-c").arg("exit 3");
        let mut transcoder = Transcoder::spawn_command(command, 512).unwrap();

        let err = transcoder.pump(&handle, &PipelineState::new()).await.unwrap_err();
        assert!(matches!(err, PacerError::Transcoder(_)));
    }
}
