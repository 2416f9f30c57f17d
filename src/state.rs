//! # Pipeline State
//!
//! Counters shared between the transcoder reader, the output writer and the progress
//! reporter. Each runs as its own task, so the metrics live behind `Arc<RwLock<_>>`.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Shared handle to pipeline metrics. Cloning shares the same counters.
#[derive(Debug, Clone)]
pub struct PipelineState {
    metrics: Arc<RwLock<PipelineMetrics>>,

    /// When the pipeline started (never changes)
    pub start_time: Instant,
}

/// Counters collected while the pipeline runs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineMetrics {
    /// Bytes read from the transcoder
    pub bytes_in: u64,

    /// Paced frames written to the output
    pub frames_out: u64,

    /// Bytes written to the output
    pub bytes_out: u64,

    /// Loudest sample seen since the last progress report, 0.0..=1.0
    pub recent_peak: f32,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(PipelineMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record_bytes_in(&self, bytes: usize) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.bytes_in += bytes as u64;
        }
    }

    /// Record one frame written to the output, with its peak level if known.
    pub fn record_frame_out(&self, bytes: usize, peak: Option<f32>) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.frames_out += 1;
            metrics.bytes_out += bytes as u64;
            if let Some(peak) = peak {
                metrics.recent_peak = metrics.recent_peak.max(peak);
            }
        }
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> PipelineMetrics {
        self.metrics.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Copy of the current counters, resetting the peak window.
    pub fn take_report(&self) -> PipelineMetrics {
        match self.metrics.write() {
            Ok(mut metrics) => {
                let report = metrics.clone();
                metrics.recent_peak = 0.0;
                report
            }
            Err(_) => PipelineMetrics::default(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Bytes read but not yet written out (queued in the pacer or in flight).
    pub fn backlog_bytes(&self) -> u64 {
        self.bytes_in.saturating_sub(self.bytes_out)
    }
}
