//! Metrics Buffering Module
//!
//! Decouples metric production from emission to the telemetry sink.
//! Metrics accumulate in an ordered batch that flushes when it reaches
//! capacity or when the owner asks for a flush; delivery is at-most-once
//! with a bounded retry budget per batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::errors::{VigilError, VigilResult};
use crate::models::Metric;

/// Destination for batches of metrics. Implementations must bound their own
/// I/O time so a flush cannot stall the monitoring loop indefinitely.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, batch: &[Metric]) -> VigilResult<()>;

    /// Short name used in log context.
    fn name(&self) -> &str {
        "telemetry"
    }
}

/// Buffering behavior knobs.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Batch size that triggers a synchronous flush.
    pub capacity: usize,
    /// Delivery attempts per batch before it is dropped.
    pub max_retries: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_retries: 3,
        }
    }
}

/// Ordered, thread-safe metric buffer in front of a [`TelemetrySink`].
///
/// A flush swaps the full batch out under the lock and delivers it after
/// releasing it, so records racing a flush start the next batch instead of
/// blocking on the sink.
pub struct MetricsBuffer {
    config: BufferConfig,
    sink: Box<dyn TelemetrySink>,
    pending: Mutex<Vec<Metric>>,
    flushed_metrics: AtomicU64,
    dropped_metrics: AtomicU64,
}

impl MetricsBuffer {
    pub fn new(sink: Box<dyn TelemetrySink>, config: BufferConfig) -> Self {
        Self {
            config,
            sink,
            pending: Mutex::new(Vec::new()),
            flushed_metrics: AtomicU64::new(0),
            dropped_metrics: AtomicU64::new(0),
        }
    }

    /// Append a metric to the accumulating batch, flushing synchronously if
    /// the batch reaches capacity.
    pub fn record(&self, metric: Metric) {
        let full_batch = {
            let mut pending = self.pending.lock().expect("metrics buffer lock poisoned");
            pending.push(metric);
            if pending.len() >= self.config.capacity {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };

        if let Some(batch) = full_batch {
            self.dispatch(batch);
        }
    }

    /// Emit a single metric immediately, bypassing the buffer.
    pub fn record_unbuffered(&self, metric: Metric) {
        self.dispatch(vec![metric]);
    }

    /// Flush whatever has accumulated. Called on shutdown so no metric is
    /// lost when the loop stops.
    pub fn flush(&self) {
        let batch = {
            let mut pending = self.pending.lock().expect("metrics buffer lock poisoned");
            std::mem::take(&mut *pending)
        };
        if !batch.is_empty() {
            self.dispatch(batch);
        }
    }

    /// Number of metrics currently buffered.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("metrics buffer lock poisoned").len()
    }

    /// Metrics successfully delivered to the sink.
    pub fn flushed_count(&self) -> u64 {
        self.flushed_metrics.load(Ordering::Relaxed)
    }

    /// Metrics dropped after the retry budget was exhausted.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_metrics.load(Ordering::Relaxed)
    }

    /// Deliver one batch, retrying the same batch up to the budget. A batch
    /// that cannot be delivered is logged and dropped; monitoring data is
    /// best-effort, not transactional.
    fn dispatch(&self, batch: Vec<Metric>) {
        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.sink.emit(&batch) {
                Ok(()) => {
                    self.flushed_metrics.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    log::debug!(
                        "Flushed {} metric(s) to sink '{}' (attempt {})",
                        batch.len(),
                        self.sink.name(),
                        attempt
                    );
                    return;
                }
                Err(e) => {
                    log::warn!(
                        "Sink '{}' rejected batch of {} metric(s) on attempt {}/{}: {}",
                        self.sink.name(),
                        batch.len(),
                        attempt,
                        attempts,
                        e
                    );
                }
            }
        }

        self.dropped_metrics.fetch_add(batch.len() as u64, Ordering::Relaxed);
        log::error!(
            "Dropping batch of {} metric(s) after {} failed attempt(s) against sink '{}'",
            batch.len(),
            attempts,
            self.sink.name()
        );
    }
}

/// Sink that logs batch summaries; the default when no output file is set.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, batch: &[Metric]) -> VigilResult<()> {
        for metric in batch {
            log::info!(
                "metric {} = {} [{}] at {}",
                metric.name,
                metric.value,
                metric.category,
                metric.timestamp.to_rfc3339()
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sink that appends one JSON object per metric to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: std::path::PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TelemetrySink for JsonLinesSink {
    fn emit(&self, batch: &[Metric]) -> VigilResult<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| VigilError::io(e, Some(self.path.clone())))?;

        for metric in batch {
            let line = serde_json::to_string(metric)?;
            writeln!(file, "{}", line).map_err(|e| VigilError::io(e, Some(self.path.clone())))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
