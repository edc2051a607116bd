//! Completion callbacks for stages and whole runs.
//!
//! A [`Monitor`] is told when each stage exits and when every stage of a run
//! has exited. Callbacks come from the stage tasks themselves, concurrently,
//! so implementations must be thread-safe and should return quickly: a stage
//! closes its outbound queue only after its callback returns.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Error;
use crate::result::RunResult;

/// Emitted once per stage when its processor returns (or panics).
#[derive(Debug, Clone, Copy)]
pub struct ProcessorDone<'a> {
    pub pipeline: &'a str,
    pub processor: &'a str,
    pub stage: usize,
    pub error: Option<&'a Error>,
    pub duration: Duration,
}

impl ProcessorDone<'_> {
    pub fn status(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else {
            "ok"
        }
    }
}

/// Emitted once per run after every stage has exited.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDone<'a> {
    pub pipeline: &'a str,
    pub result: &'a RunResult,
    pub duration: Duration,
}

impl PipelineDone<'_> {
    pub fn status(&self) -> &'static str {
        if self.result.success() {
            "ok"
        } else {
            "failed"
        }
    }
}

/// Observer of pipeline completion events.
pub trait Monitor: Send + Sync {
    fn on_processor_done(&self, event: &ProcessorDone<'_>);

    fn on_pipeline_done(&self, event: &PipelineDone<'_>);
}

/// Logs completion events through `tracing`. The default monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn on_processor_done(&self, event: &ProcessorDone<'_>) {
        let duration_ms = event.duration.as_millis() as u64;
        match event.error {
            Some(err) => warn!(
                pipeline = event.pipeline,
                processor = event.processor,
                duration_ms,
                status = event.status(),
                error = %err,
                "processor done"
            ),
            None => info!(
                pipeline = event.pipeline,
                processor = event.processor,
                duration_ms,
                status = event.status(),
                "processor done"
            ),
        }
    }

    fn on_pipeline_done(&self, event: &PipelineDone<'_>) {
        let duration_ms = event.duration.as_millis() as u64;
        if event.result.success() {
            info!(
                pipeline = event.pipeline,
                duration_ms,
                status = event.status(),
                "pipeline done"
            );
        } else {
            warn!(
                pipeline = event.pipeline,
                duration_ms,
                status = event.status(),
                errors = event.result.errors().len(),
                "pipeline done"
            );
        }
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn on_processor_done(&self, _event: &ProcessorDone<'_>) {}

    fn on_pipeline_done(&self, _event: &PipelineDone<'_>) {}
}

/// Swappable holder for the monitor of one pipeline.
///
/// Readers take a cheap `Arc` clone under the read lock; a swap only
/// replaces the pointer, so runs already in flight pick up the new monitor
/// on their next callback.
#[derive(Clone)]
pub struct MonitorSlot {
    inner: Arc<RwLock<Arc<dyn Monitor>>>,
}

impl MonitorSlot {
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(monitor)),
        }
    }

    /// The monitor currently installed
    pub fn get(&self) -> Arc<dyn Monitor> {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Install a new monitor, returning the previous one
    pub fn set(&self, monitor: Arc<dyn Monitor>) -> Arc<dyn Monitor> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, monitor)
    }
}

impl Default for MonitorSlot {
    fn default() -> Self {
        Self::new(Arc::new(LogMonitor))
    }
}

impl fmt::Debug for MonitorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSlot").finish_non_exhaustive()
    }
}

/// Records completion events through the `metrics` facade.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMonitor;

#[cfg(feature = "metrics")]
impl Monitor for MetricsMonitor {
    fn on_processor_done(&self, event: &ProcessorDone<'_>) {
        metrics::histogram!(
            "framechain_processor_duration_seconds",
            "pipeline" => event.pipeline.to_string(),
            "processor" => event.processor.to_string()
        )
        .record(event.duration.as_secs_f64());

        if event.error.is_some() {
            metrics::counter!(
                "framechain_processor_errors_total",
                "pipeline" => event.pipeline.to_string(),
                "processor" => event.processor.to_string()
            )
            .increment(1);
        }
    }

    fn on_pipeline_done(&self, event: &PipelineDone<'_>) {
        metrics::counter!(
            "framechain_pipeline_runs_total",
            "pipeline" => event.pipeline.to_string(),
            "status" => event.status()
        )
        .increment(1);
    }
}
