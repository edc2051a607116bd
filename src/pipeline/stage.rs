//! One running stage: a processor bound to its queues for a single run.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result, StepError};
use crate::monitor::{MonitorSlot, ProcessorDone};
use crate::result::ErrorCollector;
use crate::traits::{FrameReceiver, FrameSender, Processor};

pub(crate) struct Stage {
    pub pipeline: Arc<str>,
    pub index: usize,
    pub processor: Arc<dyn Processor>,
    pub ctx: CancellationToken,
    /// Present only when monitoring is enabled
    pub monitor: Option<MonitorSlot>,
    pub errors: ErrorCollector,
}

impl Stage {
    /// Drive the processor to completion.
    ///
    /// Owns both queue ends, so the outbound queue closes when this returns,
    /// whichever way the processor exited.
    pub(crate) async fn run(self, mut input: FrameReceiver, output: FrameSender) {
        let started = self.monitor.as_ref().map(|_| Instant::now());
        let name = self.processor.name().to_string();
        debug!(pipeline = %self.pipeline, processor = %name, stage = self.index, "stage started");

        let result = guarded(self.processor.process(&self.ctx, &mut input, &output)).await;

        let failure = result
            .as_ref()
            .err()
            .map(|e| StepError::new(name.as_str(), self.index, e.clone()));
        if !self.errors.finish(self.index, failure) {
            debug!(pipeline = %self.pipeline, processor = %name, stage = self.index, "abandoned stage exited");
        } else if let Err(e) = &result {
            debug!(
                pipeline = %self.pipeline,
                processor = %name,
                stage = self.index,
                error = %e,
                "stage failed"
            );
        } else {
            debug!(pipeline = %self.pipeline, processor = %name, stage = self.index, "stage finished");
        }

        if let (Some(slot), Some(started)) = (&self.monitor, started) {
            slot.get().on_processor_done(&ProcessorDone {
                pipeline: &self.pipeline,
                processor: &name,
                stage: self.index,
                error: result.as_ref().err(),
                duration: started.elapsed(),
            });
        }

        drop(input);
        drop(output);
    }
}

/// Await a processor future, turning a panic into `Error::Panic`.
pub(crate) async fn guarded<F>(fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::from_panic(payload)),
    }
}
