//! Run supervision: waiting for every stage, the optional deadline, and the
//! output relay that lets a deadline close the final queue.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{Error, StepError};
use crate::monitor::{MonitorSlot, PipelineDone};
use crate::result::{ErrorCollector, RunResult};
use crate::traits::{FrameReceiver, FrameSender};

pub(crate) struct Supervisor {
    pub pipeline: Arc<str>,
    pub started: Instant,
    pub tracker: TaskTracker,
    pub errors: ErrorCollector,
    /// Present only when monitoring is enabled
    pub monitor: Option<MonitorSlot>,
    pub deadline: Option<Deadline>,
}

/// What the supervisor needs to give up on a run.
pub(crate) struct Deadline {
    pub after: Duration,
    /// Child token shared by every stage of the run
    pub run_token: CancellationToken,
    /// Stops the output relay, closing the caller's queue
    pub stop_relay: CancellationToken,
    /// Processor name per stage
    pub stages: Vec<String>,
}

impl Supervisor {
    pub(crate) async fn run(self) -> RunResult {
        match &self.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline.after, self.tracker.wait())
                    .await
                    .is_err()
                {
                    self.abandon(deadline);
                }
            }
            None => self.tracker.wait().await,
        }

        let result = RunResult::new(
            &*self.pipeline,
            self.errors.snapshot(),
            self.started.elapsed(),
        );
        debug!(pipeline = %self.pipeline, errors = result.errors().len(), "all stages joined");

        if let Some(slot) = &self.monitor {
            slot.get().on_pipeline_done(&PipelineDone {
                pipeline: &self.pipeline,
                result: &result,
                duration: result.duration(),
            });
        }
        result
    }

    fn abandon(&self, deadline: &Deadline) {
        let after_ms = deadline.after.as_millis() as u64;
        // Recorded before cancelling; stages released by the token still count.
        let abandoned = self.errors.abandon_running(|index| {
            let name = deadline.stages.get(index).map_or("", String::as_str);
            StepError::new(name, index, Error::Abandoned { after_ms })
        });
        deadline.run_token.cancel();
        deadline.stop_relay.cancel();

        for index in abandoned {
            warn!(
                pipeline = %self.pipeline,
                processor = deadline.stages.get(index).map_or("", String::as_str),
                stage = index,
                after_ms,
                "stage abandoned at deadline"
            );
        }
    }
}

/// Forward frames from the last stage to the caller until the upstream
/// closes or `stop` fires.
pub(crate) async fn relay(mut upstream: FrameReceiver, downstream: FrameSender, stop: CancellationToken) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = upstream.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if downstream.send_or_cancel(&stop, frame).await.is_err() {
            break;
        }
    }
}
