//! Pipeline orchestration and execution.
//!
//! A [`Pipeline`] chains processors with bounded queues. Each call to
//! [`Pipeline::run`] spawns one task per processor and hands back the final
//! queue immediately:
//!
//! ```text
//! input -> P0 -> q0 -> P1 -> q1 -> ... -> Pn-1 -> output
//! ```
//!
//! Every stage closes its outbound queue when it exits, however it exits
//! (return, error or panic). The next stage sees the closed queue, drains it
//! and exits too, so the whole chain winds down without any extra signal.
//!
//! # Limitations
//!
//! Cancellation is cooperative: a processor that never looks at its
//! cancellation token keeps its stage alive. With a deadline configured the
//! output queue is still closed on time and the stage is reported as
//! abandoned, but its task keeps running until the processor returns.

mod stage;
mod supervisor;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{self, PipelineConfig};
use crate::error::{Error, Result};
use crate::frame::FrameRef;
use crate::monitor::{Monitor, MonitorSlot};
use crate::result::{ErrorCollector, RunResult};
use crate::traits::{stage_channel, FrameReceiver, Processor};

use stage::Stage;
use supervisor::{relay, Deadline, Supervisor};

/// An ordered chain of processors.
///
/// The processor list is fixed once built. A pipeline may be run any number
/// of times, one run after another; each run gets fresh queues and a fresh
/// error collector.
pub struct Pipeline {
    name: String,
    processors: Vec<Arc<dyn Processor>>,
    monitor: MonitorSlot,
    config: Option<PipelineConfig>,
}

impl Pipeline {
    /// Create an empty pipeline with the default logging monitor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processors: Vec::new(),
            monitor: MonitorSlot::default(),
            config: None,
        }
    }

    /// Append a processor
    pub fn processor<P: Processor>(mut self, processor: P) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Append an already shared processor
    pub fn shared_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Append several shared processors in order
    pub fn processors<I>(mut self, processors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Processor>>,
    {
        self.processors.extend(processors);
        self
    }

    /// Use this monitor instead of the default logging one
    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = MonitorSlot::new(monitor);
        self
    }

    /// Use explicit settings instead of the process-wide ones
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the capacity of every queue between stages
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config_mut().buffer_size = size;
        self
    }

    /// Turn monitor callbacks off (or back on)
    pub fn disable_monitor(mut self, disable: bool) -> Self {
        self.config_mut().disable_monitor = disable;
        self
    }

    /// Close the output and abandon unfinished stages after `after`
    pub fn deadline(mut self, after: std::time::Duration) -> Self {
        self.config_mut().deadline = Some(after);
        self
    }

    fn config_mut(&mut self) -> &mut PipelineConfig {
        self.config.get_or_insert_with(|| config::global().clone())
    }

    /// Swap the monitor, including for runs already in flight
    pub fn set_monitor(&self, monitor: Arc<dyn Monitor>) -> Arc<dyn Monitor> {
        self.monitor.set(monitor)
    }

    /// The monitor currently installed
    pub fn monitor(&self) -> Arc<dyn Monitor> {
        self.monitor.get()
    }

    /// Settings the next run will use
    pub fn config(&self) -> PipelineConfig {
        self.config
            .clone()
            .unwrap_or_else(|| config::global().clone())
            .normalize()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Start every stage and return the final output queue without waiting.
    ///
    /// `ctx` is shared with every processor; `None` means the run can only end
    /// by its input closing. With no processors the returned queue is
    /// already closed.
    ///
    /// Failures are reported to the monitor, if enabled, once all stages have
    /// exited. The output queue closes normally whether or not a stage failed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn run(&self, ctx: Option<CancellationToken>, input: impl Into<FrameReceiver>) -> FrameReceiver {
        self.launch(ctx, input.into(), false).output
    }

    /// Like [`run`](Self::run), but also hands back a way to await the
    /// [`RunResult`], whether or not monitoring is enabled.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self, ctx: Option<CancellationToken>, input: impl Into<FrameReceiver>) -> PipelineRun {
        self.launch(ctx, input.into(), true)
    }

    fn launch(&self, ctx: Option<CancellationToken>, input: FrameReceiver, collect: bool) -> PipelineRun {
        let config = self.config();
        let monitor = config.monitor_enabled().then(|| self.monitor.clone());
        let supervised = monitor.is_some() || collect || config.deadline.is_some();
        let started = Instant::now();

        let run_token = ctx.unwrap_or_default().child_token();
        let pipeline: Arc<str> = Arc::from(self.name.as_str());
        let errors = ErrorCollector::new(self.processors.len());
        let tracker = TaskTracker::new();
        let mut stages = Vec::with_capacity(self.processors.len());

        let mut upstream = input;
        for (index, processor) in self.processors.iter().enumerate() {
            let (tx, rx) = stage_channel(config.buffer_size);
            let stage_input = std::mem::replace(&mut upstream, rx);
            stages.push(processor.name().to_string());

            let stage = Stage {
                pipeline: Arc::clone(&pipeline),
                index,
                processor: Arc::clone(processor),
                ctx: run_token.clone(),
                monitor: monitor.clone(),
                errors: errors.clone(),
            };
            tracker.spawn(stage.run(stage_input, tx));
        }
        tracker.close();

        let mut output = if self.processors.is_empty() {
            drop(upstream);
            let (_closed, rx) = stage_channel(1);
            rx
        } else {
            upstream
        };

        let deadline = config.deadline.map(|after| {
            let stop_relay = CancellationToken::new();
            let (tx, rx) = stage_channel(config.buffer_size);
            let last = std::mem::replace(&mut output, rx);
            tokio::spawn(relay(last, tx, stop_relay.clone()));
            Deadline {
                after,
                run_token: run_token.clone(),
                stop_relay,
                stages,
            }
        });

        let completion = supervised.then(|| {
            tokio::spawn(
                Supervisor {
                    pipeline,
                    started,
                    tracker,
                    errors,
                    monitor,
                    deadline,
                }
                .run(),
            )
        });

        PipelineRun {
            output,
            completion: RunCompletion {
                handle: completion,
                token: run_token,
            },
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.processors.iter().map(|p| p.name()).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("processors", &names)
            .field("config", &self.config)
            .finish()
    }
}

/// A run started with [`Pipeline::start`].
#[derive(Debug)]
pub struct PipelineRun {
    output: FrameReceiver,
    completion: RunCompletion,
}

impl PipelineRun {
    /// The final output queue
    pub fn output(&mut self) -> &mut FrameReceiver {
        &mut self.output
    }

    /// Cancel this run only; the caller's token is left alone
    pub fn cancel(&self) {
        self.completion.cancel();
    }

    pub fn into_parts(self) -> (FrameReceiver, RunCompletion) {
        (self.output, self.completion)
    }

    /// Drain the output queue, then wait for the run's result.
    pub async fn finish(self) -> Result<(Vec<FrameRef>, RunResult)> {
        let (mut output, completion) = self.into_parts();
        let mut frames = Vec::new();
        while let Some(frame) = output.recv().await {
            frames.push(frame);
        }
        let result = completion.wait().await?;
        Ok((frames, result))
    }
}

/// Resolves to the [`RunResult`] once every stage has exited.
#[derive(Debug)]
pub struct RunCompletion {
    handle: Option<JoinHandle<RunResult>>,
    token: CancellationToken,
}

impl RunCompletion {
    /// Cancel the run's stages
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the run to finish.
    ///
    /// Keep reading the output queue while waiting, or the last stage may
    /// block on a full queue forever.
    pub async fn wait(self) -> Result<RunResult> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::custom(format!("supervisor task failed: {}", e))),
            None => Err(Error::custom("run was started without a supervisor")),
        }
    }
}
