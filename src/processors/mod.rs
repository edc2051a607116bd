//! Ready-made processors.
//!
//! All of them drain their input until it closes, stop with
//! `Error::Cancelled` when the run is cancelled, and never hold on to a
//! frame after forwarding it.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::frame::FrameRef;
use crate::traits::{FrameReceiver, FrameSender, Processor};

/// Forwards every frame unchanged.
#[derive(Debug, Clone)]
pub struct PassThrough {
    name: String,
}

impl PassThrough {
    pub fn new() -> Self {
        Self::named("pass-through")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            output.send_or_cancel(ctx, frame).await?;
        }
        Ok(())
    }
}

/// A processor that maps frames using a function.
///
/// The function receives the shared frame and returns the frame to forward;
/// to change a frame it must build a new one.
pub struct MapProcessor<F> {
    name: String,
    f: F,
}

impl<F> MapProcessor<F>
where
    F: Fn(FrameRef) -> FrameRef + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Processor for MapProcessor<F>
where
    F: Fn(FrameRef) -> FrameRef + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            output.send_or_cancel(ctx, (self.f)(frame)).await?;
        }
        Ok(())
    }
}

/// A processor that filters frames using a predicate.
///
/// Only frames for which the predicate holds are forwarded.
pub struct FilterProcessor<F> {
    name: String,
    predicate: F,
}

impl<F> FilterProcessor<F>
where
    F: Fn(&FrameRef) -> bool + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

#[async_trait]
impl<F> Processor for FilterProcessor<F>
where
    F: Fn(&FrameRef) -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            if (self.predicate)(&frame) {
                output.send_or_cancel(ctx, frame).await?;
            }
        }
        Ok(())
    }
}

/// Waits a fixed time before forwarding each frame.
#[derive(Debug, Clone)]
pub struct DelayProcessor {
    name: String,
    delay: Duration,
}

impl DelayProcessor {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Processor for DelayProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            tokio::select! {
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = sleep(self.delay) => {}
            }
            output.send_or_cancel(ctx, frame).await?;
        }
        Ok(())
    }
}

/// A processor created from an async function.
///
/// The function is called once per frame. `Ok(Some(frame))` forwards a
/// frame, `Ok(None)` drops the input. An `Err` does not stop the stream: the
/// frame is dropped, later frames keep flowing, and the first error is
/// returned once the input closes.
pub struct FnProcessor<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnProcessor<F>
where
    F: Fn(FrameRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<FrameRef>>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(FrameRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<FrameRef>>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        let mut first_error = None;
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            match (self.f)(frame).await {
                Ok(Some(out)) => output.send_or_cancel(ctx, out).await?,
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
