//! Utility functions and helper types.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::frame::FrameRef;
use crate::processors::FnProcessor;
use crate::traits::FrameReceiver;

/// Helper function to create a simple processor from a function
pub fn processor_from_fn<F, Fut>(name: impl Into<String>, f: F) -> FnProcessor<F>
where
    F: Fn(FrameRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<FrameRef>>> + Send + 'static,
{
    FnProcessor::new(name, f)
}

/// Read an output queue until it closes
pub async fn collect_frames(mut rx: FrameReceiver) -> Vec<FrameRef> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    frames
}

/// Read an output queue until it closes, failing if that takes longer than
/// `timeout`
pub async fn collect_frames_timeout(rx: FrameReceiver, timeout: Duration) -> Result<Vec<FrameRef>> {
    tokio::time::timeout(timeout, collect_frames(rx))
        .await
        .map_err(|_| Error::timeout(timeout.as_millis() as u64))
}

/// Feed frames into a pipeline input, in order, then close it
pub async fn send_all<I>(tx: mpsc::Sender<FrameRef>, frames: I) -> Result<()>
where
    I: IntoIterator<Item = FrameRef>,
{
    for frame in frames {
        tx.send(frame).await?;
    }
    Ok(())
}
