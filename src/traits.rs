//! The processor contract and the queue endpoints handed to processors.
//!
//! Stages talk to each other only through bounded queues. A processor reads
//! from a [`FrameReceiver`] and writes to a [`FrameSender`]; it never owns the
//! sender, so it cannot close its outbound queue or keep writing after
//! `process` returns. The engine closes the queue when the stage exits.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::frame::FrameRef;

/// A named unit of work, run as one pipeline stage.
///
/// `process` must drain `input` until it is closed, unless it returns early
/// because `ctx` was cancelled. Returning `Err` records a failure for the run
/// but does not stop other stages; a processor may keep forwarding frames
/// after a soft failure and report it when it returns.
///
/// Cancellation is cooperative. The pipeline cannot interrupt a processor
/// that ignores `ctx`; such a processor delays shutdown until it returns.
///
/// Frames received from `input` are shared with upstream stages and must be
/// treated as immutable. See [`crate::frame`].
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use framechain::error::Result;
/// use framechain::frame::{FrameRef, TextFrame};
/// use framechain::traits::{FrameReceiver, FrameSender, Processor};
/// use tokio_util::sync::CancellationToken;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Processor for Shout {
///     fn name(&self) -> &str {
///         "shout"
///     }
///
///     async fn process(
///         &self,
///         ctx: &CancellationToken,
///         input: &mut FrameReceiver,
///         output: &FrameSender,
///     ) -> Result<()> {
///         while let Some(frame) = input.recv_or_cancel(ctx).await? {
///             let out: FrameRef = match frame.downcast_ref::<TextFrame>() {
///                 Some(t) => TextFrame::new(t.text.to_uppercase()).into_ref(),
///                 None => frame,
///             };
///             output.send_or_cancel(ctx, out).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Name used to correlate logs, monitor events and recorded errors
    fn name(&self) -> &str;

    /// Consume `input` and produce onto `output` until `input` closes.
    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()>;
}

/// Inbound end of a stage queue.
#[derive(Debug)]
pub struct FrameReceiver {
    inner: mpsc::Receiver<FrameRef>,
}

impl FrameReceiver {
    pub(crate) fn new(inner: mpsc::Receiver<FrameRef>) -> Self {
        Self { inner }
    }

    /// Receive the next frame, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<FrameRef> {
        self.inner.recv().await
    }

    /// Like [`recv`](Self::recv), but gives up with `Error::Cancelled` when
    /// the token fires first.
    pub async fn recv_or_cancel(&mut self, ctx: &CancellationToken) -> Result<Option<FrameRef>> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            frame = self.inner.recv() => Ok(frame),
        }
    }

    /// Take a frame without waiting
    pub fn try_recv(&mut self) -> Option<FrameRef> {
        self.inner.try_recv().ok()
    }

    /// True once the producing stage has exited and every frame was read
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed() && self.inner.is_empty()
    }

    /// Adapt the receiver into a `Stream` of frames
    pub fn into_stream(self) -> ReceiverStream<FrameRef> {
        ReceiverStream::new(self.inner)
    }
}

impl From<mpsc::Receiver<FrameRef>> for FrameReceiver {
    fn from(inner: mpsc::Receiver<FrameRef>) -> Self {
        Self::new(inner)
    }
}

/// Outbound end of a stage queue.
///
/// Not `Clone`: the pipeline keeps the only instance and lends it to the
/// processor for the duration of `process`.
#[derive(Debug)]
pub struct FrameSender {
    inner: mpsc::Sender<FrameRef>,
}

impl FrameSender {
    pub(crate) fn new(inner: mpsc::Sender<FrameRef>) -> Self {
        Self { inner }
    }

    /// Send a frame, waiting while the queue is full.
    ///
    /// Fails with `Error::ChannelClosed` when nobody reads the queue anymore.
    pub async fn send(&self, frame: FrameRef) -> Result<()> {
        self.inner.send(frame).await.map_err(Error::from)
    }

    /// Like [`send`](Self::send), but gives up with `Error::Cancelled` when
    /// the token fires first.
    pub async fn send_or_cancel(&self, ctx: &CancellationToken, frame: FrameRef) -> Result<()> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            sent = self.inner.send(frame) => sent.map_err(Error::from),
        }
    }

    /// Free slots currently left in the queue
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

/// Create a bounded queue for feeding a pipeline.
///
/// The caller keeps the `mpsc::Sender` and closes the input by dropping it.
pub fn channel(capacity: usize) -> (mpsc::Sender<FrameRef>, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, FrameReceiver::new(rx))
}

/// Create an internal stage queue.
pub(crate) fn stage_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameSender::new(tx), FrameReceiver::new(rx))
}
