//! # Concurrent frame pipelines for Rust
//!
//! This crate chains independent processors into a pipeline connected by
//! bounded queues. Every processor runs as its own Tokio task; stages share
//! nothing but the frames handed across the queues.
//!
//! ## Core Concepts
//!
//! - **Frame**: a unit of data with a type tag, shared as `Arc<dyn Frame>`
//! - **Processor**: a named unit of work that reads one queue and writes the next
//! - **Pipeline**: owns the processor order and wires the queues on each run
//! - **Monitor**: observes stage and run completion
//!
//! A stage that fails, or panics, never stops its siblings. Its outbound
//! queue is closed either way, so the rest of the chain drains and exits,
//! and the failure is reported to the monitor once every stage is done.
//!
//! ## Example
//!
//! ```rust
//! use framechain::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pipeline = Pipeline::new("greeting")
//!         .processor(MapProcessor::new("prefix", |frame: FrameRef| {
//!             match frame.downcast_ref::<TextFrame>() {
//!                 Some(t) => TextFrame::new(format!("prefix-{}", t.text)).into_ref(),
//!                 None => frame,
//!             }
//!         }))
//!         .processor(PassThrough::new());
//!
//!     let (tx, rx) = channel(8);
//!     let output = pipeline.run(None, rx);
//!     send_all(tx, vec![TextFrame::new("hello").into_ref()]).await?;
//!
//!     let frames = collect_frames(output).await;
//!     assert_eq!(frames[0].downcast_ref::<TextFrame>().unwrap().text, "prefix-hello");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod pipeline;
pub mod processors;
pub mod result;
pub mod traits;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::{Error, ProcessorError, Result, StepError};
    pub use crate::frame::{EndFrame, ErrorFrame, Frame, FrameRef, MetadataFrame, StartFrame, TextFrame};
    pub use crate::monitor::{LogMonitor, Monitor, NoopMonitor, PipelineDone, ProcessorDone};
    pub use crate::pipeline::{Pipeline, PipelineRun, RunCompletion};
    pub use crate::processors::*;
    pub use crate::result::RunResult;
    pub use crate::traits::{channel, FrameReceiver, FrameSender, Processor};
    pub use crate::util::{collect_frames, collect_frames_timeout, processor_from_fn, send_all};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
