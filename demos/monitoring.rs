//! Failure handling: a panicking stage, a soft failure, and a custom monitor.

use async_trait::async_trait;
use framechain::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Prints a one-line summary for every completion event.
struct Summary;

impl Monitor for Summary {
    fn on_processor_done(&self, event: &ProcessorDone<'_>) {
        println!(
            "  stage {} ({}) {} in {:?}",
            event.stage,
            event.processor,
            event.status(),
            event.duration
        );
    }

    fn on_pipeline_done(&self, event: &PipelineDone<'_>) {
        println!("  pipeline {} {} in {:?}", event.pipeline, event.status(), event.duration);
        for error in event.result.errors() {
            println!("    {}", error);
        }
    }
}

/// Panics on the frame with text "boom", forwards everything else.
struct Fragile;

#[async_trait]
impl Processor for Fragile {
    fn name(&self) -> &str {
        "fragile"
    }

    async fn process(
        &self,
        ctx: &CancellationToken,
        input: &mut FrameReceiver,
        output: &FrameSender,
    ) -> Result<()> {
        while let Some(frame) = input.recv_or_cancel(ctx).await? {
            if frame.downcast_ref::<TextFrame>().map(|t| t.text.as_str()) == Some("boom") {
                panic!("fragile stage hit a bad frame");
            }
            output.send_or_cancel(ctx, frame).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== Panicking stage ===");
    let pipeline = Pipeline::new("fragile")
        .processor(Fragile)
        .processor(PassThrough::new())
        .with_monitor(Arc::new(Summary));

    let (tx, rx) = channel(4);
    let run = pipeline.start(None, rx);
    // The fragile stage drops its input when it panics, so later sends may fail.
    tokio::spawn(send_all(
        tx,
        vec![
            TextFrame::new("fine").into_ref(),
            TextFrame::new("boom").into_ref(),
            TextFrame::new("never seen").into_ref(),
        ],
    ));
    let (frames, result) = run.finish().await?;
    println!("  {} frame(s) reached the output; {}", frames.len(), result);

    println!("=== Soft failure keeps the stream going ===");
    let lenient = processor_from_fn("lenient", |frame: FrameRef| async move {
        match frame.downcast_ref::<TextFrame>() {
            Some(t) if t.text.parse::<i64>().is_err() => {
                Err(Error::custom(format!("not a number: {}", t.text)))
            }
            _ => Ok(Some(frame)),
        }
    });
    let pipeline = Pipeline::new("numbers")
        .processor(lenient)
        .processor(DelayProcessor::new("pace", Duration::from_millis(5)))
        .with_monitor(Arc::new(Summary));

    let (tx, rx) = channel(4);
    let run = pipeline.start(None, rx);
    send_all(
        tx,
        vec![
            TextFrame::new("1").into_ref(),
            TextFrame::new("two").into_ref(),
            TextFrame::new("3").into_ref(),
        ],
    )
    .await?;
    let (frames, result) = run.finish().await?;
    println!("  {} frame(s) reached the output; success={}", frames.len(), result.success());

    Ok(())
}
