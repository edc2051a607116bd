//! A three-stage text pipeline fed from a producer task.

use framechain::prelude::*;
use tracing_subscriber::EnvFilter;

fn text(frame: &FrameRef) -> Option<&str> {
    frame.downcast_ref::<TextFrame>().map(|t| t.text.as_str())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Basic Pipeline Example ===");

    let pipeline = Pipeline::new("basic")
        .processor(FilterProcessor::new("non-empty", |frame: &FrameRef| {
            text(frame).map_or(true, |t| !t.trim().is_empty())
        }))
        .processor(MapProcessor::new("prefixer", |frame: FrameRef| {
            match text(&frame) {
                Some(t) => TextFrame::new(format!("prefix-{}", t)).into_ref(),
                None => frame,
            }
        }))
        .processor(MapProcessor::new("suffixer", |frame: FrameRef| {
            match text(&frame) {
                Some(t) => TextFrame::new(format!("{}-suffix", t)).into_ref(),
                None => frame,
            }
        }))
        .buffer_size(8);

    let (tx, rx) = channel(8);
    let output = pipeline.run(None, rx);

    tokio::spawn(send_all(
        tx,
        vec![
            StartFrame::new().into_ref(),
            TextFrame::new("hello").into_ref(),
            TextFrame::new("   ").into_ref(),
            TextFrame::new("world").into_ref(),
            EndFrame.into_ref(),
        ],
    ));

    for frame in collect_frames(output).await {
        match text(&frame) {
            Some(t) => println!("{}: {}", frame.frame_type(), t),
            None => println!("{}", frame.frame_type()),
        }
    }

    println!("Basic pipeline completed!");
    Ok(())
}
