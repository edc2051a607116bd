use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use framechain::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

fn frames(count: usize) -> Vec<FrameRef> {
    (0..count)
        .map(|i| TextFrame::new(i.to_string()).into_ref())
        .collect()
}

fn pass_through_chain(stages: usize, config: PipelineConfig) -> Pipeline {
    (0..stages)
        .fold(Pipeline::new("bench"), |p, i| {
            p.processor(PassThrough::named(format!("stage-{}", i)))
        })
        .with_monitor(Arc::new(NoopMonitor))
        .with_config(config)
}

fn bench_chain_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_length");
    let size = 1000;
    group.throughput(Throughput::Elements(size as u64));

    for stages in [1, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("pass_through", stages), stages, |b, &stages| {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let pipeline = pass_through_chain(stages, PipelineConfig::default());
            b.iter(|| {
                runtime.block_on(async {
                    let (tx, rx) = channel(64);
                    let output = pipeline.run(None, rx);
                    tokio::spawn(send_all(tx, frames(size)));
                    black_box(collect_frames(output).await);
                })
            });
        });
    }

    group.finish();
}

fn bench_buffer_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_size");
    let size = 1000;
    group.throughput(Throughput::Elements(size as u64));

    for buffer_size in [1, 16, 256].iter() {
        group.bench_with_input(
            BenchmarkId::new("four_stages", buffer_size),
            buffer_size,
            |b, &buffer_size| {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let pipeline = pass_through_chain(
                    4,
                    PipelineConfig {
                        buffer_size,
                        ..Default::default()
                    },
                );
                b.iter(|| {
                    runtime.block_on(async {
                        let (tx, rx) = channel(buffer_size);
                        let output = pipeline.run(None, rx);
                        tokio::spawn(send_all(tx, frames(size)));
                        black_box(collect_frames(output).await);
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_monitor_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitor_overhead");
    let size = 1000;

    for disable_monitor in [true, false].iter() {
        group.bench_with_input(
            BenchmarkId::new("disable_monitor", disable_monitor),
            disable_monitor,
            |b, &disable_monitor| {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let pipeline = pass_through_chain(
                    4,
                    PipelineConfig {
                        disable_monitor,
                        ..Default::default()
                    },
                );
                b.iter(|| {
                    runtime.block_on(async {
                        let (tx, rx) = channel(64);
                        let output = pipeline.run(None, rx);
                        tokio::spawn(send_all(tx, frames(size)));
                        black_box(collect_frames(output).await);
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_chain_length, bench_buffer_size, bench_monitor_overhead);
criterion_main!(benches);
