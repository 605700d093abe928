//! Benchmarks for enqueue throughput and backoff computation.

use batchflow::backoff::{BackoffStrategy, Exponential};
use batchflow::context::Context;
use batchflow::pipeline::{Pipeline, PipelineConfig};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

const VALUES: u64 = 10_000;

fn enqueue_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("sync_add_10k", |b| {
        b.to_async(&runtime).iter_batched(
            || {
                Pipeline::<u64>::new(
                    PipelineConfig::new()
                        .with_worker(8)
                        .with_max_size(256)
                        .with_buffer(1024)
                        .with_interval(Duration::from_millis(5)),
                )
                .with_process(|_ctx, _shard, batch| async move {
                    black_box(batch.len());
                })
                .with_split(|key: &str| key.bytes().map(usize::from).sum())
            },
            |pipeline| async move {
                pipeline.start();
                let ctx = Context::background();
                for i in 0..VALUES {
                    pipeline.sync_add(&ctx, format!("key-{}", i % 64), i).await.unwrap();
                }
                pipeline.close().await.unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn backoff_benchmark(c: &mut Criterion) {
    let backoff = Exponential::default();
    c.bench_function("exponential_backoff", |b| {
        b.iter(|| black_box(backoff.backoff(black_box(7))));
    });
}

criterion_group!(benches, enqueue_benchmark, backoff_benchmark);
criterion_main!(benches);
