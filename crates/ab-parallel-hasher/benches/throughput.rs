use ab_parallel_hasher::{HasherOptions, ParallelHasher};
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::hint::black_box;
use tokio::runtime::Runtime;

fn pseudo_random_input(seed: u8, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::from_seed([seed; 32]);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

fn criterion_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime for async benches");

    throughput::<1>(c, &rt);
    throughput::<6>(c, &rt);
    throughput::<16>(c, &rt);
}

fn throughput<const WORKER_COUNT: usize>(c: &mut Criterion, rt: &Runtime) {
    let input = pseudo_random_input(1, 16 * 1024 * 1024);
    let options = HasherOptions { worker_count: WORKER_COUNT, ..HasherOptions::default() };

    let mut group = c.benchmark_group(format!("hash_file/worker_count={WORKER_COUNT}"));
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("16MiB", |b| {
        b.to_async(rt).iter_batched(
            || {
                let mut hasher = ParallelHasher::new(options).expect("valid options");
                rt.block_on(hasher.init()).expect("worker pool should start");
                hasher
            },
            |mut hasher| {
                let input = input.clone();
                async move {
                    let stream = tokio_stream::iter(vec![Ok(Bytes::from(input.clone()))]);
                    let outcome = hasher.hash_file(stream, input.len() as u64).await.expect("hash_file should succeed");
                    hasher.terminate();
                    black_box(outcome.digest)
                }
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
