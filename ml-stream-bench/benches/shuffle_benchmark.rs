use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ml_stream_bench::{drain, synthetic_dataset, BenchConfig};

fn shuffle_window(c: &mut Criterion) {
    let config = BenchConfig {
        num_shards: 4,
        records_per_shard: 5_000,
        ..BenchConfig::default()
    };
    let mut group = c.benchmark_group("shuffle_window");
    for buffer_size in [16, 1000, 10_000] {
        let dataset = synthetic_dataset(&config).shuffle(config.seed, buffer_size).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(buffer_size), &dataset, |b, dataset| {
            b.iter(|| black_box(drain(dataset).unwrap()));
        });
    }
    group.finish();
}

fn sequential(c: &mut Criterion) {
    let dataset = synthetic_dataset(&BenchConfig::default());
    c.bench_function("sequential_read", |b| b.iter(|| black_box(drain(&dataset).unwrap())));
}

criterion_group!(benches, shuffle_window, sequential);
criterion_main!(benches);
