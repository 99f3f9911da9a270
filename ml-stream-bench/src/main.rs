//! Benchmark runner for streaming ML data pipeline components
//!
//! Usage: `ml-stream-bench [config.json]`. Fields missing from the JSON
//! configuration take their defaults.

use anyhow::Context;
use ml_stream_bench::{bench_shuffle, run_all, BenchConfig, BenchResult};
use tracing_subscriber::EnvFilter;

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Records:      {}", result.records);
    println!("  Throughput:   {:.2} records/sec", result.throughput);
}

fn load_config() -> anyhow::Result<BenchConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(BenchConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {path}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = load_config()?;

    println!("=== Streaming Pipeline Benchmarks ===");
    for result in run_all(&config)? {
        print_result(&result);
    }

    println!("\n=== Shuffle Window Sizes ===");
    for buffer_size in [1, 100, 1000, 10_000] {
        let config = BenchConfig {
            iterations: 3,
            warmup_iterations: 1,
            buffer_size,
            ..config.clone()
        };
        let result = bench_shuffle(&config)?;
        println!("\nBuffer size: {buffer_size}");
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} records/sec", result.throughput);
    }

    Ok(())
}
