//! Benchmarks for streaming ML data pipeline components

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use ml_stream::{
    interleave_datasets, Batch, Error, GeneratorShard, InterleaveOptions, MapOptions, Record, Result, ShardSource,
    StoppingStrategy, StreamingDataset, Value,
};

/// Benchmark configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of measured iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Number of synthetic shards
    pub num_shards: usize,

    /// Records generated by each shard
    pub records_per_shard: usize,

    /// Shuffle window capacity
    pub buffer_size: usize,

    /// Records per batch for batched maps
    pub batch_size: usize,

    /// Base seed for shuffling and interleaving
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 3,
            num_shards: 8,
            records_per_shard: 10_000,
            buffer_size: 1000,
            batch_size: 1000,
            seed: 42,
        }
    }
}

impl BenchConfig {
    /// Total records produced by one pass over the synthetic dataset
    pub fn total_records(&self) -> usize {
        self.num_shards * self.records_per_shard
    }
}

/// Benchmark result
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Records read across all measured iterations
    pub records: usize,

    /// Throughput (records/second)
    pub throughput: f64,
}

/// Run a benchmark
///
/// `func` performs one full pass and returns the number of records it read.
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, func: F) -> Result<BenchResult>
where
    F: Fn() -> Result<usize>,
{
    if config.iterations == 0 {
        return Err(Error::InvalidArgument("iterations must be at least 1".to_string()));
    }

    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut records = 0;
    let start_total = Instant::now();

    for _ in 0..config.iterations {
        let start = Instant::now();
        records += func()?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();
    let count = u32::try_from(times.len()).unwrap_or(u32::MAX);
    let avg_time = times.iter().sum::<Duration>() / count;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();

    #[allow(clippy::cast_precision_loss)]
    let throughput = records as f64 / total_time.as_secs_f64().max(f64::EPSILON);

    tracing::debug!(name, records, ?total_time, "benchmark finished");

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        records,
        throughput,
    })
}

fn synthetic_record(shard: usize, index: usize) -> Result<Record> {
    let id = u64::try_from(shard * 1_000_000 + index).map_err(|e| Error::InvalidArgument(e.to_string()))?;
    Ok(Record::new()
        .with("id", id)
        .with("shard", u64::try_from(shard).unwrap_or(u64::MAX))
        .with("text", format!("record {index} of shard {shard}"))
        .with("label", id % 10))
}

/// Synthetic dataset of `num_shards` generator shards
pub fn synthetic_dataset(config: &BenchConfig) -> StreamingDataset {
    let per_shard = config.records_per_shard;
    let shards: Vec<Arc<dyn ShardSource>> = (0..config.num_shards)
        .map(|shard| {
            let generator = move || (0..per_shard).map(move |index| synthetic_record(shard, index));
            Arc::new(GeneratorShard::new(format!("synthetic-{shard}"), generator)) as Arc<dyn ShardSource>
        })
        .collect();
    StreamingDataset::from_shards(shards, None)
}

/// Read every record of one pass, returning how many were read
pub fn drain(dataset: &StreamingDataset) -> Result<usize> {
    let mut count = 0;
    for record in dataset {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Plain sequential reading over all shards
pub fn bench_sequential(config: &BenchConfig) -> Result<BenchResult> {
    let dataset = synthetic_dataset(config);
    run_benchmark("sequential", config, || drain(&dataset))
}

/// A map, filter and rename chain applied per record
pub fn bench_transform_chain(config: &BenchConfig) -> Result<BenchResult> {
    let dataset = synthetic_dataset(config)
        .map(|record| {
            let length = record.try_get("text")?.as_str().map_or(0, str::len);
            Ok(Record::new().with("length", u64::try_from(length).unwrap_or(u64::MAX)))
        })?
        .filter(|record| Ok(record.get("label").and_then(Value::as_i64).is_some_and(|label| label % 2 == 0)))?
        .rename_column("text", "content")?;
    run_benchmark("transform_chain", config, || drain(&dataset))
}

/// A batched map over `config.batch_size` records
pub fn bench_batched_map(config: &BenchConfig) -> Result<BenchResult> {
    let options = MapOptions::default().batch_size(config.batch_size);
    let dataset = synthetic_dataset(config).map_batched(
        |batch| {
            let doubled = batch
                .try_column("label")?
                .iter()
                .map(|v| Value::Int(v.as_i64().unwrap_or_default() * 2))
                .collect();
            let mut out = Batch::new();
            out.set_column("double_label", doubled);
            Ok(out)
        },
        options,
    )?;
    run_benchmark("batched_map", config, || drain(&dataset))
}

/// Shard-order shuffling plus the sliding shuffle window
pub fn bench_shuffle(config: &BenchConfig) -> Result<BenchResult> {
    let dataset = synthetic_dataset(config).shuffle(config.seed, config.buffer_size)?;
    run_benchmark("shuffle", config, || drain(&dataset))
}

/// Two-way weighted interleaving that runs until every source has ended
pub fn bench_interleave(config: &BenchConfig) -> Result<BenchResult> {
    let sources = [synthetic_dataset(config), synthetic_dataset(config)];
    let options = InterleaveOptions {
        probabilities: Some(vec![0.7, 0.3]),
        seed: config.seed,
        stopping_strategy: StoppingStrategy::AllExhausted,
    };
    let dataset = interleave_datasets(&sources, options)?;
    run_benchmark("interleave_all_exhausted", config, || drain(&dataset))
}

/// Run every benchmark in order
pub fn run_all(config: &BenchConfig) -> Result<Vec<BenchResult>> {
    Ok(vec![
        bench_sequential(config)?,
        bench_transform_chain(config)?,
        bench_batched_map(config)?,
        bench_shuffle(config)?,
        bench_interleave(config)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BenchConfig {
        BenchConfig {
            iterations: 2,
            warmup_iterations: 0,
            num_shards: 3,
            records_per_shard: 20,
            buffer_size: 8,
            batch_size: 7,
            seed: 1,
        }
    }

    #[test]
    fn test_run_benchmark_counts_records() {
        let config = small_config();
        let result = bench_shuffle(&config).unwrap();
        assert_eq!(result.records, 2 * config.total_records());
        assert!(result.min_time <= result.max_time);
    }

    #[test]
    fn test_all_benchmarks_run() {
        let results = run_all(&small_config()).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["sequential", "transform_chain", "batched_map", "shuffle", "interleave_all_exhausted"]);
        // two passes, each keeping the even labels
        assert_eq!(results[1].records, small_config().total_records());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = BenchConfig { iterations: 0, ..small_config() };
        assert!(matches!(run_benchmark("noop", &config, || Ok(0)), Err(Error::InvalidArgument(_))));
    }
}
