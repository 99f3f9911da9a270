//! Weighted random interleaving of several pipelines

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ml_stream_core::rng::{effective_seed, seeded_rng};
use ml_stream_core::{BoxStream, Error, PassContext, Record, RecordStream, Result, Schema, SeededRng, Stage, StageRef};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerance on the sum of interleaving probabilities
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// When an interleaved sequence ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingStrategy {
    /// End as soon as any drawn source runs out
    #[default]
    FirstExhausted,

    /// Restart exhausted sources until every source has run out once
    AllExhausted,
}

impl fmt::Display for StoppingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoppingStrategy::FirstExhausted => write!(f, "first_exhausted"),
            StoppingStrategy::AllExhausted => write!(f, "all_exhausted"),
        }
    }
}

impl FromStr for StoppingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first_exhausted" => Ok(StoppingStrategy::FirstExhausted),
            "all_exhausted" => Ok(StoppingStrategy::AllExhausted),
            other => Err(Error::InvalidArgument(format!("unknown stopping strategy: {other}"))),
        }
    }
}

/// How the next source is drawn
#[derive(Debug, Clone)]
enum SourceSampler {
    Uniform(usize),
    Weighted(WeightedIndex<f64>),
}

impl SourceSampler {
    fn draw(&self, rng: &mut SeededRng) -> usize {
        match self {
            SourceSampler::Uniform(n) => rng.random_range(0..*n),
            SourceSampler::Weighted(weights) => weights.sample(rng),
        }
    }
}

/// Merges several stages by drawing one source per pull
pub struct InterleaveStage {
    sources: Vec<StageRef>,
    /// Sources that can be drawn and therefore must run out to finish
    drawable: Vec<bool>,
    sampler: SourceSampler,
    seed: u64,
    strategy: StoppingStrategy,
    schema: Option<Schema>,
}

impl InterleaveStage {
    /// Create an interleaving stage
    ///
    /// `probabilities`, when given, must hold one non-negative weight per
    /// source summing to 1. Known source schemas must be identical.
    pub fn new(
        sources: Vec<StageRef>,
        probabilities: Option<Vec<f64>>,
        seed: u64,
        strategy: StoppingStrategy,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::InvalidArgument("interleaving needs at least one source".into()));
        }
        let schema = common_schema(&sources)?;

        let (sampler, drawable) = match probabilities {
            None => (SourceSampler::Uniform(sources.len()), vec![true; sources.len()]),
            Some(probabilities) => {
                validate_probabilities(&probabilities, sources.len())?;
                let weights = WeightedIndex::new(&probabilities)
                    .map_err(|e| Error::InvalidArgument(format!("invalid probabilities: {e}")))?;
                let drawable = probabilities.iter().map(|&p| p > 0.0).collect();
                (SourceSampler::Weighted(weights), drawable)
            }
        };

        Ok(Self {
            sources,
            drawable,
            sampler,
            seed,
            strategy,
            schema,
        })
    }

    /// Stopping strategy of this stage
    pub fn strategy(&self) -> StoppingStrategy {
        self.strategy
    }

    fn with_sources(&self, sources: Vec<StageRef>) -> StageRef {
        Arc::new(Self {
            sources,
            drawable: self.drawable.clone(),
            sampler: self.sampler.clone(),
            seed: self.seed,
            strategy: self.strategy,
            schema: self.schema.clone(),
        })
    }
}

fn common_schema(sources: &[StageRef]) -> Result<Option<Schema>> {
    let mut schemas = sources.iter().map(|s| s.schema());
    let Some(Some(first)) = schemas.next() else {
        return Ok(None);
    };
    let mut all_known = true;
    for schema in schemas {
        match schema {
            Some(schema) if schema != first => {
                return Err(Error::SchemaMismatch(format!(
                    "interleaved sources have different schemas: [{}] vs [{}]",
                    first.names().collect::<Vec<_>>().join(", "),
                    schema.names().collect::<Vec<_>>().join(", ")
                )));
            }
            Some(_) => {}
            None => all_known = false,
        }
    }
    Ok(all_known.then(|| first.clone()))
}

fn validate_probabilities(probabilities: &[f64], sources: usize) -> Result<()> {
    if probabilities.len() != sources {
        return Err(Error::InvalidArgument(format!(
            "got {} probabilities for {sources} sources",
            probabilities.len()
        )));
    }
    if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(Error::InvalidArgument(format!("probability {bad} is not a non-negative number")));
    }
    let sum: f64 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(Error::InvalidArgument(format!("probabilities sum to {sum}, expected 1")));
    }
    Ok(())
}

impl Stage for InterleaveStage {
    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn num_shards(&self) -> usize {
        self.sources.iter().map(|s| s.num_shards()).min().unwrap_or(0)
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        let remaining = self.drawable.iter().filter(|d| **d).count();
        Box::new(InterleaveStream {
            sources: self.sources.clone(),
            cursors: self.sources.iter().map(|_| None).collect(),
            exhausted: vec![false; self.sources.len()],
            drawable: self.drawable.clone(),
            remaining,
            sampler: self.sampler.clone(),
            rng: seeded_rng(effective_seed(self.seed, ctx.epoch)),
            strategy: self.strategy,
            ctx,
            done: false,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        let sources = self
            .sources
            .iter()
            .map(|s| Arc::clone(s).shuffle_shards(rng))
            .collect();
        self.with_sources(sources)
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        let sources = self
            .sources
            .iter()
            .map(|s| s.partition(worker_count, worker_index))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_sources(sources))
    }

    fn shard_order_locked(&self) -> bool {
        self.sources.iter().any(|s| s.shard_order_locked())
    }
}

struct InterleaveStream {
    sources: Vec<StageRef>,
    /// Open cursor per source, opened on first draw
    cursors: Vec<Option<BoxStream>>,
    /// Sources that have run out at least once
    exhausted: Vec<bool>,
    drawable: Vec<bool>,
    /// Drawable sources that have not run out yet
    remaining: usize,
    sampler: SourceSampler,
    rng: SeededRng,
    strategy: StoppingStrategy,
    ctx: PassContext,
    done: bool,
}

impl RecordStream for InterleaveStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while !self.done {
            let index = self.sampler.draw(&mut self.rng);
            let source = &self.sources[index];
            let ctx = self.ctx;
            let cursor = self.cursors[index].get_or_insert_with(|| source.open(ctx));
            if let Some(record) = cursor.next_record()? {
                return Ok(Some(record));
            }

            self.cursors[index] = None;
            match self.strategy {
                StoppingStrategy::FirstExhausted => {
                    debug!(source = index, "interleaved source exhausted, stopping");
                    self.done = true;
                }
                StoppingStrategy::AllExhausted => {
                    if !self.exhausted[index] {
                        self.exhausted[index] = true;
                        if self.drawable[index] {
                            self.remaining -= 1;
                        }
                    }
                    if self.remaining == 0 {
                        self.done = true;
                    } else {
                        debug!(source = index, remaining = self.remaining, "restarting exhausted source");
                    }
                }
            }
        }
        self.cursors.clear();
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use ml_stream_core::Records;
    use test_case::test_case;

    use super::*;
    use crate::test_util::{ids, offset_leaf};

    fn run(stage: &InterleaveStage) -> Vec<i64> {
        ids(Records::new(stage.open(PassContext::default())))
    }

    /// Sources with ids `0..3` and `100..102`
    fn three_and_two() -> Vec<StageRef> {
        vec![offset_leaf(0, 3), offset_leaf(100, 2)]
    }

    fn is_ordered_subsequence(out: &[i64], range: std::ops::Range<i64>) -> bool {
        let picked: Vec<i64> = out.iter().copied().filter(|id| range.contains(id)).collect();
        picked.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_first_exhausted_weighted_seed_42() {
        let stage =
            InterleaveStage::new(three_and_two(), Some(vec![0.8, 0.2]), 42, StoppingStrategy::FirstExhausted).unwrap();
        let out = run(&stage);
        assert_eq!(out, vec![0, 100, 1, 2]);
        assert_eq!(out, run(&stage));
        assert!(is_ordered_subsequence(&out, 0..3));
        assert!(is_ordered_subsequence(&out, 100..102));
        // The sequence ends when one source is exhausted, so one of them was fully read.
        let from_first = out.iter().filter(|id| **id < 3).count();
        let from_second = out.len() - from_first;
        assert!(from_first == 3 || from_second == 2);
    }

    #[test]
    fn test_all_exhausted_reads_every_record() {
        let stage = InterleaveStage::new(three_and_two(), None, 7, StoppingStrategy::AllExhausted).unwrap();
        let out = run(&stage);
        for id in [0, 1, 2, 100, 101] {
            assert!(out.contains(&id), "missing {id} in {out:?}");
        }
    }

    #[test]
    fn test_zero_probability_source_never_drawn_nor_awaited() {
        let stage =
            InterleaveStage::new(three_and_two(), Some(vec![1.0, 0.0]), 3, StoppingStrategy::AllExhausted).unwrap();
        assert_eq!(run(&stage), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_source_passthrough() {
        let stage = InterleaveStage::new(vec![offset_leaf(0, 4)], None, 0, StoppingStrategy::FirstExhausted).unwrap();
        assert_eq!(run(&stage), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_epoch_drives_draws() {
        let stage = InterleaveStage::new(
            vec![offset_leaf(0, 50), offset_leaf(100, 50)],
            None,
            5,
            StoppingStrategy::FirstExhausted,
        )
        .unwrap();
        let epoch0 = ids(Records::new(stage.open(PassContext::new(0))));
        let epoch1 = ids(Records::new(stage.open(PassContext::new(1))));
        assert_ne!(epoch0, epoch1);
    }

    #[test_case(vec![0.5] ; "wrong length")]
    #[test_case(vec![1.5, -0.5] ; "negative")]
    #[test_case(vec![0.5, 0.4] ; "does not sum to one")]
    #[test_case(vec![f64::NAN, 1.0] ; "not a number")]
    fn test_invalid_probabilities(probabilities: Vec<f64>) {
        let result = InterleaveStage::new(three_and_two(), Some(probabilities), 0, StoppingStrategy::FirstExhausted);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_no_sources_rejected() {
        assert!(InterleaveStage::new(Vec::new(), None, 0, StoppingStrategy::AllExhausted).is_err());
    }

    #[test_case("first_exhausted", StoppingStrategy::FirstExhausted)]
    #[test_case("all_exhausted", StoppingStrategy::AllExhausted)]
    fn test_strategy_names(name: &str, strategy: StoppingStrategy) {
        assert_eq!(name.parse::<StoppingStrategy>().unwrap(), strategy);
        assert_eq!(serde_json::to_string(&strategy).unwrap(), format!("\"{name}\""));
        assert_eq!(strategy.to_string(), name);
    }

    #[test]
    fn test_num_shards_is_minimum() {
        let stage = InterleaveStage::new(
            vec![crate::test_util::leaf(4, 1), crate::test_util::leaf(2, 1)],
            None,
            0,
            StoppingStrategy::FirstExhausted,
        )
        .unwrap();
        assert_eq!(stage.num_shards(), 2);
    }
}
