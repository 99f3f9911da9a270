//! Windowed shuffle buffer with shard-order shuffling

use std::sync::Arc;

use ml_stream_core::rng::{effective_seed, seeded_rng};
use ml_stream_core::{
    BoxStream, Error, IterStream, PassContext, Record, RecordStream, Result, Schema, SeededRng, Stage, StageRef,
};
use rand::Rng;
use tracing::debug;

/// Default capacity of the shuffle window
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Approximate shuffling through a bounded random window
///
/// Each pass seeds a generator with `seed + epoch`, uses it to permute the
/// shard order of every shard set upstream, then keeps `buffer_size` records
/// in a window and emits a uniformly chosen one on every pull.
///
/// Partitioning a shuffle stage defers the split to each pass: the full shard
/// order is shuffled first and a worker then keeps its positions in it. Every
/// worker derives the same order from `seed + epoch`, so the partitions stay
/// disjoint while the assignment changes from epoch to epoch.
pub struct ShuffleStage {
    upstream: StageRef,
    seed: u64,
    buffer_size: usize,
    /// `(worker_count, worker_index)` splits applied after shard shuffling
    workers: Vec<(usize, usize)>,
}

impl ShuffleStage {
    /// Create a shuffle stage; `buffer_size` must be at least 1
    pub fn new(upstream: StageRef, seed: u64, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(Error::InvalidArgument("shuffle buffer size must be at least 1".into()));
        }
        Ok(Self {
            upstream,
            seed,
            buffer_size,
            workers: Vec::new(),
        })
    }

    /// Base seed of this stage
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Capacity of the shuffle window
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Shuffled shard order of one pass, restricted to this stage's workers
    fn pass_upstream(&self, rng: &mut SeededRng) -> Result<StageRef> {
        let mut upstream = Arc::clone(&self.upstream).shuffle_shards(rng);
        for &(worker_count, worker_index) in &self.workers {
            upstream = upstream.partition(worker_count, worker_index)?;
        }
        Ok(upstream)
    }
}

impl Stage for ShuffleStage {
    fn schema(&self) -> Option<&Schema> {
        self.upstream.schema()
    }

    fn num_shards(&self) -> usize {
        if self.workers.is_empty() {
            return self.upstream.num_shards();
        }
        self.pass_upstream(&mut seeded_rng(self.seed)).map_or(0, |upstream| upstream.num_shards())
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        let seed = effective_seed(self.seed, ctx.epoch);
        let mut rng = seeded_rng(seed);
        let upstream: BoxStream = match self.pass_upstream(&mut rng) {
            Ok(upstream) => upstream.open(ctx),
            Err(err) => Box::new(IterStream::new(std::iter::once(Err(err)))),
        };
        Box::new(ShuffleStream {
            upstream: Some(upstream),
            window: Vec::with_capacity(self.buffer_size),
            capacity: self.buffer_size,
            filled: false,
            rng,
            seed,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        Arc::new(Self {
            upstream: Arc::clone(&self.upstream).shuffle_shards(rng),
            seed: self.seed,
            buffer_size: self.buffer_size,
            workers: self.workers.clone(),
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        let mut workers = self.workers.clone();
        workers.push((worker_count, worker_index));
        let stage = Self {
            upstream: Arc::clone(&self.upstream),
            seed: self.seed,
            buffer_size: self.buffer_size,
            workers,
        };
        // Validate the split eagerly.
        stage.pass_upstream(&mut seeded_rng(self.seed))?;
        Ok(Arc::new(stage))
    }

    fn shard_order_locked(&self) -> bool {
        self.upstream.shard_order_locked()
    }
}

struct ShuffleStream {
    upstream: Option<BoxStream>,
    /// Never holds more than `capacity` records
    window: Vec<Record>,
    capacity: usize,
    filled: bool,
    rng: SeededRng,
    seed: u64,
}

impl ShuffleStream {
    fn pull(&mut self) -> Result<Option<Record>> {
        let Some(upstream) = self.upstream.as_mut() else {
            return Ok(None);
        };
        let next = upstream.next_record()?;
        if next.is_none() {
            self.upstream = None;
        }
        Ok(next)
    }

    fn fill(&mut self) -> Result<()> {
        while self.window.len() < self.capacity {
            match self.pull()? {
                Some(record) => self.window.push(record),
                None => break,
            }
        }
        self.filled = true;
        debug!(seed = self.seed, records = self.window.len(), capacity = self.capacity, "shuffle window filled");
        Ok(())
    }
}

impl RecordStream for ShuffleStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.filled {
            self.fill()?;
        }
        if self.window.is_empty() {
            return Ok(None);
        }
        let slot = self.rng.random_range(0..self.window.len());
        match self.pull()? {
            Some(replacement) => Ok(Some(std::mem::replace(&mut self.window[slot], replacement))),
            None => Ok(Some(self.window.swap_remove(slot))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ml_stream_core::Records;
    use proptest::prelude::*;

    use super::*;
    use crate::test_util::{ids, leaf};

    fn run(stage: &ShuffleStage, epoch: u64) -> Vec<i64> {
        ids(Records::new(stage.open(PassContext::new(epoch))))
    }

    #[test]
    fn test_four_shards_buffer_ten_seed_42() {
        let stage = ShuffleStage::new(leaf(4, 5), 42, 10).unwrap();
        let first = run(&stage, 0);
        assert_eq!(first, vec![6, 11, 9, 7, 14, 13, 0, 3, 12, 16, 1, 18, 8, 2, 4, 15, 5, 17, 10, 19]);
        assert_eq!(first, run(&stage, 0));
    }

    #[test]
    fn test_partition_assignment_changes_with_epoch() {
        let stage: StageRef = Arc::new(ShuffleStage::new(leaf(8, 1), 42, 1).unwrap());
        let workers = [stage.partition(2, 0).unwrap(), stage.partition(2, 1).unwrap()];
        assert_eq!(workers[0].num_shards(), 4);

        let mut assignments = HashSet::new();
        for epoch in 0..20 {
            let parts: Vec<Vec<i64>> = workers
                .iter()
                .map(|w| ids(Records::new(w.open(PassContext::new(epoch)))))
                .collect();
            let mut covered: Vec<i64> = parts.concat();
            covered.sort_unstable();
            assert_eq!(covered, (0..8).collect::<Vec<_>>());

            let mut first = parts[0].clone();
            first.sort_unstable();
            assignments.insert(first);
        }
        assert!(assignments.len() > 1);
    }

    #[test]
    fn test_partition_rejects_bad_worker_index() {
        let stage = ShuffleStage::new(leaf(4, 1), 1, 2).unwrap();
        assert!(matches!(stage.partition(2, 2), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_epoch_changes_permutation() {
        let stage = ShuffleStage::new(leaf(4, 5), 42, 10).unwrap();
        assert_ne!(run(&stage, 0), run(&stage, 1));
        let shifted = ShuffleStage::new(leaf(4, 5), 43, 10).unwrap();
        assert_eq!(run(&stage, 1), run(&shifted, 0));
    }

    #[test]
    fn test_buffer_of_one_only_reorders_shards() {
        let stage = ShuffleStage::new(leaf(4, 5), 7, 1).unwrap();
        let out = run(&stage, 0);
        for shard in out.chunks(5) {
            let start = shard[0];
            assert_eq!(start % 5, 0);
            assert_eq!(shard, (start..start + 5).collect::<Vec<_>>().as_slice());
        }
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        assert!(matches!(ShuffleStage::new(leaf(1, 1), 0, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_upstream() {
        let stage = ShuffleStage::new(leaf(0, 0), 1, 4).unwrap();
        assert!(run(&stage, 0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_output_is_permutation(
            shards in 0usize..5,
            per_shard in 0i64..8,
            buffer in 1usize..12,
            seed in any::<u64>(),
        ) {
            let stage = ShuffleStage::new(leaf(shards, per_shard), seed, buffer).unwrap();
            let out = run(&stage, 3);
            let unique: HashSet<i64> = out.iter().copied().collect();
            prop_assert_eq!(unique.len(), out.len());
            prop_assert_eq!(out.len(), shards * usize::try_from(per_shard).unwrap());
            prop_assert_eq!(out, run(&stage, 3));
        }
    }
}
