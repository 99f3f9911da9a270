//! Shards, shard sets, and the leaf stage that streams them

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::rng::{self, SeededRng};
use crate::schema::Schema;
use crate::stage::{PassContext, Stage, StageRef};
use crate::stream::{BoxStream, RecordStream};

/// Identifier of a shard: its index in the shard set it was first listed in
///
/// Ids survive reordering and partitioning, so a shard keeps its id in every
/// worker's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub usize);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A restartable source of records for one shard
///
/// Every call to [`ShardSource::open`] starts the shard from its beginning.
/// Failures to reach the underlying resource may be reported from `open` or
/// from any later pull; the engine only calls `open` once the first record of
/// the shard is requested.
pub trait ShardSource: Send + Sync {
    /// Open the shard for one pass
    fn open(&self) -> Result<BoxStream>;

    /// Human-readable description used in logs
    fn describe(&self) -> String {
        "shard".to_string()
    }
}

#[derive(Clone)]
struct Shard {
    id: ShardId,
    source: Arc<dyn ShardSource>,
}

/// An ordered set of shards plus their iteration order
///
/// The iteration order is the only place shard shuffling lives; records inside
/// a shard are never reordered by it.
#[derive(Clone, Default)]
pub struct ShardSet {
    /// Shards, in the order they were listed
    shards: Vec<Shard>,

    /// Iteration order as positions into `shards`
    order: Vec<usize>,
}

impl ShardSet {
    /// Create a shard set; shard ids follow the order of `sources`
    pub fn new(sources: Vec<Arc<dyn ShardSource>>) -> Self {
        let shards: Vec<Shard> = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| Shard { id: ShardId(i), source })
            .collect();
        let order = (0..shards.len()).collect();
        Self { shards, order }
    }

    /// Number of shards
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Check if the set has no shards
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard identifiers in current iteration order
    pub fn shards(&self) -> Vec<ShardId> {
        self.order.iter().map(|&i| self.shards[i].id).collect()
    }

    /// Replace the iteration order
    ///
    /// `permutation[k]` is the index, in the order shards were listed in this
    /// set, of the shard to visit k-th. It must be a bijection on `0..len`;
    /// otherwise the set is left unchanged. Any earlier order is discarded.
    pub fn set_order(&mut self, permutation: &[usize]) -> Result<()> {
        if permutation.len() != self.order.len() {
            return Err(Error::InvalidArgument(format!(
                "shard permutation has {} entries, expected {}",
                permutation.len(),
                self.order.len()
            )));
        }
        let mut seen = vec![false; permutation.len()];
        for &p in permutation {
            if p >= seen.len() || seen[p] {
                return Err(Error::InvalidArgument(format!(
                    "shard permutation is not a bijection (entry {p})"
                )));
            }
            seen[p] = true;
        }
        self.order = permutation.to_vec();
        Ok(())
    }

    /// Copy of this set with its iteration order permuted by `rng`
    pub fn shuffled(&self, rng: &mut SeededRng) -> Self {
        let permutation = rng::permutation(self.len(), rng);
        let order = permutation.iter().map(|&p| self.order[p]).collect();
        Self {
            shards: self.shards.clone(),
            order,
        }
    }

    /// Disjoint subset for one worker
    ///
    /// Keeps the shards at iteration positions `i` with
    /// `i % worker_count == worker_index`, in their relative order.
    pub fn partition(&self, worker_count: usize, worker_index: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::InvalidArgument("worker count must be greater than 0".into()));
        }
        if worker_index >= worker_count {
            return Err(Error::InvalidArgument(format!(
                "worker index {worker_index} out of range for {worker_count} workers"
            )));
        }
        let shards: Vec<Shard> = self
            .order
            .iter()
            .enumerate()
            .filter(|(position, _)| position % worker_count == worker_index)
            .map(|(_, &i)| self.shards[i].clone())
            .collect();
        if shards.is_empty() {
            warn!(
                worker_index,
                worker_count,
                num_shards = self.len(),
                "worker received no shards; its partition is empty"
            );
        }
        let order = (0..shards.len()).collect();
        Ok(Self { shards, order })
    }

    /// Stream every shard in iteration order
    pub fn open(&self) -> ShardSetStream {
        let pending: Vec<Shard> = self.order.iter().map(|&i| self.shards[i].clone()).collect();
        ShardSetStream {
            pending: pending.into_iter(),
            current: None,
        }
    }
}

impl fmt::Debug for ShardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardSet").field("order", &self.shards()).finish()
    }
}

/// Stream over a shard set that opens one shard at a time
///
/// A shard is opened on the first pull that needs it and dropped as soon as it
/// is exhausted, so at most one shard resource is held at once.
pub struct ShardSetStream {
    pending: std::vec::IntoIter<Shard>,
    current: Option<(ShardId, BoxStream)>,
}

impl RecordStream for ShardSetStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.current.is_none() {
                let Some(shard) = self.pending.next() else {
                    return Ok(None);
                };
                debug!(shard = %shard.id, source = %shard.source.describe(), "opening shard");
                let stream = shard.source.open().map_err(|e| e.at_shard(shard.id))?;
                self.current = Some((shard.id, stream));
            }

            let Some((id, stream)) = self.current.as_mut() else {
                continue;
            };
            let id = *id;
            match stream.next_record() {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {
                    trace!(shard = %id, "shard exhausted, releasing");
                    self.current = None;
                }
                Err(err) => return Err(err.at_shard(id)),
            }
        }
    }
}

/// Leaf stage streaming a shard set
#[derive(Clone)]
pub struct ShardSetStage {
    shards: ShardSet,
    schema: Option<Schema>,
}

impl ShardSetStage {
    /// Create a leaf stage
    pub fn new(shards: ShardSet, schema: Option<Schema>) -> Self {
        Self { shards, schema }
    }

    /// The shard set this stage reads
    pub fn shard_set(&self) -> &ShardSet {
        &self.shards
    }
}

impl Stage for ShardSetStage {
    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn num_shards(&self) -> usize {
        self.shards.len()
    }

    fn open(&self, _ctx: PassContext) -> BoxStream {
        Box::new(self.shards.open())
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        Arc::new(Self {
            shards: self.shards.shuffled(rng),
            schema: self.schema.clone(),
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        Ok(Arc::new(Self {
            shards: self.shards.partition(worker_count, worker_index)?,
            schema: self.schema.clone(),
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::stream::{IterStream, Records};

    /// Shard of `len` records with ids starting at `first`, counting its opens
    pub(crate) struct RangeShard {
        pub first: i64,
        pub len: i64,
        pub opens: Arc<AtomicUsize>,
    }

    impl RangeShard {
        pub(crate) fn new(first: i64, len: i64) -> Self {
            Self { first, len, opens: Arc::new(AtomicUsize::new(0)) }
        }
    }

    impl ShardSource for RangeShard {
        fn open(&self) -> Result<BoxStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let records = (self.first..self.first + self.len).map(|id| Ok(Record::new().with("id", id)));
            Ok(Box::new(IterStream::new(records)))
        }
    }

    struct BrokenShard;

    impl ShardSource for BrokenShard {
        fn open(&self) -> Result<BoxStream> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")))
        }
    }

    pub(crate) fn range_set(shards: usize, per_shard: i64) -> ShardSet {
        let sources: Vec<Arc<dyn ShardSource>> = (0..shards)
            .map(|i| Arc::new(RangeShard::new(i as i64 * per_shard, per_shard)) as Arc<dyn ShardSource>)
            .collect();
        ShardSet::new(sources)
    }

    pub(crate) fn ids(records: Records) -> Vec<i64> {
        records.map(|r| r.unwrap().get("id").and_then(|v| v.as_i64()).unwrap()).collect()
    }

    #[test]
    fn test_streams_shards_in_order() {
        let set = range_set(3, 2);
        assert_eq!(ids(Records::new(Box::new(set.open()))), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_set_order_reorders_shards_not_records() {
        let mut set = range_set(3, 2);
        set.set_order(&[2, 0, 1]).unwrap();
        assert_eq!(set.shards(), vec![ShardId(2), ShardId(0), ShardId(1)]);
        assert_eq!(ids(Records::new(Box::new(set.open()))), vec![4, 5, 0, 1, 2, 3]);
    }

    #[test]
    fn test_set_order_replaces_previous_order() {
        let mut set = range_set(3, 1);
        set.set_order(&[1, 0, 2]).unwrap();
        set.set_order(&[1, 0, 2]).unwrap();
        assert_eq!(set.shards(), vec![ShardId(1), ShardId(0), ShardId(2)]);
    }

    #[test]
    fn test_set_order_on_shuffled_set_uses_listing_indices() {
        let mut set = range_set(4, 1).shuffled(&mut rng::seeded_rng(42));
        set.set_order(&[3, 2, 1, 0]).unwrap();
        assert_eq!(set.shards(), vec![ShardId(3), ShardId(2), ShardId(1), ShardId(0)]);
        assert_eq!(ids(Records::new(Box::new(set.open()))), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_set_order_rejects_non_bijection() {
        let mut set = range_set(3, 1);
        assert!(set.set_order(&[0, 0, 1]).is_err());
        assert!(set.set_order(&[0, 1]).is_err());
        assert!(set.set_order(&[0, 1, 3]).is_err());
        assert_eq!(set.shards(), vec![ShardId(0), ShardId(1), ShardId(2)]);
    }

    #[test]
    fn test_partition_is_disjoint_and_covering() {
        let set = range_set(7, 1);
        let mut all: Vec<ShardId> = Vec::new();
        for worker in 0..3 {
            let part = set.partition(3, worker).unwrap();
            assert_eq!(part.shards(), set.partition(3, worker).unwrap().shards());
            all.extend(part.shards());
        }
        all.sort();
        assert_eq!(all, set.shards());
        assert_eq!(set.partition(3, 1).unwrap().shards(), vec![ShardId(1), ShardId(4)]);
    }

    #[test]
    fn test_partition_rejects_bad_arguments() {
        let set = range_set(2, 1);
        assert!(set.partition(0, 0).is_err());
        assert!(set.partition(2, 2).is_err());
        assert!(set.partition(4, 3).unwrap().is_empty());
    }

    #[test]
    fn test_open_error_is_lazy_and_attributed() {
        let sources: Vec<Arc<dyn ShardSource>> = vec![Arc::new(RangeShard::new(0, 2)), Arc::new(BrokenShard)];
        let set = ShardSet::new(sources);
        let mut records = Records::new(Box::new(set.open()));
        assert!(records.next().unwrap().is_ok());
        assert!(records.next().unwrap().is_ok());
        let err = records.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { shard: ShardId(1), .. }));
    }

    #[test]
    fn test_shards_open_only_when_reached() {
        let first = RangeShard::new(0, 2);
        let second = RangeShard::new(2, 2);
        let second_opens = second.opens.clone();
        let sources: Vec<Arc<dyn ShardSource>> = vec![Arc::new(first), Arc::new(second)];
        let set = ShardSet::new(sources);
        let mut stream = set.open();
        stream.next_record().unwrap();
        stream.next_record().unwrap();
        assert_eq!(second_opens.load(Ordering::SeqCst), 0);
        stream.next_record().unwrap();
        assert_eq!(second_opens.load(Ordering::SeqCst), 1);
    }
}
