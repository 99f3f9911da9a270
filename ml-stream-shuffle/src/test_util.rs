//! Shard fixtures shared by the shuffle tests

use std::sync::Arc;

use ml_stream_core::{BoxStream, IterStream, Record, Records, Result, ShardSet, ShardSetStage, ShardSource, StageRef};

/// Shard of consecutive ids
pub(crate) struct IdShard {
    first: i64,
    len: i64,
}

impl ShardSource for IdShard {
    fn open(&self) -> Result<BoxStream> {
        let records = (self.first..self.first + self.len).map(|id| Ok(Record::new().with("id", id)));
        Ok(Box::new(IterStream::new(records)))
    }
}

/// `shards` shards of `per_shard` records, ids `0..shards * per_shard`
pub(crate) fn leaf(shards: usize, per_shard: i64) -> StageRef {
    let sources: Vec<Arc<dyn ShardSource>> = (0..shards)
        .map(|i| {
            let first = i64::try_from(i).unwrap() * per_shard;
            Arc::new(IdShard { first, len: per_shard }) as Arc<dyn ShardSource>
        })
        .collect();
    Arc::new(ShardSetStage::new(ShardSet::new(sources), None))
}

/// Single shard with ids `first..first + len`
pub(crate) fn offset_leaf(first: i64, len: i64) -> StageRef {
    let sources: Vec<Arc<dyn ShardSource>> = vec![Arc::new(IdShard { first, len })];
    Arc::new(ShardSetStage::new(ShardSet::new(sources), None))
}

pub(crate) fn ids(records: Records) -> Vec<i64> {
    records
        .map(|r| r.unwrap().get("id").and_then(|v| v.as_i64()).unwrap())
        .collect()
}
