//! Grouping consecutive records into list-valued records

use std::sync::Arc;

use ml_stream_core::{
    Batch, BoxStream, DataType, Error, Field, PassContext, Record, RecordStream, Result, Schema, SeededRng, Stage,
    StageRef, Value,
};

/// Groups up to `batch_size` consecutive records into one record
///
/// Each output column holds a [`Value::List`] of the grouped values; declared
/// column types become `List(t)`.
pub struct GroupStage {
    upstream: StageRef,
    batch_size: usize,
    drop_last_batch: bool,
    schema: Option<Schema>,
}

impl GroupStage {
    /// Create a grouping stage
    pub fn new(upstream: StageRef, batch_size: usize, drop_last_batch: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be greater than 0".into()));
        }
        let schema = upstream.schema().map(|schema| {
            Schema::new(
                schema
                    .fields()
                    .iter()
                    .map(|f| Field::new(f.name(), DataType::List(Box::new(f.data_type().clone())), f.is_nullable()))
                    .collect(),
            )
        });
        Ok(Self {
            upstream,
            batch_size,
            drop_last_batch,
            schema,
        })
    }
}

impl Stage for GroupStage {
    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        Box::new(GroupStream {
            upstream: Some(self.upstream.open(ctx)),
            batch_size: self.batch_size,
            drop_last_batch: self.drop_last_batch,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        Arc::new(Self {
            upstream: Arc::clone(&self.upstream).shuffle_shards(rng),
            batch_size: self.batch_size,
            drop_last_batch: self.drop_last_batch,
            schema: self.schema.clone(),
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        Ok(Arc::new(Self {
            upstream: self.upstream.partition(worker_count, worker_index)?,
            batch_size: self.batch_size,
            drop_last_batch: self.drop_last_batch,
            schema: self.schema.clone(),
        }))
    }

    fn shard_order_locked(&self) -> bool {
        self.upstream.shard_order_locked()
    }
}

struct GroupStream {
    upstream: Option<BoxStream>,
    batch_size: usize,
    drop_last_batch: bool,
}

impl RecordStream for GroupStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(upstream) = self.upstream.as_mut() else {
            return Ok(None);
        };
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match upstream.next_record()? {
                Some(record) => rows.push(record),
                None => {
                    self.upstream = None;
                    break;
                }
            }
        }
        if rows.is_empty() || (self.drop_last_batch && rows.len() < self.batch_size) {
            self.upstream = None;
            return Ok(None);
        }

        let batch = Batch::from_records(rows);
        let mut grouped = Record::with_capacity(batch.num_columns());
        for name in batch.column_names() {
            let values = batch.try_column(name)?.to_vec();
            grouped.set(name, Value::List(values));
        }
        Ok(Some(grouped))
    }
}

#[cfg(test)]
mod tests {
    use ml_stream_core::{IterStream, Records, ShardSet, ShardSetStage, ShardSource};

    use super::*;

    struct Counter(i64);

    impl ShardSource for Counter {
        fn open(&self) -> Result<BoxStream> {
            let n = self.0;
            Ok(Box::new(IterStream::new((0..n).map(|id| Ok(Record::new().with("id", id))))))
        }
    }

    fn leaf(n: i64) -> StageRef {
        let sources: Vec<Arc<dyn ShardSource>> = vec![Arc::new(Counter(n))];
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        Arc::new(ShardSetStage::new(ShardSet::new(sources), Some(schema)))
    }

    fn lists(stage: &GroupStage) -> Vec<Vec<i64>> {
        Records::new(stage.open(PassContext::default()))
            .map(|r| {
                let record = r.unwrap();
                record.get("id").and_then(Value::as_list).unwrap().iter().filter_map(Value::as_i64).collect()
            })
            .collect()
    }

    #[test]
    fn test_groups_keep_remainder() {
        let stage = GroupStage::new(leaf(5), 2, false).unwrap();
        assert_eq!(lists(&stage), vec![vec![0, 1], vec![2, 3], vec![4]]);
        let field = stage.schema().unwrap().field_by_name("id").unwrap();
        assert_eq!(field.data_type(), &DataType::List(Box::new(DataType::Int64)));
    }

    #[test]
    fn test_groups_drop_remainder() {
        let stage = GroupStage::new(leaf(5), 2, true).unwrap();
        assert_eq!(lists(&stage), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(GroupStage::new(leaf(1), 0, false).is_err());
    }
}
