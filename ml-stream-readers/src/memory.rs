//! Shards backed by records held in memory

use std::sync::Arc;

use ml_stream_core::{BoxStream, Record, RecordStream, ShardSource};

use crate::error::{Error, Result};

/// A shard over a shared, immutable list of records
#[derive(Debug, Clone, Default)]
pub struct InMemoryShard {
    records: Arc<Vec<Record>>,
}

impl InMemoryShard {
    /// Create a shard over `records`
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    /// Number of records in the shard
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the shard has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Split `records` into `num_shards` contiguous shards of near-equal size
    ///
    /// Earlier shards receive one extra record when the split is uneven.
    pub fn split(records: Vec<Record>, num_shards: usize) -> Result<Vec<Arc<dyn ShardSource>>> {
        if num_shards == 0 {
            return Err(Error::InvalidArgument("number of shards must be greater than 0".into()));
        }
        let base = records.len() / num_shards;
        let extra = records.len() % num_shards;
        let mut rest = records.into_iter();
        let shards = (0..num_shards)
            .map(|i| {
                let size = base + usize::from(i < extra);
                Arc::new(Self::new(rest.by_ref().take(size).collect())) as Arc<dyn ShardSource>
            })
            .collect();
        Ok(shards)
    }
}

impl ShardSource for InMemoryShard {
    fn open(&self) -> ml_stream_core::Result<BoxStream> {
        Ok(Box::new(MemoryStream {
            records: Arc::clone(&self.records),
            position: 0,
        }))
    }

    fn describe(&self) -> String {
        format!("memory({} records)", self.records.len())
    }
}

struct MemoryStream {
    records: Arc<Vec<Record>>,
    position: usize,
}

impl RecordStream for MemoryStream {
    fn next_record(&mut self) -> ml_stream_core::Result<Option<Record>> {
        let record = self.records.get(self.position).cloned();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use ml_stream_core::Records;

    use super::*;

    fn records(n: i64) -> Vec<Record> {
        (0..n).map(|id| Record::new().with("id", id)).collect()
    }

    #[test]
    fn test_restartable() {
        let shard = InMemoryShard::new(records(3));
        for _ in 0..2 {
            assert_eq!(Records::new(shard.open().unwrap()).count(), 3);
        }
    }

    #[test]
    fn test_split_is_contiguous_and_covering() {
        let shards = InMemoryShard::split(records(7), 3).unwrap();
        let sizes: Vec<usize> = shards
            .iter()
            .map(|s| Records::new(s.open().unwrap()).count())
            .collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        assert!(InMemoryShard::split(records(1), 0).is_err());
    }
}
