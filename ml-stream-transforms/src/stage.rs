//! Stage applying a transform chain to its upstream

use std::sync::Arc;

use ml_stream_core::{BoxStream, PassContext, Result, Schema, SeededRng, Stage, StageRef};

use crate::chain::TransformChain;

/// Runs a [`TransformChain`] over every pass of its upstream
///
/// Transform stages are transparent to shard shuffling and partitioning: both
/// are forwarded to the upstream so they reach the shard sets underneath.
pub struct TransformStage {
    upstream: StageRef,
    chain: Arc<TransformChain>,
    schema: Option<Schema>,
}

impl TransformStage {
    /// Create a transform stage, computing its schema from the upstream's
    pub fn new(upstream: StageRef, chain: TransformChain) -> Result<Self> {
        let schema = chain.output_schema(upstream.schema())?;
        Ok(Self {
            upstream,
            chain: Arc::new(chain),
            schema,
        })
    }

    /// The chain this stage runs
    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    fn with_upstream(&self, upstream: StageRef) -> StageRef {
        Arc::new(Self {
            upstream,
            chain: Arc::clone(&self.chain),
            schema: self.schema.clone(),
        })
    }
}

impl Stage for TransformStage {
    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        self.chain.apply(self.upstream.open(ctx))
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        let upstream = Arc::clone(&self.upstream).shuffle_shards(rng);
        self.with_upstream(upstream)
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        Ok(self.with_upstream(self.upstream.partition(worker_count, worker_index)?))
    }

    fn shard_order_locked(&self) -> bool {
        self.upstream.shard_order_locked()
    }
}

#[cfg(test)]
mod tests {
    use ml_stream_core::{DataType, Error, Field, IterStream, Record, Records, ShardSet, ShardSetStage, ShardSource};

    use super::*;
    use crate::step::TransformStep;

    struct Rows(Vec<i64>);

    impl ShardSource for Rows {
        fn open(&self) -> Result<BoxStream> {
            let rows: Vec<_> = self.0.iter().map(|&id| Ok(Record::new().with("id", id))).collect();
            Ok(Box::new(IterStream::new(rows.into_iter())))
        }
    }

    fn leaf(schema: Option<Schema>) -> StageRef {
        let sources: Vec<Arc<dyn ShardSource>> = vec![Arc::new(Rows(vec![0, 1])), Arc::new(Rows(vec![2]))];
        Arc::new(ShardSetStage::new(ShardSet::new(sources), schema))
    }

    fn id_schema() -> Schema {
        Schema::new(vec![Field::new("id", DataType::Int64, false)])
    }

    fn rename(from: &str, to: &str) -> TransformStep {
        TransformStep::Rename { from: from.into(), to: to.into() }
    }

    #[test]
    fn test_known_schema_reports_errors_at_construction() {
        let chain = TransformChain::new(vec![rename("missing", "x")]);
        assert!(matches!(TransformStage::new(leaf(Some(id_schema())), chain), Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn test_unknown_schema_reports_errors_per_record() {
        let stage = TransformStage::new(leaf(None), TransformChain::new(vec![rename("missing", "x")])).unwrap();
        let mut records = Records::new(stage.open(PassContext::default()));
        assert!(matches!(records.next(), Some(Err(Error::UnknownColumn(_)))));
    }

    #[test]
    fn test_schema_propagates_through_steps() {
        let chain = TransformChain::new(vec![
            rename("id", "label"),
            TransformStep::CastColumn { column: "label".into(), data_type: DataType::Boolean },
        ]);
        let stage = TransformStage::new(leaf(Some(id_schema())), chain).unwrap();
        let expected = Schema::new(vec![Field::new("label", DataType::Boolean, false)]);
        assert_eq!(stage.schema(), Some(&expected));
    }

    #[test]
    fn test_partition_reaches_shards_below() {
        let stage = TransformStage::new(leaf(None), TransformChain::new(vec![rename("id", "key")])).unwrap();
        let part = stage.partition(2, 1).unwrap();
        let keys: Vec<i64> = Records::new(part.open(PassContext::default()))
            .map(|r| r.unwrap().get("key").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(keys, vec![2]);
        assert_eq!(part.num_shards(), 1);
    }
}
