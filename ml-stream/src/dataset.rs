//! The streaming dataset facade and its builder

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use ml_stream_core::{
    Batch, DataType, Error, PassContext, Record, Records, RepeatStage, Result, Schema, ShardSet, ShardSetStage,
    ShardSource, SkipStage, Stage, StageRef, StrideStage, TakeStage,
};
use ml_stream_readers::InMemoryShard;
use ml_stream_shuffle::ShuffleStage;
use ml_stream_transforms::{GroupStage, MapOutput, TransformChain, TransformStage, TransformStep};

use crate::config::{MapOptions, ShuffleOptions};

/// A lazily evaluated, possibly unbounded dataset streamed from shards
///
/// Every operation returns a new dataset describing a longer pipeline; no
/// record is read until [`StreamingDataset::iter`] is pulled. Record-level
/// transforms applied back to back are fused into one chain.
#[derive(Clone)]
pub struct StreamingDataset {
    /// Pipeline below the pending transforms
    base: StageRef,

    /// Transforms not yet wrapped into a stage
    chain: TransformChain,

    /// Schema after the pending transforms, when known
    schema: Option<Schema>,

    /// Epoch the next pass is opened with
    epoch: u64,
}

impl StreamingDataset {
    /// Create a dataset from any stage
    pub fn from_stage(stage: StageRef) -> Self {
        let schema = stage.schema().cloned();
        Self {
            base: stage,
            chain: TransformChain::default(),
            schema,
            epoch: 0,
        }
    }

    /// Create a dataset over a shard set
    pub fn from_shard_set(shards: ShardSet, schema: Option<Schema>) -> Self {
        Self::from_stage(Arc::new(ShardSetStage::new(shards, schema)))
    }

    /// Create a dataset with one shard per source, in order
    pub fn from_shards(sources: Vec<Arc<dyn ShardSource>>, schema: Option<Schema>) -> Self {
        Self::from_shard_set(ShardSet::new(sources), schema)
    }

    /// Create a dataset over in-memory records split into `num_shards` shards
    pub fn from_records(records: Vec<Record>, num_shards: usize, schema: Option<Schema>) -> Result<Self> {
        let sources = InMemoryShard::split(records, num_shards)?;
        Ok(Self::from_shards(sources, schema))
    }

    /// Start building a dataset
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    /// The pipeline this dataset runs, with pending transforms wrapped in
    pub fn stage(&self) -> Result<StageRef> {
        if self.chain.is_empty() {
            return Ok(Arc::clone(&self.base));
        }
        Ok(Arc::new(TransformStage::new(Arc::clone(&self.base), self.chain.clone())?))
    }

    /// Declared schema of the records this dataset produces, when known
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Number of shards visible to this dataset
    pub fn num_shards(&self) -> usize {
        self.base.num_shards()
    }

    /// Epoch the next pass will use
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Set the epoch for the next pass
    ///
    /// Iterators already created keep the epoch they were opened with.
    pub fn set_epoch(&mut self, epoch: u64) {
        debug!(epoch, "setting dataset epoch");
        self.epoch = epoch;
    }

    /// Start a pass over the dataset
    ///
    /// Returns a fused iterator; the first error ends the pass.
    pub fn iter(&self) -> Records {
        match self.stage() {
            Ok(stage) => Records::new(stage.open(PassContext::new(self.epoch))),
            Err(err) => Records::new(Box::new(ml_stream_core::IterStream::new(std::iter::once(Err(err))))),
        }
    }

    fn with_step(mut self, step: TransformStep) -> Result<Self> {
        step.validate()?;
        self.schema = step.output_schema(self.schema.as_ref())?;
        self.chain.push(step);
        Ok(self)
    }

    fn wrap(&self, stage: StageRef) -> Self {
        Self {
            epoch: self.epoch,
            ..Self::from_stage(stage)
        }
    }

    /// Map every record; the returned columns are added or replaced
    pub fn map<F>(self, func: F) -> Result<Self>
    where
        F: Fn(&Record) -> Result<Record> + Send + Sync + 'static,
    {
        self.map_with(func, MapOptions::default())
    }

    /// Map every record with removal of input columns and declared features
    pub fn map_with<F>(self, func: F, options: MapOptions) -> Result<Self>
    where
        F: Fn(&Record) -> Result<Record> + Send + Sync + 'static,
    {
        let output = map_output(options);
        self.with_step(TransformStep::RecordMap {
            func: Arc::new(func),
            output,
        })
    }

    /// Map every record together with its index in the pass
    pub fn map_with_indices<F>(self, func: F, options: MapOptions) -> Result<Self>
    where
        F: Fn(&Record, usize) -> Result<Record> + Send + Sync + 'static,
    {
        let output = map_output(options);
        self.with_step(TransformStep::IndexedMap {
            func: Arc::new(func),
            output,
        })
    }

    /// Map batches of `options.batch_size` records
    pub fn map_batched<F>(self, func: F, options: MapOptions) -> Result<Self>
    where
        F: Fn(&Batch) -> Result<Batch> + Send + Sync + 'static,
    {
        let batch_size = options.batch_size;
        let drop_last_batch = options.drop_last_batch;
        self.with_step(TransformStep::BatchMap {
            func: Arc::new(func),
            batch_size,
            drop_last_batch,
            output: map_output(options),
        })
    }

    /// Keep records for which `predicate` holds
    pub fn filter<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Record) -> Result<bool> + Send + Sync + 'static,
    {
        self.with_step(TransformStep::RecordFilter(Arc::new(predicate)))
    }

    /// Keep records for which `predicate` holds, given each record's index
    pub fn filter_with_indices<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Record, usize) -> Result<bool> + Send + Sync + 'static,
    {
        self.with_step(TransformStep::IndexedFilter(Arc::new(predicate)))
    }

    /// Keep rows flagged by `predicate`, evaluated on batches of `batch_size` records
    pub fn filter_batched<F>(self, predicate: F, batch_size: usize) -> Result<Self>
    where
        F: Fn(&Batch) -> Result<Vec<bool>> + Send + Sync + 'static,
    {
        self.with_step(TransformStep::BatchFilter {
            func: Arc::new(predicate),
            batch_size,
        })
    }

    /// Rename one column
    pub fn rename_column(self, from: &str, to: &str) -> Result<Self> {
        self.with_step(TransformStep::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Rename several columns, one pair after another
    pub fn rename_columns(self, pairs: &[(&str, &str)]) -> Result<Self> {
        pairs
            .iter()
            .try_fold(self, |dataset, (from, to)| dataset.rename_column(from, to))
    }

    /// Drop columns
    pub fn remove_columns<I, S>(self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_step(TransformStep::Remove(columns.into_iter().map(Into::into).collect()))
    }

    /// Keep only the named columns, in the given order
    pub fn select_columns<I, S>(self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_step(TransformStep::Select(columns.into_iter().map(Into::into).collect()))
    }

    /// Cast one column to a new type
    pub fn cast_column(self, column: &str, data_type: DataType) -> Result<Self> {
        self.with_step(TransformStep::CastColumn {
            column: column.to_string(),
            data_type,
        })
    }

    /// Cast every record to `schema`
    pub fn cast(self, schema: Schema) -> Result<Self> {
        self.with_step(TransformStep::Cast(schema))
    }

    /// Shuffle with a bounded window
    pub fn shuffle(self, seed: u64, buffer_size: usize) -> Result<Self> {
        self.shuffle_with(ShuffleOptions { seed, buffer_size })
    }

    /// Shuffle with explicit options
    ///
    /// Fails with [`Error::ShuffleLocked`] once a take or skip has fixed the
    /// shard order.
    pub fn shuffle_with(self, options: ShuffleOptions) -> Result<Self> {
        let stage = self.stage()?;
        if stage.shard_order_locked() {
            return Err(Error::ShuffleLocked);
        }
        let shuffled = ShuffleStage::new(stage, options.seed, options.buffer_size)?;
        Ok(self.wrap(Arc::new(shuffled)))
    }

    /// Only the first `n` records
    pub fn take(self, n: usize) -> Result<Self> {
        let stage = self.stage()?;
        Ok(self.wrap(Arc::new(TakeStage::new(stage, n))))
    }

    /// Everything after the first `n` records
    pub fn skip(self, n: usize) -> Result<Self> {
        let stage = self.stage()?;
        Ok(self.wrap(Arc::new(SkipStage::new(stage, n))))
    }

    /// One worker's disjoint share of the shards
    pub fn partition(self, worker_count: usize, worker_index: usize) -> Result<Self> {
        let stage = self.stage()?.partition(worker_count, worker_index)?;
        Ok(self.wrap(stage))
    }

    /// One node's share of the dataset in distributed training
    ///
    /// Assigns whole shards when they divide evenly across `world_size`
    /// nodes; otherwise every node reads all shards and keeps every
    /// `world_size`-th record starting at `rank`.
    pub fn split_by_node(self, world_size: usize, rank: usize) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(Error::InvalidArgument(format!(
                "rank {rank} out of range for world size {world_size}"
            )));
        }
        let stage = self.stage()?;
        if stage.shard_order_locked() {
            return Err(Error::ShuffleLocked);
        }
        let shards = self.num_shards();
        if shards > 0 && shards % world_size == 0 {
            return self.partition(world_size, rank);
        }
        debug!(shards, world_size, rank, "shards do not divide across nodes, splitting by record");
        Ok(self.wrap(Arc::new(StrideStage::new(stage, world_size, rank)?)))
    }

    /// Repeat the dataset `times` times, or forever with `None`
    pub fn repeat(self, times: Option<usize>) -> Result<Self> {
        let stage = self.stage()?;
        Ok(self.wrap(Arc::new(RepeatStage::new(stage, times))))
    }

    /// Group consecutive records into list-valued records of `batch_size` rows
    pub fn batch(self, batch_size: usize, drop_last_batch: bool) -> Result<Self> {
        let stage = self.stage()?;
        Ok(self.wrap(Arc::new(GroupStage::new(stage, batch_size, drop_last_batch)?)))
    }
}

fn map_output(options: MapOptions) -> MapOutput {
    MapOutput {
        remove_columns: options.remove_columns,
        features: options.features,
    }
}

impl IntoIterator for &StreamingDataset {
    type Item = Result<Record>;
    type IntoIter = Records;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for StreamingDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingDataset")
            .field("num_shards", &self.num_shards())
            .field("epoch", &self.epoch)
            .field("schema", &self.schema)
            .field("pending_steps", &self.chain.steps().len())
            .finish()
    }
}

/// A builder for creating streaming datasets
pub struct DatasetBuilder {
    /// The shards of the dataset
    shards: Vec<Arc<dyn ShardSource>>,

    /// The schema of the dataset
    schema: Option<Schema>,

    /// Shuffle applied on top of the shards
    shuffle: Option<ShuffleOptions>,

    /// Initial epoch
    epoch: u64,
}

impl DatasetBuilder {
    /// Create a new dataset builder
    pub fn new() -> Self {
        Self {
            shards: Vec::new(),
            schema: None,
            shuffle: None,
            epoch: 0,
        }
    }

    /// Add a shard
    #[must_use]
    pub fn shard(mut self, source: Arc<dyn ShardSource>) -> Self {
        self.shards.push(source);
        self
    }

    /// Add several shards
    #[must_use]
    pub fn shards<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ShardSource>>,
    {
        self.shards.extend(sources);
        self
    }

    /// Set the schema of the dataset
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Shuffle the dataset
    #[must_use]
    pub fn shuffle(mut self, options: ShuffleOptions) -> Self {
        self.shuffle = Some(options);
        self
    }

    /// Set the initial epoch
    #[must_use]
    pub fn epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Build the dataset
    pub fn build(self) -> Result<StreamingDataset> {
        if self.shards.is_empty() {
            return Err(Error::InvalidArgument(
                "At least one shard is required to build a dataset".into(),
            ));
        }

        let mut dataset = StreamingDataset::from_shards(self.shards, self.schema);
        if let Some(options) = self.shuffle {
            dataset = dataset.shuffle_with(options)?;
        }
        dataset.set_epoch(self.epoch);
        Ok(dataset)
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}
