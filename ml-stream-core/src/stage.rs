//! Pipeline stages: immutable descriptions that open one cursor per pass
//!
//! A pipeline is a DAG of [`Stage`]s built once and never mutated. Every
//! iteration pass calls [`Stage::open`] on the root with a [`PassContext`],
//! which recursively opens fresh cursors for the whole graph. Randomized stages
//! derive their generators from the context, so a pass is fully determined by
//! the graph and the epoch.

use std::sync::Arc;

use crate::error::Result;
use crate::rng::SeededRng;
use crate::schema::Schema;
use crate::stream::BoxStream;

/// Per-pass state handed to every stage when a pass is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassContext {
    /// Epoch of this pass
    pub epoch: u64,
}

impl PassContext {
    /// Context for the given epoch
    pub fn new(epoch: u64) -> Self {
        Self { epoch }
    }
}

/// Shared handle to a stage
pub type StageRef = Arc<dyn Stage>;

/// A node of the pipeline graph
pub trait Stage: Send + Sync {
    /// Declared schema of the records this stage produces, when known
    fn schema(&self) -> Option<&Schema>;

    /// Number of shards visible below this stage
    fn num_shards(&self) -> usize;

    /// Open a fresh cursor for one pass
    ///
    /// Opening is lazy: no shard is read until the first record is pulled.
    fn open(&self, ctx: PassContext) -> BoxStream;

    /// Copy of this stage with every shard set below it reordered using `rng`
    ///
    /// Stages that fix shard order return themselves unchanged.
    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef;

    /// Copy of this stage restricted to one worker's disjoint subset of shards
    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef>;

    /// Whether a take/skip view below this stage has fixed the shard order
    fn shard_order_locked(&self) -> bool {
        false
    }
}
