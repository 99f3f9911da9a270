//! Lazy transforms for streaming ML data pipelines
//!
//! Transform steps are resolved into a [`TransformChain`] when a pipeline is
//! built and run record by record, or batch by batch, as the consumer pulls.

#![warn(missing_docs)]

pub mod chain;
pub mod group;
pub mod stage;
pub mod step;

pub use chain::TransformChain;
pub use group::GroupStage;
pub use stage::TransformStage;
pub use step::{
    BatchFn, BatchPredicateFn, IndexedPredicateFn, IndexedRecordFn, MapOutput, PredicateFn, RecordFn, TransformStep,
    DEFAULT_BATCH_SIZE,
};
