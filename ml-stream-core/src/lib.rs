//! Core records, schemas, shards and stage abstractions for streaming ML data pipelines
//!
//! This crate provides the foundational components for building lazy, shard-based
//! streaming pipelines. It defines the record model, the pull-based stream trait,
//! the immutable stage graph and the shard sets every other crate builds upon.

#![warn(missing_docs)]

pub mod batch;
pub mod bounded;
pub mod cast;
pub mod compose;
pub mod error;
pub mod record;
pub mod rng;
pub mod schema;
pub mod shard;
pub mod stage;
pub mod stream;
pub mod value;

// Re-export key types for convenience
pub use batch::Batch;
pub use bounded::{SkipStage, StrideStage, TakeStage};
pub use compose::{ConcatStage, RepeatStage};
pub use error::{Error, Result};
pub use record::Record;
pub use rng::SeededRng;
pub use schema::{DataType, Field, Schema};
pub use shard::{ShardId, ShardSet, ShardSetStage, ShardSource};
pub use stage::{PassContext, Stage, StageRef};
pub use stream::{BoxStream, EmptyStream, IterStream, RecordStream, Records};
pub use value::Value;
