//! Lazy, shard-based streaming datasets for ML training
//!
//! A [`StreamingDataset`] describes a pipeline over shards of records:
//! transforms, windowed shuffling, interleaving and bounded views are all
//! applied lazily while the consumer iterates. Workers each build the same
//! pipeline over their own [`StreamingDataset::partition`].

#![warn(missing_docs)]

pub mod combine;
pub mod config;
pub mod dataset;

pub use combine::{concatenate_datasets, interleave_datasets};
pub use config::{InterleaveOptions, MapOptions, ShuffleOptions};
pub use dataset::{DatasetBuilder, StreamingDataset};

// Re-export the types pipelines are written against
pub use ml_stream_core::{
    Batch, BoxStream, DataType, Error, Field, IterStream, Record, RecordStream, Records, Result, Schema, ShardId,
    ShardSet, ShardSource, Value,
};
pub use ml_stream_readers::{GeneratorShard, InMemoryShard, JsonLinesShard};
pub use ml_stream_shuffle::StoppingStrategy;
