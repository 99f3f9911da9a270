//! Shard source implementations for streaming ML data pipelines
//!
//! This crate provides the leaf [`ShardSource`]s pipelines are built over:
//! records held in memory, generator functions, and JSON-lines files.

#![warn(missing_docs)]

mod error;

pub mod generator;
#[cfg(feature = "json")]
pub mod jsonl;
pub mod memory;

pub use error::{Error, Result};
pub use generator::GeneratorShard;
#[cfg(feature = "json")]
pub use jsonl::JsonLinesShard;
pub use memory::InMemoryShard;

// Re-export core types
pub use ml_stream_core::{BoxStream, Record, ShardSource, Value};
