//! Shards produced by a user supplied generator function

use ml_stream_core::{BoxStream, IterStream, Record, Result, ShardSource};

/// A shard whose records come from calling a generator function
///
/// The function is called on every open, so each pass starts from a fresh
/// iterator. The iterator may be unbounded.
pub struct GeneratorShard<F> {
    generator: F,
    name: String,
}

impl<F, I> GeneratorShard<F>
where
    F: Fn() -> I + Send + Sync,
    I: Iterator<Item = Result<Record>> + Send + 'static,
{
    /// Create a shard from a generator function
    pub fn new(name: impl Into<String>, generator: F) -> Self {
        Self {
            generator,
            name: name.into(),
        }
    }
}

impl<F, I> ShardSource for GeneratorShard<F>
where
    F: Fn() -> I + Send + Sync,
    I: Iterator<Item = Result<Record>> + Send + 'static,
{
    fn open(&self) -> Result<BoxStream> {
        Ok(Box::new(IterStream::new((self.generator)())))
    }

    fn describe(&self) -> String {
        format!("generator({})", self.name)
    }
}
