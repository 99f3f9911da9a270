//! Pull-based record streams

use crate::error::Result;
use crate::record::Record;

/// A forward-only cursor over records
///
/// `Ok(None)` signals the end of the sequence, distinct from an error.
/// Implementations never read ahead of the consumer by more than the unit of
/// work they are currently processing.
pub trait RecordStream: Send {
    /// Retrieve the next record from this stream
    /// Returns None when exhausted
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Boxed record stream, the currency passed between stages
pub type BoxStream = Box<dyn RecordStream>;

impl<S: RecordStream + ?Sized> RecordStream for Box<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        (**self).next_record()
    }
}

/// A stream that yields nothing
#[derive(Debug, Default)]
pub struct EmptyStream;

impl RecordStream for EmptyStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(None)
    }
}

/// Adapter turning any iterator of record results into a stream
pub struct IterStream<I> {
    inner: I,
}

impl<I> IterStream<I>
where
    I: Iterator<Item = Result<Record>> + Send,
{
    /// Wrap an iterator
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> RecordStream for IterStream<I>
where
    I: Iterator<Item = Result<Record>> + Send,
{
    fn next_record(&mut self) -> Result<Option<Record>> {
        self.inner.next().transpose()
    }
}

/// Consumer-facing iterator over one pass of a pipeline
///
/// The iterator is fused: after the end of the stream or the first error it
/// yields `None` forever and drops the underlying stream, releasing any shard
/// it still holds.
pub struct Records {
    stream: Option<BoxStream>,
}

impl Records {
    /// Wrap a stream
    pub fn new(stream: BoxStream) -> Self {
        Self { stream: Some(stream) }
    }
}

impl Iterator for Records {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream.as_mut()?;
        match stream.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.stream = None;
                None
            }
            Err(err) => {
                self.stream = None;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for Records {}
