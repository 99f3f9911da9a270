//! Stages combining whole passes: concatenation and repetition

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::record::Record;
use crate::rng::{self, SeededRng};
use crate::schema::Schema;
use crate::stage::{PassContext, Stage, StageRef};
use crate::stream::{BoxStream, RecordStream};

/// Streams several stages one after another
pub struct ConcatStage {
    sources: Vec<StageRef>,
    schema: Option<Schema>,
}

impl ConcatStage {
    /// Concatenate `sources`; the caller has checked their schemas agree
    pub fn new(sources: Vec<StageRef>, schema: Option<Schema>) -> Self {
        Self { sources, schema }
    }
}

impl Stage for ConcatStage {
    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn num_shards(&self) -> usize {
        self.sources.iter().map(|s| s.num_shards()).min().unwrap_or(0)
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        Box::new(ConcatStream {
            pending: self.sources.clone().into_iter(),
            current: None,
            ctx,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        let order = rng::permutation(self.sources.len(), rng);
        let sources = order
            .into_iter()
            .map(|i| Arc::clone(&self.sources[i]).shuffle_shards(rng))
            .collect();
        Arc::new(Self {
            sources,
            schema: self.schema.clone(),
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        let sources = self
            .sources
            .iter()
            .map(|s| s.partition(worker_count, worker_index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Self {
            sources,
            schema: self.schema.clone(),
        }))
    }

    fn shard_order_locked(&self) -> bool {
        self.sources.iter().any(|s| s.shard_order_locked())
    }
}

struct ConcatStream {
    pending: std::vec::IntoIter<StageRef>,
    current: Option<BoxStream>,
    ctx: PassContext,
}

impl RecordStream for ConcatStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.current.is_none() {
                let Some(next) = self.pending.next() else {
                    return Ok(None);
                };
                self.current = Some(next.open(self.ctx));
            }
            if let Some(stream) = self.current.as_mut() {
                match stream.next_record()? {
                    Some(record) => return Ok(Some(record)),
                    None => self.current = None,
                }
            }
        }
    }
}

/// Re-runs the upstream a fixed number of times, or forever
///
/// Every repetition opens the upstream with the same pass context, so shuffled
/// upstreams repeat the same permutation until the epoch changes.
pub struct RepeatStage {
    upstream: StageRef,
    times: Option<usize>,
}

impl RepeatStage {
    /// Repeat `times` times; `None` repeats until the consumer stops
    pub fn new(upstream: StageRef, times: Option<usize>) -> Self {
        Self { upstream, times }
    }
}

impl Stage for RepeatStage {
    fn schema(&self) -> Option<&Schema> {
        self.upstream.schema()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        Box::new(RepeatStream {
            upstream: Arc::clone(&self.upstream),
            current: None,
            times: self.times,
            completed: 0,
            yielded_this_round: 0,
            ctx,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        Arc::new(Self {
            upstream: Arc::clone(&self.upstream).shuffle_shards(rng),
            times: self.times,
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        Ok(Arc::new(Self {
            upstream: self.upstream.partition(worker_count, worker_index)?,
            times: self.times,
        }))
    }

    fn shard_order_locked(&self) -> bool {
        self.upstream.shard_order_locked()
    }
}

struct RepeatStream {
    upstream: StageRef,
    current: Option<BoxStream>,
    times: Option<usize>,
    completed: usize,
    yielded_this_round: usize,
    ctx: PassContext,
}

impl RecordStream for RepeatStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.times.is_some_and(|times| self.completed >= times) {
                return Ok(None);
            }
            let stream = self.current.get_or_insert_with(|| self.upstream.open(self.ctx));
            if let Some(record) = stream.next_record()? {
                self.yielded_this_round += 1;
                return Ok(Some(record));
            }

            self.current = None;
            self.completed += 1;
            // An empty round would spin forever under unbounded repetition.
            if self.yielded_this_round == 0 {
                return Ok(None);
            }
            debug!(round = self.completed, "repeating upstream");
            self.yielded_this_round = 0;
        }
    }
}
