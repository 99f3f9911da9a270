//! Bounded views: take, skip and stride over an upstream stage
//!
//! `take` and `skip` fix the upstream's shard order: the sub-range they expose
//! only means something for one particular order, so stages built on top of
//! them report [`Stage::shard_order_locked`] and refuse partitioning.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::rng::SeededRng;
use crate::schema::Schema;
use crate::stage::{PassContext, Stage, StageRef};
use crate::stream::{BoxStream, RecordStream};

/// Emits the first `n` upstream records
pub struct TakeStage {
    upstream: StageRef,
    n: usize,
}

impl TakeStage {
    /// Create a take view
    pub fn new(upstream: StageRef, n: usize) -> Self {
        Self { upstream, n }
    }
}

impl Stage for TakeStage {
    fn schema(&self) -> Option<&Schema> {
        self.upstream.schema()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        let upstream = (self.n > 0).then(|| self.upstream.open(ctx));
        Box::new(TakeStream { upstream, remaining: self.n })
    }

    fn shuffle_shards(self: Arc<Self>, _rng: &mut SeededRng) -> StageRef {
        self
    }

    fn partition(&self, _worker_count: usize, _worker_index: usize) -> Result<StageRef> {
        Err(Error::ShuffleLocked)
    }

    fn shard_order_locked(&self) -> bool {
        true
    }
}

struct TakeStream {
    upstream: Option<BoxStream>,
    remaining: usize,
}

impl RecordStream for TakeStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(upstream) = self.upstream.as_mut() else {
            return Ok(None);
        };
        let next = upstream.next_record()?;
        match next {
            Some(record) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    // Release the upstream cursor and whatever shard it holds.
                    self.upstream = None;
                }
                Ok(Some(record))
            }
            None => {
                self.upstream = None;
                Ok(None)
            }
        }
    }
}

/// Discards the first `n` upstream records
pub struct SkipStage {
    upstream: StageRef,
    n: usize,
}

impl SkipStage {
    /// Create a skip view
    pub fn new(upstream: StageRef, n: usize) -> Self {
        Self { upstream, n }
    }
}

impl Stage for SkipStage {
    fn schema(&self) -> Option<&Schema> {
        self.upstream.schema()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        Box::new(SkipStream {
            upstream: self.upstream.open(ctx),
            to_skip: self.n,
        })
    }

    fn shuffle_shards(self: Arc<Self>, _rng: &mut SeededRng) -> StageRef {
        self
    }

    fn partition(&self, _worker_count: usize, _worker_index: usize) -> Result<StageRef> {
        Err(Error::ShuffleLocked)
    }

    fn shard_order_locked(&self) -> bool {
        true
    }
}

struct SkipStream {
    upstream: BoxStream,
    to_skip: usize,
}

impl RecordStream for SkipStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while self.to_skip > 0 {
            if self.upstream.next_record()?.is_none() {
                self.to_skip = 0;
                return Ok(None);
            }
            self.to_skip -= 1;
        }
        self.upstream.next_record()
    }
}

/// Keeps upstream records at positions `offset, offset + step, ...`
///
/// Used to split a pipeline across nodes when its shards cannot be divided
/// evenly: every node reads every shard and keeps its own stride.
pub struct StrideStage {
    upstream: StageRef,
    step: usize,
    offset: usize,
}

impl StrideStage {
    /// Create a stride view; `offset` must be smaller than `step`
    pub fn new(upstream: StageRef, step: usize, offset: usize) -> Result<Self> {
        if step == 0 || offset >= step {
            return Err(Error::InvalidArgument(format!(
                "invalid stride: offset {offset} with step {step}"
            )));
        }
        Ok(Self { upstream, step, offset })
    }
}

impl Stage for StrideStage {
    fn schema(&self) -> Option<&Schema> {
        self.upstream.schema()
    }

    fn num_shards(&self) -> usize {
        self.upstream.num_shards()
    }

    fn open(&self, ctx: PassContext) -> BoxStream {
        Box::new(StrideStream {
            upstream: self.upstream.open(ctx),
            step: self.step,
            offset: self.offset,
            position: 0,
        })
    }

    fn shuffle_shards(self: Arc<Self>, rng: &mut SeededRng) -> StageRef {
        Arc::new(Self {
            upstream: Arc::clone(&self.upstream).shuffle_shards(rng),
            step: self.step,
            offset: self.offset,
        })
    }

    fn partition(&self, worker_count: usize, worker_index: usize) -> Result<StageRef> {
        Ok(Arc::new(Self {
            upstream: self.upstream.partition(worker_count, worker_index)?,
            step: self.step,
            offset: self.offset,
        }))
    }

    fn shard_order_locked(&self) -> bool {
        self.upstream.shard_order_locked()
    }
}

struct StrideStream {
    upstream: BoxStream,
    step: usize,
    offset: usize,
    position: usize,
}

impl RecordStream for StrideStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(record) = self.upstream.next_record()? {
            let position = self.position;
            self.position += 1;
            if position % self.step == self.offset {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
