//! Transform chains and the cursors that run them

use std::collections::VecDeque;
use std::sync::Arc;

use ml_stream_core::{BoxStream, Record, RecordStream, Result, Schema};
use tracing::trace;

use crate::step::TransformStep;

/// An ordered list of transform steps applied lazily to a record stream
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    /// The steps in this chain
    steps: Vec<TransformStep>,
}

impl TransformChain {
    /// Create a new transform chain
    pub fn new(steps: Vec<TransformStep>) -> Self {
        Self { steps }
    }

    /// Get a reference to the steps in this chain
    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    /// Check if the chain has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step
    pub fn push(&mut self, step: TransformStep) {
        self.steps.push(step);
    }

    /// Get the output schema for this chain when applied to the given input schema
    pub fn output_schema(&self, input: Option<&Schema>) -> Result<Option<Schema>> {
        let mut current = input.cloned();
        for step in &self.steps {
            step.validate()?;
            current = step.output_schema(current.as_ref())?;
        }
        Ok(current)
    }

    /// Wrap `upstream` in cursors running every step of the chain
    ///
    /// Consecutive record steps share one cursor; each batched step gets its
    /// own cursor holding at most one batch.
    pub fn apply(&self, upstream: BoxStream) -> BoxStream {
        let mut stream = upstream;
        let mut pending: Vec<TransformStep> = Vec::new();
        for step in &self.steps {
            if step.is_batched() {
                if !pending.is_empty() {
                    stream = Box::new(RecordStepStream::new(stream, std::mem::take(&mut pending)));
                }
                stream = Box::new(BatchStepStream::new(stream, step.clone()));
            } else {
                pending.push(step.clone());
            }
        }
        if !pending.is_empty() {
            stream = Box::new(RecordStepStream::new(stream, pending));
        }
        stream
    }
}

/// Runs a run of record-level steps over each pulled record
struct RecordStepStream {
    upstream: BoxStream,
    steps: Arc<[TransformStep]>,
    /// Records that reached each step so far in this pass
    counters: Vec<usize>,
}

impl RecordStepStream {
    fn new(upstream: BoxStream, steps: Vec<TransformStep>) -> Self {
        let counters = vec![0; steps.len()];
        Self {
            upstream,
            steps: steps.into(),
            counters,
        }
    }
}

impl RecordStream for RecordStepStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        'pull: while let Some(mut record) = self.upstream.next_record()? {
            for (step, counter) in self.steps.iter().zip(self.counters.iter_mut()) {
                match step.apply_record(record, counter)? {
                    Some(next) => record = next,
                    None => continue 'pull,
                }
            }
            return Ok(Some(record));
        }
        Ok(None)
    }
}

/// Collects batches for one batched step and re-flattens its output
struct BatchStepStream {
    upstream: Option<BoxStream>,
    step: TransformStep,
    batch_size: usize,
    drop_last_batch: bool,
    ready: VecDeque<Record>,
}

impl BatchStepStream {
    fn new(upstream: BoxStream, step: TransformStep) -> Self {
        let (batch_size, drop_last_batch) = match &step {
            TransformStep::BatchMap { batch_size, drop_last_batch, .. } => (*batch_size, *drop_last_batch),
            TransformStep::BatchFilter { batch_size, .. } => (*batch_size, false),
            _ => (1, false),
        };
        Self {
            upstream: Some(upstream),
            step,
            batch_size: batch_size.max(1),
            drop_last_batch,
            ready: VecDeque::new(),
        }
    }

    /// Pull up to one batch from upstream; `None` once upstream is done
    fn fill(&mut self) -> Result<Option<Vec<Record>>> {
        let Some(upstream) = self.upstream.as_mut() else {
            return Ok(None);
        };
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match upstream.next_record()? {
                Some(record) => rows.push(record),
                None => {
                    self.upstream = None;
                    break;
                }
            }
        }
        if rows.is_empty() || (self.drop_last_batch && rows.len() < self.batch_size) {
            self.upstream = None;
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

impl RecordStream for BatchStepStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Ok(Some(record));
            }
            let Some(rows) = self.fill()? else {
                return Ok(None);
            };
            trace!(rows = rows.len(), "applying batched step");
            self.ready.extend(self.step.apply_batch(rows)?);
        }
    }
}
