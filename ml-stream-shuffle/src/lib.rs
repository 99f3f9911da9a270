//! Seeded shuffling and interleaving for streaming ML data pipelines
//!
//! Both stages own an explicit generator seeded from `seed + epoch` at the
//! start of every pass, so a pass is reproducible from the pipeline and its
//! epoch alone.

#![warn(missing_docs)]

pub mod buffer;
pub mod interleave;

#[cfg(test)]
mod test_util;

pub use buffer::{ShuffleStage, DEFAULT_BUFFER_SIZE};
pub use interleave::{InterleaveStage, StoppingStrategy};
