//! Option structs for pipeline operations
//!
//! Every struct deserializes with serde and fills missing fields with its
//! defaults, so options can be loaded from partial JSON documents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ml_stream_core::{Error, Result, Schema};
use ml_stream_shuffle::{StoppingStrategy, DEFAULT_BUFFER_SIZE};
use ml_stream_transforms::DEFAULT_BATCH_SIZE;

/// Options for [`StreamingDataset::shuffle_with`](crate::StreamingDataset::shuffle_with)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleOptions {
    /// Base seed; the effective seed of a pass is `seed + epoch`
    pub seed: u64,

    /// Capacity of the shuffle window
    pub buffer_size: usize,
}

impl Default for ShuffleOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ShuffleOptions {
    /// Options with the given seed and the default buffer size
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }
}

/// Options for map operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Records per batch for batched maps
    pub batch_size: usize,

    /// Drop a final batch smaller than `batch_size`
    pub drop_last_batch: bool,

    /// Columns removed after the map function has run
    pub remove_columns: Vec<String>,

    /// Declared output schema enforced on every output record
    pub features: Option<Schema>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            drop_last_batch: false,
            remove_columns: Vec::new(),
            features: None,
        }
    }
}

impl MapOptions {
    /// Set the batch size
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set whether to drop a final short batch
    #[must_use]
    pub fn drop_last_batch(mut self, drop_last_batch: bool) -> Self {
        self.drop_last_batch = drop_last_batch;
        self
    }

    /// Set the columns removed after the map
    #[must_use]
    pub fn remove_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the declared output schema
    #[must_use]
    pub fn features(mut self, features: Schema) -> Self {
        self.features = Some(features);
        self
    }
}

/// Options for [`interleave_datasets`](crate::interleave_datasets)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterleaveOptions {
    /// One sampling probability per source; uniform when absent
    pub probabilities: Option<Vec<f64>>,

    /// Base seed; the effective seed of a pass is `seed + epoch`
    pub seed: u64,

    /// When the interleaved sequence ends
    pub stopping_strategy: StoppingStrategy,
}

/// Parse options from JSON text
pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::InvalidArgument(format!("invalid options: {e}")))
}

#[cfg(test)]
mod tests {
    use ml_stream_core::{DataType, Field};

    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ShuffleOptions::default().buffer_size, 1000);
        let map = MapOptions::default();
        assert_eq!(map.batch_size, 1000);
        assert!(!map.drop_last_batch);
        assert_eq!(InterleaveOptions::default().stopping_strategy, StoppingStrategy::FirstExhausted);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let shuffle: ShuffleOptions = from_json(r#"{"seed": 42}"#).unwrap();
        assert_eq!(shuffle, ShuffleOptions { seed: 42, buffer_size: 1000 });

        let interleave: InterleaveOptions =
            from_json(r#"{"probabilities": [0.8, 0.2], "stopping_strategy": "all_exhausted"}"#).unwrap();
        assert_eq!(interleave.stopping_strategy, StoppingStrategy::AllExhausted);
        assert_eq!(interleave.seed, 0);
    }

    #[test]
    fn test_map_options_with_features() {
        let features = Schema::new(vec![Field::new("label", DataType::class_label(["neg", "pos"]), false)]);
        let options = MapOptions::default().remove_columns(["text"]).features(features.clone());
        let text = serde_json::to_string(&options).unwrap();
        let parsed: MapOptions = from_json(&text).unwrap();
        assert_eq!(parsed.features, Some(features));
        assert_eq!(parsed.remove_columns, vec!["text".to_string()]);
    }

    #[test]
    fn test_invalid_json_is_invalid_argument() {
        assert!(matches!(from_json::<ShuffleOptions>("{"), Err(Error::InvalidArgument(_))));
    }
}
