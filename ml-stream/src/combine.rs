//! Combining several datasets into one

use std::sync::Arc;

use ml_stream_core::{ConcatStage, Error, Result, Schema, StageRef};
use ml_stream_shuffle::InterleaveStage;

use crate::config::InterleaveOptions;
use crate::dataset::StreamingDataset;

/// Interleave datasets by drawing a source for every record
///
/// The combined dataset starts at epoch 0; its epoch seeds the draws and is
/// passed down to every source on each pass.
pub fn interleave_datasets(datasets: &[StreamingDataset], options: InterleaveOptions) -> Result<StreamingDataset> {
    let stages = stages(datasets)?;
    let stage = InterleaveStage::new(stages, options.probabilities, options.seed, options.stopping_strategy)?;
    Ok(StreamingDataset::from_stage(Arc::new(stage)))
}

/// Stream datasets one after another
///
/// Known schemas must be identical.
pub fn concatenate_datasets(datasets: &[StreamingDataset]) -> Result<StreamingDataset> {
    let schema = common_schema(datasets)?;
    let stages = stages(datasets)?;
    Ok(StreamingDataset::from_stage(Arc::new(ConcatStage::new(stages, schema))))
}

fn stages(datasets: &[StreamingDataset]) -> Result<Vec<StageRef>> {
    if datasets.is_empty() {
        return Err(Error::InvalidArgument("at least one dataset is required".into()));
    }
    datasets.iter().map(StreamingDataset::stage).collect()
}

fn common_schema(datasets: &[StreamingDataset]) -> Result<Option<Schema>> {
    let mut known = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        match dataset.schema() {
            Some(schema) => known.push(schema),
            None => return Ok(None),
        }
    }
    let Some((first, rest)) = known.split_first() else {
        return Ok(None);
    };
    if let Some(other) = rest.iter().find(|s| *s != first) {
        return Err(Error::SchemaMismatch(format!(
            "datasets have different schemas: [{}] vs [{}]",
            first.names().collect::<Vec<_>>().join(", "),
            other.names().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(Some((*first).clone()))
}

#[cfg(test)]
mod tests {
    use ml_stream_core::{DataType, Field, Record, Value};

    use super::*;

    fn dataset(first: i64, n: i64, data_type: DataType) -> StreamingDataset {
        let records = (first..first + n).map(|id| Record::new().with("id", id)).collect();
        let schema = Schema::new(vec![Field::new("id", data_type, false)]);
        StreamingDataset::from_records(records, 1, Some(schema)).unwrap()
    }

    #[test]
    fn test_concatenate_in_order() {
        let sources = [dataset(0, 2, DataType::Int64), dataset(10, 2, DataType::Int64)];
        let combined = concatenate_datasets(&sources).unwrap();
        let ids: Vec<i64> = combined
            .iter()
            .map(|r| r.unwrap().get("id").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 10, 11]);
        assert!(combined.schema().is_some());
    }

    #[test]
    fn test_mismatched_schemas_rejected() {
        let datasets = || vec![dataset(0, 2, DataType::Int64), dataset(0, 2, DataType::Int32)];
        assert!(matches!(concatenate_datasets(&datasets()), Err(Error::SchemaMismatch(_))));
        assert!(matches!(
            interleave_datasets(&datasets(), InterleaveOptions::default()),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(concatenate_datasets(&[]).is_err());
        assert!(interleave_datasets(&[], InterleaveOptions::default()).is_err());
    }
}
