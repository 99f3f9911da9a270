//! Transform steps: the tagged variants a transform chain is built from

use std::fmt;
use std::sync::Arc;

use ml_stream_core::cast::{cast_column, cast_record};
use ml_stream_core::{Batch, DataType, Error, Record, Result, Schema};

/// Default number of records handed to a batched step
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-record map; returns the columns to add or replace
pub type RecordFn = Arc<dyn Fn(&Record) -> Result<Record> + Send + Sync>;

/// Per-record map that also receives the record's index at this step
pub type IndexedRecordFn = Arc<dyn Fn(&Record, usize) -> Result<Record> + Send + Sync>;

/// Per-batch map; returns the columns to add or replace
pub type BatchFn = Arc<dyn Fn(&Batch) -> Result<Batch> + Send + Sync>;

/// Per-record predicate
pub type PredicateFn = Arc<dyn Fn(&Record) -> Result<bool> + Send + Sync>;

/// Per-record predicate that also receives the record's index at this step
pub type IndexedPredicateFn = Arc<dyn Fn(&Record, usize) -> Result<bool> + Send + Sync>;

/// Per-batch predicate returning one keep flag per row
pub type BatchPredicateFn = Arc<dyn Fn(&Batch) -> Result<Vec<bool>> + Send + Sync>;

/// What happens to a map's output before it leaves the step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOutput {
    /// Columns dropped after the function has seen them
    pub remove_columns: Vec<String>,

    /// Declared output schema, enforced on every output record
    pub features: Option<Schema>,
}

impl MapOutput {
    /// Output schema of a map given its input schema
    fn output_schema(&self, input: Option<&Schema>) -> Result<Option<Schema>> {
        if let Some(input) = input {
            input.without(&self.remove_columns)?;
        }
        Ok(self.features.clone())
    }

    /// Merge `updates` over `input`, then apply removals and declared features
    fn finish(&self, input: Record, updates: Record) -> Result<Record> {
        let merged = input.merge(updates).without(&self.remove_columns)?;
        match &self.features {
            Some(features) => cast_record(merged, features),
            None => Ok(merged),
        }
    }

    /// Batch counterpart of [`MapOutput::finish`], flattened into records
    fn finish_batch(&self, input: Batch, updates: Batch) -> Result<Vec<Record>> {
        let records = input.merge(updates).without(&self.remove_columns)?.into_records()?;
        match &self.features {
            Some(features) => records.into_iter().map(|r| cast_record(r, features)).collect(),
            None => Ok(records),
        }
    }
}

/// One step of a transform chain
#[derive(Clone)]
pub enum TransformStep {
    /// Map each record
    RecordMap {
        /// Map function
        func: RecordFn,
        /// Post-processing of the output
        output: MapOutput,
    },

    /// Map each record together with its index
    IndexedMap {
        /// Map function
        func: IndexedRecordFn,
        /// Post-processing of the output
        output: MapOutput,
    },

    /// Map batches of up to `batch_size` records
    BatchMap {
        /// Map function
        func: BatchFn,
        /// Maximum rows per batch
        batch_size: usize,
        /// Drop a final batch smaller than `batch_size`
        drop_last_batch: bool,
        /// Post-processing of the output
        output: MapOutput,
    },

    /// Keep records matching a predicate
    RecordFilter(PredicateFn),

    /// Keep records matching a predicate that also sees the index
    IndexedFilter(IndexedPredicateFn),

    /// Keep rows of batches of up to `batch_size` records
    BatchFilter {
        /// Predicate
        func: BatchPredicateFn,
        /// Maximum rows per batch
        batch_size: usize,
    },

    /// Rename one column
    Rename {
        /// Existing name
        from: String,
        /// New name
        to: String,
    },

    /// Drop columns
    Remove(Vec<String>),

    /// Keep only the named columns, in this order
    Select(Vec<String>),

    /// Cast one column
    CastColumn {
        /// Column to cast
        column: String,
        /// Target type
        data_type: DataType,
    },

    /// Cast every record to a schema
    Cast(Schema),
}

impl TransformStep {
    /// Validate batch parameters of batched steps
    pub fn validate(&self) -> Result<()> {
        match self {
            TransformStep::BatchMap { batch_size: 0, .. } | TransformStep::BatchFilter { batch_size: 0, .. } => {
                Err(Error::InvalidArgument("batch size must be greater than 0".into()))
            }
            _ => Ok(()),
        }
    }

    /// Whether this step works on batches rather than single records
    pub fn is_batched(&self) -> bool {
        matches!(self, TransformStep::BatchMap { .. } | TransformStep::BatchFilter { .. })
    }

    /// Compute the schema this step produces from its input schema
    ///
    /// Column errors are only detectable when the input schema is known; an
    /// unknown input yields an unknown output, except for a whole-schema cast.
    pub fn output_schema(&self, input: Option<&Schema>) -> Result<Option<Schema>> {
        match self {
            TransformStep::RecordMap { output, .. }
            | TransformStep::IndexedMap { output, .. }
            | TransformStep::BatchMap { output, .. } => output.output_schema(input),
            TransformStep::RecordFilter(_) | TransformStep::IndexedFilter(_) | TransformStep::BatchFilter { .. } => {
                Ok(input.cloned())
            }
            TransformStep::Rename { from, to } => input.map(|s| s.renamed(from, to)).transpose(),
            TransformStep::Remove(columns) => input.map(|s| s.without(columns)).transpose(),
            TransformStep::Select(columns) => input.map(|s| s.project_by_names(columns)).transpose(),
            TransformStep::CastColumn { column, data_type } => {
                input.map(|s| s.with_data_type(column, data_type.clone())).transpose()
            }
            TransformStep::Cast(schema) => {
                if let Some(input) = input {
                    if !input.same_columns(schema) {
                        return Err(Error::SchemaMismatch(format!(
                            "cast target columns [{}] differ from input columns [{}]",
                            schema.names().collect::<Vec<_>>().join(", "),
                            input.names().collect::<Vec<_>>().join(", ")
                        )));
                    }
                }
                Ok(Some(schema.clone()))
            }
        }
    }

    /// Apply a record-level step
    ///
    /// `index` counts the records that reached this step so far in the pass.
    /// Returns `None` when a filter drops the record.
    pub(crate) fn apply_record(&self, record: Record, index: &mut usize) -> Result<Option<Record>> {
        let position = *index;
        *index += 1;
        match self {
            TransformStep::RecordMap { func, output } => {
                let updates = func(&record)?;
                output.finish(record, updates).map(Some)
            }
            TransformStep::IndexedMap { func, output } => {
                let updates = func(&record, position)?;
                output.finish(record, updates).map(Some)
            }
            TransformStep::RecordFilter(predicate) => Ok(predicate(&record)?.then_some(record)),
            TransformStep::IndexedFilter(predicate) => Ok(predicate(&record, position)?.then_some(record)),
            TransformStep::Rename { from, to } => record.renamed(from, to).map(Some),
            TransformStep::Remove(columns) => record.without(columns).map(Some),
            TransformStep::Select(columns) => record.select(columns).map(Some),
            TransformStep::CastColumn { column, data_type } => cast_column(record, column, data_type).map(Some),
            TransformStep::Cast(schema) => cast_record(record, schema).map(Some),
            TransformStep::BatchMap { .. } | TransformStep::BatchFilter { .. } => Err(Error::InvalidArgument(
                "batched step applied to a single record".into(),
            )),
        }
    }

    /// Apply a batched step to one batch of records
    pub(crate) fn apply_batch(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        match self {
            TransformStep::BatchMap { func, output, .. } => {
                let batch = Batch::from_records(records);
                let updates = func(&batch)?;
                output.finish_batch(batch, updates)
            }
            TransformStep::BatchFilter { func, .. } => {
                let batch = Batch::from_records(records);
                let flags = func(&batch)?;
                if flags.len() != batch.num_rows() {
                    return Err(Error::transformation(format!(
                        "batch filter returned {} flags for {} rows",
                        flags.len(),
                        batch.num_rows()
                    )));
                }
                let mut keep = flags.into_iter();
                let mut rows = batch.into_records()?;
                rows.retain(|_| keep.next().unwrap_or(false));
                Ok(rows)
            }
            _ => Err(Error::InvalidArgument("record step applied to a batch".into())),
        }
    }
}

impl fmt::Debug for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStep::RecordMap { output, .. } => f.debug_struct("RecordMap").field("output", output).finish(),
            TransformStep::IndexedMap { output, .. } => f.debug_struct("IndexedMap").field("output", output).finish(),
            TransformStep::BatchMap { batch_size, drop_last_batch, output, .. } => f
                .debug_struct("BatchMap")
                .field("batch_size", batch_size)
                .field("drop_last_batch", drop_last_batch)
                .field("output", output)
                .finish(),
            TransformStep::RecordFilter(_) => f.write_str("RecordFilter"),
            TransformStep::IndexedFilter(_) => f.write_str("IndexedFilter"),
            TransformStep::BatchFilter { batch_size, .. } => {
                f.debug_struct("BatchFilter").field("batch_size", batch_size).finish()
            }
            TransformStep::Rename { from, to } => f.debug_struct("Rename").field("from", from).field("to", to).finish(),
            TransformStep::Remove(columns) => f.debug_tuple("Remove").field(columns).finish(),
            TransformStep::Select(columns) => f.debug_tuple("Select").field(columns).finish(),
            TransformStep::CastColumn { column, data_type } => f
                .debug_struct("CastColumn")
                .field("column", column)
                .field("data_type", data_type)
                .finish(),
            TransformStep::Cast(schema) => f.debug_tuple("Cast").field(schema).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ml_stream_core::{Field, Value};
    use test_case::test_case;

    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("text", DataType::String, true),
        ])
    }

    fn record() -> Record {
        Record::new().with("id", 1).with("text", "hello")
    }

    #[test]
    fn test_map_merges_and_removes_after_map() {
        let step = TransformStep::RecordMap {
            func: Arc::new(|r: &Record| -> Result<Record> {
                let len = r.try_get("text")?.as_str().map_or(0, str::len);
                Ok(Record::new().with("len", len as i64))
            }),
            output: MapOutput {
                remove_columns: vec!["text".to_string()],
                features: None,
            },
        };
        let out = step.apply_record(record(), &mut 0).unwrap().unwrap();
        assert_eq!(out, Record::new().with("id", 1).with("len", 5));
    }

    #[test]
    fn test_map_enforces_declared_features() {
        let features = Schema::new(vec![
            Field::new("id", DataType::Float64, false),
            Field::new("text", DataType::String, true),
        ]);
        let step = TransformStep::RecordMap {
            func: Arc::new(|_: &Record| Ok(Record::new())),
            output: MapOutput { remove_columns: Vec::new(), features: Some(features.clone()) },
        };
        assert_eq!(step.output_schema(Some(&schema())).unwrap(), Some(features));
        let out = step.apply_record(record(), &mut 0).unwrap().unwrap();
        assert_eq!(out.get("id"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_indexed_filter_sees_step_index() {
        let step = TransformStep::IndexedFilter(Arc::new(|_: &Record, i: usize| Ok(i % 2 == 0)));
        let mut index = 0;
        let kept: Vec<bool> = (0..4)
            .map(|_| step.apply_record(record(), &mut index).unwrap().is_some())
            .collect();
        assert_eq!(kept, vec![true, false, true, false]);
        assert_eq!(index, 4);
    }

    #[test_case(TransformStep::Rename { from: "nope".into(), to: "x".into() } ; "rename")]
    #[test_case(TransformStep::Remove(vec!["nope".into()]) ; "remove")]
    #[test_case(TransformStep::Select(vec!["nope".into()]) ; "select")]
    #[test_case(TransformStep::CastColumn { column: "nope".into(), data_type: DataType::Int8 } ; "cast column")]
    fn test_unknown_column_detected_from_schema(step: TransformStep) {
        assert!(matches!(step.output_schema(Some(&schema())), Err(Error::UnknownColumn(_))));
        assert!(step.output_schema(None).unwrap().is_none());
    }

    #[test]
    fn test_rename_onto_existing_column_rejected() {
        let step = TransformStep::Rename { from: "id".into(), to: "text".into() };
        assert!(matches!(step.output_schema(Some(&schema())), Err(Error::InvalidArgument(_))));
        assert!(matches!(step.apply_record(record(), &mut 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_cast_requires_same_column_set() {
        let target = Schema::new(vec![Field::new("id", DataType::Int32, false)]);
        let step = TransformStep::Cast(target.clone());
        assert!(matches!(step.output_schema(Some(&schema())), Err(Error::SchemaMismatch(_))));
        assert_eq!(step.output_schema(None).unwrap(), Some(target));
    }

    #[test]
    fn test_batch_filter_checks_flag_count() {
        let step = TransformStep::BatchFilter { func: Arc::new(|_: &Batch| Ok(vec![true])), batch_size: 2 };
        assert!(step.apply_batch(vec![record(), record()]).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let step = TransformStep::BatchFilter {
            func: Arc::new(|b: &Batch| Ok(vec![true; b.num_rows()])),
            batch_size: 0,
        };
        assert!(step.validate().is_err());
    }
}
