//! Columnar batches handed to batched map and filter steps

use std::fmt;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::Value;

/// A collection of columns representing a batch of records in columnar format
///
/// Columns may be left with different lengths while a batch function edits
/// them; [`Batch::into_records`] checks lengths when the batch is flattened.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    /// Columns in order
    columns: Vec<(String, Vec<Value>)>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch from whole columns
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Self {
        let mut batch = Self::new();
        for (name, values) in columns {
            batch.set_column(name, values);
        }
        batch
    }

    /// Transpose records into columns
    ///
    /// Column order follows first appearance; a column missing from some
    /// record is filled with nulls for that row.
    pub fn from_records(records: Vec<Record>) -> Self {
        let rows = records.len();
        let mut batch = Self::new();
        for (row, record) in records.into_iter().enumerate() {
            for (name, value) in record {
                let values = match batch.columns.iter_mut().position(|(n, _)| *n == name) {
                    Some(index) => &mut batch.columns[index].1,
                    None => {
                        batch.columns.push((name, Vec::with_capacity(rows)));
                        let last = batch.columns.len() - 1;
                        &mut batch.columns[last].1
                    }
                };
                values.resize(row, Value::Null);
                values.push(value);
            }
        }
        for (_, values) in &mut batch.columns {
            values.resize(rows, Value::Null);
        }
        batch
    }

    /// Number of rows, taken from the first column
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, values)| values.len())
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Check if this batch has no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Get a column by name, failing with [`Error::UnknownColumn`]
    pub fn try_column(&self, name: &str) -> Result<&[Value]> {
        self.column(name).ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Insert or replace a column
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
    }

    /// Remove a column, returning its values
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        let index = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(index).1)
    }

    /// Overlay the columns of `updates` on this batch
    #[must_use]
    pub fn merge(mut self, updates: Batch) -> Self {
        for (name, values) in updates.columns {
            self.set_column(name, values);
        }
        self
    }

    /// Drop the named columns
    pub fn without(mut self, names: &[String]) -> Result<Self> {
        if let Some(missing) = names.iter().find(|name| self.column(name).is_none()) {
            return Err(Error::UnknownColumn(missing.clone()));
        }
        self.columns.retain(|(n, _)| !names.contains(n));
        Ok(self)
    }

    /// Flatten the batch back into records
    ///
    /// Every column must hold the same number of values.
    pub fn into_records(self) -> Result<Vec<Record>> {
        let rows = self.num_rows();
        if let Some((name, values)) = self.columns.iter().find(|(_, v)| v.len() != rows) {
            return Err(Error::ColumnLengthMismatch {
                column: name.clone(),
                expected: rows,
                actual: values.len(),
            });
        }

        let mut records: Vec<Record> = (0..rows)
            .map(|_| Record::with_capacity(self.columns.len()))
            .collect();
        for (name, values) in self.columns {
            for (record, value) in records.iter_mut().zip(values) {
                record.set(name.clone(), value);
            }
        }
        Ok(records)
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch: {} rows, {} columns", self.num_rows(), self.num_columns())?;
        for (name, values) in &self.columns {
            writeln!(f, "  {name}: {} values", values.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Record> {
        vec![
            Record::new().with("id", 0).with("text", "a"),
            Record::new().with("id", 1),
            Record::new().with("text", "c").with("id", 2),
        ]
    }

    #[test]
    fn test_from_records_fills_missing_with_null() {
        let batch = Batch::from_records(rows());
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.column_names().collect::<Vec<_>>(), vec!["id", "text"]);
        assert_eq!(
            batch.column("text").unwrap(),
            &[Value::from("a"), Value::Null, Value::from("c")]
        );
    }

    #[test]
    fn test_round_trip_preserves_column_order() {
        let records = Batch::from_records(rows()).into_records().unwrap();
        assert_eq!(records[2].columns().collect::<Vec<_>>(), vec!["id", "text"]);
        assert_eq!(records[1].get("text"), Some(&Value::Null));
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let mut batch = Batch::from_records(rows());
        batch.set_column("extra", vec![Value::from(1)]);
        let err = batch.into_records().unwrap_err();
        assert!(matches!(
            err,
            Error::ColumnLengthMismatch { ref column, expected: 3, actual: 1 } if column == "extra"
        ));
    }

    #[test]
    fn test_batch_may_change_row_count() {
        let batch = Batch::from_records(rows());
        let ids: Vec<Value> = batch
            .try_column("id")
            .unwrap()
            .iter()
            .flat_map(|v| [v.clone(), v.clone()])
            .collect();
        let expanded = Batch::from_columns(vec![("id".to_string(), ids)]);
        assert_eq!(expanded.into_records().unwrap().len(), 6);
    }

    #[test]
    fn test_without_rejects_unknown_column() {
        let batch = Batch::from_records(rows());
        assert!(matches!(batch.without(&["nope".to_string()]), Err(Error::UnknownColumn(_))));
    }
}
