//! Record: an ordered mapping from column name to value

use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

/// A single streamed record
///
/// Column names are unique and insertion order is preserved. Records are
/// treated as immutable values: every operation that changes columns consumes
/// the record and returns a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Columns in order
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Create an empty record with room for `capacity` columns
    pub fn with_capacity(capacity: usize) -> Self {
        Self { fields: Vec::with_capacity(capacity) }
    }

    /// Builder-style insert; replaces an existing column in place
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a column
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Get a column value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a column value by name, failing with [`Error::UnknownColumn`]
    pub fn try_get(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Check whether a column exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the record into its `(name, value)` pairs
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// Rename a column, keeping its position
    pub fn renamed(mut self, from: &str, to: &str) -> Result<Self> {
        if from == to {
            self.try_get(from)?;
            return Ok(self);
        }
        if self.contains(to) {
            return Err(Error::InvalidArgument(format!(
                "cannot rename '{from}' to '{to}': column '{to}' already exists"
            )));
        }
        let entry = self
            .fields
            .iter_mut()
            .find(|(n, _)| n == from)
            .ok_or_else(|| Error::UnknownColumn(from.to_string()))?;
        entry.0 = to.to_string();
        Ok(self)
    }

    /// Drop the named columns
    pub fn without(mut self, names: &[String]) -> Result<Self> {
        if let Some(missing) = names.iter().find(|name| !self.contains(name)) {
            return Err(Error::UnknownColumn(missing.clone()));
        }
        self.fields.retain(|(n, _)| !names.contains(n));
        Ok(self)
    }

    /// Keep only the named columns, in the requested order
    pub fn select(mut self, names: &[String]) -> Result<Self> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let index = self
                .fields
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
            selected.push(self.fields.swap_remove(index));
        }
        Ok(Self { fields: selected })
    }

    /// Overlay `updates` on this record
    ///
    /// Columns present in both take the updated value in their original
    /// position; new columns are appended in `updates` order.
    #[must_use]
    pub fn merge(mut self, updates: Record) -> Self {
        for (name, value) in updates.fields {
            self.set(name, value);
        }
        self
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}
