//! Schema definition for streamed records

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Data type for column values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type
    Boolean,

    /// 8-bit signed integer
    Int8,

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 8-bit unsigned integer
    UInt8,

    /// 16-bit unsigned integer
    UInt16,

    /// 32-bit unsigned integer
    UInt32,

    /// 64-bit unsigned integer
    UInt64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// UTF-8 encoded string
    String,

    /// Binary data
    Binary,

    /// Categorical value from a fixed label set, stored as the label index
    ClassLabel(Vec<String>),

    /// List of values with a given type
    List(Box<DataType>),

    /// Struct with named fields
    Struct(Vec<Field>),

    /// Null type (for representing null values only)
    Null,
}

impl DataType {
    /// Create a class label type from its label names
    pub fn class_label<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DataType::ClassLabel(names.into_iter().map(Into::into).collect())
    }

    /// Check if this type is a signed or unsigned integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    /// Check if this type is a numeric type
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Inclusive value range of an integer type, `None` for other types
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            DataType::Int8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            DataType::Int16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            DataType::Int32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            DataType::Int64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            DataType::UInt8 => (0, i128::from(u8::MAX)),
            DataType::UInt16 => (0, i128::from(u16::MAX)),
            DataType::UInt32 => (0, i128::from(u32::MAX)),
            DataType::UInt64 => (0, i128::from(u64::MAX)),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int8 => write!(f, "Int8"),
            DataType::Int16 => write!(f, "Int16"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::UInt8 => write!(f, "UInt8"),
            DataType::UInt16 => write!(f, "UInt16"),
            DataType::UInt32 => write!(f, "UInt32"),
            DataType::UInt64 => write!(f, "UInt64"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Binary => write!(f, "Binary"),
            DataType::ClassLabel(names) => write!(f, "ClassLabel([{}])", names.join(", ")),
            DataType::List(item_type) => write!(f, "List({item_type})"),
            DataType::Struct(fields) => {
                write!(f, "Struct({{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, "}})")
            }
            DataType::Null => write!(f, "Null"),
        }
    }
}

/// A field in a schema, with a name, data type, and nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Data type of the field
    pub data_type: DataType,

    /// Whether the field can be null
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Check if this field is nullable
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}: {} (nullable)", self.name, self.data_type)
        } else {
            write!(f, "{}: {} (non-nullable)", self.name, self.data_type)
        }
    }
}

/// A schema describing the records produced by a pipeline stage
///
/// Field order is significant and names are unique. Schemas are small, so
/// lookups scan the field list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema with the given fields
    ///
    /// Later fields replace earlier fields with the same name.
    pub fn new(fields: Vec<Field>) -> Self {
        let mut schema = Self { fields: Vec::with_capacity(fields.len()) };
        for field in fields {
            schema.upsert(field);
        }
        schema
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Check whether a field with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Field names in schema order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema with `from` renamed to `to`, keeping its position
    pub fn renamed(&self, from: &str, to: &str) -> Result<Self> {
        let index = self.index_of(from)?;
        if from != to && self.contains(to) {
            return Err(Error::InvalidArgument(format!(
                "cannot rename '{from}' to '{to}': column '{to}' already exists"
            )));
        }
        let mut fields = self.fields.clone();
        fields[index].name = to.to_string();
        Ok(Self { fields })
    }

    /// Schema without the named fields
    pub fn without(&self, names: &[String]) -> Result<Self> {
        for name in names {
            self.index_of(name)?;
        }
        let fields = self
            .fields
            .iter()
            .filter(|f| !names.contains(&f.name))
            .cloned()
            .collect();
        Ok(Self { fields })
    }

    /// Schema with only the named fields, in the requested order
    pub fn project_by_names(&self, names: &[String]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|name| self.field_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }

    /// Schema with the type of one field replaced
    pub fn with_data_type(&self, name: &str, data_type: DataType) -> Result<Self> {
        let index = self.index_of(name)?;
        let mut fields = self.fields.clone();
        fields[index].data_type = data_type;
        Ok(Self { fields })
    }

    /// Insert a field, replacing any existing field with the same name in place
    pub fn upsert(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Check that another schema has the same field names in any order
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.len() == other.len() && self.names().all(|name| other.contains(name))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}
