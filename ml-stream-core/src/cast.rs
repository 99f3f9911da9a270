//! Lossless value casting between data types
//!
//! A cast succeeds only when the value can be reinterpreted under the target
//! type without losing information; everything else is reported as
//! [`Error::IncompatibleCast`] for the column being cast.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{DataType, Field, Schema};
use crate::value::Value;

/// Largest integer magnitude an `f64` represents exactly
const F64_EXACT_INT: i128 = 1 << 53;

/// Largest integer magnitude an `f32` represents exactly
const F32_EXACT_INT: i128 = 1 << 24;

/// Cast a single value of `column` to `to`
pub fn cast_value(column: &str, value: &Value, to: &DataType) -> Result<Value> {
    let incompatible = || Error::IncompatibleCast {
        column: column.to_string(),
        value: value.to_string(),
        to: to.clone(),
    };

    if value.is_null() {
        return Ok(Value::Null);
    }

    match to {
        DataType::Null => Err(incompatible()),
        DataType::Boolean => to_bool(value).map(Value::Bool).ok_or_else(incompatible),
        DataType::Float64 => to_float(value, F64_EXACT_INT).map(Value::Float).ok_or_else(incompatible),
        DataType::Float32 => to_float(value, F32_EXACT_INT)
            .filter(|v| fits_f32(*v))
            .map(Value::Float)
            .ok_or_else(incompatible),
        DataType::String => to_string(value).map(Value::String).ok_or_else(incompatible),
        DataType::Binary => match value {
            Value::Binary(b) => Ok(Value::Binary(b.clone())),
            Value::String(s) => Ok(Value::Binary(s.clone().into_bytes().into())),
            _ => Err(incompatible()),
        },
        DataType::ClassLabel(names) => {
            let index = match value {
                Value::String(label) => names.iter().position(|n| n == label).and_then(|i| i64::try_from(i).ok()),
                _ => to_integer(value)
                    .filter(|i| usize::try_from(*i).is_ok_and(|i| i < names.len()))
                    .and_then(|i| i64::try_from(i).ok()),
            };
            index.map(Value::Int).ok_or_else(incompatible)
        }
        DataType::List(item_type) => match value {
            Value::List(items) => items
                .iter()
                .map(|item| cast_value(column, item, item_type))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            _ => Err(incompatible()),
        },
        DataType::Struct(fields) => match value {
            Value::Struct(record) => {
                let schema = Schema::new(fields.clone());
                if !record.columns().all(|c| schema.contains(c)) || record.len() != schema.len() {
                    return Err(incompatible());
                }
                cast_record(record.clone(), &schema).map(Value::Struct)
            }
            _ => Err(incompatible()),
        },
        integer => {
            let (min, max) = integer.integer_range().ok_or_else(incompatible)?;
            let v = to_integer(value).filter(|v| *v >= min && *v <= max).ok_or_else(incompatible)?;
            if min < 0 {
                i64::try_from(v).map(Value::Int).map_err(|_| incompatible())
            } else {
                u64::try_from(v).map(Value::UInt).map_err(|_| incompatible())
            }
        }
    }
}

/// Cast one column of a record, leaving the others untouched
pub fn cast_column(record: Record, column: &str, to: &DataType) -> Result<Record> {
    let value = record.try_get(column)?;
    let cast = cast_value(column, value, to)?;
    Ok(record.with(column, cast))
}

/// Cast a whole record to `schema`
///
/// The record must carry exactly the schema's columns. The result is in
/// schema order; nulls in non-nullable fields are rejected.
pub fn cast_record(record: Record, schema: &Schema) -> Result<Record> {
    if let Some(extra) = record.columns().find(|c| !schema.contains(c)) {
        return Err(Error::SchemaMismatch(format!("column '{extra}' is not in the target schema")));
    }
    let mut out = Record::with_capacity(schema.len());
    for Field { name, data_type, nullable } in schema.fields() {
        let value = record
            .get(name)
            .ok_or_else(|| Error::SchemaMismatch(format!("column '{name}' is missing from the record")))?;
        if value.is_null() && !nullable {
            return Err(Error::IncompatibleCast {
                column: name.clone(),
                value: value.to_string(),
                to: data_type.clone(),
            });
        }
        out.set(name.clone(), cast_value(name, value, data_type)?);
    }
    Ok(out)
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        other => match to_integer(other)? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Bool(b) => Some(i128::from(*b)),
        Value::Int(v) => Some(i128::from(*v)),
        Value::UInt(v) => Some(i128::from(*v)),
        Value::Float(v) => {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e38 {
                Some(*v as i128)
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &Value, exact_limit: i128) -> Option<f64> {
    match value {
        Value::Float(v) => Some(*v),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Int(_) | Value::UInt(_) => {
            let v = to_integer(value)?;
            (v.abs() <= exact_limit).then_some(v as f64)
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn fits_f32(v: f64) -> bool {
    v.is_nan() || f64::from(v as f32) == v
}

fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Binary(b) => std::str::from_utf8(b).ok().map(str::to_string),
        _ => None,
    }
}
