//! JSON-lines shards: one JSON object per line

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ml_stream_core::{BoxStream, Record, RecordStream, ShardSource, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// A shard reading one JSON-lines file
///
/// The file is opened when the shard is opened and closed when its stream is
/// exhausted or dropped. Empty lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesShard {
    path: PathBuf,
}

impl JsonLinesShard {
    /// Create a shard for `path`; the file is not touched until the shard is opened
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// One shard per path, in the given order
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<Arc<dyn ShardSource>> {
        paths
            .iter()
            .map(|p| Arc::new(Self::new(p)) as Arc<dyn ShardSource>)
            .collect()
    }

    /// Path of the file behind this shard
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShardSource for JsonLinesShard {
    fn open(&self) -> ml_stream_core::Result<BoxStream> {
        debug!(path = %self.path.display(), "opening JSON-lines file");
        let file = File::open(&self.path).map_err(Error::from)?;
        Ok(Box::new(JsonLinesStream {
            lines: Some(BufReader::new(file).lines()),
            line: 0,
        }))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

struct JsonLinesStream {
    lines: Option<Lines<BufReader<File>>>,
    line: usize,
}

impl JsonLinesStream {
    fn read_next(&mut self) -> Result<Option<Record>> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        for line in lines.by_ref() {
            self.line += 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            return parse_line(&line, self.line).map(Some);
        }
        self.lines = None;
        Ok(None)
    }
}

impl RecordStream for JsonLinesStream {
    fn next_record(&mut self) -> ml_stream_core::Result<Option<Record>> {
        Ok(self.read_next()?)
    }
}

/// Parse one line holding a JSON object
pub fn parse_line(line: &str, line_number: usize) -> Result<Record> {
    let value = serde_json::from_str::<serde_json::Value>(line)
        .map_err(|e| Error::Format(format!("line {line_number}: {e}")))?;
    match value {
        serde_json::Value::Object(object) => Ok(object_to_record(object)),
        other => Err(Error::Format(format!(
            "line {line_number}: expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn object_to_record(object: serde_json::Map<String, serde_json::Value>) -> Record {
    object.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::Float)
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(object) => Value::Struct(object_to_record(object)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
