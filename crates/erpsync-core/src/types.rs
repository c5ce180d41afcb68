use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::watermark::{parse_timestamp, Watermark};

/// A scalar read from a source column.
///
/// Temporal and DECIMAL columns arrive as text in their canonical form, so
/// nothing is lost before projection decides the replica type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            // NaN and infinities have no JSON form.
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column name to value, for one source row.
pub type RowMap = HashMap<String, Value>;

/// One row read from a source table, with every column it carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    columns: RowMap,
}

impl SourceRecord {
    pub fn new(columns: RowMap) -> Self {
        Self { columns }
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &RowMap {
        &self.columns
    }

    /// Get a column that must hold a non-empty string.
    pub fn require_str(&self, column: &str) -> Result<&str> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Err(Error::MissingColumn(column.to_string())),
            Some(Value::Text(s)) if s.is_empty() => Err(Error::InvalidValue {
                column: column.to_string(),
                message: "empty string".into(),
            }),
            Some(Value::Text(s)) => Ok(s),
            Some(other) => Err(Error::InvalidColumnType {
                column: column.to_string(),
                expected: "text".into(),
                actual: other.kind().into(),
            }),
        }
    }

    /// The `(timestamp, key)` position of this row in its entity's change stream.
    pub fn watermark(&self, time_column: &str, key_column: &str) -> Result<Watermark> {
        let time = parse_timestamp(self.require_str(time_column)?)?;
        let key = self.require_str(key_column)?;
        Ok(Watermark::new(time, key))
    }

    /// The complete record as a JSON object, for the replica payload column.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
