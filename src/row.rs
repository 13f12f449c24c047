//! Result rows from either engine, normalized behind one accessor.
//!
//! Engines hand back rows either positionally (`["Alice", {...}]`) or keyed
//! by column (`{"name": "Alice", ...}`). Callers read cells through
//! [`Row::get`] with both an index and a field name and never branch on shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    /// Positional cells, in column order.
    List(Vec<Value>),
    /// Cells keyed by column name, in column order.
    Map(Map<String, Value>),
}

impl Row {
    /// Wrap an arbitrary JSON value as a row. Scalars become one-cell rows.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(cells) => Row::List(cells),
            Value::Object(fields) => Row::Map(fields),
            scalar => Row::List(vec![scalar]),
        }
    }

    /// Build a keyed row from column names and cells.
    pub fn keyed(columns: &[String], cells: Vec<Value>) -> Self {
        Row::Map(columns.iter().cloned().zip(cells).collect())
    }

    /// Read a cell by position for list rows, or by field for keyed rows.
    ///
    /// Keyed lookup also accepts qualified column names, so `"name"` finds
    /// a column called `p.name`.
    pub fn get(&self, index: usize, field: &str) -> Option<&Value> {
        match self {
            Row::List(cells) => cells.get(index),
            Row::Map(fields) => fields.get(field).or_else(|| {
                fields
                    .iter()
                    .find(|(key, _)| {
                        key.rsplit_once('.')
                            .is_some_and(|(_, column)| column == field)
                    })
                    .map(|(_, value)| value)
            }),
        }
    }

    /// A cell that must be a string.
    pub fn str_at(&self, index: usize, field: &str) -> Option<&str> {
        self.get(index, field).and_then(Value::as_str)
    }

    /// A cell rendered for display: strings bare, anything else as JSON.
    pub fn text_at(&self, index: usize, field: &str) -> String {
        match self.get(index, field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Row::List(cells) => cells.len(),
            Row::Map(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Row::List(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Row::List(cells) => Value::Array(cells.clone()),
            Row::Map(fields) => Value::Object(fields.clone()),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}
