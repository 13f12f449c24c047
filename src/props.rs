//! Free-form property bags attached to people and facts.
//!
//! Properties are validated once, at the tool boundary, and then travel
//! through the backends as a structured value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{CrmError, Result};

/// A validated JSON property bag.
///
/// Any JSON document is accepted; only parse-ability is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(Value);

impl Properties {
    /// The empty object, `{}`.
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Parse properties from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(CrmError::InvalidProperties)
    }

    /// Build properties from a tool argument.
    ///
    /// Missing or null arguments mean `{}`. Strings are parsed as JSON text;
    /// any other JSON value is taken as already structured.
    pub fn from_argument(arg: Option<&Value>) -> Result<Self> {
        match arg {
            None | Some(Value::Null) => Ok(Self::empty()),
            Some(Value::String(text)) => Self::parse(text),
            Some(other) => Ok(Self(other.clone())),
        }
    }

    /// Recover properties from what a backend stored.
    ///
    /// Rows written through the raw query tools may hold text that is not
    /// JSON; such text is kept as a JSON string instead of failing the read.
    pub fn from_stored(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self(Value::String(text.to_string())))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Compact JSON text, the form persisted by the embedded store.
    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
