//! Snapshot model for raw sensor readings.
//!
//! A [`Snapshot`] maps category names (e.g. "Temperature") to either a group of
//! readings keyed by a human-readable description, or to some other value that
//! is not modeled as a sensor group. Reading values stay loosely typed: the
//! translation into metrics decides how to interpret them.

use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A raw reading value as reported by a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Text, optionally carrying a space-separated unit suffix ("45.5 °C").
    Text(String),
    /// Any other JSON shape (null, array, object).
    Unsupported(Value),
}

impl ReadingValue {
    /// Returns the name of the value's type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadingValue::Integer(_) => "integer",
            ReadingValue::Float(_) => "float",
            ReadingValue::Boolean(_) => "boolean",
            ReadingValue::Text(_) => "string",
            ReadingValue::Unsupported(value) => json_kind(value),
        }
    }
}

impl From<Value> for ReadingValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => ReadingValue::Boolean(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ReadingValue::Integer(i),
                (None, Some(f)) => ReadingValue::Float(f),
                _ => ReadingValue::Unsupported(Value::Number(n)),
            },
            Value::String(s) => ReadingValue::Text(s),
            other => ReadingValue::Unsupported(other),
        }
    }
}

impl From<i64> for ReadingValue {
    fn from(value: i64) -> Self {
        ReadingValue::Integer(value)
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::Float(value)
    }
}

impl From<bool> for ReadingValue {
    fn from(value: bool) -> Self {
        ReadingValue::Boolean(value)
    }
}

impl From<&str> for ReadingValue {
    fn from(value: &str) -> Self {
        ReadingValue::Text(value.to_string())
    }
}

impl From<String> for ReadingValue {
    fn from(value: String) -> Self {
        ReadingValue::Text(value)
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Integer(i) => write!(f, "{}", i),
            ReadingValue::Float(v) => write!(f, "{}", v),
            ReadingValue::Boolean(b) => write!(f, "{}", b),
            ReadingValue::Text(s) => f.write_str(s),
            ReadingValue::Unsupported(value) => write!(f, "{}", value),
        }
    }
}

/// Details reported for one reading. Only the value is modeled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingDetails {
    pub value: ReadingValue,
}

/// A category entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Category {
    /// Readings keyed by description.
    Group(BTreeMap<String, ReadingDetails>),
    /// A value that is not a group of readings.
    Unmodeled(Value),
}

/// One (category, description, value) triple borrowed from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<'a> {
    pub category: &'a str,
    pub description: &'a str,
    pub value: &'a ReadingValue,
}

/// A point-in-time set of readings, ordered by category then description.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    categories: BTreeMap<String, Category>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a snapshot from a JSON document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)?;
        Self::from_json(root)
    }

    /// Builds a snapshot from a parsed JSON document.
    ///
    /// The root must be an object. Category values that are objects become
    /// groups; anything else is kept as [`Category::Unmodeled`]. Within a group,
    /// entries whose details are not objects are dropped, and details without a
    /// `value` field carry a null value.
    pub fn from_json(root: Value) -> Result<Self> {
        let map = match root {
            Value::Object(map) => map,
            other => return Err(Error::InvalidSnapshot(json_kind(&other))),
        };

        let mut categories = BTreeMap::new();
        for (name, value) in map {
            let category = match value {
                Value::Object(entries) => {
                    let mut readings = BTreeMap::new();
                    for (description, details) in entries {
                        match details {
                            Value::Object(mut fields) => {
                                let value = fields.remove("value").unwrap_or(Value::Null);
                                readings.insert(
                                    description,
                                    ReadingDetails {
                                        value: value.into(),
                                    },
                                );
                            }
                            other => {
                                debug!(
                                    "Skipping {}/{}: details are {}, not an object",
                                    name,
                                    description,
                                    json_kind(&other)
                                );
                            }
                        }
                    }
                    Category::Group(readings)
                }
                other => Category::Unmodeled(other),
            };
            categories.insert(name, category);
        }

        Ok(Self { categories })
    }

    /// Adds a reading, creating its category group if needed.
    ///
    /// An unmodeled category with the same name is replaced by a group.
    pub fn insert(
        &mut self,
        category: impl Into<String>,
        description: impl Into<String>,
        value: impl Into<ReadingValue>,
    ) {
        let entry = self
            .categories
            .entry(category.into())
            .or_insert_with(|| Category::Group(BTreeMap::new()));
        if let Category::Unmodeled(_) = entry {
            *entry = Category::Group(BTreeMap::new());
        }
        if let Category::Group(readings) = entry {
            readings.insert(
                description.into(),
                ReadingDetails {
                    value: value.into(),
                },
            );
        }
    }

    /// Sets a category to a value that is not a reading group.
    pub fn insert_unmodeled(&mut self, category: impl Into<String>, value: Value) {
        self.categories
            .insert(category.into(), Category::Unmodeled(value));
    }

    /// Iterates over all categories, including unmodeled ones.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.categories.iter().map(|(name, c)| (name.as_str(), c))
    }

    /// Iterates over every reading in every group.
    pub fn readings(&self) -> impl Iterator<Item = Reading<'_>> {
        self.categories
            .iter()
            .filter_map(|(category, entry)| match entry {
                Category::Group(readings) => Some((category, readings)),
                Category::Unmodeled(_) => None,
            })
            .flat_map(|(category, readings)| {
                readings.iter().map(move |(description, details)| Reading {
                    category,
                    description,
                    value: &details.value,
                })
            })
    }

    /// Returns the number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns true if the snapshot has no categories.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Names the type of a JSON value.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
