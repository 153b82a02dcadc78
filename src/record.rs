//! Schemaless surveillance records.
//!
//! A `Record` maps field names to values. Stages add, rename and remove
//! fields freely; the only fixed piece is the reserved line number, which is
//! stored apart from the ordinary fields so it cannot be overwritten once
//! assigned.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Name under which the line number is exposed to filters and sinks.
pub const LINE_NUMBER_KEY: &str = "_line_number";

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    /// Present in the input but explicitly empty (JSON `null`).
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Text form used for comparisons and output. `Null` renders as `None`.
    pub fn render(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Str(s) => Some(Cow::Borrowed(s)),
            Value::Int(n) => Some(Cow::Owned(n.to_string())),
            Value::Null => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Str(n.to_string()),
            },
            serde_json::Value::Bool(b) => Value::Str(b.to_string()),
            other => Value::Str(other.to_string()),
        }
    }
}

/// One record flowing through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    line_number: Option<u64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a parsed JSON object.
    ///
    /// A field named like the reserved line number key is dropped.
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        let fields = object
            .into_iter()
            .filter(|(k, _)| k != LINE_NUMBER_KEY)
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        Self {
            fields,
            line_number: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of a field, or `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// String value of a field, treating anything that is not a string as empty.
    pub fn str_or_empty(&self, key: &str) -> &str {
        self.get_str(key).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Set a field. Writes to the reserved line number key are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key == LINE_NUMBER_KEY {
            tracing::debug!("ignoring write to reserved field {LINE_NUMBER_KEY}");
            return;
        }
        self.fields.insert(key, value.into());
    }

    /// Set a field only if it is not already present.
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) {
        if !self.fields.contains_key(key) {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Move a field to a new name. A missing source yields an empty string.
    pub fn rename(&mut self, from: &str, to: &str) {
        let value = self.fields.remove(from).unwrap_or_else(|| Value::from(""));
        self.set(to, value);
    }

    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    /// Assign the line number. Returns `false` and leaves the record
    /// untouched if one was already assigned.
    pub fn assign_line_number(&mut self, line_number: u64) -> bool {
        if self.line_number.is_some() {
            return false;
        }
        self.line_number = Some(line_number);
        true
    }

    /// Text of a field for output, including the reserved line number.
    pub fn render(&self, key: &str) -> Option<Cow<'_, str>> {
        if key == LINE_NUMBER_KEY {
            return self.line_number.map(|n| Cow::Owned(n.to_string()));
        }
        self.fields.get(key).and_then(Value::render)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.fields.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}
