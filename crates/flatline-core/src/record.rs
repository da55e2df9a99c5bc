//! Parsed input records and flat output rows

use std::borrow::Cow;

use serde_json::{Map, Value};

/// One decoded JSON object from an input line
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Parse a raw input line.
    ///
    /// Returns `None` for blank lines, invalid JSON, and JSON values that are
    /// not objects. Callers treat all three the same way: skip the line.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match sonic_rs::from_str::<Value>(trimmed).ok()? {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Parse a raw input line as read from disk.
    ///
    /// A line that is not valid UTF-8 is treated like invalid JSON.
    pub fn parse_bytes(line: &[u8]) -> Option<Self> {
        Self::parse(std::str::from_utf8(line).ok()?)
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Top-level field, with JSON `null` folded into `None`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Walk nested objects, e.g. `["primary_location", "source", "id"]`.
    /// Any missing or `null` step yields `None`.
    pub fn path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        let mut cur = self.get(first)?;
        for key in rest {
            cur = cur.get(key).filter(|v| !v.is_null())?;
        }
        Some(cur)
    }

    /// Top-level field as an array; missing, `null`, and non-array all give `&[]`
    pub fn array(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Top-level field as an object
    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    /// The record's identifier, if present.
    ///
    /// A non-empty string or a number counts as an identifier. Anything else
    /// (missing, `null`, `""`, objects, ...) means the record cannot be
    /// attributed and must be dropped.
    pub fn identifier(&self, field: &str) -> Option<&Value> {
        self.get(field).filter(|v| match v {
            Value::String(s) => !s.is_empty(),
            Value::Number(_) => true,
            _ => false,
        })
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One flat output row: column name → scalar value.
///
/// Rows may carry keys that the target stream does not declare; those are
/// dropped when the row is written. Declared columns missing from the row are
/// written as empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Map<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every key of a nested JSON object into a new row
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            cells: object.clone(),
        }
    }

    /// Builder-style [`set`](Row::set)
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.cells.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Text for one column of this row (empty when absent)
    pub fn cell(&self, column: &str) -> Cow<'_, str> {
        self.cells.get(column).map_or(Cow::Borrowed(""), render_value)
    }
}

/// Render a JSON value as a delimited-text cell.
///
/// `null` is empty, strings are verbatim, numbers and booleans use their JSON
/// text, and arrays/objects are written as compact JSON.
pub fn render_value(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(_) | Value::Object(_) => Cow::Owned(value.to_string()),
    }
}
