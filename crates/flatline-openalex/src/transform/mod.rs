//! Projections from OpenAlex JSON records to flat rows
//!
//! Snapshot fields are frequently present but empty (`null`, `""`, `[]`,
//! `{}`). The projections treat all of those as absent, the same way for
//! every entity, via [`truthy`].

pub mod author;
pub mod funder;
pub mod work;

use flatline_core::{Record, Row};
use serde_json::{Map, Value};

/// Identifier field of every OpenAlex entity. The pipeline's `id_field` is
/// set to this so accepted records and projected rows agree.
pub const ID_FIELD: &str = "id";

/// Whether a JSON value counts as present: not null, not `false`, not zero,
/// not an empty string, array, or object
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `value[key]` when it is [`truthy`]
pub fn truthy_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| truthy(v))
}

/// `value[key]`, or `null` when missing
pub fn cell(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

/// Row holding the declared `columns` that `object` has
pub fn pick(object: &Map<String, Value>, columns: &[&str]) -> Row {
    let mut row = Row::new();
    for &column in columns {
        if let Some(v) = object.get(column) {
            row.set(column, v.clone());
        }
    }
    row
}

/// Top-level object field when it is non-empty
pub fn nonempty_object<'a>(record: &'a Record, key: &str) -> Option<&'a Map<String, Value>> {
    record.object(key).filter(|o| !o.is_empty())
}

/// Nested source id of a location, e.g. `primary_location.source.id`
pub fn location_source(location: &Value) -> Option<&Value> {
    location.get("source").and_then(|s| truthy_field(s, "id"))
}

/// Row for one work location; `None` when the location has no source
pub fn location_row(work_id: &Value, location: &Value) -> Option<Row> {
    let source_id = location_source(location)?;
    Some(
        Row::new()
            .with("work_id", work_id.clone())
            .with("source_id", source_id.clone())
            .with("landing_page_url", cell(location, "landing_page_url"))
            .with("pdf_url", cell(location, "pdf_url"))
            .with("is_oa", cell(location, "is_oa"))
            .with("version", cell(location, "version"))
            .with("license", cell(location, "license")),
    )
}
