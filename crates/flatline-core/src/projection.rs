//! Projection registry: pure functions from one record to output rows
//!
//! A projection knows which fields of an entity map to which stream. The
//! pipeline only sees the registered list and routes whatever it yields.

use crate::record::{Record, Row};

/// A row addressed to one named stream
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub stream: &'static str,
    pub row: Row,
}

impl Output {
    pub fn new(stream: &'static str, row: Row) -> Self {
        Self { stream, row }
    }
}

/// Append zero or more outputs for a record. Must not have side effects.
pub type ProjectFn = fn(&Record, &mut Vec<Output>);

/// A named, registered projection
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub name: &'static str,
    pub apply: ProjectFn,
}

impl Projection {
    pub const fn new(name: &'static str, apply: ProjectFn) -> Self {
        Self { name, apply }
    }
}

/// Static description of an output stream: name and ordered columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Run every projection over `record`, in registration order.
///
/// Output order is record-stable: all rows from the first projection, then
/// the second, and so on.
pub fn project_all(projections: &[Projection], record: &Record, out: &mut Vec<Output>) {
    for p in projections {
        (p.apply)(record, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn topics(record: &Record, out: &mut Vec<Output>) {
        let Some(work_id) = record.get("id") else {
            return;
        };
        for topic in record.array("topics") {
            if let Some(topic_id) = topic.get("id").filter(|v| !v.is_null()) {
                out.push(Output::new(
                    "topics",
                    Row::new()
                        .with("work_id", work_id.clone())
                        .with("topic_id", topic_id.clone())
                        .with("score", topic.get("score").cloned().unwrap_or(Value::Null)),
                ));
            }
        }
    }

    fn entity(record: &Record, out: &mut Vec<Output>) {
        if let Some(id) = record.get("id") {
            out.push(Output::new("works", Row::new().with("id", id.clone())));
        }
    }

    #[test]
    fn topics_projection_yields_one_row_per_topic() {
        let rec =
            Record::parse(r#"{"id":"W1","topics":[{"id":"T1","score":0.9},{"score":0.1}]}"#)
                .unwrap();
        let mut out = Vec::new();
        project_all(&[Projection::new("topics", topics)], &rec, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stream, "topics");
        assert_eq!(out[0].row.cell("work_id"), "W1");
        assert_eq!(out[0].row.cell("topic_id"), "T1");
        assert_eq!(out[0].row.cell("score"), "0.9");
    }

    #[test]
    fn registration_order_is_output_order() {
        let rec = Record::parse(r#"{"id":"W1","topics":[{"id":"T1"}]}"#).unwrap();
        let registry = [
            Projection::new("works", entity),
            Projection::new("topics", topics),
        ];
        let mut out = Vec::new();
        project_all(&registry, &rec, &mut out);
        let streams: Vec<_> = out.iter().map(|o| o.stream).collect();
        assert_eq!(streams, ["works", "topics"]);
    }

    #[test]
    fn empty_registry_yields_nothing() {
        let rec = Record::parse(r#"{"id":"W1"}"#).unwrap();
        let mut out = Vec::new();
        project_all(&[], &rec, &mut out);
        assert!(out.is_empty());
    }
}
