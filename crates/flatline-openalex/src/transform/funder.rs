//! Funder projections

use flatline_core::{Output, Projection, Record, Row};
use serde_json::Value;

use super::{ID_FIELD, nonempty_object, pick};
use crate::schema;

pub const PROJECTIONS: &[Projection] = &[
    Projection::new("funders", funders),
    Projection::new("ids", ids),
];

fn funders(record: &Record, out: &mut Vec<Output>) {
    if record.identifier(ID_FIELD).is_none() {
        return;
    }
    out.push(Output::new(
        schema::FUNDERS.name,
        pick(record.fields(), schema::FUNDERS.columns),
    ));
}

/// External identifiers; `ids.crossref` lands in `crossref_id`
fn ids(record: &Record, out: &mut Vec<Output>) {
    let Some(funder_id) = record.identifier(ID_FIELD) else { return };
    let Some(ids) = nonempty_object(record, "ids") else { return };
    let id = |key: &str| ids.get(key).cloned().unwrap_or(Value::Null);
    out.push(Output::new(
        schema::FUNDER_IDS.name,
        Row::new()
            .with("funder_id", funder_id.clone())
            .with("crossref_id", id("crossref"))
            .with("doi", id("doi"))
            .with("ror", id("ror"))
            .with("wikidata", id("wikidata")),
    ));
}
