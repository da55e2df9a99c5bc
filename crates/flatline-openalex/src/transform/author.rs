//! Author projections

use flatline_core::{Output, Projection, Record};
use serde_json::Value;

use super::{ID_FIELD, nonempty_object, pick, truthy_field};
use crate::schema;

pub const PROJECTIONS: &[Projection] = &[
    Projection::new("authors", authors),
    Projection::new("ids", ids),
    Projection::new("counts_by_year", counts_by_year),
];

/// Entity table.
///
/// `display_name_alternatives` is written as a JSON array. The institution
/// column keeps only the id: the legacy `last_known_institution` object
/// wins, otherwise the first of `last_known_institutions`.
fn authors(record: &Record, out: &mut Vec<Output>) {
    if record.identifier(ID_FIELD).is_none() {
        return;
    }
    let mut row = pick(record.fields(), schema::AUTHORS.columns);
    row.set(
        "last_known_institution",
        last_known_institution(record).cloned(),
    );
    out.push(Output::new(schema::AUTHORS.name, row));
}

fn last_known_institution(record: &Record) -> Option<&Value> {
    record
        .get("last_known_institution")
        .and_then(|inst| truthy_field(inst, "id"))
        .or_else(|| {
            record
                .array("last_known_institutions")
                .iter()
                .find_map(|inst| truthy_field(inst, "id"))
        })
}

fn ids(record: &Record, out: &mut Vec<Output>) {
    let Some(author_id) = record.identifier(ID_FIELD) else { return };
    if let Some(ids) = nonempty_object(record, "ids") {
        let row = pick(ids, schema::AUTHOR_IDS.columns).with("author_id", author_id.clone());
        out.push(Output::new(schema::AUTHOR_IDS.name, row));
    }
}

fn counts_by_year(record: &Record, out: &mut Vec<Output>) {
    let Some(author_id) = record.identifier(ID_FIELD) else { return };
    for year in record.array("counts_by_year").iter().filter_map(Value::as_object) {
        let row = pick(year, schema::AUTHOR_COUNTS_BY_YEAR.columns)
            .with("author_id", author_id.clone());
        out.push(Output::new(schema::AUTHOR_COUNTS_BY_YEAR.name, row));
    }
}
