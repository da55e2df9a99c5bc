//! Work projections: the works table plus one stream per nested relation

use flatline_core::{Output, Projection, Record, Row, StreamDef};
use serde_json::Value;

use super::{ID_FIELD, cell, location_row, nonempty_object, pick, truthy, truthy_field};
use crate::schema;

/// Registration order is the order rows of one work are emitted
pub const PROJECTIONS: &[Projection] = &[
    Projection::new("works", works),
    Projection::new("primary_locations", primary_locations),
    Projection::new("locations", locations),
    Projection::new("best_oa_locations", best_oa_locations),
    Projection::new("authorships", authorships),
    Projection::new("biblio", biblio),
    Projection::new("topics", topics),
    Projection::new("concepts", concepts),
    Projection::new("ids", ids),
    Projection::new("mesh", mesh),
    Projection::new("open_access", open_access),
    Projection::new("referenced_works", referenced_works),
    Projection::new("related_works", related_works),
    Projection::new("grants", grants),
    Projection::new("counts_by_year", counts_by_year),
    Projection::new("more_info", more_info),
];

fn work_id(record: &Record) -> Option<&Value> {
    record.identifier(ID_FIELD)
}

/// Entity table. `abstract_inverted_index` is written as JSON text.
fn works(record: &Record, out: &mut Vec<Output>) {
    if work_id(record).is_none() {
        return;
    }
    out.push(Output::new(
        schema::WORKS.name,
        pick(record.fields(), schema::WORKS.columns),
    ));
}

fn single_location(record: &Record, key: &str, stream: &'static str, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    if let Some(row) = record.get(key).and_then(|loc| location_row(id, loc)) {
        out.push(Output::new(stream, row));
    }
}

fn primary_locations(record: &Record, out: &mut Vec<Output>) {
    single_location(record, "primary_location", schema::PRIMARY_LOCATIONS.name, out);
}

fn best_oa_locations(record: &Record, out: &mut Vec<Output>) {
    single_location(record, "best_oa_location", schema::BEST_OA_LOCATIONS.name, out);
}

fn locations(record: &Record, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    out.extend(
        record
            .array("locations")
            .iter()
            .filter_map(|loc| location_row(id, loc))
            .map(|row| Output::new(schema::LOCATIONS.name, row)),
    );
}

/// One row per (author, institution); an author with no institution still
/// gets one row with an empty `institution_id`.
fn authorships(record: &Record, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    for authorship in record.array("authorships") {
        let Some(author_id) = authorship.get("author").and_then(|a| truthy_field(a, "id")) else {
            continue;
        };
        let mut institution_ids: Vec<Value> = authorship
            .get("institutions")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|inst| truthy_field(inst, "id"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if institution_ids.is_empty() {
            institution_ids.push(Value::Null);
        }

        for institution_id in institution_ids {
            out.push(Output::new(
                schema::AUTHORSHIPS.name,
                Row::new()
                    .with("work_id", id.clone())
                    .with("author_position", cell(authorship, "author_position"))
                    .with("author_id", author_id.clone())
                    .with("institution_id", institution_id)
                    .with(
                        "raw_affiliation_string",
                        cell(authorship, "raw_affiliation_string"),
                    ),
            ));
        }
    }
}

/// Copy a nested object's declared columns, tagged with the work id
fn tagged_object(record: &Record, key: &str, stream: &StreamDef, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    if let Some(object) = nonempty_object(record, key) {
        let row = pick(object, stream.columns).with("work_id", id.clone());
        out.push(Output::new(stream.name, row));
    }
}

/// Copy each object of a nested array, tagged with the work id
fn tagged_array(record: &Record, key: &str, stream: &StreamDef, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    for object in record.array(key).iter().filter_map(Value::as_object) {
        let row = pick(object, stream.columns).with("work_id", id.clone());
        out.push(Output::new(stream.name, row));
    }
}

fn biblio(record: &Record, out: &mut Vec<Output>) {
    tagged_object(record, "biblio", &schema::BIBLIO, out);
}

fn ids(record: &Record, out: &mut Vec<Output>) {
    tagged_object(record, "ids", &schema::WORK_IDS, out);
}

fn open_access(record: &Record, out: &mut Vec<Output>) {
    tagged_object(record, "open_access", &schema::OPEN_ACCESS, out);
}

fn mesh(record: &Record, out: &mut Vec<Output>) {
    tagged_array(record, "mesh", &schema::MESH, out);
}

fn grants(record: &Record, out: &mut Vec<Output>) {
    tagged_array(record, "grants", &schema::GRANTS, out);
}

fn counts_by_year(record: &Record, out: &mut Vec<Output>) {
    tagged_array(record, "counts_by_year", &schema::WORK_COUNTS_BY_YEAR, out);
}

/// Scored classification (topics, concepts): one row per entry with an id
fn scored(
    record: &Record,
    key: &str,
    id_column: &str,
    stream: &'static str,
    out: &mut Vec<Output>,
) {
    let Some(id) = work_id(record) else { return };
    for entry in record.array(key) {
        if let Some(entry_id) = truthy_field(entry, "id") {
            out.push(Output::new(
                stream,
                Row::new()
                    .with("work_id", id.clone())
                    .with(id_column, entry_id.clone())
                    .with("score", cell(entry, "score")),
            ));
        }
    }
}

fn topics(record: &Record, out: &mut Vec<Output>) {
    scored(record, "topics", "topic_id", schema::TOPICS.name, out);
}

fn concepts(record: &Record, out: &mut Vec<Output>) {
    scored(record, "concepts", "concept_id", schema::CONCEPTS.name, out);
}

/// Plain list of work ids: one row per non-empty entry
fn linked(
    record: &Record,
    key: &str,
    id_column: &str,
    stream: &'static str,
    out: &mut Vec<Output>,
) {
    let Some(id) = work_id(record) else { return };
    out.extend(record.array(key).iter().filter(|v| truthy(v)).map(|linked| {
        Output::new(
            stream,
            Row::new()
                .with("work_id", id.clone())
                .with(id_column, linked.clone()),
        )
    }));
}

fn referenced_works(record: &Record, out: &mut Vec<Output>) {
    linked(
        record,
        "referenced_works",
        "referenced_work_id",
        schema::REFERENCED_WORKS.name,
        out,
    );
}

fn related_works(record: &Record, out: &mut Vec<Output>) {
    linked(
        record,
        "related_works",
        "related_work_id",
        schema::RELATED_WORKS.name,
        out,
    );
}

/// Always one row per work, even when every metric is missing
fn more_info(record: &Record, out: &mut Vec<Output>) {
    let Some(id) = work_id(record) else { return };
    let top = |key: &str| record.get(key).cloned().unwrap_or(Value::Null);
    let percentile = record
        .get("citation_normalized_percentile")
        .cloned()
        .unwrap_or(Value::Null);

    out.push(Output::new(
        schema::MORE_INFO.name,
        Row::new()
            .with("work_id", id.clone())
            .with("institutions_distinct_count", top("institutions_distinct_count"))
            .with("countries_distinct_count", top("countries_distinct_count"))
            .with("authors_count", top("authors_count"))
            .with("fwci", top("fwci"))
            .with("citation_normalized_percentile", cell(&percentile, "value"))
            .with("top1_percentile", cell(&percentile, "is_in_top_1_percent"))
            .with("top10_percentile", cell(&percentile, "is_in_top_10_percent")),
    ));
}
