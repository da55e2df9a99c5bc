//! Output stream definitions for OpenAlex entities
//!
//! Each entity has one stream named after itself (the entity table) plus one
//! stream per flattened relation. Column order here is the header order in
//! the written files.

use flatline_core::StreamDef;

/// Shared by every location stream of a work
const LOCATION_COLUMNS: &[&str] = &[
    "work_id",
    "source_id",
    "landing_page_url",
    "pdf_url",
    "is_oa",
    "version",
    "license",
];

// === Works ===

pub const WORKS: StreamDef = StreamDef {
    name: "works",
    columns: &[
        "id",
        "doi",
        "title",
        "display_name",
        "publication_year",
        "publication_date",
        "type",
        "cited_by_count",
        "is_retracted",
        "is_paratext",
        "cited_by_api_url",
        "abstract_inverted_index", // compact JSON text
        "language",
    ],
};

pub const PRIMARY_LOCATIONS: StreamDef = StreamDef {
    name: "primary_locations",
    columns: LOCATION_COLUMNS,
};

pub const LOCATIONS: StreamDef = StreamDef {
    name: "locations",
    columns: LOCATION_COLUMNS,
};

pub const BEST_OA_LOCATIONS: StreamDef = StreamDef {
    name: "best_oa_locations",
    columns: LOCATION_COLUMNS,
};

pub const AUTHORSHIPS: StreamDef = StreamDef {
    name: "authorships",
    columns: &[
        "work_id",
        "author_position",
        "author_id",
        "institution_id",
        "raw_affiliation_string",
    ],
};

pub const BIBLIO: StreamDef = StreamDef {
    name: "biblio",
    columns: &["work_id", "volume", "issue", "first_page", "last_page"],
};

pub const TOPICS: StreamDef = StreamDef {
    name: "topics",
    columns: &["work_id", "topic_id", "score"],
};

pub const CONCEPTS: StreamDef = StreamDef {
    name: "concepts",
    columns: &["work_id", "concept_id", "score"],
};

pub const WORK_IDS: StreamDef = StreamDef {
    name: "ids",
    columns: &["work_id", "openalex", "doi", "mag", "pmid", "pmcid"],
};

pub const MESH: StreamDef = StreamDef {
    name: "mesh",
    columns: &[
        "work_id",
        "descriptor_ui",
        "descriptor_name",
        "qualifier_ui",
        "qualifier_name",
        "is_major_topic",
    ],
};

pub const OPEN_ACCESS: StreamDef = StreamDef {
    name: "open_access",
    columns: &[
        "work_id",
        "is_oa",
        "oa_status",
        "oa_url",
        "any_repository_has_fulltext",
    ],
};

pub const REFERENCED_WORKS: StreamDef = StreamDef {
    name: "referenced_works",
    columns: &["work_id", "referenced_work_id"],
};

pub const RELATED_WORKS: StreamDef = StreamDef {
    name: "related_works",
    columns: &["work_id", "related_work_id"],
};

pub const GRANTS: StreamDef = StreamDef {
    name: "grants",
    columns: &["work_id", "funder", "funder_display_name", "award_id"],
};

pub const WORK_COUNTS_BY_YEAR: StreamDef = StreamDef {
    name: "counts_by_year",
    columns: &["work_id", "year", "cited_by_count"],
};

pub const MORE_INFO: StreamDef = StreamDef {
    name: "more_info",
    columns: &[
        "work_id",
        "institutions_distinct_count",
        "countries_distinct_count",
        "authors_count",
        "fwci",
        "citation_normalized_percentile",
        "top1_percentile",
        "top10_percentile",
    ],
};

pub const WORK_STREAMS: &[StreamDef] = &[
    WORKS,
    PRIMARY_LOCATIONS,
    LOCATIONS,
    BEST_OA_LOCATIONS,
    AUTHORSHIPS,
    BIBLIO,
    TOPICS,
    CONCEPTS,
    WORK_IDS,
    MESH,
    OPEN_ACCESS,
    REFERENCED_WORKS,
    RELATED_WORKS,
    GRANTS,
    WORK_COUNTS_BY_YEAR,
    MORE_INFO,
];

// === Authors ===

pub const AUTHORS: StreamDef = StreamDef {
    name: "authors",
    columns: &[
        "id",
        "orcid",
        "display_name",
        "display_name_alternatives", // compact JSON text
        "works_count",
        "cited_by_count",
        "last_known_institution", // institution id only
        "works_api_url",
        "updated_date",
    ],
};

pub const AUTHOR_IDS: StreamDef = StreamDef {
    name: "ids",
    columns: &[
        "author_id",
        "openalex",
        "orcid",
        "scopus",
        "twitter",
        "wikipedia",
        "mag",
    ],
};

pub const AUTHOR_COUNTS_BY_YEAR: StreamDef = StreamDef {
    name: "counts_by_year",
    columns: &[
        "author_id",
        "year",
        "works_count",
        "cited_by_count",
        "oa_works_count",
    ],
};

pub const AUTHOR_STREAMS: &[StreamDef] = &[AUTHORS, AUTHOR_IDS, AUTHOR_COUNTS_BY_YEAR];

// === Funders ===

pub const FUNDERS: StreamDef = StreamDef {
    name: "funders",
    columns: &[
        "id",
        "display_name",
        "country_code",
        "country_id",
        "description",
        "grants_count",
        "works_count",
        "homepage_url",
    ],
};

pub const FUNDER_IDS: StreamDef = StreamDef {
    name: "ids",
    columns: &["funder_id", "crossref_id", "doi", "ror", "wikidata"],
};

pub const FUNDER_STREAMS: &[StreamDef] = &[FUNDERS, FUNDER_IDS];
