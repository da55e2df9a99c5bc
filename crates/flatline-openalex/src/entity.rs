//! OpenAlex entity types and their output layout

use std::fmt;
use std::path::Path;

use flatline_core::{Projection, StreamDef, StreamSpec};

use crate::schema;
use crate::transform;

/// OpenAlex snapshot entities with registered projections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// Academic works (papers, articles, etc.)
    Works,
    /// Researchers and authors
    Authors,
    /// Funding organizations
    Funders,
}

impl Entity {
    /// Output filename prefix, also the snapshot directory name
    pub fn output_prefix(&self) -> &'static str {
        match self {
            Self::Works => "works",
            Self::Authors => "authors",
            Self::Funders => "funders",
        }
    }

    /// List all available entities
    pub fn all() -> &'static [Entity] {
        &[Self::Works, Self::Authors, Self::Funders]
    }

    /// Declared output streams, entity table first
    pub fn streams(&self) -> &'static [StreamDef] {
        match self {
            Self::Works => schema::WORK_STREAMS,
            Self::Authors => schema::AUTHOR_STREAMS,
            Self::Funders => schema::FUNDER_STREAMS,
        }
    }

    pub fn projections(&self) -> &'static [Projection] {
        match self {
            Self::Works => transform::work::PROJECTIONS,
            Self::Authors => transform::author::PROJECTIONS,
            Self::Funders => transform::funder::PROJECTIONS,
        }
    }

    /// File name for one stream: `works.csv.gz` for the entity table,
    /// `works_topics.csv.gz` for a relation
    pub fn file_name(&self, stream: &str) -> String {
        let prefix = self.output_prefix();
        if stream == prefix {
            format!("{prefix}.csv.gz")
        } else {
            format!("{prefix}_{stream}.csv.gz")
        }
    }

    /// Stream specs for writing this entity under `output_dir`
    pub fn stream_specs(&self, output_dir: &Path) -> Vec<StreamSpec> {
        self.streams()
            .iter()
            .map(|s| StreamSpec::new(s.name, s.columns, output_dir.join(self.file_name(s.name))))
            .collect()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.output_prefix())
    }
}
