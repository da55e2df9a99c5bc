//! OpenAlex pipeline configuration

use std::path::PathBuf;

use flatline_core::pipeline::{DEFAULT_BATCH_SIZE, DEFAULT_CAPACITY, DEFAULT_PATTERN, DEFAULT_WORKERS};
use flatline_core::CsvFormat;

use crate::entity::Entity;

/// Runtime configuration for one entity run
#[derive(Debug, Clone)]
pub struct Config {
    /// Entity type to flatten
    pub entity: Entity,
    /// Snapshot root; entity files live under `<snapshot_dir>/data/<entity>`
    pub snapshot_dir: PathBuf,
    /// Explicit input directory, overrides the snapshot layout
    pub input_dir: Option<PathBuf>,
    /// Output directory for csv.gz files
    pub output_dir: PathBuf,
    /// Glob for input files, relative to the input directory
    pub pattern: String,
    /// Transform workers (one ingestion channel each)
    pub workers: usize,
    /// Lines per batch
    pub batch_size: usize,
    /// Bounded channel capacity, in messages
    pub capacity: usize,
    pub format: CsvFormat,
}

impl Config {
    /// Directory the reader walks
    pub fn input_dir(&self) -> PathBuf {
        self.input_dir.clone().unwrap_or_else(|| {
            self.snapshot_dir
                .join("data")
                .join(self.entity.output_prefix())
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity: Entity::Works,
            snapshot_dir: PathBuf::from("openalex-snapshot"),
            input_dir: None,
            output_dir: PathBuf::from("output"),
            pattern: DEFAULT_PATTERN.to_string(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            capacity: DEFAULT_CAPACITY,
            format: CsvFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.entity, Entity::Works);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.format.level, 6);
    }

    #[test]
    fn input_dir_follows_snapshot_layout() {
        let config = Config {
            entity: Entity::Authors,
            snapshot_dir: PathBuf::from("/snap"),
            ..Default::default()
        };
        assert_eq!(config.input_dir(), PathBuf::from("/snap/data/authors"));
    }

    #[test]
    fn explicit_input_dir_wins() {
        let config = Config {
            input_dir: Some(PathBuf::from("/elsewhere")),
            ..Default::default()
        };
        assert_eq!(config.input_dir(), PathBuf::from("/elsewhere"));
    }
}
