//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for flatline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// OpenAlex snapshot root, `${VAR}` allowed
    #[serde(deserialize_with = "deserialize_env_path")]
    pub snapshot_dir: Option<PathBuf>,
    pub pattern: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: std::env::var_os("OPENALEX_SNAPSHOT").map(PathBuf::from),
            pattern: flatline_core::pipeline::DEFAULT_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
    /// gzip level, 0-9
    pub compression_level: u32,
    pub delimiter: char,
    pub crlf: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./output"),
            compression_level: 6,
            delimiter: ',',
            crlf: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: flatline_core::pipeline::DEFAULT_WORKERS,
            batch_size: flatline_core::pipeline::DEFAULT_BATCH_SIZE,
            capacity: flatline_core::pipeline::DEFAULT_CAPACITY,
        }
    }
}

/// Deserialize a path that may be an environment variable reference like ${VAR}
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)).map(PathBuf::from))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./flatline.toml (current directory)
    /// 2. ~/.config/flatline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("flatline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "flatline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
