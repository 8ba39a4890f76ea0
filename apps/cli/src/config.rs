//! CLI configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `cohortql.toml` in the working directory, or the file passed with `--config`
//! 3. `COHORTQL__SECTION__KEY` environment variables (a `.env` file is read first)

use anyhow::Context;
use cohortql_sql::{SchemaConfig, StopWords};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "cohortql.toml";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const ROTATIONS: &[&str] = &["daily", "hourly", "minutely", "never"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub query: QueryConfig,
    pub search: SearchConfig,
    /// JSON file replacing the default OMOP table mapping
    pub schema_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// daily, hourly, minutely or never
    pub file_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "logs".to_string(),
            file_prefix: "cohortql".to_string(),
            file_rotation: "daily".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size of `ids` when `--limit` is not given
    pub id_limit: u64,
    /// Row limit of `domain-chart` and `search` when `--limit` is not given
    pub chart_limit: u64,
    /// Linking lookups to keep across dataset builds; 0 disables the cache
    pub linking_cache_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            id_limit: 100,
            chart_limit: 10,
            linking_cache_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Replaces the built-in full-text stop words when set
    pub stop_words: Option<Vec<String>>,
}

impl SearchConfig {
    pub fn stop_words(&self) -> StopWords {
        match &self.stop_words {
            Some(words) => StopWords::new(words),
            None => StopWords::default(),
        }
    }
}

impl Config {
    /// Load from the default sources, reading `path` instead of `cohortql.toml` when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(p) => ::config::File::from(p).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix("COHORTQL")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("search.stop_words")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<(), String> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "logging.level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.logging.level
            ));
        }
        if !ROTATIONS.contains(&self.logging.file_rotation.as_str()) {
            return Err(format!(
                "logging.file_rotation must be one of {:?}, got '{}'",
                ROTATIONS, self.logging.file_rotation
            ));
        }
        if self.query.id_limit == 0 {
            return Err("query.id_limit must be greater than 0".to_string());
        }
        if self.query.chart_limit == 0 {
            return Err("query.chart_limit must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn schema(&self) -> anyhow::Result<SchemaConfig> {
        let Some(path) = &self.schema_file else {
            return Ok(SchemaConfig::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse schema file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query.linking_cache_capacity, 0);
    }

    #[test]
    fn rejects_unknown_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut config = Config::default();
        config.query.id_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn configured_stop_words_replace_builtin_set() {
        let search = SearchConfig {
            stop_words: Some(vec!["lung".to_string()]),
        };
        let words = search.stop_words();
        assert!(words.contains("LUNG"));
        assert!(!words.contains("the"));
    }
}
