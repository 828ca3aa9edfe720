//! Configuration loading for the search indexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/search-indexer/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::delay::{DelayPolicy, DEFAULT_ERROR_MS, DEFAULT_IDLE_MS, DEFAULT_NORMAL_MS};
use crate::error::TypesError;

/// Pass pacing as written in config files (signed, validated on use).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySettings {
    #[serde(default = "default_normal_ms")]
    pub normal_ms: i64,

    #[serde(default = "default_idle_ms")]
    pub idle_ms: i64,

    #[serde(default = "default_error_ms")]
    pub error_ms: i64,
}

fn default_normal_ms() -> i64 {
    DEFAULT_NORMAL_MS as i64
}

fn default_idle_ms() -> i64 {
    DEFAULT_IDLE_MS as i64
}

fn default_error_ms() -> i64 {
    DEFAULT_ERROR_MS as i64
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            normal_ms: default_normal_ms(),
            idle_ms: default_idle_ms(),
            error_ms: default_error_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the tantivy index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Waits between indexing passes
    #[serde(default)]
    pub delays: DelaySettings,

    /// Generations kept per caching filter
    #[serde(default = "default_filter_cache_capacity")]
    pub filter_cache_capacity: usize,

    /// JSON-lines file consumed by the bundled source routine
    #[serde(default)]
    pub source_path: Option<String>,

    /// Maximum source records consumed per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "search-indexer")
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./index"))
        .to_string_lossy()
        .to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_filter_cache_capacity() -> usize {
    4
}

fn default_batch_size() -> usize {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            writer_memory_mb: default_writer_memory_mb(),
            log_level: default_log_level(),
            delays: DelaySettings::default(),
            filter_cache_capacity: default_filter_cache_capacity(),
            source_path: None,
            batch_size: default_batch_size(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/search-indexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (INDEXER_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "search-indexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_path", default_index_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("delays.normal_ms", default_normal_ms())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("delays.idle_ms", default_idle_ms())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("delays.error_ms", default_error_ms())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("filter_cache_capacity", default_filter_cache_capacity() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: INDEXER_INDEX_PATH, INDEXER_DELAYS__IDLE_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("INDEXER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that serde cannot express.
    pub fn validate(&self) -> Result<(), TypesError> {
        self.delay_policy()?;
        if self.writer_memory_mb == 0 {
            return Err(TypesError::Config("writer_memory_mb must be > 0".to_string()));
        }
        if self.filter_cache_capacity == 0 {
            return Err(TypesError::Config(
                "filter_cache_capacity must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TypesError::Config("batch_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// The configured delays as a validated policy.
    pub fn delay_policy(&self) -> Result<DelayPolicy, TypesError> {
        DelayPolicy::of(
            self.delays.normal_ms,
            self.delays.idle_ms,
            self.delays.error_ms,
        )
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.writer_memory_mb, 50);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.filter_cache_capacity, 4);
        assert!(settings.source_path.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_delay_policy() {
        let settings = Settings::default();
        assert_eq!(settings.delay_policy().unwrap(), DelayPolicy::default());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut settings = Settings::default();
        settings.delays.error_ms = -10;
        assert!(matches!(
            settings.delay_policy(),
            Err(TypesError::InvalidArgument(_))
        ));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("indexer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "index_path = \"/tmp/idx\"").unwrap();
        writeln!(file, "batch_size = 25").unwrap();
        writeln!(file, "[delays]").unwrap();
        writeln!(file, "idle_ms = 1500").unwrap();
        drop(file);

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.index_path, "/tmp/idx");
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.delays.idle_ms, 1500);
        assert_eq!(settings.delays.error_ms, DEFAULT_ERROR_MS as i64);
    }

    #[test]
    fn test_missing_cli_config_is_error() {
        let result = Settings::load(Some("/nonexistent/indexer-config"));
        assert!(matches!(result, Err(TypesError::Config(_))));
    }

    #[test]
    fn test_expanded_index_path_plain() {
        let settings = Settings {
            index_path: "/var/lib/indexer".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_index_path(), PathBuf::from("/var/lib/indexer"));
    }
}
