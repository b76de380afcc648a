use anyhow::{Context, Result};
use dayload::{FileStoreConfig, LoaderConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration file
///
/// ```yaml
/// loader:
///   base_url: "http://localhost:8080"
///   max_concurrency: 6
/// logging:
///   level: "info"
/// storage:
///   path: "./data/dayload"
///   max_bytes: 5242880
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub loader: LoaderConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let defaults = FileStoreConfig::default();
        Self {
            path: defaults.directory,
            max_bytes: defaults.max_bytes,
        }
    }
}

impl CliConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CliConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.loader.validate()?;
        Ok(config)
    }

    pub fn file_store_config(&self) -> FileStoreConfig {
        FileStoreConfig {
            directory: self.storage.path.clone(),
            max_bytes: self.storage.max_bytes,
        }
    }
}
