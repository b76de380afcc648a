//! Loader configuration

use crate::cache::DEFAULT_REFRESH_HOUR;
use crate::error::{LoaderError, Result};
use crate::scheduler::DEFAULT_MAX_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Data loader configuration
///
/// In YAML, durations are written in milliseconds:
///
/// ```yaml
/// base_url: "http://localhost:8080"
/// endpoint: "api/query"
/// timeout_ms: 300000
/// max_concurrency: 6
/// max_retries: 1
/// retry_backoff_ms: 1000
/// refresh_hour: 8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base URL of the query service
    pub base_url: String,
    /// Path of the query endpoint, relative to `base_url`
    pub endpoint: String,
    /// Deadline for a single network call
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Maximum number of outstanding network calls
    pub max_concurrency: usize,
    /// Retries after a transient failure
    pub max_retries: u32,
    /// Pause before each retry
    #[serde(rename = "retry_backoff_ms", with = "duration_ms")]
    pub retry_backoff: Duration,
    /// Refresh hour used until one is persisted
    pub refresh_hour: u8,
    /// Prefix of persisted cache entries
    pub namespace: String,
    /// Key of the persisted cache configuration record
    pub config_key: String,
    pub cache_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            endpoint: "api/query".to_string(),
            timeout: Duration::from_secs(300),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: 1,
            retry_backoff: Duration::from_secs(1),
            refresh_hour: DEFAULT_REFRESH_HOUR,
            namespace: "dayload:cache:".to_string(),
            config_key: "dayload:config".to_string(),
            cache_enabled: true,
        }
    }
}

impl LoaderConfig {
    /// Create a new configuration with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_refresh_hour(mut self, hour: u8) -> Self {
        self.refresh_hour = hour;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: LoaderConfig =
            serde_yaml::from_str(content).map_err(|e| LoaderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(LoaderError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.refresh_hour > 23 {
            return Err(LoaderError::Config(format!(
                "refresh_hour must be within 0..=23, got {}",
                self.refresh_hour
            )));
        }
        if self.namespace.is_empty() {
            return Err(LoaderError::Config("namespace must not be empty".to_string()));
        }
        if self.config_key.starts_with(&self.namespace) {
            return Err(LoaderError::Config(
                "config_key must live outside the cache namespace".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute URL of the query endpoint
    pub fn endpoint_url(&self) -> Result<Url> {
        let mut base = Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(self.endpoint.trim_start_matches('/'))?)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
