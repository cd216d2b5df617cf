//! Configuration for the metadata service and backend selection.

use std::path::Path as FsPath;
use std::time::Duration;

use agro_logging::LogConfig;
use agro_types::{Status, StatusCode};
use serde::{Deserialize, Serialize};

/// Tuning knobs shared by every backend (the `[meta]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Upper bound on one operation, retries included.
    pub operation_timeout_ms: u64,

    /// Maximum transaction retries after a conflict.
    pub max_retries: u32,

    /// Initial retry wait time.
    pub retry_init_wait_ms: u64,

    /// Maximum retry wait time.
    pub retry_max_wait_ms: u64,

    /// Maximum directory depth.
    pub max_directory_depth: usize,

    /// Keys fetched per range request while listing.
    pub list_limit: i32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
            max_retries: 16,
            retry_init_wait_ms: 5,
            retry_max_wait_ms: 500,
            max_directory_depth: 64,
            list_limit: 128,
        }
    }
}

impl MetadataConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn retry_init_wait(&self) -> Duration {
        Duration::from_millis(self.retry_init_wait_ms)
    }

    pub fn retry_max_wait(&self) -> Duration {
        Duration::from_millis(self.retry_max_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::invalid("meta.operation_timeout_ms must be positive"));
        }
        if self.retry_init_wait_ms > self.retry_max_wait_ms {
            return Err(ConfigError::invalid(
                "meta.retry_init_wait_ms exceeds meta.retry_max_wait_ms",
            ));
        }
        // Depth is encoded as four hex digits in directory keys.
        if self.max_directory_depth == 0 || self.max_directory_depth >= 0xffff {
            return Err(ConfigError::invalid(
                "meta.max_directory_depth must be in 1..65535",
            ));
        }
        if self.list_limit <= 0 {
            return Err(ConfigError::invalid("meta.list_limit must be positive"));
        }
        Ok(())
    }
}

/// A complete config file: which backend to build and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name the backend was registered under.
    pub backend: String,

    #[serde(default)]
    pub meta: MetadataConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Backend-specific settings (addresses, data directory, ...), opaque to
    /// the service layer.
    #[serde(default)]
    pub backend_options: toml::Table,
}

impl BackendConfig {
    /// Config selecting `backend` with default settings.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            meta: MetadataConfig::default(),
            log: LogConfig::default(),
            backend_options: toml::Table::new(),
        }
    }

    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = text.parse()?;
        tracing::debug!(path = %path.display(), backend = %config.backend, "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.is_empty() {
            return Err(ConfigError::invalid("backend name is empty"));
        }
        self.meta.validate()
    }
}

impl std::str::FromStr for BackendConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

impl From<ConfigError> for Status {
    fn from(e: ConfigError) -> Self {
        let code = match e {
            ConfigError::Parse(_) => StatusCode::CONFIG_PARSE_ERROR,
            ConfigError::Io { .. } | ConfigError::Invalid(_) => StatusCode::INVALID_CONFIG,
        };
        Status::with_message(code, e.to_string())
    }
}
