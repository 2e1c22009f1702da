use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::offline::{RetryPolicy, SchedulerSettings};
use crate::storage::FileKvStore;

pub const ENV_DATA_DIR: &str = "FIELDKIT_DATA_DIR";
pub const ENV_REMOTE_URL: &str = "FIELDKIT_REMOTE_URL";
pub const ENV_API_TOKEN: &str = "FIELDKIT_API_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Remote document store and media service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Document gateway base URL (e.g., "https://api.example.com/v1")
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Media upload service base URL; media sync is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            api_token: None,
            timeout_secs: 60,
            media_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Transient failures before a mutation is dead-lettered (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    pub poll_interval_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: None,
            poll_interval_secs: 30,
            max_backoff_secs: 300,
        }
    }
}

/// Top-level configuration, read from `<config_dir>/fieldkit/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldkitConfig {
    /// Where queue state is kept (platform data dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
}

impl FieldkitConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fieldkit").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    /// Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                log::debug!("Loading config from {:?}", path);
                Self::from_toml_str(&std::fs::read_to_string(&path)?)?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `FIELDKIT_*` overrides; empty values are ignored
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_REMOTE_URL) {
            self.remote.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.remote.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in std::iter::once(&self.remote.base_url).chain(self.remote.media_url.as_ref()) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "URL must start with http:// or https://: {}",
                    url
                )));
            }
        }
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::Invalid("remote.timeoutSecs must be positive".to_string()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("sync.pollIntervalSecs must be positive".to_string()));
        }
        if self.sync.max_backoff_secs < self.sync.poll_interval_secs {
            return Err(ConfigError::Invalid(
                "sync.maxBackoffSecs must not be below sync.pollIntervalSecs".to_string(),
            ));
        }
        if self.sync.max_attempts == Some(0) {
            return Err(ConfigError::Invalid("sync.maxAttempts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => FileKvStore::default_data_dir()
                .map_err(|e| ConfigError::Invalid(format!("no data directory: {}", e))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync.max_attempts,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs),
            max_backoff: Duration::from_secs(self.sync.max_backoff_secs),
        }
    }
}
