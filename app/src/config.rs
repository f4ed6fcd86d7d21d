use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use modeldock_transport::{RetryPolicy, TransportConfig};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::TransferSettings;

/// Overrides the models directory regardless of the config file
pub const MODELS_DIR_ENV: &str = "MODELDOCK_MODELS_DIR";

/// Application folder under the platform data directory
const APP_DATA_FOLDER: &str = "LlamaCompose";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no data directory available on this platform")]
    NoDataDir,
    #[error("failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== App Configuration =====

/// App configuration (stored locally)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Where models live; platform data dir + `LlamaCompose/models` when unset
    pub models_dir: Option<PathBuf>,
    /// JSON catalog replacing the built-in model list
    pub catalog_path: Option<PathBuf>,
    pub transport: TransportSettings,
    pub download: DownloadSettings,
}

impl ConfigKey<AppConfig> {
    pub const APP: Self = Self::new("appConfig");
}

impl AppConfig {
    /// Resolve the models directory: env override, then config, then the
    /// platform data directory.
    pub fn resolve_models_dir(&self) -> Result<PathBuf, ConfigError> {
        let from_env = std::env::var_os(MODELS_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self.resolve_models_dir_with(from_env, dirs::data_dir())
    }

    fn resolve_models_dir_with(
        &self,
        from_env: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = from_env.or_else(|| self.models_dir.clone()) {
            return Ok(dir);
        }
        data_dir
            .map(|d| d.join(APP_DATA_FOLDER).join("models"))
            .ok_or(ConfigError::NoDataDir)
    }
}

/// HTTP timeouts and retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    pub connect_timeout_secs: u64,
    /// Maximum idle time between body reads
    pub read_timeout_secs: u64,
    /// Whole-request deadline; unset for multi-GB bodies
    pub total_timeout_secs: Option<u64>,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            total_timeout_secs: None,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl TransportSettings {
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            total_timeout: self.total_timeout_secs.map(Duration::from_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            ..TransportConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadSettings {
    pub chunk_size: usize,
    pub indeterminate_interval_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        let defaults = TransferSettings::default();
        Self {
            chunk_size: defaults.chunk_size,
            indeterminate_interval_ms: defaults.indeterminate_interval.as_millis() as u64,
        }
    }
}

impl DownloadSettings {
    pub fn to_transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            chunk_size: self.chunk_size.max(1),
            indeterminate_interval: Duration::from_millis(self.indeterminate_interval_ms),
        }
    }
}

/// Default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("modeldock").join("config.json"))
}

/// Load the app config, falling back to defaults for a missing key
pub fn load_app_config(store: &impl ConfigStore) -> AppConfig {
    store.get(&ConfigKey::APP).unwrap_or_default()
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Config store backed by a single JSON object on disk, one entry per key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, serde_json::Value>, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(source) => Err(ConfigError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_all(&self, data: &HashMap<String, serde_json::Value>) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, content).map_err(io_err)
    }
}

impl ConfigStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        let mut data = match self.read_all() {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Ignoring unreadable config: {}", e);
                return None;
            }
        };
        data.remove(key.key_name())
            .and_then(|v| match serde_json::from_value(v) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("Ignoring invalid '{}' config: {}", key.key_name(), e);
                    None
                }
            })
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let mut data = self.read_all()?;
        data.insert(key.key_name().to_string(), serde_json::to_value(value)?);
        self.write_all(&data)
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        let mut data = self.read_all()?;
        if data.remove(key.key_name()).is_some() {
            self.write_all(&data)?;
        }
        Ok(())
    }
}
