//! Configuration file support for Nutrilook.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/nutrilook/config.toml`.
//! A missing file means defaults; a file that exists must carry a
//! `[database]` section.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[api] api_key`
pub const API_KEY_ENV: &str = "USDA_API_KEY";

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

/// On-disk shape, used to detect missing sections before defaults apply
#[derive(Deserialize)]
struct RawConfig {
    database: Option<DatabaseConfig>,
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    ingest: IngestConfig,
}

/// Database storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// Remote nutrition API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Ingestion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            snapshot_dir: None,
        }
    }
}

// Default value functions
fn default_database_path() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nutrilook").join("nutrients.db")
}

fn default_pool_size() -> u32 {
    4
}

fn default_base_url() -> String {
    "https://api.nal.usda.gov/fdc/v1".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    20
}

fn default_batch_size() -> usize {
    5000
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    ///
    /// Fails with [`Error::Config`] naming the section when `[database]`
    /// is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents, path)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents)?;
        let database = raw.database.ok_or_else(|| {
            Error::Config(format!(
                "Section [database] not found in {}",
                origin.display()
            ))
        })?;
        if database.pool_size == 0 {
            return Err(Error::Config(
                "[database] pool_size must be at least 1".into(),
            ));
        }
        if raw.ingest.batch_size == 0 {
            return Err(Error::Config(
                "[ingest] batch_size must be at least 1".into(),
            ));
        }

        Ok(Self {
            database,
            api: raw.api,
            ingest: raw.ingest,
        })
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("nutrilook").join("config.toml")
    }

    /// API key from the environment or the `[api]` section
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        self.api
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Section [api] has no api_key and {} is not set",
                    API_KEY_ENV
                ))
            })
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
