use crate::error::{Result, SyncError};
use crate::restrictions::RestrictionSpec;
use crate::tagger::TagList;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub photos: PhotoConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub tags: TagConfig,
    #[serde(default)]
    pub restrictions: Vec<RestrictionSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub group_url_name: String,
    pub events_wanted: u32,
    /// Events starting before this instant are never offered again.
    pub earliest_start_time: DateTime<Utc>,
    /// Events starting after this instant wait for a later run.
    pub latest_start_time: DateTime<Utc>,
    #[serde(default)]
    pub skip_event_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DestinationConfig {
    /// Request budget per throttle window.
    pub requests_per_window: usize,
    /// Throttle window length in seconds.
    pub window_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoConfig {
    /// Site-relative directory recorded in event descriptions.
    pub directory: String,
    /// WebDAV base URL uploads are PUT beneath.
    pub upload_base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    pub known_events_path: PathBuf,
    pub photo_urls_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagConfig {
    #[serde(default)]
    pub all_events: TagList,
    #[serde(default)]
    pub codes: HashMap<String, TagList>,
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}

/// Credentials come from the environment (or a .env file), never from the
/// config file.
#[derive(Debug)]
pub struct Secrets {
    pub destination_account_id: String,
    pub destination_api_key: String,
    pub photo_username: String,
    pub photo_password: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Secrets {
            destination_account_id: required_env("APRICOT_ACCOUNT_ID")?,
            destination_api_key: required_env("APRICOT_API_KEY")?,
            photo_username: required_env("PHOTO_USERNAME")?,
            photo_password: required_env("PHOTO_PASSWORD")?,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| SyncError::MissingEnvVar(name.to_string()))
}
