use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Schema version written into both cache files. Bump when the layout
/// changes so old files are rejected instead of silently misread.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Sentinel key and value recording that an event had no photo, so later
/// runs skip the lookup without a network call.
pub const NO_PHOTO: &str = "<no photo>";

/// A previously submitted event: the destination id it was created under
/// and its start instant, used for retention cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEvent {
    pub destination_id: i64,
    pub start: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct KnownEventsFile {
    version: u32,
    events: HashMap<String, KnownEvent>,
}

/// Persistent mapping of source event ids to previously created destination
/// events. Loaded once at run start and stored once at run end.
#[derive(Debug)]
pub struct KnownEventsCache {
    path: PathBuf,
    events: HashMap<String, KnownEvent>,
}

impl KnownEventsCache {
    /// Load the cache, or start empty when no file exists yet.
    pub fn load(path: &Path) -> Result<Self> {
        let events = if path.exists() {
            let file: KnownEventsFile = read_versioned(path)?;
            file.events
        } else {
            debug!(path = %path.display(), "no known-events cache file; starting empty");
            HashMap::new()
        };
        Ok(KnownEventsCache {
            path: path.to_path_buf(),
            events,
        })
    }

    pub fn store(&self) -> Result<()> {
        let file = KnownEventsFile {
            version: CACHE_SCHEMA_VERSION,
            events: self.events.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        info!(path = %self.path.display(), entries = self.events.len(), "stored known-events cache");
        Ok(())
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.events.contains_key(source_id)
    }

    pub fn insert(&mut self, source_id: String, known: KnownEvent) {
        self.events.insert(source_id, known);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand the mapping to the reconciliation pass.
    pub fn take_events(&mut self) -> HashMap<String, KnownEvent> {
        std::mem::take(&mut self.events)
    }

    /// Install the reconciled mapping.
    pub fn replace_events(&mut self, events: HashMap<String, KnownEvent>) {
        self.events = events;
    }
}

#[derive(Serialize, Deserialize)]
struct PhotoUrlFile {
    version: u32,
    urls_to_paths: HashMap<String, String>,
}

/// Persistent mapping of source photo URLs to destination photo paths,
/// including the no-photo sentinel entry.
#[derive(Debug)]
pub struct PhotoUrlCache {
    path: PathBuf,
    urls_to_paths: HashMap<String, String>,
}

impl PhotoUrlCache {
    pub fn load(path: &Path) -> Result<Self> {
        let urls_to_paths = if path.exists() {
            let file: PhotoUrlFile = read_versioned(path)?;
            file.urls_to_paths
        } else {
            debug!(path = %path.display(), "no photo-URL cache file; starting empty");
            HashMap::from([(NO_PHOTO.to_string(), NO_PHOTO.to_string())])
        };
        Ok(PhotoUrlCache {
            path: path.to_path_buf(),
            urls_to_paths,
        })
    }

    pub fn store(&self) -> Result<()> {
        let file = PhotoUrlFile {
            version: CACHE_SCHEMA_VERSION,
            urls_to_paths: self.urls_to_paths.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        info!(path = %self.path.display(), entries = self.urls_to_paths.len(), "stored photo-URL cache");
        Ok(())
    }

    /// Look up a photo URL; `None` for the no-photo sentinel. An outer
    /// `None` means the URL has never been seen.
    pub fn get(&self, photo_url: Option<&str>) -> Option<Option<String>> {
        let key = photo_url.unwrap_or(NO_PHOTO);
        self.urls_to_paths.get(key).map(|path| {
            if path == NO_PHOTO {
                None
            } else {
                Some(path.clone())
            }
        })
    }

    pub fn insert(&mut self, photo_url: String, destination_path: String) {
        self.urls_to_paths.insert(photo_url, destination_path);
    }
}

fn read_versioned<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = fs::read_to_string(path)?;
    let header: serde_json::Value =
        serde_json::from_str(&content).map_err(|err| SyncError::CacheSchema {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
    match header.get("version").and_then(|v| v.as_u64()) {
        Some(version) if version == CACHE_SCHEMA_VERSION as u64 => {}
        Some(version) => {
            return Err(SyncError::CacheSchema {
                path: path.display().to_string(),
                message: format!(
                    "version {version} is not the supported version {CACHE_SCHEMA_VERSION}"
                ),
            })
        }
        None => {
            return Err(SyncError::CacheSchema {
                path: path.display().to_string(),
                message: "missing version field".to_string(),
            })
        }
    }
    serde_json::from_str(&content).map_err(|err| SyncError::CacheSchema {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}
