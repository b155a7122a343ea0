//! Persisted key-value state.
//!
//! Two keys are stored: `location` (the selected region) and
//! `notificationTime` (when the daily reminder fires). Both are optional;
//! absence is the normal first-run state. Read failures fall back to
//! defaults, write failures propagate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{NotificationTime, SelectedLocation, validate_coordinates};

pub const LOCATION_KEY: &str = "location";
pub const NOTIFICATION_TIME_KEY: &str = "notificationTime";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read '{key}' from {path}: {source}")]
    Read {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write '{key}' to {path}: {source}")]
    Write {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode '{key}': {message}")]
    Encode { key: String, message: String },
}

/// One JSON document per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(payload) => Ok(Some(payload)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                path,
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        write_atomic(&path, value.as_bytes()).map_err(|source| StorageError::Write {
            key: key.to_string(),
            path,
            source,
        })
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.path_for(key);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StorageError::Write {
                        key: key.to_string(),
                        path,
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "state path must have a parent directory",
        )
    })?;
    fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    if let Err(error) = fs::write(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct TimeRecord {
    hour: u32,
    minute: u32,
    #[serde(default)]
    timestamp: i64,
}

/// Typed access to the two persisted keys.
#[derive(Debug, Clone)]
pub struct Preferences<S> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// `None` means no region has been chosen yet and the caller should
    /// prompt for one. Unreadable or corrupt state reads as `None`.
    pub fn load_location(&self) -> Option<SelectedLocation> {
        let raw = self.read_or_default(LOCATION_KEY)?;
        match serde_json::from_str::<SelectedLocation>(&raw) {
            Ok(location) if validate_coordinates(location.latitude, location.longitude).is_ok() => {
                Some(location)
            }
            Ok(location) => {
                tracing::warn!(
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "stored location out of range, ignoring"
                );
                None
            }
            Err(error) => {
                tracing::warn!(%error, "stored location is corrupt, ignoring");
                None
            }
        }
    }

    pub fn save_location(&self, location: &SelectedLocation) -> Result<(), StorageError> {
        let payload = encode(LOCATION_KEY, location)?;
        self.store.set(LOCATION_KEY, &payload)?;
        tracing::info!(name = %location.name, "location saved");
        Ok(())
    }

    /// Falls back to 08:00 when nothing usable is stored.
    pub fn load_notification_time(&self) -> NotificationTime {
        let Some(raw) = self.read_or_default(NOTIFICATION_TIME_KEY) else {
            return NotificationTime::default();
        };

        let parsed = serde_json::from_str::<TimeRecord>(&raw)
            .map_err(|error| error.to_string())
            .and_then(|record| {
                NotificationTime::new(record.hour, record.minute).map_err(|error| error.to_string())
            });

        match parsed {
            Ok(time) => time,
            Err(error) => {
                tracing::warn!(%error, "stored notification time is unusable, using default");
                NotificationTime::default()
            }
        }
    }

    pub fn save_notification_time(
        &self,
        time: NotificationTime,
        saved_at_ms: i64,
    ) -> Result<(), StorageError> {
        let record = TimeRecord {
            hour: u32::from(time.hour()),
            minute: u32::from(time.minute()),
            timestamp: saved_at_ms,
        };
        let payload = encode(NOTIFICATION_TIME_KEY, &record)?;
        self.store.set(NOTIFICATION_TIME_KEY, &payload)?;
        tracing::info!(time = %time, "notification time saved");
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.store.remove(&[LOCATION_KEY, NOTIFICATION_TIME_KEY])?;
        tracing::info!("all stored preferences cleared");
        Ok(())
    }

    fn read_or_default(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, "failed to read stored value, using default");
                None
            }
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|error| StorageError::Encode {
        key: key.to_string(),
        message: error.to_string(),
    })
}
