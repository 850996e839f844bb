//! Typed session state on top of a [`KeyValueStore`].
//!
//! Values are stored as JSON text. Collections that must survive corruption
//! are read through [`SessionStateStore::load_with_backup`], which keeps a
//! mirror of the last good raw value in a `<key>.backup` slot:
//!
//! 1. A successful parse of the primary slot mirrors the raw text to the backup.
//! 2. A missing or unparsable primary falls back to the backup.
//! 3. A successful recovery rewrites the primary from the backup.
//! 4. If neither slot parses, the caller gets `None` and decides the default.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::KeyValueStore;

/// Suffix appended to a key to form its backup slot.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Where a recovered value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Primary slot parsed.
    Primary,
    /// Primary was missing or corrupt; backup parsed and the primary was repaired.
    Backup,
}

/// A value read through the backup discipline.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered<T> {
    /// The parsed value.
    pub value: T,
    /// Slot the value was read from.
    pub source: LoadSource,
}

/// Typed JSON state over an injected key/value backend.
#[derive(Clone)]
pub struct SessionStateStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStateStore {
    /// Wraps a key/value backend.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Name of the backup slot for `key`.
    pub fn backup_key(key: &str) -> String {
        format!("{key}{BACKUP_SUFFIX}")
    }

    /// Serializes `value` as JSON into `key`.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.backend.set(key, &json)
    }

    /// Reads and deserializes `key`. Returns `Ok(None)` if the slot is empty.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Reads a boolean flag, treating missing or unparsable values as `default`.
    pub fn load_flag(&self, key: &str, default: bool) -> bool {
        match self.backend.get(key) {
            Ok(Some(raw)) => match raw.trim() {
                "true" => true,
                "false" => false,
                other => {
                    warn!(key, value = other, "ignoring unparsable flag");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "failed to read flag");
                default
            }
        }
    }

    /// Writes a boolean flag as `true`/`false`.
    pub fn save_flag(&self, key: &str, value: bool) -> Result<()> {
        self.backend.set(key, if value { "true" } else { "false" })
    }

    /// Reads `key` with backup fallback and self-healing.
    ///
    /// `parse` turns the raw slot text into a value; an `Err` marks the slot
    /// as corrupt. Backend read failures are treated the same way as corrupt
    /// data, since the point of this method is to never fail the caller.
    pub fn load_with_backup<T, E, F>(&self, key: &str, parse: F) -> Option<Recovered<T>>
    where
        F: Fn(&str) -> std::result::Result<T, E>,
        E: std::fmt::Display,
    {
        let backup_key = Self::backup_key(key);

        match self.backend.get(key) {
            Ok(Some(raw)) => match parse(&raw) {
                Ok(value) => {
                    if let Err(e) = self.backend.set(&backup_key, &raw) {
                        warn!(key, error = %e, "failed to mirror primary slot to backup");
                    }
                    debug!(key, "loaded primary slot");
                    return Some(Recovered {
                        value,
                        source: LoadSource::Primary,
                    });
                }
                Err(e) => warn!(key, error = %e, "primary slot is corrupt, trying backup"),
            },
            Ok(None) => debug!(key, "primary slot empty, trying backup"),
            Err(e) => warn!(key, error = %e, "failed to read primary slot, trying backup"),
        }

        let raw = match self.backend.get(&backup_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %backup_key, error = %e, "failed to read backup slot");
                return None;
            }
        };

        match parse(&raw) {
            Ok(value) => {
                match self.backend.set(key, &raw) {
                    Ok(()) => info!(key, "restored primary slot from backup"),
                    Err(e) => warn!(key, error = %e, "failed to repair primary slot"),
                }
                Some(Recovered {
                    value,
                    source: LoadSource::Backup,
                })
            }
            Err(e) => {
                warn!(key = %backup_key, error = %e, "backup slot is corrupt too");
                None
            }
        }
    }

    /// Deletes `key` and its backup slot.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend.remove(key)?;
        self.backend.remove(&Self::backup_key(key))
    }

    /// Deletes every key in `keys` along with their backup slots.
    pub fn clear(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        debug!(count = keys.len(), "cleared session state");
        Ok(())
    }
}
