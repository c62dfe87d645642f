//! JSON-file preference store
//!
//! The whole map is rewritten on every put, mirroring how a flash key/value
//! store commits each write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cornhole_node::{bounded, PreferenceStore, StoreError, Text};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Preference store persisted as one JSON object
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    values: BTreeMap<String, StoredValue>,
}

impl JsonStore {
    /// Open `path`, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened store {} ({} keys)", path.display(), values.len());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let write = || -> Result<(), HostError> {
            if let Some(dir) = self.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let text = serde_json::to_string_pretty(&self.values)?;
            std::fs::write(&self.path, text)?;
            Ok(())
        };
        write().map_err(|e| {
            warn!("Writing {} failed: {}", self.path.display(), e);
            StoreError::WriteFailed
        })
    }

    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(StoredValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

impl PreferenceStore for JsonStore {
    fn get_str<const N: usize>(&self, key: &str) -> Option<Text<N>> {
        match self.values.get(key) {
            Some(StoredValue::Text(s)) => Some(bounded(s)),
            _ => None,
        }
    }

    fn put_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, StoredValue::Text(value.to_string()))
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_int(key).and_then(|v| i32::try_from(v).ok())
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.put(key, StoredValue::Int(value.into()))
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_int(key).and_then(|v| u32::try_from(v).ok())
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        self.put(key, StoredValue::Int(value.into()))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(StoredValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, StoredValue::Bool(value))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.values.clear();
        self.flush()
    }
}
