//! Local key/value storage.
//!
//! A flat string → string map persisted as JSON, written through on every
//! change. No schema versioning.

use crate::domain::settings::APP_DIR_NAME;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SERVER_ADDRESS_KEY: &str = "serverAddress";
pub const THEME_KEY: &str = "theme";
pub const DEVICES_KEY: &str = "devices";

#[derive(Debug, Default)]
pub struct LocalStorage {
    items: BTreeMap<String, String>,
    // None keeps everything in memory
    path: Option<PathBuf>,
}

impl LocalStorage {
    /// Open the storage file at `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let items = match Self::read_items(&path) {
            Ok(items) => items,
            Err(e) => {
                if path.exists() {
                    warn!("Ignoring unreadable storage {}: {}", path.display(), e);
                }
                BTreeMap::new()
            }
        };
        Self {
            items,
            path: Some(path),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        path.push(APP_DIR_NAME);
        path.push("storage.json");
        Ok(path)
    }

    fn read_items(path: &Path) -> Result<BTreeMap<String, String>> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn get_item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn set_item(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.items.insert(key.to_string(), value.into());
        self.flush()
    }

    pub fn remove_item(&mut self, key: &str) -> Result<()> {
        if self.items.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.items)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("storage.json");

        let mut storage = LocalStorage::open(path.clone());
        storage.set_item(SERVER_ADDRESS_KEY, "192.168.4.1:55555").unwrap();
        storage.set_item(THEME_KEY, "dark").unwrap();
        storage.remove_item(THEME_KEY).unwrap();

        let reopened = LocalStorage::open(path);
        assert_eq!(
            reopened.get_item(SERVER_ADDRESS_KEY),
            Some("192.168.4.1:55555")
        );
        assert_eq!(reopened.get_item(THEME_KEY), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        let storage = LocalStorage::open(path);
        assert_eq!(storage.get_item(DEVICES_KEY), None);
    }
}
