//! Device Registry
//!
//! Holds the volatile scanned-device map and the user-curated stored-device
//! sequence, together with the codecs used to move them around:
//!
//! - stored devices travel to and from the remote controller as
//!   base64(JSON array)
//! - scanned devices are mirrored into local storage as a JSON object keyed by
//!   address

use crate::domain::models::{ScannedDevice, StoredDevice};
use crate::error::{CodecError, RegistryError};
use base64::{engine::general_purpose, Engine as _};
use std::collections::BTreeMap;

pub type ScannedMap = BTreeMap<String, ScannedDevice>;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    scanned: ScannedMap,
    stored: Vec<StoredDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `device.addr`. Returns `true` on first sighting.
    pub fn upsert_scanned(&mut self, device: ScannedDevice) -> bool {
        self.scanned.insert(device.addr.clone(), device).is_none()
    }

    pub fn scanned(&self) -> &ScannedMap {
        &self.scanned
    }

    pub fn scanned_device(&self, addr: &str) -> Option<&ScannedDevice> {
        self.scanned.get(addr)
    }

    pub fn replace_scanned(&mut self, scanned: ScannedMap) {
        self.scanned = scanned;
    }

    pub fn clear_scanned(&mut self) {
        self.scanned.clear();
    }

    pub fn stored(&self) -> &[StoredDevice] {
        &self.stored
    }

    pub fn stored_device(&self, index: usize) -> Result<&StoredDevice, RegistryError> {
        self.stored.get(index).ok_or(RegistryError::IndexOutOfRange {
            index,
            len: self.stored.len(),
        })
    }

    /// Append a scanned device to the stored sequence under `alias`.
    pub fn promote(
        &mut self,
        device: ScannedDevice,
        alias: &str,
    ) -> Result<&StoredDevice, RegistryError> {
        let alias = checked_alias(alias)?;
        self.stored.push(StoredDevice::from_scanned(device, alias));
        Ok(&self.stored[self.stored.len() - 1])
    }

    pub fn rename(&mut self, index: usize, alias: &str) -> Result<(), RegistryError> {
        let alias = checked_alias(alias)?;
        let len = self.stored.len();
        let device = self
            .stored
            .get_mut(index)
            .ok_or(RegistryError::IndexOutOfRange { index, len })?;
        device.alias = alias.to_string();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<StoredDevice, RegistryError> {
        if index >= self.stored.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: self.stored.len(),
            });
        }
        Ok(self.stored.remove(index))
    }

    /// Replace the whole stored sequence, as received from the remote controller.
    pub fn replace_stored(&mut self, stored: Vec<StoredDevice>) {
        self.stored = stored;
    }
}

fn checked_alias(alias: &str) -> Result<&str, RegistryError> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(RegistryError::EmptyAlias);
    }
    Ok(alias)
}

/// JSON, then standard base64 of its UTF-8 bytes.
pub fn encode_stored_devices(devices: &[StoredDevice]) -> Result<String, CodecError> {
    let json = serde_json::to_string(devices)?;
    Ok(general_purpose::STANDARD.encode(json.as_bytes()))
}

pub fn decode_stored_devices(payload: &str) -> Result<Vec<StoredDevice>, CodecError> {
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    let json = String::from_utf8(bytes)?;
    let devices = serde_json::from_str(&json)?;
    Ok(devices)
}

pub fn encode_snapshot(scanned: &ScannedMap) -> Result<String, CodecError> {
    Ok(serde_json::to_string(scanned)?)
}

pub fn decode_snapshot(snapshot: &str) -> Result<ScannedMap, CodecError> {
    Ok(serde_json::from_str(snapshot)?)
}
