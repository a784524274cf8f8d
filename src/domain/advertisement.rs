//! Advertising Data Decoder
//!
//! Extracts the manufacturer identity from a raw BLE advertising payload.
//!
//! # Payload Structure
//!
//! ```text
//! [len][type][payload ...][len][type][payload ...] ...
//!
//! len     : number of bytes that follow, type byte included
//! type    : AD type, 0xFF = Manufacturer Specific Data
//! payload : for 0xFF, starts with the 16-bit company id (little-endian)
//! ```

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// AD type of a Manufacturer Specific Data structure
pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;

/// Shown when no manufacturer can be determined
pub const UNKNOWN_MANUFACTURER: &str = "N/A";

/// Company id → display name, loaded once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ManufacturerTable {
    names: HashMap<u16, String>,
}

impl ManufacturerTable {
    /// Parse a JSON object keyed by decimal company id, e.g. `{"76": "Apple, Inc."}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let names: HashMap<u16, String> = serde_json::from_str(json)?;
        Ok(Self { names })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read manufacturer table {}", path.display()))?;
        let table = Self::from_json(&contents)
            .with_context(|| format!("Invalid manufacturer table {}", path.display()))?;
        Ok(table)
    }

    pub fn name(&self, company_id: u16) -> Option<&str> {
        self.names.get(&company_id).map(String::as_str)
    }

    /// Manufacturer name for a hex payload, or [`UNKNOWN_MANUFACTURER`].
    pub fn manufacturer_name(&self, hex_data: &str) -> &str {
        company_id(hex_data)
            .and_then(|id| self.name(id))
            .unwrap_or(UNKNOWN_MANUFACTURER)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(u16, String)> for ManufacturerTable {
    fn from_iter<I: IntoIterator<Item = (u16, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Find the company id of the first Manufacturer Specific Data structure.
///
/// Never fails: invalid hex, truncated structures and oversized lengths all
/// yield `None`.
pub fn company_id(hex_data: &str) -> Option<u16> {
    let bytes = decode_hex(hex_data)?;
    let mut rest: &[u8] = &bytes;

    while let [length, ad_type, payload @ ..] = rest {
        // A zero length terminates the significant part of the payload
        if *length == 0 {
            return None;
        }

        if *ad_type == MANUFACTURER_SPECIFIC_DATA {
            return match payload {
                [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
                _ => None,
            };
        }

        let skip = usize::from(*length) - 1;
        rest = payload.get(skip..).unwrap_or(&[]);
    }

    None
}

/// Decode a hex string, ignoring any ASCII whitespace between digits.
pub fn decode_hex(hex_data: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = hex_data
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return None;
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}
