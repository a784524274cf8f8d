//! Console commands and table rendering.

use crate::domain::advertisement::ManufacturerTable;
use crate::domain::models::{ScannedDevice, StoredDevice};
use crate::domain::registry::ScannedMap;
use crate::error::CommandParseError;
use std::fmt::Write as _;

pub const HELP: &str = "\
Commands:
  connect [host:port]      connect (defaults to the last server)
  disconnect               close the connection
  scan [seconds]           start scanning, 0 = until stopped
  stop                     stop scanning or advertising
  simulate <n>             advertise stored device n
  store <addr> <alias>     keep a scanned device under an alias
  rename <n> <alias>       change the alias of stored device n
  delete <n>               remove stored device n
  load | save              fetch / push the stored device list
  clear                    forget all scanned devices
  devices [filter]         list scanned devices
  stored                   list stored devices
  status                   ask the controller for its status
  theme                    toggle light / dark colours
  help                     show this text
  quit                     leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Connect(Option<String>),
    Disconnect,
    Scan(Option<u64>),
    Stop,
    /// Positions are zero-based here, one-based on screen
    Simulate(usize),
    Store { addr: String, alias: String },
    Rename { index: usize, alias: String },
    Delete(usize),
    Load,
    Save,
    Clear,
    Devices(Option<String>),
    Stored,
    Status,
    Theme,
    Help,
    Quit,
}

impl UserCommand {
    /// Parse a console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        let command = match name.to_lowercase().as_str() {
            "connect" => Self::Connect(arg),
            "disconnect" => Self::Disconnect,
            "scan" => match arg {
                Some(seconds) => Self::Scan(Some(
                    seconds
                        .parse()
                        .map_err(|_| CommandParseError::Usage("scan [seconds]"))?,
                )),
                None => Self::Scan(None),
            },
            "stop" => Self::Stop,
            "simulate" => Self::Simulate(position(rest, "simulate <n>")?),
            "store" => {
                let (addr, alias) = split_pair(rest).ok_or(CommandParseError::Usage(
                    "store <addr> <alias>",
                ))?;
                Self::Store { addr, alias }
            }
            "rename" => {
                let (index, alias) =
                    split_pair(rest).ok_or(CommandParseError::Usage("rename <n> <alias>"))?;
                Self::Rename {
                    index: position(&index, "rename <n> <alias>")?,
                    alias,
                }
            }
            "delete" => Self::Delete(position(rest, "delete <n>")?),
            "load" => Self::Load,
            "save" => Self::Save,
            "clear" => Self::Clear,
            "devices" | "ls" => Self::Devices(arg),
            "stored" => Self::Stored,
            "status" => Self::Status,
            "theme" => Self::Theme,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn position(text: &str, usage: &'static str) -> Result<usize, CommandParseError> {
    match text.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(CommandParseError::Usage(usage)),
    }
}

fn split_pair(text: &str) -> Option<(String, String)> {
    let (first, second) = text.split_once(char::is_whitespace)?;
    let second = second.trim();
    if second.is_empty() {
        return None;
    }
    Some((first.to_string(), second.to_string()))
}

/// Scanned devices, strongest signal first, optionally filtered by a
/// case-insensitive substring of address, data or manufacturer.
pub fn render_scanned(
    scanned: &ScannedMap,
    manufacturers: &ManufacturerTable,
    filter: Option<&str>,
) -> String {
    let filter = filter.map(str::to_lowercase);
    let mut rows: Vec<(&ScannedDevice, &str)> = scanned
        .values()
        .map(|device| (device, manufacturers.manufacturer_name(&device.data)))
        .filter(|(device, manufacturer)| match &filter {
            Some(query) => [device.addr.as_str(), device.data.as_str(), *manufacturer]
                .iter()
                .any(|field| field.to_lowercase().contains(query.as_str())),
            None => true,
        })
        .collect();
    rows.sort_by(|(a, _), (b, _)| b.rssi.cmp(&a.rssi).then_with(|| a.addr.cmp(&b.addr)));

    let mut out = format!(
        "{:<17}  {:>5}  {:<24}  {}\n",
        "ADDRESS", "RSSI", "MANUFACTURER", "DATA"
    );
    for (device, manufacturer) in &rows {
        let _ = writeln!(
            out,
            "{:<17}  {:>5}  {:<24}  {}",
            device.addr, device.rssi, manufacturer, device.data
        );
    }
    let _ = write!(out, "{} of {} devices", rows.len(), scanned.len());
    out
}

/// Position of the stored entry being advertised.
///
/// Matches on address and payload, so a renamed entry keeps its marker; only
/// the first of several identical entries is reported.
pub fn simulated_position(
    stored: &[StoredDevice],
    simulating: Option<&StoredDevice>,
) -> Option<usize> {
    let target = simulating?;
    stored
        .iter()
        .position(|device| device.addr == target.addr && device.data == target.data)
}

/// Stored devices in list order; `*` marks the one being simulated.
pub fn render_stored(
    stored: &[StoredDevice],
    manufacturers: &ManufacturerTable,
    simulating: Option<&StoredDevice>,
) -> String {
    let mut out = format!(
        "  {:>3}  {:<16}  {:<17}  {:>5}  {:<24}  {}\n",
        "#", "ALIAS", "ADDRESS", "RSSI", "MANUFACTURER", "DATA"
    );
    let simulated = simulated_position(stored, simulating);
    for (index, device) in stored.iter().enumerate() {
        let marker = if simulated == Some(index) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{} {:>3}  {:<16}  {:<17}  {:>5}  {:<24}  {}",
            marker,
            index + 1,
            device.alias,
            device.addr,
            device.rssi,
            manufacturers.manufacturer_name(&device.data),
            device.data
        );
    }
    let _ = write!(out, "{} stored devices", stored.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(entries: &[(&str, i32, &str)]) -> ScannedMap {
        entries
            .iter()
            .map(|(addr, rssi, data)| {
                (
                    addr.to_string(),
                    ScannedDevice {
                        addr: addr.to_string(),
                        rssi: *rssi,
                        data: data.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(UserCommand::parse("  ").unwrap(), None);
        assert_eq!(
            UserCommand::parse("scan 5").unwrap(),
            Some(UserCommand::Scan(Some(5)))
        );
        assert_eq!(
            UserCommand::parse("SCAN").unwrap(),
            Some(UserCommand::Scan(None))
        );
        assert_eq!(
            UserCommand::parse("simulate 1").unwrap(),
            Some(UserCommand::Simulate(0))
        );
        assert_eq!(
            UserCommand::parse("store aa:bb:cc my   desk lamp").unwrap(),
            Some(UserCommand::Store {
                addr: "aa:bb:cc".into(),
                alias: "my   desk lamp".into()
            })
        );
        assert_eq!(
            UserCommand::parse("rename 2 door").unwrap(),
            Some(UserCommand::Rename {
                index: 1,
                alias: "door".into()
            })
        );
        assert_eq!(
            UserCommand::parse("connect 10.0.0.2:55555").unwrap(),
            Some(UserCommand::Connect(Some("10.0.0.2:55555".into())))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            UserCommand::parse("delete 0").unwrap_err(),
            CommandParseError::Usage("delete <n>")
        );
        assert!(UserCommand::parse("store aa").is_err());
        assert!(UserCommand::parse("scan soon").is_err());
        assert_eq!(
            UserCommand::parse("fly").unwrap_err(),
            CommandParseError::Unknown("fly".into())
        );
    }

    #[test]
    fn test_scanned_sorted_by_signal_and_filtered() {
        let table: ManufacturerTable = [(76, "Apple, Inc.".to_string())].into_iter().collect();
        let devices = scanned(&[
            ("aa", -80, "020106"),
            ("bb", -40, "1aff4c000215"),
            ("cc", -60, "020106"),
        ]);

        let out = render_scanned(&devices, &table, None);
        let order: Vec<&str> = out
            .lines()
            .skip(1)
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        assert_eq!(order, ["bb", "cc", "aa", "3"]);

        let out = render_scanned(&devices, &table, Some("apple"));
        assert!(out.contains("Apple, Inc."));
        assert!(out.ends_with("1 of 3 devices"));
    }

    #[test]
    fn test_stored_marks_simulated_device() {
        let stored = vec![
            StoredDevice {
                addr: "aa".into(),
                rssi: -50,
                data: "020106".into(),
                alias: "desk".into(),
            },
            StoredDevice {
                addr: "bb".into(),
                rssi: -70,
                data: "020106".into(),
                alias: "door".into(),
            },
        ];
        let out = render_stored(&stored, &ManufacturerTable::default(), Some(&stored[1]));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[1].starts_with("    1  desk"));
        assert!(lines[2].starts_with("*   2  door"));
        assert!(lines[2].contains("N/A"));
    }

    #[test]
    fn test_marker_follows_renamed_entry_and_stars_once() {
        let simulated = StoredDevice {
            addr: "aa".into(),
            rssi: -50,
            data: "020106".into(),
            alias: "desk".into(),
        };
        let renamed = StoredDevice {
            alias: "office".into(),
            ..simulated.clone()
        };
        let stored = vec![renamed.clone(), renamed];

        assert_eq!(simulated_position(&stored, Some(&simulated)), Some(0));
        assert_eq!(simulated_position(&stored, None), None);

        let out = render_stored(&stored, &ManufacturerTable::default(), Some(&simulated));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[1].starts_with("*   1  office"));
        assert!(lines[2].starts_with("    2  office"));
    }
}
