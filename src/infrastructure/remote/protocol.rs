//! Remote Controller Protocol
//!
//! Line-oriented text protocol spoken with the scanning/advertising
//! controller. One command or event per line, lines end with `\r\n`.
//!
//! # Commands (client → controller)
//!
//! ```text
//! store              request the stored-device list
//! store <base64>     replace the stored-device list
//! status             request the current operation status
//! scan <seconds>     start scanning, 0 = until stopped
//! stop               stop scanning or advertising
//! simulate <hex>     advertise the given payload
//! ```
//!
//! # Events (controller → client)
//!
//! ```text
//! new-device <addr> <rssi> <hex...>   hex is the rest of the line, spaces included
//! status <idle|scanning|advertising>
//! stored-devices <base64>
//! ```
//!
//! Anything else (e.g. `ok`, `Command not found: x`) is an unknown event.

use crate::domain::models::{OperationStatus, ScannedDevice, StoredDevice};
use crate::domain::registry;
use crate::error::ProtocolError;
use std::fmt;

pub const LINE_TERMINATOR: &str = "\r\n";

pub const NEW_DEVICE_EVENT: &str = "new-device";
pub const STATUS_EVENT: &str = "status";
pub const STORED_DEVICES_EVENT: &str = "stored-devices";

/// Commands sent to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Ask for the stored-device list
    LoadStored,
    /// Replace the stored-device list (already base64 encoded)
    SaveStored(String),
    /// Ask for the current status
    Status,
    /// Scan for the given number of seconds, 0 = indefinitely
    Scan(u64),
    /// Stop the current operation
    Stop,
    /// Advertise a raw hex payload
    Simulate(String),
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadStored => f.write_str("store"),
            Self::SaveStored(payload) => write!(f, "store {}", payload),
            Self::Status => f.write_str("status"),
            Self::Scan(seconds) => write!(f, "scan {}", seconds),
            Self::Stop => f.write_str("stop"),
            Self::Simulate(data) => write!(f, "simulate {}", data),
        }
    }
}

/// Frame a command for the wire.
pub fn encode_line(command: &ClientCommand) -> String {
    format!("{}{}", command, LINE_TERMINATOR)
}

/// Split a received frame into lines. A frame without terminator is one line.
pub fn split_frame(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

/// Events reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    NewDevice(ScannedDevice),
    Status(OperationStatus),
    StoredDevices(Vec<StoredDevice>),
    /// Any line whose first token is not a known event
    Unknown(String),
}

impl ServerEvent {
    /// Parse one inbound line.
    ///
    /// Total over arbitrary input: unknown lines become [`ServerEvent::Unknown`],
    /// known events with bad contents become a [`ProtocolError`].
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (kind, rest) = line.split_once(' ').unwrap_or((line, ""));

        match kind {
            NEW_DEVICE_EVENT => parse_new_device(rest),
            STATUS_EVENT => {
                let word = first_token(rest).ok_or(ProtocolError::MissingField {
                    event: STATUS_EVENT,
                    field: "status",
                })?;
                word.parse::<OperationStatus>()
                    .map(Self::Status)
                    .map_err(ProtocolError::UnknownStatus)
            }
            STORED_DEVICES_EVENT => {
                let payload = first_token(rest).ok_or(ProtocolError::MissingField {
                    event: STORED_DEVICES_EVENT,
                    field: "payload",
                })?;
                let devices = registry::decode_stored_devices(payload)?;
                Ok(Self::StoredDevices(devices))
            }
            _ => Ok(Self::Unknown(line.to_string())),
        }
    }
}

fn parse_new_device(rest: &str) -> Result<ServerEvent, ProtocolError> {
    let mut fields = rest.splitn(3, ' ');
    let addr = fields
        .next()
        .filter(|addr| !addr.is_empty())
        .ok_or(ProtocolError::MissingField {
            event: NEW_DEVICE_EVENT,
            field: "address",
        })?;
    let rssi = fields.next().ok_or(ProtocolError::MissingField {
        event: NEW_DEVICE_EVENT,
        field: "signal strength",
    })?;
    let rssi = rssi
        .parse::<i32>()
        .map_err(|_| ProtocolError::InvalidRssi(rssi.to_string()))?;
    let data = fields.next().unwrap_or_default();

    Ok(ServerEvent::NewDevice(ScannedDevice {
        addr: addr.to_string(),
        rssi,
        data: data.to_string(),
    }))
}

fn first_token(rest: &str) -> Option<&str> {
    rest.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn test_command_lines() {
        assert_eq!(encode_line(&ClientCommand::LoadStored), "store\r\n");
        assert_eq!(encode_line(&ClientCommand::Scan(0)), "scan 0\r\n");
        assert_eq!(
            encode_line(&ClientCommand::SaveStored("W10=".into())),
            "store W10=\r\n"
        );
        assert_eq!(
            encode_line(&ClientCommand::Simulate("0201061aff".into())),
            "simulate 0201061aff\r\n"
        );
    }

    #[test]
    fn test_new_device_keeps_rest_of_line() {
        let event = ServerEvent::parse("new-device 11:22:33:44:55:66 -67 0201 06 1aff").unwrap();
        assert_eq!(
            event,
            ServerEvent::NewDevice(ScannedDevice {
                addr: "11:22:33:44:55:66".into(),
                rssi: -67,
                data: "0201 06 1aff".into(),
            })
        );
    }

    #[test]
    fn test_new_device_without_data() {
        let event = ServerEvent::parse("new-device aa -40").unwrap();
        assert!(matches!(event, ServerEvent::NewDevice(d) if d.data.is_empty()));
    }

    #[test]
    fn test_malformed_new_device() {
        assert!(matches!(
            ServerEvent::parse("new-device aa loud 0201"),
            Err(ProtocolError::InvalidRssi(_))
        ));
        assert!(matches!(
            ServerEvent::parse("new-device"),
            Err(ProtocolError::MissingField { .. })
        ));
    }

    #[test]
    fn test_status_events() {
        assert_eq!(
            ServerEvent::parse("status advertising").unwrap(),
            ServerEvent::Status(OperationStatus::Advertising)
        );
        assert!(matches!(
            ServerEvent::parse("status sleeping"),
            Err(ProtocolError::UnknownStatus(s)) if s == "sleeping"
        ));
        assert!(ServerEvent::parse("status").is_err());
    }

    #[test]
    fn test_stored_devices_payload() {
        let devices = vec![StoredDevice {
            addr: "aa".into(),
            rssi: -50,
            data: "020106".into(),
            alias: "tag".into(),
        }];
        let payload = registry::encode_stored_devices(&devices).unwrap();
        let line = format!("stored-devices {}", payload);
        assert_eq!(
            ServerEvent::parse(&line).unwrap(),
            ServerEvent::StoredDevices(devices)
        );

        assert!(matches!(
            ServerEvent::parse("stored-devices %%%"),
            Err(ProtocolError::StoredDevices(CodecError::Base64(_)))
        ));
    }

    #[test]
    fn test_unknown_lines_are_not_errors() {
        assert_eq!(
            ServerEvent::parse("ok").unwrap(),
            ServerEvent::Unknown("ok".into())
        );
        // Prefix match alone is not enough
        assert!(matches!(
            ServerEvent::parse("statuses idle").unwrap(),
            ServerEvent::Unknown(_)
        ));
        assert!(matches!(
            ServerEvent::parse("Command not found: fly").unwrap(),
            ServerEvent::Unknown(_)
        ));
    }

    #[test]
    fn test_split_frame() {
        let lines: Vec<_> = split_frame("status idle").collect();
        assert_eq!(lines, ["status idle"]);

        let lines: Vec<_> = split_frame("stored-devices W10=\n").collect();
        assert_eq!(lines, ["stored-devices W10="]);

        let lines: Vec<_> = split_frame("status idle\r\nnew-device aa -1 02\r\n\r\n").collect();
        assert_eq!(lines, ["status idle", "new-device aa -1 02"]);
    }
}
