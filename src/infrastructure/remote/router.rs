//! Protocol Message Router
//!
//! Turns each inbound line into a [`ServerEvent`] and applies it to the
//! session state. Lines are handled strictly one at a time, in arrival order.

use crate::domain::models::{AppEvent, MessageSeverity};
use crate::infrastructure::remote::protocol::ServerEvent;
use crate::infrastructure::remote::service::RemoteSession;
use tracing::{debug, info, warn};

impl RemoteSession {
    /// Parse and apply one line. Malformed lines leave the state untouched.
    pub fn handle_line(&mut self, line: &str) {
        debug!("<- {}", line);
        match ServerEvent::parse(line) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                warn!("Ignoring malformed message {:?}: {}", truncate(line), e);
                self.log(format!("Malformed message: {}", e), MessageSeverity::Warning);
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewDevice(device) => {
                self.registry.upsert_scanned(device);
                self.persist_scanned_snapshot();
                self.notify(AppEvent::ScannedDevicesChanged);
            }
            ServerEvent::Status(status) => {
                if self.operation.apply_status(status) {
                    info!("Controller status: {}", status);
                }
                self.notify(AppEvent::OperationStatus(status));
            }
            ServerEvent::StoredDevices(devices) => {
                info!("Received {} stored devices", devices.len());
                self.registry.replace_stored(devices);
                self.notify(AppEvent::StoredDevicesChanged);
            }
            ServerEvent::Unknown(line) => debug!("Unhandled message: {}", line),
        }
    }
}

// Stored-device payloads can be long
fn truncate(line: &str) -> &str {
    match line.char_indices().nth(80) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}
