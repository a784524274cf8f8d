//! Remote Session Module
//!
//! Owns the connection to the controller and everything mirrored from it:
//! both device registries, the operation state and the manufacturer table.
//! All methods run on the single event-loop task, one at a time.

use crate::domain::advertisement::ManufacturerTable;
use crate::domain::models::{
    AppEvent, ConnectionStatus, MessageSeverity, OperationStatus, StatusMessage,
};
use crate::domain::operation::OperationState;
use crate::domain::registry::{self, DeviceRegistry};
use crate::error::{RegistryError, TransportError};
use crate::infrastructure::local_storage::{LocalStorage, DEVICES_KEY, SERVER_ADDRESS_KEY};
use crate::infrastructure::remote::connection::{Connection, ConnectionId, TransportEvent};
use crate::infrastructure::remote::protocol::ClientCommand;
use anyhow::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct RemoteSession {
    pub(super) connection: Option<Connection>,
    next_connection_id: ConnectionId,
    pub(super) registry: DeviceRegistry,
    pub(super) operation: OperationState,
    manufacturers: ManufacturerTable,
    manufacturer_source: Option<PathBuf>,
    manufacturers_requested: bool,
    pub(super) storage: LocalStorage,
    pub(super) event_sender: mpsc::UnboundedSender<AppEvent>,
    transport_sender: mpsc::UnboundedSender<TransportEvent>,
    connect_timeout: Duration,
}

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl RemoteSession {
    pub fn new(
        storage: LocalStorage,
        manufacturer_source: Option<PathBuf>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        transport_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            connection: None,
            next_connection_id: 1,
            registry: DeviceRegistry::new(),
            operation: OperationState::new(),
            manufacturers: ManufacturerTable::default(),
            manufacturer_source,
            manufacturers_requested: false,
            storage,
            event_sender,
            transport_sender,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Connect to `address`, replacing any existing connection.
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        self.disconnect();

        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.notify(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));

        let opened = Connection::open(
            id,
            address,
            self.transport_sender.clone(),
            self.connect_timeout,
        )
        .await;
        match opened {
            Ok(connection) => {
                self.attach(connection);
                Ok(())
            }
            Err(e) => {
                error!("Connection failed: {}", e);
                self.log(format!("Connection failed: {}", e), MessageSeverity::Error);
                self.notify(AppEvent::ConnectionStatus(ConnectionStatus::Error));
                Err(e.into())
            }
        }
    }

    /// Adopt an open connection and run the bootstrap sequence.
    pub(crate) fn attach(&mut self, connection: Connection) {
        let address = connection.address().to_string();
        self.connection = Some(connection);
        self.notify(AppEvent::ConnectionStatus(ConnectionStatus::Connected));

        if let Err(e) = self.storage.set_item(SERVER_ADDRESS_KEY, address.as_str()) {
            warn!("Could not remember server address: {}", e);
        }

        self.load_stored();
        self.request_status();
        self.restore_scanned_snapshot();
        self.load_manufacturers();
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!(connection = connection.id(), "Disconnected from {}", connection.address());
            self.notify(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        }
        self.reset_operation();
    }

    /// The operation state is only meaningful for the connection that reported it.
    fn reset_operation(&mut self) {
        let previous = self.operation.status();
        self.operation = OperationState::new();
        if previous != OperationStatus::Idle {
            self.notify(AppEvent::OperationStatus(OperationStatus::Idle));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    pub fn current_address(&self) -> Option<&str> {
        self.connection.as_ref().map(Connection::address)
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let current = self.connection.as_ref().map(Connection::id);
        match event {
            TransportEvent::Line { connection, line } if Some(connection) == current => {
                self.handle_line(&line);
            }
            TransportEvent::Closed { connection } if Some(connection) == current => {
                self.connection = None;
                self.log("Connection closed", MessageSeverity::Warning);
                self.notify(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
                self.reset_operation();
            }
            stale => debug!("Ignoring event from a replaced connection: {:?}", stale),
        }
    }

    // Commands

    pub fn request_status(&self) {
        self.send(ClientCommand::Status);
    }

    pub fn start_scan(&mut self, seconds: u64, now: Instant) {
        if self.send(ClientCommand::Scan(seconds)) {
            self.operation.arm_scan_timeout(now, seconds);
        }
    }

    pub fn stop(&mut self) {
        if self.send(ClientCommand::Stop) {
            self.operation.cancel_scan_timeout();
        }
    }

    /// Advertise the stored device at `index`.
    pub fn simulate(&mut self, index: usize) -> Result<()> {
        let device = self.registry.stored_device(index)?.clone();
        if self.send(ClientCommand::Simulate(device.data.clone())) {
            info!("Simulating {} ({})", device.alias, device.addr);
            self.operation.begin_simulation(device);
        }
        Ok(())
    }

    /// Store the scanned device `addr` under `alias`, then save.
    pub fn store_device(&mut self, addr: &str, alias: &str) -> Result<()> {
        let device = self
            .registry
            .scanned_device(addr)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDevice(addr.to_string()))?;
        self.registry.promote(device, alias)?;
        self.notify(AppEvent::StoredDevicesChanged);
        self.save_stored();
        Ok(())
    }

    pub fn rename(&mut self, index: usize, alias: &str) -> Result<()> {
        self.registry.rename(index, alias)?;
        self.notify(AppEvent::StoredDevicesChanged);
        self.save_stored();
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<()> {
        let removed = self.registry.remove(index)?;
        debug!("Removed stored device {}", removed.alias);
        self.notify(AppEvent::StoredDevicesChanged);
        self.save_stored();
        Ok(())
    }

    pub fn load_stored(&self) {
        self.send(ClientCommand::LoadStored);
    }

    /// Send the whole stored sequence. Fire-and-forget: success is assumed.
    pub fn save_stored(&self) {
        match registry::encode_stored_devices(self.registry.stored()) {
            Ok(payload) => {
                if self.send(ClientCommand::SaveStored(payload)) {
                    let count = self.registry.stored().len();
                    self.log(format!("Saved {} stored devices", count), MessageSeverity::Info);
                }
            }
            Err(e) => error!("Could not encode stored devices: {}", e),
        }
    }

    pub fn clear_scanned(&mut self) {
        self.registry.clear_scanned();
        if let Err(e) = self.storage.remove_item(DEVICES_KEY) {
            warn!("Could not clear scanned snapshot: {}", e);
        }
        self.notify(AppEvent::ScannedDevicesChanged);
    }

    /// Apply the scan soft timeout if due.
    pub fn expire_scan(&mut self, now: Instant) {
        if self.operation.expire_scan(now) {
            debug!("Scan duration elapsed, showing idle");
            self.notify(AppEvent::OperationStatus(OperationStatus::Idle));
        }
    }

    pub fn scan_deadline(&self) -> Option<Instant> {
        self.operation.scan_deadline()
    }

    // State

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn operation(&self) -> &OperationState {
        &self.operation
    }

    pub fn manufacturers(&self) -> &ManufacturerTable {
        &self.manufacturers
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut LocalStorage {
        &mut self.storage
    }

    fn restore_scanned_snapshot(&mut self) {
        let Some(snapshot) = self.storage.get_item(DEVICES_KEY) else {
            return;
        };
        match registry::decode_snapshot(snapshot) {
            Ok(scanned) => {
                self.registry.replace_scanned(scanned);
                self.notify(AppEvent::ScannedDevicesChanged);
            }
            Err(e) => warn!("Ignoring unreadable scanned snapshot: {}", e),
        }
    }

    /// Persist the scanned map to local storage.
    pub(super) fn persist_scanned_snapshot(&mut self) {
        let result = registry::encode_snapshot(self.registry.scanned())
            .map_err(anyhow::Error::from)
            .and_then(|snapshot| self.storage.set_item(DEVICES_KEY, snapshot));
        if let Err(e) = result {
            warn!("Could not save scanned snapshot: {}", e);
        }
    }

    /// The table is loaded at most once per process.
    fn load_manufacturers(&mut self) {
        if self.manufacturers_requested {
            return;
        }
        self.manufacturers_requested = true;

        let Some(path) = &self.manufacturer_source else {
            return;
        };
        match ManufacturerTable::load(path) {
            Ok(table) => {
                if table.is_empty() {
                    warn!("Manufacturer table {} has no entries", path.display());
                }
                info!("Loaded {} manufacturer names", table.len());
                self.manufacturers = table;
                self.notify(AppEvent::ScannedDevicesChanged);
            }
            Err(e) => error!("Error loading manufacturer data: {:#}", e),
        }
    }

    /// Returns `true` if the command was handed to an open connection.
    fn send(&self, command: ClientCommand) -> bool {
        let result = match &self.connection {
            Some(connection) => connection.send(&command),
            None => Err(TransportError::NotConnected),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping `{}`: {}", command, e);
                self.log(format!("Not sent: {}", e), MessageSeverity::Warning);
                false
            }
        }
    }

    pub(super) fn notify(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    pub(super) fn log(&self, message: impl Into<String>, severity: MessageSeverity) {
        self.notify(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::StoredDevice;

    struct Harness {
        session: RemoteSession,
        wire: mpsc::UnboundedReceiver<String>,
        _events: mpsc::UnboundedReceiver<AppEvent>,
    }

    impl Harness {
        fn sent(&mut self) -> Vec<String> {
            let mut lines = Vec::new();
            while let Ok(line) = self.wire.try_recv() {
                lines.push(line);
            }
            lines
        }
    }

    fn connected(storage: LocalStorage) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (transport_tx, _transport_rx) = mpsc::unbounded_channel();
        let mut session = RemoteSession::new(storage, None, event_tx, transport_tx);
        let (connection, wire) = Connection::detached(7, "10.0.0.2:55555");
        session.attach(connection);
        Harness {
            session,
            wire,
            _events: events,
        }
    }

    fn line(text: &str) -> TransportEvent {
        TransportEvent::Line {
            connection: 7,
            line: text.to_string(),
        }
    }

    #[test]
    fn test_bootstrap_sequence() {
        let mut storage = LocalStorage::in_memory();
        storage
            .set_item(
                DEVICES_KEY,
                r#"{"aa":{"addr":"aa","rssi":-50,"data":"020106"}}"#,
            )
            .unwrap();

        let mut h = connected(storage);
        assert_eq!(h.sent(), ["store\r\n", "status\r\n"]);
        assert!(h.session.is_connected());
        assert_eq!(h.session.registry().scanned()["aa"].rssi, -50);
        assert_eq!(
            h.session.storage().get_item(SERVER_ADDRESS_KEY),
            Some("10.0.0.2:55555")
        );
    }

    #[test]
    fn test_new_device_upsert_persists_snapshot() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa:bb -80 0201"));
        h.session.handle_transport_event(line("new-device aa:bb -45 0201"));

        let scanned = h.session.registry().scanned();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned["aa:bb"].rssi, -45);

        let snapshot = h.session.storage().get_item(DEVICES_KEY).unwrap();
        assert_eq!(&registry::decode_snapshot(snapshot).unwrap(), scanned);
    }

    #[test]
    fn test_stored_devices_round_trip_through_save_path() {
        let mut h = connected(LocalStorage::in_memory());
        h.sent();
        h.session.handle_transport_event(line("new-device aa:bb -60 02010605ff34120000"));
        h.session.handle_transport_event(line("new-device cc:dd -70 0201"));
        h.session.store_device("aa:bb", "desk").unwrap();
        h.session.store_device("cc:dd", "门").unwrap();
        let original: Vec<StoredDevice> = h.session.registry().stored().to_vec();

        let saved = h.sent().pop().unwrap();
        let payload = saved
            .strip_prefix("store ")
            .and_then(|rest| rest.strip_suffix("\r\n"))
            .unwrap()
            .to_string();

        h.session.registry.replace_stored(Vec::new());
        h.session
            .handle_transport_event(line(&format!("stored-devices {}", payload)));

        assert_eq!(h.session.registry().stored(), original.as_slice());
    }

    #[test]
    fn test_malformed_stored_devices_keeps_previous_list() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa -60 0201"));
        h.session.store_device("aa", "desk").unwrap();

        h.session.handle_transport_event(line("stored-devices !!!not-base64"));
        h.session.handle_transport_event(line("stored-devices bm90IGpzb24="));

        assert_eq!(h.session.registry().stored().len(), 1);
        assert_eq!(h.session.registry().stored()[0].alias, "desk");
    }

    #[test]
    fn test_status_update_clears_simulation() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa -60 0201061aff4c00"));
        h.session.store_device("aa", "tag").unwrap();
        h.sent();

        h.session.simulate(0).unwrap();
        assert_eq!(h.sent(), ["simulate 0201061aff4c00\r\n"]);
        assert_eq!(h.session.operation().simulating().unwrap().alias, "tag");
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);

        h.session.handle_transport_event(line("status advertising"));
        assert!(h.session.operation().simulating().is_some());

        h.session.handle_transport_event(line("status idle"));
        assert!(h.session.operation().simulating().is_none());
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);
    }

    #[test]
    fn test_scan_soft_timeout_without_stop() {
        let mut h = connected(LocalStorage::in_memory());
        h.sent();
        let start = Instant::now();

        h.session.start_scan(2, start);
        assert_eq!(h.sent(), ["scan 2\r\n"]);
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);

        h.session.handle_transport_event(line("status scanning"));
        h.session.expire_scan(start + std::time::Duration::from_millis(1500));
        assert_eq!(h.session.operation().status(), OperationStatus::Scanning);

        h.session.expire_scan(start + std::time::Duration::from_secs(2));
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_scan_longer_than_the_clock_runs_until_stopped() {
        let mut h = connected(LocalStorage::in_memory());
        h.sent();
        let start = Instant::now();

        h.session.start_scan(u64::MAX, start);
        assert_eq!(h.sent(), ["scan 18446744073709551615\r\n"]);
        assert!(h.session.scan_deadline().is_none());

        h.session.handle_transport_event(line("status scanning"));
        h.session.expire_scan(start + std::time::Duration::from_secs(86_400));
        assert_eq!(h.session.operation().status(), OperationStatus::Scanning);
    }

    #[test]
    fn test_operation_state_does_not_outlive_connection() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa -60 0201"));
        h.session.store_device("aa", "tag").unwrap();
        h.session.simulate(0).unwrap();
        h.session.handle_transport_event(line("status advertising"));
        h.session.start_scan(30, Instant::now());
        assert!(h.session.scan_deadline().is_some());

        h.session.disconnect();
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);
        assert!(h.session.operation().simulating().is_none());
        assert!(h.session.scan_deadline().is_none());

        let (connection, _wire) = Connection::detached(8, "10.0.0.3:55555");
        h.session.attach(connection);
        h.session.start_scan(30, Instant::now());
        h.session.handle_transport_event(TransportEvent::Line {
            connection: 8,
            line: "status scanning".to_string(),
        });
        h.session
            .handle_transport_event(TransportEvent::Closed { connection: 8 });
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);
        assert!(h.session.scan_deadline().is_none());
    }

    #[test]
    fn test_registry_edits_trigger_save() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa -60 0201"));
        h.session.store_device("aa", "one").unwrap();
        h.session.rename(0, "two").unwrap();
        h.session.delete(0).unwrap();

        let saves: Vec<_> = h
            .sent()
            .into_iter()
            .filter(|l| l.starts_with("store "))
            .collect();
        assert_eq!(saves.len(), 3);
        assert_eq!(saves[2], "store W10=\r\n");
        assert!(h.session.rename(0, "x").is_err());
        assert!(h.session.store_device("zz", "x").is_err());
    }

    #[test]
    fn test_clear_scanned_drops_snapshot() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(line("new-device aa -60 0201"));
        h.session.clear_scanned();

        assert!(h.session.registry().scanned().is_empty());
        assert_eq!(h.session.storage().get_item(DEVICES_KEY), None);
    }

    #[test]
    fn test_send_while_disconnected_is_dropped() {
        let (event_tx, _events) = mpsc::unbounded_channel();
        let (transport_tx, _transport_rx) = mpsc::unbounded_channel();
        let mut session =
            RemoteSession::new(LocalStorage::in_memory(), None, event_tx, transport_tx);

        session.start_scan(5, Instant::now());
        session.stop();
        session.load_stored();

        assert!(!session.is_connected());
        assert!(session.scan_deadline().is_none());
    }

    #[test]
    fn test_close_and_stale_events() {
        let mut h = connected(LocalStorage::in_memory());
        h.session.handle_transport_event(TransportEvent::Line {
            connection: 3,
            line: "new-device old -1 00".to_string(),
        });
        assert!(h.session.registry().scanned().is_empty());

        h.session
            .handle_transport_event(TransportEvent::Closed { connection: 3 });
        assert!(h.session.is_connected());

        h.session
            .handle_transport_event(TransportEvent::Closed { connection: 7 });
        assert!(!h.session.is_connected());
        assert_eq!(h.session.current_address(), None);
    }

    #[test]
    fn test_unknown_and_malformed_lines_are_ignored() {
        let mut h = connected(LocalStorage::in_memory());
        for text in ["ok", "Command not found: fly", "new-device aa loud", "status ???"] {
            h.session.handle_transport_event(line(text));
        }
        assert!(h.session.registry().scanned().is_empty());
        assert_eq!(h.session.operation().status(), OperationStatus::Idle);
    }
}
