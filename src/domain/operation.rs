//! Operation State Machine
//!
//! ```text
//!   idle ──scan──▶ scanning ──done / stop / soft timeout──▶ idle
//!   idle ──simulate──▶ advertising ──stop──▶ idle
//! ```
//!
//! Requests never change the status directly: only a `status` report from the
//! controller does. The scan soft timeout is the one local exception.

use crate::domain::models::{OperationStatus, StoredDevice};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct OperationState {
    status: OperationStatus,
    simulating: Option<StoredDevice>,
    scan_deadline: Option<Instant>,
}

impl OperationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// The stored device being advertised, if any.
    pub fn simulating(&self) -> Option<&StoredDevice> {
        self.simulating.as_ref()
    }

    pub fn scan_deadline(&self) -> Option<Instant> {
        self.scan_deadline
    }

    /// Apply a status reported by the controller. Returns `true` if it changed.
    pub fn apply_status(&mut self, status: OperationStatus) -> bool {
        if status != OperationStatus::Advertising {
            self.simulating = None;
        }
        let changed = self.status != status;
        self.status = status;
        changed
    }

    pub fn begin_simulation(&mut self, device: StoredDevice) {
        self.simulating = Some(device);
    }

    /// Arm the one-shot soft timeout for a scan of `seconds` (0 = indefinite).
    ///
    /// A duration beyond what the clock can represent is treated as indefinite.
    pub fn arm_scan_timeout(&mut self, now: Instant, seconds: u64) {
        self.scan_deadline = match seconds {
            0 => None,
            _ => now.checked_add(Duration::from_secs(seconds)),
        };
    }

    pub fn cancel_scan_timeout(&mut self) {
        self.scan_deadline = None;
    }

    /// Fire the soft timeout if its deadline has passed.
    ///
    /// Returns `true` if the local status was forced back to idle.
    pub fn expire_scan(&mut self, now: Instant) -> bool {
        match self.scan_deadline {
            Some(deadline) if now >= deadline => {
                self.scan_deadline = None;
                if self.status == OperationStatus::Scanning {
                    self.status = OperationStatus::Idle;
                    return true;
                }
                false
            }
            _ => false,
        }
    }
}
