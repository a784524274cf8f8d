//! Remote Controller Module
//!
//! Talks to the BLE scanning/advertising controller over a WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     RemoteSession                        │
//! │  (registries, operation state, manufacturer table)       │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐  ┌──────────┐  ┌──────────┐
//! │ Connection │  │  Router  │  │ Protocol │
//! │            │  │          │  │          │
//! │ - socket   │  │ - event  │  │ - framing│
//! │ - reader/  │  │   dispatch│ │ - command│
//! │   writer   │  │          │  │ - parsing│
//! └────────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Commands, events and line framing
//! - [`connection`] - WebSocket lifecycle and reader/writer tasks
//! - [`router`] - Applies parsed events to the session state
//! - [`service`] - The session object and its operations

pub mod connection;
pub mod protocol;
pub mod router;
pub mod service;

pub use connection::TransportEvent;
pub use service::RemoteSession;
