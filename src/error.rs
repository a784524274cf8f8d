//! Error types shared across the client.

use std::time::Duration;
use thiserror::Error;

/// Failure to decode or encode the stored-device payload (`JSON` inside base64).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// An inbound line that names a known event but cannot be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("`{event}` event is missing its {field}")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("invalid signal strength `{0}`")]
    InvalidRssi(String),

    #[error("unknown operation status `{0}`")]
    UnknownStatus(String),

    #[error("malformed stored devices: {0}")]
    StoredDevices(#[from] CodecError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("alias must not be empty")]
    EmptyAlias,

    // Positions are shown 1-based, as the console numbers them
    #[error("no stored device at position {} (have {})", .index + 1, .len)]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no scanned device with address {0}")]
    UnknownDevice(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to the remote controller")]
    NotConnected,

    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("timed out connecting to {address} after {}s", .after.as_secs())]
    ConnectTimedOut { address: String, after: Duration },
}

/// A console line that is not a valid user command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command `{0}` (type `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}
