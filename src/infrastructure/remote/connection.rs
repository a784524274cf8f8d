//! Remote Connection Module
//!
//! One WebSocket session to the controller. Inbound frames are split into
//! lines and forwarded as [`TransportEvent`]s tagged with the connection id;
//! outbound commands are framed and written in FIFO order by a writer task.

use crate::error::TransportError;
use crate::infrastructure::remote::protocol::{self, ClientCommand};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

/// What a connection reports back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Line {
        connection: ConnectionId,
        line: String,
    },
    Closed {
        connection: ConnectionId,
    },
}

/// An open session with the controller. Dropping it tears the socket down.
pub struct Connection {
    id: ConnectionId,
    address: String,
    outbound: mpsc::UnboundedSender<String>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open a WebSocket to `address` (`host:port` or a full `ws://` URL).
    ///
    /// Gives up with [`TransportError::ConnectTimedOut`] once `connect_timeout` elapses.
    pub async fn open(
        id: ConnectionId,
        address: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let url = websocket_url(address);
        info!("Connecting to controller at {}", url);

        let attempt = async {
            connect_async(url.as_str())
                .await
                .map_err(|source| TransportError::ConnectFailed {
                    address: address.to_string(),
                    source,
                })
        };
        let (ws_stream, _) = with_timeout(address, connect_timeout, attempt).await?;

        info!(connection = id, "Connected to {}", url);

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        // Writer: ends when the Connection (and its sender) is dropped
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(connection = id, "Write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!(connection = id, "Writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(connection = id, "Read failed: {}", e);
                        break;
                    }
                };
                for line in protocol::split_frame(&text) {
                    let _ = events.send(TransportEvent::Line {
                        connection: id,
                        line: line.to_string(),
                    });
                }
            }
            info!(connection = id, "Connection closed by remote");
            let _ = events.send(TransportEvent::Closed { connection: id });
        });

        Ok(Self {
            id,
            address: address.to_string(),
            outbound,
            reader: Some(reader),
        })
    }

    /// A connection with no socket behind it; framed lines land in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(
        id: ConnectionId,
        address: &str,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connection = Self {
            id,
            address: address.to_string(),
            outbound,
            reader: None,
        };
        (connection, outbound_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a command. Never blocks and never waits for an acknowledgement.
    pub fn send(&self, command: &ClientCommand) -> Result<(), TransportError> {
        debug!(connection = self.id, "-> {}", command);
        self.outbound
            .send(protocol::encode_line(command))
            .map_err(|_| TransportError::NotConnected)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn with_timeout<T>(
    address: &str,
    limit: Duration,
    attempt: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, attempt)
        .await
        .map_err(|_| TransportError::ConnectTimedOut {
            address: address.to_string(),
            after: limit,
        })?
}

fn websocket_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{}", address)
    }
}
