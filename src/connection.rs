//! Connection to one endpoint
//!
//! Wraps the write half of one WebSocket behind a send guard, so heartbeat
//! pings and relayed messages never interleave on the wire. Every write runs
//! under the write deadline. A connection is closed at most once, through its
//! cancellation token; its receive loop and heartbeat both stop on it.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ConnectionError;
use crate::message::OutboundMessage;
use crate::types::ConnectionId;

/// Outbound frame, independent of the WebSocket implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Close,
}

/// Write half of a connection's transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectionError> + Send>>;

/// One endpoint connected over WebSocket
pub struct Connection {
    id: ConnectionId,
    peer: String,
    sink: Mutex<FrameSink>,
    write_wait: Duration,
    closed: CancellationToken,
}

impl Connection {
    pub fn new(id: ConnectionId, peer: impl Into<String>, sink: FrameSink, write_wait: Duration) -> Self {
        Self {
            id,
            peer: peer.into(),
            sink: Mutex::new(sink),
            write_wait,
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Remote address, for logs
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Serialize and send a relay-originated message
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(msg)?;
        self.write(Frame::Text(json)).await
    }

    /// Send an already-encoded message unchanged
    pub async fn send_text(&self, text: &str) -> Result<(), ConnectionError> {
        self.write(Frame::Text(text.to_owned())).await
    }

    /// Zero-payload liveness ping
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.write(Frame::Ping).await
    }

    /// Write one frame under the send guard and write deadline
    ///
    /// A failed write closes the connection.
    async fn write(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let result = self.write_frame(frame).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    async fn write_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;
        match timeout(self.write_wait, sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Mark the connection closed; its loops stop at their next await point
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Best-effort Close frame, sent once the receive loop has ended
    pub async fn send_close_frame(&self) {
        if let Err(e) = self.write_frame(Frame::Close).await {
            debug!("Close frame to {} not delivered: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Periodic ping for one connection
///
/// Runs until the connection closes. A failed ping closes the connection.
pub async fn heartbeat(conn: Arc<Connection>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = conn.closed() => break,
            _ = ticker.tick() => {
                if let Err(e) = conn.ping().await {
                    debug!("Heartbeat to {} failed: {}", conn.id(), e);
                    conn.close();
                    break;
                }
            }
        }
    }
    debug!("Heartbeat ended for {}", conn.id());
}
