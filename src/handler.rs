//! WebSocket connection handler
//!
//! Handles individual connections: upgrade, the receive loop with its read
//! deadline, join requests, relaying, and teardown back through the room
//! registry. Also serves the out-of-band leave request.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::connection::{self, Connection, Frame, FrameSink};
use crate::error::{ConnectionError, JoinError, LeaveError};
use crate::message::{InboundMessage, LeaveKind, LeaveRequest, MessageKind, OutboundMessage};
use crate::registry::RoomRegistry;
use crate::router::{deliver, relay};
use crate::server::AppState;
use crate::types::{ConnectionId, RoomName};

/// Query parameters for the WebSocket upgrade
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub id: Option<String>,
}

/// Inbound frame, independent of the WebSocket implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Pong,
    Close,
    /// Ping frames and non-UTF-8 binary frames; ignored
    Other,
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
            Message::Pong(_) => Inbound::Pong,
            Message::Close(_) => Inbound::Close,
            // JSON sent as a binary frame is handled like text
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => Inbound::Text(text.to_owned()),
                Err(_) => Inbound::Other,
            },
            Message::Ping(_) => Inbound::Other,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(Bytes::new()),
            Frame::Close => Message::Close(None),
        }
    }
}

/// `GET /ws`: upgrade to a relay connection
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let id = ConnectionId::from_query(query.id);
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(move |e| warn!("Upgrade from {} failed: {}", addr, e))
        .on_upgrade(move |socket| handle_socket(socket, state, id, addr))
}

/// Drive one upgraded socket until it closes
pub async fn handle_socket(socket: WebSocket, state: AppState, id: ConnectionId, addr: SocketAddr) {
    let (ws_sender, ws_receiver) = socket.split();

    let sink: FrameSink = Box::pin(sink::unfold(ws_sender, |mut ws_sender, frame: Frame| async move {
        ws_sender
            .send(Message::from(frame))
            .await
            .map_err(ConnectionError::transport)?;
        Ok::<_, ConnectionError>(ws_sender)
    }));
    let conn = Arc::new(Connection::new(id, addr.to_string(), sink, state.config.write_wait));
    info!("Client {} connected from {}", conn.id(), addr);

    let inbound = ws_receiver.map(|msg| msg.map(Inbound::from).map_err(ConnectionError::transport));
    run_session(conn, inbound, state.registry, state.config).await;
}

/// Run the receive loop and heartbeat of one connection, then tear it down
///
/// The read deadline is refreshed only by pongs. The session ends on read
/// error, end of stream, close frame, missed deadline, a failed join, or
/// the connection being closed from elsewhere.
pub async fn run_session<S>(
    conn: Arc<Connection>,
    mut inbound: S,
    registry: Arc<RoomRegistry>,
    config: RelayConfig,
) where
    S: Stream<Item = Result<Inbound, ConnectionError>> + Unpin,
{
    let heartbeat = tokio::spawn(connection::heartbeat(conn.clone(), config.ping_period));
    let mut session = Session {
        conn,
        registry,
        joined: None,
    };

    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let next = tokio::select! {
            _ = session.conn.closed() => {
                debug!("Connection {} closed", session.conn.id());
                break;
            }
            next = timeout_at(deadline, inbound.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                info!("Client {} missed its heartbeat deadline", session.conn.id());
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Read error from {}: {}", session.conn.peer(), e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Inbound::Pong => deadline = Instant::now() + config.pong_wait,
            Inbound::Close => {
                debug!("Client {} sent close frame", session.conn.id());
                break;
            }
            Inbound::Other => {
                debug!("Ignored non-text frame from {}", session.conn.peer());
            }
            Inbound::Text(text) => {
                if session.handle_text(&text).await.is_break() {
                    break;
                }
            }
        }
    }

    session.conn.close();
    session.teardown().await;
    // A ping may still be blocked on a dead peer
    heartbeat.abort();
    let _ = heartbeat.await;
    session.conn.send_close_frame().await;

    info!("Client {} disconnected", session.conn.id());
}

/// Per-connection state owned by the receive loop
struct Session {
    conn: Arc<Connection>,
    registry: Arc<RoomRegistry>,
    /// Room this connection joined, if any
    joined: Option<RoomName>,
}

impl Session {
    async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        debug!("ws in from {}: {} bytes", self.conn.peer(), text.len());

        let msg = match InboundMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Bad JSON from {}: {}", self.conn.peer(), e);
                return ControlFlow::Continue(());
            }
        };

        match msg.kind {
            MessageKind::Join => self.join(msg).await,
            kind if kind.is_relayed() => {
                let room = RoomName(msg.room);
                debug!("[{}] relaying {:?} from {}", room, kind, self.conn.peer());
                relay(&self.registry, &room, &self.conn, text).await;
                ControlFlow::Continue(())
            }
            kind => {
                warn!("Unexpected message type {:?} from {}", kind, self.conn.peer());
                ControlFlow::Continue(())
            }
        }
    }

    /// Handle a join; a rejected join ends the session
    async fn join(&mut self, msg: InboundMessage) -> ControlFlow<()> {
        let room = RoomName(msg.room.clone());
        let result = match self.joined {
            Some(_) => Err(JoinError::AlreadyJoined),
            None => {
                self.registry
                    .join(&self.conn, &room, msg.join_role(), msg.quality)
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                self.joined = Some(room.clone());
                deliver(outcome.notices).await;
                if let Err(e) = self.conn.send(&OutboundMessage::joined(&room)).await {
                    debug!("Joined reply to {} failed: {}", self.conn.id(), e);
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            Err(e) => {
                info!("[{}] join from {} rejected: {}", room, self.conn.peer(), e);
                let _ = self.conn.send(&OutboundMessage::from(e)).await;
                ControlFlow::Break(())
            }
        }
    }

    /// Fix up room state after the connection ended
    async fn teardown(&self) {
        let Some(room) = &self.joined else {
            return;
        };
        info!("[{}] disconnected: {}", room, self.conn.peer());
        let notices = self.registry.depart(&self.conn, room).await;
        deliver(notices).await;
    }
}

/// `POST /leave`: out-of-band leave
///
/// A creator leave destroys the room: the viewer is told to leave and both
/// connections are closed. Any other leave is informational.
pub async fn leave_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, LeaveError> {
    let (kind, room) =
        LeaveRequest::parse(&body).inspect_err(|e| warn!("Leave request rejected: {}", e))?;

    match kind {
        Some(LeaveKind::Creator) => {
            if let Some(removed) = state.registry.remove_room(&room).await {
                if let Some(viewer) = &removed.viewer {
                    let _ = viewer.send(&OutboundMessage::leave(&room)).await;
                    viewer.close();
                }
                if let Some(creator) = &removed.creator {
                    creator.close();
                }
            }
        }
        other => {
            debug!("[{}] leave request {:?} ignored", room, other);
        }
    }

    Ok(StatusCode::OK)
}
