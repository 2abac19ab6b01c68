//! 1:1 WebRTC Rendezvous Relay Library
//!
//! Pairs a room creator with one viewer by room name, relays their session
//! negotiation messages over WebSocket, and answers STUN binding requests
//! so each side can learn its public address.
//!
//! # Features
//! - Room creation by the creator, carrying the media quality descriptor
//! - Single viewer per room, with replacement signaling when a viewer returns
//! - Verbatim 1:1 relay of `offer` / `answer` / `candidate` / `state` / `hangup` / `leave`
//! - Heartbeat pings with a pong deadline
//! - Out-of-band creator leave over HTTP
//! - STUN binding responder on UDP
//!
//! # Architecture
//! Shared state behind one lock:
//! - `RoomRegistry` owns every room; joins and departures are atomic under its lock
//! - Each connection runs its own receive loop and heartbeat task
//! - Writes to one connection are serialized by that connection's send guard
//! - The registry lock is never held across a network write
//!
//! # Example
//! ```ignore
//! use std::path::Path;
//! use tokio::net::TcpListener;
//! use rendezvous_relay::{server, AppState, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let app = server::router(AppState::new(RelayConfig::default()), Path::new("./web"));
//!     server::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod logging;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::RelayConfig;
pub use connection::Connection;
pub use error::{ConnectionError, DecodeError, JoinError, LeaveError};
pub use message::{InboundMessage, MessageKind, OutboundMessage, Quality, Role};
pub use registry::RoomRegistry;
pub use room::Room;
pub use server::AppState;
pub use types::{ConnectionId, RoomName};
