//! Error types for the relay
//!
//! Defines connection-fatal transport errors, join (authorization) errors,
//! leave-endpoint errors, and discovery decoding errors.
//! Uses thiserror for ergonomic error definitions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Connection-level errors
///
/// Any of these is fatal for the connection it occurred on; the caller
/// tears the connection down and never retries.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// WebSocket transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Write did not complete within the write deadline
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// The connection was already closed
    #[error("connection closed")]
    Closed,

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectionError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Join failures
///
/// The `Display` text is what the joining client receives in its
/// `error` message before the connection is closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Room does not exist and the joiner is not a creator
    #[error("not a creator")]
    NotCreator,

    /// Room exists without a creator
    #[error("creator not yet joined")]
    CreatorNotJoined,

    /// Room already has a viewer (or a creator, for a create join)
    #[error("room busy")]
    RoomBusy,

    /// This connection already joined a room
    #[error("already joined")]
    AlreadyJoined,

    /// Join without a room name
    #[error("room name required")]
    MissingRoom,
}

/// Leave endpoint request errors (client errors)
#[derive(Debug, Error)]
pub enum LeaveError {
    /// Body is not valid JSON
    #[error("invalid leave body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Room name missing or empty
    #[error("room name required")]
    MissingRoom,
}

impl IntoResponse for LeaveError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Discovery (STUN) datagram decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),

    #[error("leading bits not zero")]
    NotStun,

    #[error("invalid magic cookie {0:#010x}")]
    BadCookie(u32),

    #[error("declared length {declared} does not match payload {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("truncated attribute at offset {0}")]
    TruncatedAttribute(usize),
}
