//! Message protocol definitions
//!
//! JSON signaling messages exchanged over the WebSocket, plus the body of the
//! out-of-band leave request. Payload fields the relay does not understand
//! (`offer`, `answer`, `candidate`, ...) are ignored on decode; relayed
//! messages are forwarded as the original text, never re-encoded.

use serde::{Deserialize, Serialize};

use crate::error::{JoinError, LeaveError};
use crate::types::RoomName;

/// Message type tag (`"type"` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Join,
    Joined,
    Ready,
    Offer,
    Answer,
    Candidate,
    Leave,
    Hangup,
    State,
    PeerReplaced,
    Error,
    /// Any tag not listed above
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Whether messages of this kind are forwarded verbatim to the peer
    pub fn is_relayed(self) -> bool {
        matches!(
            self,
            Self::Offer | Self::Answer | Self::Candidate | Self::Leave | Self::Hangup | Self::State
        )
    }
}

/// Media quality descriptor
///
/// Carried from the creator to the viewer on pairing; never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quality {
    pub width: i64,
    pub height: i64,
    pub fps: i64,
    pub bitrate: i64,
    pub codec: String,
}

/// Role requested by a `join`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Create the room and become its creator
    Create,
    /// Join an existing room as its viewer
    View,
}

/// Client → Relay message
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub text: Option<String>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Role of a join request
    ///
    /// An explicit `role` wins. Without one, a positive bit-rate means the
    /// joiner is creating the room.
    pub fn join_role(&self) -> Role {
        match self.role {
            Some(role) => role,
            None if self.quality.as_ref().is_some_and(|q| q.bitrate > 0) => Role::Create,
            None => Role::View,
        }
    }
}

/// Relay → Client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl OutboundMessage {
    fn new(kind: MessageKind, room: &RoomName) -> Self {
        Self {
            kind,
            room: room.to_string(),
            quality: None,
            text: None,
        }
    }

    /// Join accepted
    pub fn joined(room: &RoomName) -> Self {
        Self::new(MessageKind::Joined, room)
    }

    /// Room paired; carries the room's canonical quality
    pub fn ready(room: &RoomName, quality: Quality) -> Self {
        Self {
            quality: Some(quality),
            ..Self::new(MessageKind::Ready, room)
        }
    }

    /// A new viewer replaced one that left
    pub fn peer_replaced(room: &RoomName) -> Self {
        Self::new(MessageKind::PeerReplaced, room)
    }

    /// The peer is gone
    pub fn leave(room: &RoomName) -> Self {
        Self::new(MessageKind::Leave, room)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            room: String::new(),
            quality: None,
            text: Some(text.into()),
        }
    }
}

/// Convert JoinError to OutboundMessage for client notification
impl From<JoinError> for OutboundMessage {
    fn from(err: JoinError) -> Self {
        OutboundMessage::error(err.to_string())
    }
}

/// Who is asking to leave, in a leave request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Creator,
    Viewer,
    #[serde(other)]
    Other,
}

/// Body of `POST /leave`
#[derive(Debug, Clone, Deserialize)]
pub struct LeaveRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<LeaveKind>,
    #[serde(default)]
    pub room: Option<String>,
}

impl LeaveRequest {
    /// Decode a leave body, whatever content type it was sent with
    pub fn parse(body: &[u8]) -> Result<(Option<LeaveKind>, RoomName), LeaveError> {
        let request: LeaveRequest = serde_json::from_slice(body)?;
        match request.room {
            Some(room) if !room.is_empty() => Ok((request.kind, RoomName(room))),
            _ => Err(LeaveError::MissingRoom),
        }
    }
}
