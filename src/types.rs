//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: caller-supplied or random 16-byte hex identifier
//! - `RoomName`: caller-chosen room name

use std::fmt::Write;

use rand::Rng;

/// Connection identifier (newtype pattern)
///
/// Ids may be supplied by the client, so two live connections can share one.
/// Room membership never compares ids, only connection identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new id from 16 random bytes, hex-encoded
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        let mut hex = String::with_capacity(32);
        for b in bytes {
            let _ = write!(hex, "{:02x}", b);
        }
        Self(hex)
    }

    /// Use the caller-supplied id, or generate one when it is missing or blank
    pub fn from_query(id: Option<String>) -> Self {
        match id {
            Some(id) if !id.trim().is_empty() => Self(id),
            _ => Self::generate(),
        }
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name, unique within the registry
///
/// Names are used exactly as given; no case folding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(pub String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
