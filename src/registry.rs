//! Room registry
//!
//! The single owner of all room state. Every lookup-then-mutate sequence
//! runs under one lock, so concurrent joins and departures cannot race.
//! The lock is never held across a network write: operations that need to
//! notify members return [`Notice`]s for the caller to deliver after the
//! lock is released.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::JoinError;
use crate::message::{OutboundMessage, Quality, Role};
use crate::room::{Member, Room};
use crate::types::RoomName;

/// A message to deliver once the registry lock is released
#[derive(Debug)]
pub struct Notice {
    pub to: Arc<Connection>,
    pub message: OutboundMessage,
}

impl Notice {
    fn new(to: &Arc<Connection>, message: OutboundMessage) -> Self {
        Self {
            to: to.clone(),
            message,
        }
    }
}

/// Result of a successful join
///
/// The joiner is relayable as soon as the lock is released, so a peer's
/// relayed message can reach it before its `ready` notice is delivered.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Slot the joiner took
    pub member: Member,
    /// `peer-replaced` and `ready` notices, in delivery order
    pub notices: Vec<Notice>,
}

/// Result of looking up the relay target for a sender
#[derive(Debug)]
pub enum PeerLookup {
    /// No room with that name
    NoRoom,
    /// Room is not paired
    Unpaired,
    /// Sender is not a member of the room
    NotMember,
    /// Deliver to this connection
    Peer(Arc<Connection>),
}

/// Why a room was destroyed, for logs
#[derive(Debug, Clone, Copy)]
enum Initiator {
    Disconnect,
    LeaveRequest,
    WriteFailure,
}

/// Read-only view of one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub has_creator: bool,
    pub has_viewer: bool,
    pub viewer_left: bool,
    pub quality: Quality,
}

/// All active rooms, by name
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomName, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `conn` into `room` according to the room state machine
    ///
    /// - absent room: created with `conn` as creator, if the role is `Create`
    /// - room with a creator and no viewer: `conn` becomes the viewer
    /// - anything else fails, leaving the registry unchanged
    pub async fn join(
        &self,
        conn: &Arc<Connection>,
        room: &RoomName,
        role: Role,
        quality: Option<Quality>,
    ) -> Result<JoinOutcome, JoinError> {
        if room.as_str().is_empty() {
            return Err(JoinError::MissingRoom);
        }

        let mut rooms = self.rooms.lock().await;

        let existing = match rooms.entry(room.clone()) {
            Entry::Vacant(slot) => {
                if role != Role::Create {
                    return Err(JoinError::NotCreator);
                }
                let quality = quality.unwrap_or_default();
                slot.insert(Room::new(room.clone(), conn.clone(), quality));
                info!("[{}] creator joined from {}", room, conn.peer());
                check_invariants(&rooms);
                return Ok(JoinOutcome {
                    member: Member::Creator,
                    notices: Vec::new(),
                });
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if role == Role::Create || existing.viewer.is_some() {
            return Err(JoinError::RoomBusy);
        }
        let Some(creator) = existing.creator.clone() else {
            return Err(JoinError::CreatorNotJoined);
        };

        existing.admit_viewer(conn.clone());
        info!("[{}] viewer joined from {}", room, conn.peer());

        let replacing = existing.viewer_left;
        let ready = OutboundMessage::ready(room, existing.quality.clone());
        let mut notices = Vec::with_capacity(2);
        if replacing {
            info!("[{}] signaling viewer replacement", room);
            notices.push(Notice::new(&creator, OutboundMessage::peer_replaced(room)));
        } else {
            notices.push(Notice::new(&creator, ready.clone()));
        }
        notices.push(Notice::new(conn, ready));

        check_invariants(&rooms);
        Ok(JoinOutcome {
            member: Member::Viewer,
            notices,
        })
    }

    /// Remove `conn` from `room` after its connection ended
    ///
    /// A departing creator takes the room with it; the viewer, if any, is
    /// told to leave. A departing viewer frees its slot and the room waits
    /// for a replacement.
    pub async fn depart(&self, conn: &Arc<Connection>, room: &RoomName) -> Vec<Notice> {
        let mut rooms = self.rooms.lock().await;
        let Some(existing) = rooms.get_mut(room) else {
            return Vec::new();
        };

        let mut notices = Vec::new();
        match existing.member(conn) {
            Some(Member::Creator) => {
                if let Some(viewer) = &existing.viewer {
                    notices.push(Notice::new(viewer, OutboundMessage::leave(room)));
                }
                rooms.remove(room);
                log_destroyed(room, Initiator::Disconnect);
            }
            Some(Member::Viewer) => {
                existing.remove_viewer();
                info!("[{}] viewer left", room);
                if existing.is_empty() {
                    rooms.remove(room);
                    log_destroyed(room, Initiator::Disconnect);
                }
            }
            None => {
                debug!("[{}] {} was no longer a member", room, conn.id());
            }
        }

        check_invariants(&rooms);
        notices
    }

    /// Tear down `room` on the creator's out-of-band request
    ///
    /// Returns the removed room so the caller can notify and close its
    /// members; `None` if no such room exists.
    pub async fn remove_room(&self, room: &RoomName) -> Option<Room> {
        let mut rooms = self.rooms.lock().await;
        let removed = rooms.remove(room);
        if removed.is_some() {
            log_destroyed(room, Initiator::LeaveRequest);
        }
        removed
    }

    /// Clear `failed` from `room` after a write to it failed
    ///
    /// Deletes the room once neither member remains. If the creator was
    /// cleared and a viewer remains, the viewer is told to leave.
    pub async fn clear_failed(&self, room: &RoomName, failed: &Arc<Connection>) -> Vec<Notice> {
        let mut rooms = self.rooms.lock().await;
        let Some(existing) = rooms.get_mut(room) else {
            return Vec::new();
        };

        let mut notices = Vec::new();
        match existing.remove_member(failed) {
            Some(member) => {
                debug!("[{}] cleared {:?} {} after write failure", room, member, failed.id());
                if existing.is_empty() {
                    rooms.remove(room);
                    log_destroyed(room, Initiator::WriteFailure);
                } else if member == Member::Creator {
                    if let Some(viewer) = &existing.viewer {
                        notices.push(Notice::new(viewer, OutboundMessage::leave(room)));
                    }
                }
            }
            None => {
                debug!("[{}] {} already gone", room, failed.id());
            }
        }

        check_invariants(&rooms);
        notices
    }

    /// Find where a message from `sender` to `room` should go
    pub async fn peer_of(&self, room: &RoomName, sender: &Arc<Connection>) -> PeerLookup {
        let rooms = self.rooms.lock().await;
        let Some(existing) = rooms.get(room) else {
            return PeerLookup::NoRoom;
        };
        if !existing.is_paired() {
            return PeerLookup::Unpaired;
        }
        match existing.peer_of(sender) {
            Some(peer) => PeerLookup::Peer(peer),
            None => PeerLookup::NotMember,
        }
    }

    pub async fn lookup(&self, room: &RoomName) -> Option<RoomSnapshot> {
        let rooms = self.rooms.lock().await;
        rooms.get(room).map(|r| RoomSnapshot {
            has_creator: r.creator.is_some(),
            has_viewer: r.viewer.is_some(),
            viewer_left: r.viewer_left,
            quality: r.quality.clone(),
        })
    }

    /// Number of rooms
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

fn log_destroyed(room: &RoomName, initiator: Initiator) {
    info!("[{}] room destroyed, initiator: {:?}", room, initiator);
}

/// Every stored room has one or two members
fn check_invariants(rooms: &HashMap<RoomName, Room>) {
    debug_assert!(
        rooms
            .values()
            .all(|r| (1..=2).contains(&r.member_count())),
        "registry holds a room with no members"
    );
}
