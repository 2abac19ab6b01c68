//! Room struct definition
//!
//! Represents a 1:1 room with a creator and an optional viewer.

use std::sync::Arc;

use crate::connection::Connection;
use crate::message::Quality;
use crate::types::RoomName;

/// Which slot of a room a connection occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Creator,
    Viewer,
}

/// 1:1 Room
///
/// Holds at most one creator and one viewer. Normally the creator is
/// present; it is only absent transiently, after a failed write to it
/// cleared its slot while a viewer remained. A room with neither member
/// is never kept in the registry.
#[derive(Debug)]
pub struct Room {
    /// Room name
    pub name: RoomName,
    /// Connection that created the room
    pub creator: Option<Arc<Connection>>,
    /// Connection watching the room
    pub viewer: Option<Arc<Connection>>,
    /// Set once a viewer has left; the next viewer is a replacement
    pub viewer_left: bool,
    /// Canonical quality, from the creator's join
    pub quality: Quality,
}

impl Room {
    /// Create a new room with the given creator
    pub fn new(name: RoomName, creator: Arc<Connection>, quality: Quality) -> Self {
        Self {
            name,
            creator: Some(creator),
            viewer: None,
            viewer_left: false,
            quality,
        }
    }

    /// Which slot, if any, this connection occupies
    pub fn member(&self, conn: &Arc<Connection>) -> Option<Member> {
        if is_same(&self.creator, conn) {
            Some(Member::Creator)
        } else if is_same(&self.viewer, conn) {
            Some(Member::Viewer)
        } else {
            None
        }
    }

    /// The other member, if the room is paired and `conn` is in it
    pub fn peer_of(&self, conn: &Arc<Connection>) -> Option<Arc<Connection>> {
        let (creator, viewer) = (self.creator.as_ref()?, self.viewer.as_ref()?);
        match self.member(conn)? {
            Member::Creator => Some(viewer.clone()),
            Member::Viewer => Some(creator.clone()),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.creator.is_some() && self.viewer.is_some()
    }

    /// Neither member present; the room must be deleted
    pub fn is_empty(&self) -> bool {
        self.creator.is_none() && self.viewer.is_none()
    }

    /// Get the number of members in the room
    pub fn member_count(&self) -> usize {
        usize::from(self.creator.is_some()) + usize::from(self.viewer.is_some())
    }

    /// Seat a viewer
    ///
    /// Returns false if the viewer slot is taken.
    pub fn admit_viewer(&mut self, viewer: Arc<Connection>) -> bool {
        if self.viewer.is_some() {
            false
        } else {
            self.viewer = Some(viewer);
            true
        }
    }

    /// Clear the viewer slot, remembering that a viewer left
    pub fn remove_viewer(&mut self) -> Option<Arc<Connection>> {
        let viewer = self.viewer.take();
        if viewer.is_some() {
            self.viewer_left = true;
        }
        viewer
    }

    /// Clear whichever slot `conn` occupies
    pub fn remove_member(&mut self, conn: &Arc<Connection>) -> Option<Member> {
        let member = self.member(conn)?;
        match member {
            Member::Creator => self.creator = None,
            Member::Viewer => {
                self.remove_viewer();
            }
        }
        Some(member)
    }
}

fn is_same(slot: &Option<Arc<Connection>>, conn: &Arc<Connection>) -> bool {
    slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn))
}
