//! Message routing
//!
//! Strict 1:1 relay between the two members of a room, and delivery of
//! registry notices. Payloads are forwarded as received. A failed write
//! closes the recipient and removes it from the room.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::registry::{Notice, PeerLookup, RoomRegistry};
use crate::types::RoomName;

/// What happened to a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Room missing, unpaired, or sender not a member
    Dropped,
    /// Write to the peer failed; the peer was removed
    Failed,
}

/// Forward `text` from `sender` to the other member of `room`
///
/// The registry lock covers only the peer lookup and the post-failure
/// cleanup, never the write itself.
pub async fn relay(
    registry: &RoomRegistry,
    room: &RoomName,
    sender: &Arc<Connection>,
    text: &str,
) -> RelayOutcome {
    let peer = match registry.peer_of(room, sender).await {
        PeerLookup::Peer(peer) => peer,
        PeerLookup::NoRoom => {
            debug!("[{}] relay from {}: room not found", room, sender.id());
            return RelayOutcome::Dropped;
        }
        PeerLookup::Unpaired => {
            debug!("[{}] relay from {}: room not paired", room, sender.id());
            return RelayOutcome::Dropped;
        }
        PeerLookup::NotMember => {
            debug!("[{}] relay from {}: sender not a member", room, sender.id());
            return RelayOutcome::Dropped;
        }
    };

    match peer.send_text(text).await {
        Ok(()) => {
            debug!("[{}] relayed {} bytes {} -> {}", room, text.len(), sender.id(), peer.id());
            RelayOutcome::Delivered
        }
        Err(e) => {
            warn!("[{}] write to {} failed: {}; removing it from the room", room, peer.peer(), e);
            peer.close();
            let notices = registry.clear_failed(room, &peer).await;
            deliver(notices).await;
            RelayOutcome::Failed
        }
    }
}

/// Send registry notices, in order
///
/// A failed notice closes its recipient; that connection's own teardown
/// then fixes up room state.
pub async fn deliver(notices: Vec<Notice>) {
    for notice in notices {
        if let Err(e) = notice.to.send(&notice.message).await {
            debug!(
                "Notice {:?} to {} not delivered: {}",
                notice.message.kind,
                notice.to.id(),
                e
            );
        }
    }
}
