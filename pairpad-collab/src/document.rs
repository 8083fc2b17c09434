//! Whole-document relay.
//!
//! The relay keeps no copy of the text. It forwards each update verbatim to
//! every other connection in the room, and a receiver overwrites its buffer
//! with whatever arrived last. Two concurrent senders are never merged.

use crate::broadcast::BroadcastGroup;
use crate::identity::ConnectionId;
use crate::protocol::ServerEvent;

/// Forwards full-buffer `text-update`s.
#[derive(Debug, Default)]
pub struct DocumentBroadcastChannel {
    updates_relayed: u64,
    bytes_relayed: u64,
}

impl DocumentBroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay `text` to everyone in `group` except `sender`.
    ///
    /// Returns the number of connections the update was handed to.
    pub fn publish(&mut self, group: &mut BroadcastGroup, sender: &ConnectionId, text: String) -> usize {
        let len = text.len() as u64;
        let delivered = group.send_except(sender, ServerEvent::TextUpdate(text));
        self.updates_relayed += 1;
        self.bytes_relayed += len * delivered as u64;
        log::debug!("text-update from {sender}: {len} bytes to {delivered} peers");
        delivered
    }

    pub fn updates_relayed(&self) -> u64 {
        self.updates_relayed
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }
}
