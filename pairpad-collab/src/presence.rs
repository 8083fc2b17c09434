//! Selection presence: relay on the server, per-viewer state on the client.
//!
//! ## Data flow
//!
//! ```text
//! Local selection change
//!       │
//!       ▼
//! SelectionRelay::local_selection()  ── cursor-update {userId, range, color}
//!       │
//!       ▼   (WebSocket)
//! PresenceTracker::publish()         ── fan-out to N-1 connections, unchanged
//!       │
//!       ▼
//! SelectionState::apply()            ── overwrite by userId
//!       │
//!       ▼
//! SelectionRelay::decorations()
//! ```
//!
//! Entries are keyed by sender id and each key has exactly one writer, so
//! last-write-wins per key is enough. Nothing here expires entries: a
//! participant who leaves keeps its last selection in every viewer's map.

use std::collections::BTreeMap;

use crate::broadcast::BroadcastGroup;
use crate::identity::{ConnectionId, ParticipantId};
use crate::protocol::{CursorUpdate, SelectionRange, ServerEvent};

// ───────────────────────────────────────────────────────────────────
// Relay side
// ───────────────────────────────────────────────────────────────────

/// Forwards `cursor-update`s to the rest of the room.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    updates_relayed: u64,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay `update` to everyone in `group` except `sender`, unchanged.
    pub fn publish(&mut self, group: &mut BroadcastGroup, sender: &ConnectionId, update: CursorUpdate) -> usize {
        log::trace!("cursor-update from {} ({sender})", update.user_id);
        self.updates_relayed += 1;
        group.send_except(sender, ServerEvent::CursorUpdate(update))
    }

    pub fn updates_relayed(&self) -> u64 {
        self.updates_relayed
    }
}

// ───────────────────────────────────────────────────────────────────
// Viewer side
// ───────────────────────────────────────────────────────────────────

/// Last known selection of one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSelection {
    pub range: SelectionRange,
    pub color: String,
}

/// One viewer's map of everyone else's selection.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    entries: BTreeMap<ParticipantId, RemoteSelection>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `update`, replacing any earlier entry for the same id.
    pub fn apply(&mut self, update: &CursorUpdate) {
        self.entries.insert(
            update.user_id.clone(),
            RemoteSelection {
                range: update.range,
                color: update.color.clone(),
            },
        );
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteSelection> {
        self.entries.get(id)
    }

    /// Entries ordered by participant id.
    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &RemoteSelection)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
