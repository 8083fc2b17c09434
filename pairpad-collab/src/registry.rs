//! Authoritative room membership.
//!
//! Each room keeps its participants in insertion order, deduplicated by
//! participant id. The registry is plain owned data: it is only ever
//! touched from the gateway task, so it carries no locks.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::identity::{ParticipantId, RoomId};
use crate::protocol::RosterEntry;

/// One connected identity inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub color: String,
}

impl Participant {
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
        }
    }
}

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The id was already a member. Nothing changed, metadata included.
    AlreadyPresent,
}

#[derive(Debug, Default)]
struct Room {
    members: IndexMap<ParticipantId, Participant>,
}

/// Membership for every room, keyed by room id.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `participant` to `room` unless its id is already there.
    pub fn join(&mut self, room: &RoomId, participant: Participant) -> JoinOutcome {
        let members = &mut self.rooms.entry(room.clone()).or_default().members;
        if members.contains_key(&participant.id) {
            return JoinOutcome::AlreadyPresent;
        }
        members.insert(participant.id.clone(), participant);
        JoinOutcome::Joined
    }

    /// Remove `id` from `room`. Empty rooms are dropped.
    pub fn leave(&mut self, room: &RoomId, id: &ParticipantId) -> Option<Participant> {
        let entry = self.rooms.get_mut(room)?;
        let removed = entry.members.shift_remove(id);
        if entry.members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Ordered roster of `room`. Unknown rooms yield an empty roster.
    pub fn snapshot(&self, room: &RoomId) -> Vec<RosterEntry> {
        self.rooms
            .get(room)
            .map(|r| r.members.values().map(Participant::roster_entry).collect())
            .unwrap_or_default()
    }

    pub fn participant(&self, room: &RoomId, id: &ParticipantId) -> Option<&Participant> {
        self.rooms.get(room)?.members.get(id)
    }

    pub fn contains(&self, room: &RoomId, id: &ParticipantId) -> bool {
        self.participant(room, id).is_some()
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, |r| r.members.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
