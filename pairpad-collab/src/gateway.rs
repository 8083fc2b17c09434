//! Connection lifecycle and the task that owns all relay state.
//!
//! ```text
//! conn task A ──┐                      ┌── RoomRegistry
//! conn task B ──┼── GatewayCommand ──► ├── ColorAssigner
//! conn task C ──┘   (unbounded mpsc)   ├── BroadcastGroup per room ──► outboxes
//!                                      ├── DocumentBroadcastChannel
//!                                      └── PresenceTracker
//! ```
//!
//! A [`ConnectionGateway`] is an ordinary owned value. [`ConnectionGateway::spawn`]
//! moves it onto one task that applies commands strictly one after another,
//! so membership, color and relay state are never touched concurrently and
//! need no locks. The task ends, handing the gateway back, once every
//! [`GatewayHandle`] has been dropped.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastGroup, Outbox};
use crate::color::{ColorAssigner, Palette};
use crate::document::DocumentBroadcastChannel;
use crate::identity::{ConnectionId, Identity, ParticipantId, RoomId};
use crate::presence::PresenceTracker;
use crate::protocol::{ClientEvent, RosterEntry, ServerEvent};
use crate::registry::{JoinOutcome, Participant, RoomRegistry};

/// Gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Room every new connection is placed in.
    pub default_room: RoomId,
    /// Colors handed out to participants.
    pub palette: Palette,
}

/// Gateway statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub total_connections: u64,
    pub active_connections: usize,
    pub active_rooms: usize,
    pub text_updates: u64,
    /// Text bytes handed to receivers, summed over every recipient.
    pub text_bytes_relayed: u64,
    pub cursor_updates: u64,
    pub chat_messages: u64,
    pub join_requests: u64,
    pub rejected_frames: u64,
    pub messages_dropped: u64,
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
    room: RoomId,
    participant: ParticipantId,
    name: String,
}

/// Owns membership, colors and fan-out for every room.
#[derive(Debug)]
pub struct ConnectionGateway {
    config: GatewayConfig,
    registry: RoomRegistry,
    colors: ColorAssigner,
    groups: HashMap<RoomId, BroadcastGroup>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    documents: DocumentBroadcastChannel,
    presence: PresenceTracker,
    total_connections: u64,
    chat_messages: u64,
    join_requests: u64,
    rejected_frames: u64,
    /// Drops counted by groups that have since been torn down.
    retired_drops: u64,
}

impl ConnectionGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let colors = ColorAssigner::with_palette(config.palette.clone());
        Self {
            config,
            registry: RoomRegistry::new(),
            colors,
            groups: HashMap::new(),
            connections: HashMap::new(),
            documents: DocumentBroadcastChannel::new(),
            presence: PresenceTracker::new(),
            total_connections: 0,
            chat_messages: 0,
            join_requests: 0,
            rejected_frames: 0,
            retired_drops: 0,
        }
    }

    /// Register a fresh connection in the default room and broadcast the roster.
    pub fn connect(&mut self, connection: ConnectionId, identity: Identity, outbox: Outbox) -> JoinOutcome {
        if self.connections.contains_key(&connection) {
            log::warn!("Connection {connection} connected twice; ignoring");
            return JoinOutcome::AlreadyPresent;
        }

        let id = identity.participant_id();
        let name = identity.display_name().to_string();
        let room = self.config.default_room.clone();
        self.total_connections += 1;

        log::info!(
            "Connection {connection} is {} {id} ({name})",
            if identity.is_anonymous() { "anonymous" } else { "participant" },
        );
        self.enter_room(connection, &room, id, name, outbox)
    }

    /// Apply one inbound event. Returns the number of deliveries it caused.
    pub fn handle(&mut self, connection: ConnectionId, event: ClientEvent) -> usize {
        let Some(entry) = self.connections.get(&connection) else {
            log::warn!("Dropping {} from unknown connection {connection}", event.name());
            return 0;
        };
        let room = entry.room.clone();

        match event {
            ClientEvent::Join(request) => self.rejoin(connection, request.room),
            ClientEvent::TextUpdate(text) => match self.groups.get_mut(&room) {
                Some(group) => self.documents.publish(group, &connection, text),
                None => 0,
            },
            ClientEvent::CursorUpdate(update) => match self.groups.get_mut(&room) {
                Some(group) => self.presence.publish(group, &connection, update),
                None => 0,
            },
            ClientEvent::ChatUpdate(message) => {
                self.chat_messages += 1;
                match self.groups.get_mut(&room) {
                    Some(group) => {
                        let delivered = group.send_except(&connection, ServerEvent::ChatUpdate(message));
                        log::debug!("chat-update from {connection} to {delivered} peers");
                        delivered
                    }
                    None => 0,
                }
            }
        }
    }

    /// Tell one connection that its frame was dropped at ingress.
    pub fn reject(&mut self, connection: ConnectionId, reason: String) -> bool {
        self.rejected_frames += 1;
        let Some(entry) = self.connections.get(&connection) else {
            return false;
        };
        match self.groups.get_mut(&entry.room) {
            Some(group) => group.send_to(&connection, ServerEvent::Rejected { reason }),
            None => false,
        }
    }

    /// Remove a connection and broadcast the shrunken roster.
    ///
    /// Membership is removed by participant id, so when two connections
    /// share an id the first to close takes the id off the roster.
    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        match self.exit_room(connection) {
            Some((entry, _)) => {
                log::info!("{} left room {} (connection {connection})", entry.participant, entry.room);
                true
            }
            None => false,
        }
    }

    pub fn roster(&self, room: &RoomId) -> Vec<RosterEntry> {
        self.registry.snapshot(room)
    }

    pub fn room_of(&self, connection: &ConnectionId) -> Option<&RoomId> {
        self.connections.get(connection).map(|e| &e.room)
    }

    pub fn stats(&self) -> GatewayStats {
        let live_drops: u64 = self.groups.values().map(|g| g.stats().messages_dropped).sum();
        GatewayStats {
            total_connections: self.total_connections,
            active_connections: self.connections.len(),
            active_rooms: self.registry.room_count(),
            text_updates: self.documents.updates_relayed(),
            text_bytes_relayed: self.documents.bytes_relayed(),
            cursor_updates: self.presence.updates_relayed(),
            chat_messages: self.chat_messages,
            join_requests: self.join_requests,
            rejected_frames: self.rejected_frames,
            messages_dropped: self.retired_drops + live_drops,
        }
    }

    fn enter_room(
        &mut self,
        connection: ConnectionId,
        room: &RoomId,
        id: ParticipantId,
        name: String,
        outbox: Outbox,
    ) -> JoinOutcome {
        let color = self.colors.color_for(&id).to_string();
        let participant = Participant {
            id: id.clone(),
            name: name.clone(),
            color,
        };
        let outcome = self.registry.join(room, participant);
        if outcome == JoinOutcome::AlreadyPresent {
            log::info!("{id} already present in room {room}; keeping the existing entry");
        }

        self.groups.entry(room.clone()).or_default().add_connection(connection, outbox);
        self.connections.insert(
            connection,
            ConnectionEntry {
                room: room.clone(),
                participant: id,
                name,
            },
        );
        self.broadcast_roster(room);
        outcome
    }

    fn exit_room(&mut self, connection: ConnectionId) -> Option<(ConnectionEntry, Option<Outbox>)> {
        let entry = self.connections.remove(&connection)?;

        let (outbox, now_empty) = match self.groups.get_mut(&entry.room) {
            Some(group) => (group.remove_connection(&connection), group.is_empty()),
            None => (None, false),
        };
        if now_empty {
            if let Some(group) = self.groups.remove(&entry.room) {
                self.retired_drops += group.stats().messages_dropped;
            }
        }

        self.registry.leave(&entry.room, &entry.participant);
        self.broadcast_roster(&entry.room);
        Some((entry, outbox))
    }

    fn rejoin(&mut self, connection: ConnectionId, target: RoomId) -> usize {
        self.join_requests += 1;
        let Some(entry) = self.connections.get(&connection).cloned() else {
            return 0;
        };

        if entry.room == target {
            let color = self.colors.color_for(&entry.participant).to_string();
            self.registry.join(
                &target,
                Participant {
                    id: entry.participant,
                    name: entry.name,
                    color,
                },
            );
            return self.broadcast_roster(&target);
        }

        log::info!("{} moving from room {} to {target}", entry.participant, entry.room);
        let Some((entry, Some(outbox))) = self.exit_room(connection) else {
            return 0;
        };
        self.enter_room(connection, &target, entry.participant, entry.name, outbox);
        self.groups.get(&target).map_or(0, BroadcastGroup::connection_count)
    }

    fn broadcast_roster(&mut self, room: &RoomId) -> usize {
        let roster = self.registry.snapshot(room);
        let count = roster.len();
        match self.groups.get_mut(room) {
            Some(group) => {
                let delivered = group.send_all(ServerEvent::Users(roster));
                log::debug!("Roster of room {room} ({count} members) sent to {delivered} connections");
                delivered
            }
            None => 0,
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Task wrapper
    // ───────────────────────────────────────────────────────────────

    /// Move the gateway onto its own task.
    pub fn spawn(self) -> (GatewayHandle, JoinHandle<ConnectionGateway>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (GatewayHandle { tx }, task)
    }

    /// Apply commands until every handle is gone, then hand the gateway back.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<GatewayCommand>) -> Self {
        while let Some(command) = commands.recv().await {
            self.apply(command);
        }
        log::info!("Gateway stopped after {} connections", self.total_connections);
        self
    }

    pub fn apply(&mut self, command: GatewayCommand) {
        match command {
            GatewayCommand::Connect { connection, identity, outbox } => {
                self.connect(connection, identity, outbox);
            }
            GatewayCommand::Event { connection, event } => {
                self.handle(connection, event);
            }
            GatewayCommand::Reject { connection, reason } => {
                self.reject(connection, reason);
            }
            GatewayCommand::Disconnect { connection } => {
                self.disconnect(connection);
            }
            GatewayCommand::Roster { room, reply } => {
                let _ = reply.send(self.roster(&room));
            }
            GatewayCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }
}

/// Commands accepted by the gateway task.
#[derive(Debug)]
pub enum GatewayCommand {
    Connect {
        connection: ConnectionId,
        identity: Identity,
        outbox: Outbox,
    },
    Event {
        connection: ConnectionId,
        event: ClientEvent,
    },
    Reject {
        connection: ConnectionId,
        reason: String,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Roster {
        room: RoomId,
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    Stats {
        reply: oneshot::Sender<GatewayStats>,
    },
}

/// The gateway task has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gateway task has stopped")]
pub struct GatewayClosed;

/// Cloneable sender side of the gateway task.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::UnboundedSender<GatewayCommand>,
}

impl GatewayHandle {
    fn send(&self, command: GatewayCommand) -> Result<(), GatewayClosed> {
        self.tx.send(command).map_err(|_| GatewayClosed)
    }

    pub fn connect(&self, connection: ConnectionId, identity: Identity, outbox: Outbox) -> Result<(), GatewayClosed> {
        self.send(GatewayCommand::Connect { connection, identity, outbox })
    }

    pub fn dispatch(&self, connection: ConnectionId, event: ClientEvent) -> Result<(), GatewayClosed> {
        self.send(GatewayCommand::Event { connection, event })
    }

    pub fn reject(&self, connection: ConnectionId, reason: impl Into<String>) -> Result<(), GatewayClosed> {
        self.send(GatewayCommand::Reject { connection, reason: reason.into() })
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<(), GatewayClosed> {
        self.send(GatewayCommand::Disconnect { connection })
    }

    pub async fn roster(&self, room: RoomId) -> Result<Vec<RosterEntry>, GatewayClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayCommand::Roster { room, reply })?;
        rx.await.map_err(|_| GatewayClosed)
    }

    pub async fn stats(&self) -> Result<GatewayStats, GatewayClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayCommand::Stats { reply })?;
        rx.await.map_err(|_| GatewayClosed)
    }
}
