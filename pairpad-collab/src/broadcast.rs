//! Per-room fan-out to connection outboxes.
//!
//! Every connection task owns the receiving half of an unbounded channel;
//! the gateway holds the sending half here. Sends never block, so a fan-out
//! runs to completion before the gateway picks up its next command. A slow
//! consumer is limited only by what its channel and socket will buffer.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::identity::ConnectionId;
use crate::protocol::ServerEvent;

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Receiving half, drained by the connection task.
pub type OutboxReceiver = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// Create a fresh outbox pair.
pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// Counters for monitoring fan-out health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Deliveries skipped because the connection task had already gone away.
    pub messages_dropped: u64,
    pub active_connections: usize,
}

/// All connections currently subscribed to one room.
#[derive(Debug, Default)]
pub struct BroadcastGroup {
    outboxes: IndexMap<ConnectionId, Outbox>,
    messages_sent: u64,
    messages_dropped: u64,
}

impl BroadcastGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection, outbox);
    }

    pub fn remove_connection(&mut self, connection: &ConnectionId) -> Option<Outbox> {
        self.outboxes.shift_remove(connection)
    }

    pub fn has_connection(&self, connection: &ConnectionId) -> bool {
        self.outboxes.contains_key(connection)
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Deliver to every connection, sender included. Returns deliveries made.
    pub fn send_all(&mut self, event: ServerEvent) -> usize {
        self.fan_out(None, Arc::new(event))
    }

    /// Deliver to every connection except `sender`. Returns deliveries made.
    pub fn send_except(&mut self, sender: &ConnectionId, event: ServerEvent) -> usize {
        self.fan_out(Some(sender), Arc::new(event))
    }

    /// Deliver to a single connection.
    pub fn send_to(&mut self, connection: &ConnectionId, event: ServerEvent) -> bool {
        let Some(outbox) = self.outboxes.get(connection) else {
            return false;
        };
        let delivered = outbox.send(Arc::new(event)).is_ok();
        if delivered {
            self.messages_sent += 1;
        } else {
            self.messages_dropped += 1;
        }
        delivered
    }

    fn fan_out(&mut self, skip: Option<&ConnectionId>, event: Arc<ServerEvent>) -> usize {
        let mut delivered = 0;
        for (connection, outbox) in &self.outboxes {
            if Some(connection) == skip {
                continue;
            }
            if outbox.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                self.messages_dropped += 1;
                log::debug!("Outbox for {connection} closed, dropping {}", event.name());
            }
        }
        self.messages_sent += delivered as u64;
        delivered
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
            active_connections: self.outboxes.len(),
        }
    }
}
