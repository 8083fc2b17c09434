//! # pairpad-collab: real-time relay for pair editing
//!
//! Participants join a room, see who else is there, and exchange whole
//! document updates, selection ranges and chat lines. The relay forwards;
//! it never merges. Concurrent edits resolve last-writer-wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────────┐
//! │ RelayClient │ ◄────────────────► │ RelayServer      │
//! │ + Session   │  {v:1, event:...}  │ (conn tasks)     │
//! └──────┬──────┘  JSON or bincode   └────────┬─────────┘
//!        │                                    │ GatewayCommand
//!        ▼                                    ▼
//! ┌─────────────────┐               ┌───────────────────┐
//! │ LocalEditorModel│               │ ConnectionGateway │
//! │ SelectionRelay  │               │ RoomRegistry      │
//! └─────────────────┘               │ ColorAssigner     │
//!                                   │ BroadcastGroup    │
//!                                   └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: versioned envelope and typed events
//! - [`identity`]: ids and handshake parsing
//! - [`color`]: deterministic palette assignment
//! - [`registry`]: room membership
//! - [`broadcast`]: per-room fan-out to outboxes
//! - [`document`] / [`presence`]: text and selection relay
//! - [`gateway`]: the task that owns all relay state
//! - [`server`] / [`client`]: WebSocket transport
//! - [`editor`], [`selection`], [`session`]: participant-side state

pub mod protocol;
pub mod identity;
pub mod color;
pub mod registry;
pub mod broadcast;
pub mod document;
pub mod presence;
pub mod gateway;
pub mod server;
pub mod client;
pub mod editor;
pub mod selection;
pub mod session;

// Re-exports for convenience
pub use protocol::{
    ChatMessage, ClientEvent, CursorUpdate, Encoding, Envelope, Frame, JoinRequest,
    ProtocolError, RosterEntry, SelectionRange, ServerEvent, PROTOCOL_VERSION,
};
pub use identity::{ConnectionId, Handshake, Identity, ParticipantId, RoomId};
pub use color::{ColorAssigner, Palette, DEFAULT_PALETTE};
pub use registry::{JoinOutcome, Participant, RoomRegistry};
pub use broadcast::{BroadcastGroup, BroadcastStats, Outbox};
pub use document::DocumentBroadcastChannel;
pub use presence::{PresenceTracker, RemoteSelection, SelectionState};
pub use gateway::{ConnectionGateway, GatewayClosed, GatewayConfig, GatewayHandle, GatewayStats};
pub use server::{RelayError, RelayServer, ServerConfig};
pub use client::{ClientConfig, ConnectionState, RelayClient, RelayEvent};
pub use editor::LocalEditorModel;
pub use selection::{Decoration, SelectionRelay};
pub use session::{Activity, Session, SessionError, SessionPhase};
