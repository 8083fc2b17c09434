//! Connection, participant and room identifiers, plus handshake parsing.
//!
//! The identity layer may hand us a stable participant id and a display
//! name through the connect query string. When it does not, the
//! connection's own id stands in. The two cases are kept apart as
//! [`Identity::Identified`] and [`Identity::Anonymous`] so that the
//! reconnect ambiguity (same stable id twice) stays visible.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::Encoding;

/// Display name used when the handshake carries none.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Room every connection lands in unless it asks for another.
pub const DEFAULT_ROOM: &str = "default";

/// Transport-assigned id, unique per socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Participant id as seen on the wire and in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<ConnectionId> for ParticipantId {
    fn from(id: ConnectionId) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self(DEFAULT_ROOM.to_string())
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a connection claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The identity layer supplied a stable id.
    Identified { id: ParticipantId, name: Option<String> },
    /// No id supplied; the connection id is used instead.
    Anonymous { connection: ConnectionId, name: Option<String> },
}

impl Identity {
    pub fn participant_id(&self) -> ParticipantId {
        match self {
            Identity::Identified { id, .. } => id.clone(),
            Identity::Anonymous { connection, .. } => ParticipantId::from(*connection),
        }
    }

    pub fn display_name(&self) -> &str {
        let name = match self {
            Identity::Identified { name, .. } | Identity::Anonymous { name, .. } => name,
        };
        name.as_deref().unwrap_or(ANONYMOUS_NAME)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous { .. })
    }
}

/// Parameters carried on the connect query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub encoding: Encoding,
}

impl Handshake {
    /// Parse `userId`, `name` and `encoding` from a raw query string.
    ///
    /// Empty values count as absent. Unknown keys are ignored, and so is an
    /// unrecognised `encoding`, which leaves the JSON default in place.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut handshake = Handshake::default();
        let Some(query) = query else {
            return handshake;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "userId" => handshake.user_id = Some(value.into_owned()),
                "name" => handshake.name = Some(value.into_owned()),
                "encoding" => match value.parse::<Encoding>() {
                    Ok(encoding) => handshake.encoding = encoding,
                    Err(_) => log::warn!("Ignoring unknown encoding {value:?} in handshake"),
                },
                _ => {}
            }
        }
        handshake
    }

    /// Resolve the handshake into an identity for `connection`.
    pub fn identity(&self, connection: ConnectionId) -> Identity {
        match &self.user_id {
            Some(id) => Identity::Identified {
                id: ParticipantId::new(id.clone()),
                name: self.name.clone(),
            },
            None => Identity::Anonymous {
                connection,
                name: self.name.clone(),
            },
        }
    }

    /// Render back into a query string (used by the client).
    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(id) = &self.user_id {
            query.append_pair("userId", id);
        }
        if let Some(name) = &self.name {
            query.append_pair("name", name);
        }
        query.append_pair("encoding", self.encoding.as_str());
        query.finish()
    }
}
