//! Participant-side session state machine.
//!
//! ```text
//! Connecting ──(roster lists us)──► Joined(room, Idle)
//!                                      │   ▲
//!                          local edit  ▼   │  quiet for idle_after
//!                                   Joined(room, Editing)
//!
//! any phase ──(socket gone)──► Disconnected   (terminal)
//! ```
//!
//! A [`Session`] ties together the local buffer, the selection relay, the
//! roster and the chat log, and is driven by [`RelayEvent`]s from a
//! [`RelayClient`](crate::client::RelayClient).

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::client::{ClientConfig, RelayEvent};
use crate::color::Palette;
use crate::editor::LocalEditorModel;
use crate::identity::{ParticipantId, RoomId, ANONYMOUS_NAME};
use crate::protocol::{ChatMessage, ClientEvent, JoinRequest, RosterEntry, SelectionRange};
use crate::selection::{Decoration, SelectionRelay};

/// Whether the participant is typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Editing,
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Joined { room: RoomId, activity: Activity },
    Disconnected,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Joined { activity: Activity::Idle, .. } => "idle",
            SessionPhase::Joined { activity: Activity::Editing, .. } => "editing",
            SessionPhase::Disconnected => "disconnected",
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, SessionPhase::Joined { .. })
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a session needs a participant id to find itself in the roster")]
    MissingParticipantId,
    #[error("cannot {action} while {phase}")]
    InvalidTransition { phase: &'static str, action: &'static str },
}

/// One participant's view of a room.
#[derive(Debug)]
pub struct Session {
    local: ParticipantId,
    name: String,
    requested_room: RoomId,
    phase: SessionPhase,
    editor: LocalEditorModel,
    selection: SelectionRelay,
    roster: Vec<RosterEntry>,
    chat: Vec<ChatMessage>,
    rejections: Vec<String>,
    idle_after: Duration,
    last_edit: Option<Instant>,
}

impl Session {
    pub fn new(local: ParticipantId, name: impl Into<String>, idle_after: Duration) -> Self {
        let selection = SelectionRelay::new(local.clone(), &Palette::default());
        Self {
            local,
            name: name.into(),
            requested_room: RoomId::default(),
            phase: SessionPhase::Connecting,
            editor: LocalEditorModel::new(),
            selection,
            roster: Vec::new(),
            chat: Vec::new(),
            rejections: Vec::new(),
            idle_after,
            last_edit: None,
        }
    }

    /// Build a session for the identity in `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, SessionError> {
        let id = config.user_id.clone().ok_or(SessionError::MissingParticipantId)?;
        let name = config.name.clone().unwrap_or_else(|| ANONYMOUS_NAME.to_string());
        Ok(Self::new(ParticipantId::from(id), name, config.idle_after))
    }

    /// Fold one relay event into the session.
    pub fn handle(&mut self, event: &RelayEvent) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Disconnected {
            return match event {
                RelayEvent::Disconnected => Ok(()),
                _ => Err(self.invalid("handle events")),
            };
        }

        match event {
            RelayEvent::Connected => {
                if self.phase != SessionPhase::Connecting {
                    return Err(self.invalid("reconnect"));
                }
            }
            RelayEvent::Roster(roster) => self.apply_roster(roster),
            RelayEvent::TextUpdate(text) => self.editor.apply_remote(text.as_str()),
            RelayEvent::CursorUpdate(update) => {
                self.selection.apply_remote(update);
            }
            RelayEvent::ChatUpdate(message) => self.chat.push(message.clone()),
            RelayEvent::Rejected(reason) => {
                log::warn!("Relay rejected a frame from {}: {reason}", self.local);
                self.rejections.push(reason.clone());
            }
            RelayEvent::Disconnected => {
                log::info!("Session for {} disconnected", self.local);
                self.phase = SessionPhase::Disconnected;
            }
        }
        Ok(())
    }

    fn apply_roster(&mut self, roster: &[RosterEntry]) {
        self.roster = roster.to_vec();
        let Some(own) = roster.iter().find(|entry| entry.id == self.local) else {
            return;
        };
        self.selection.set_color(own.color.clone());

        let activity = match &self.phase {
            SessionPhase::Joined { activity, .. } => *activity,
            _ => Activity::Idle,
        };
        self.phase = SessionPhase::Joined {
            room: self.requested_room.clone(),
            activity,
        };
    }

    /// Local keystroke: update the buffer and produce the full-text event.
    pub fn edit(&mut self, text: impl Into<String>, now: Instant) -> Result<ClientEvent, SessionError> {
        if !self.phase.is_joined() {
            return Err(self.invalid("edit"));
        }
        if let SessionPhase::Joined { activity, .. } = &mut self.phase {
            *activity = Activity::Editing;
        }
        self.last_edit = Some(now);
        Ok(self.editor.local_edit(text))
    }

    /// Local selection change.
    pub fn select(&mut self, range: SelectionRange) -> Result<ClientEvent, SessionError> {
        if !self.phase.is_joined() {
            return Err(self.invalid("select"));
        }
        self.editor.set_caret(range);
        Ok(self.selection.local_selection(range))
    }

    /// Post a chat line. It is appended to our own log as well, since the
    /// relay does not echo it back.
    pub fn chat(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<ClientEvent, SessionError> {
        if !self.phase.is_joined() {
            return Err(self.invalid("chat"));
        }
        let message = ChatMessage {
            id: self.local.clone(),
            name: self.name.clone(),
            message: message.into(),
            timestamp: at,
        };
        self.chat.push(message.clone());
        Ok(ClientEvent::ChatUpdate(message))
    }

    /// Ask to move to `room`. The phase follows once the roster arrives.
    pub fn join(&mut self, room: impl Into<String>) -> Result<ClientEvent, SessionError> {
        if self.phase == SessionPhase::Disconnected {
            return Err(self.invalid("join"));
        }
        let mut request = JoinRequest::room(room);
        self.requested_room = request.room.clone();
        request.user_id = Some(self.local.clone());
        request.name = Some(self.name.clone());
        request.color = Some(self.selection.color().to_string());
        Ok(ClientEvent::Join(request))
    }

    /// Drop back to idle once `idle_after` has passed since the last edit.
    /// Returns true when the phase changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let SessionPhase::Joined { activity, .. } = &mut self.phase else {
            return false;
        };
        let quiet = self
            .last_edit
            .is_some_and(|at| now.saturating_duration_since(at) >= self.idle_after);
        if *activity == Activity::Editing && quiet {
            *activity = Activity::Idle;
            return true;
        }
        false
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            phase: self.phase.name(),
            action,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local
    }

    pub fn text(&self) -> &str {
        self.editor.text()
    }

    pub fn editor(&self) -> &LocalEditorModel {
        &self.editor
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn rejections(&self) -> &[String] {
        &self.rejections
    }

    pub fn color(&self) -> &str {
        self.selection.color()
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        self.selection.decorations()
    }
}
