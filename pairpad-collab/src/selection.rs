//! Client-side selection relay and decoration rendering.

use crate::color::Palette;
use crate::identity::ParticipantId;
use crate::presence::SelectionState;
use crate::protocol::{ClientEvent, CursorUpdate, SelectionRange};

/// One highlight to draw in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub participant: ParticipantId,
    pub range: SelectionRange,
    pub color: String,
    /// CSS-style class, `highlight-<color>`.
    pub class_name: String,
}

impl Decoration {
    pub fn class_for(color: &str) -> String {
        format!("highlight-{color}")
    }
}

/// Turns local selections into events and remote ones into decorations.
#[derive(Debug, Clone)]
pub struct SelectionRelay {
    local: ParticipantId,
    color: String,
    remote: SelectionState,
}

impl SelectionRelay {
    /// Starts with the first palette color until a roster says otherwise.
    pub fn new(local: ParticipantId, palette: &Palette) -> Self {
        Self {
            local,
            color: palette.first().to_string(),
            remote: SelectionState::new(),
        }
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local
    }

    /// Event announcing our new selection.
    pub fn local_selection(&self, range: SelectionRange) -> ClientEvent {
        ClientEvent::CursorUpdate(CursorUpdate {
            user_id: self.local.clone(),
            range,
            color: self.color.clone(),
        })
    }

    /// Record a remote selection. Returns false for our own id.
    pub fn apply_remote(&mut self, update: &CursorUpdate) -> bool {
        if update.user_id == self.local {
            return false;
        }
        self.remote.apply(update);
        true
    }

    pub fn state(&self) -> &SelectionState {
        &self.remote
    }

    /// One decoration per remote participant, ordered by id.
    pub fn decorations(&self) -> Vec<Decoration> {
        self.remote
            .iter()
            .map(|(id, selection)| Decoration {
                participant: id.clone(),
                range: selection.range,
                color: selection.color.clone(),
                class_name: Decoration::class_for(&selection.color),
            })
            .collect()
    }
}
