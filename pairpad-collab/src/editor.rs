//! Local text buffer of one participant.

use crate::protocol::{ClientEvent, SelectionRange};

/// The participant's own copy of the document.
///
/// Local edits replace the buffer and produce a full-text update for the
/// relay. Remote updates overwrite it unconditionally and move the caret
/// back to the start, since there is nothing to map the old position onto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalEditorModel {
    text: String,
    caret: SelectionRange,
    local_edits: u64,
    remote_overwrites: u64,
}

impl LocalEditorModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Apply a local edit and return the event to publish.
    pub fn local_edit(&mut self, text: impl Into<String>) -> ClientEvent {
        self.text = text.into();
        self.local_edits += 1;
        ClientEvent::TextUpdate(self.text.clone())
    }

    /// Overwrite the buffer with text from another participant.
    pub fn apply_remote(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.caret = SelectionRange::default();
        self.remote_overwrites += 1;
    }

    pub fn set_caret(&mut self, caret: SelectionRange) {
        self.caret = caret;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> SelectionRange {
        self.caret
    }

    pub fn local_edits(&self) -> u64 {
        self.local_edits
    }

    pub fn remote_overwrites(&self) -> u64 {
        self.remote_overwrites
    }
}
