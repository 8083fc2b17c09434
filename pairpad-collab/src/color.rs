//! Deterministic participant → color assignment.
//!
//! Colors are handed out in encounter order over a fixed palette and
//! wrap around once the palette is exhausted, so the Nth distinct id
//! (1-indexed) always lands on slot `(N - 1) % palette.len()`.

use std::collections::HashMap;

use crate::identity::ParticipantId;

/// The ten baseline highlight colors.
pub const DEFAULT_PALETTE: [&str; 10] = [
    "#FF6B6B", "#6BCB77", "#4D96FF", "#FFD93D", "#845EC2",
    "#FF9671", "#0081CF", "#FFC75F", "#D65DB1", "#00C9A7",
];

/// A finite, ordered, non-empty list of colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<String>,
}

impl Palette {
    /// Build a palette from arbitrary colors. Returns `None` for an empty list.
    pub fn new<I, S>(colors: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let colors: Vec<String> = colors.into_iter().map(Into::into).collect();
        if colors.is_empty() {
            return None;
        }
        Some(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color at `slot`, wrapping cyclically.
    pub fn get(&self, slot: usize) -> &str {
        &self.colors[slot % self.colors.len()]
    }

    pub fn first(&self) -> &str {
        self.get(0)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Remembers the palette slot given to every id seen so far.
///
/// Assignments live as long as the assigner; nothing is persisted.
#[derive(Debug, Default)]
pub struct ColorAssigner {
    palette: Palette,
    slots: HashMap<ParticipantId, usize>,
    next_slot: usize,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_palette(palette: Palette) -> Self {
        Self {
            palette,
            slots: HashMap::new(),
            next_slot: 0,
        }
    }

    /// Palette slot for `id`, assigning the next one on first sight.
    pub fn slot_for(&mut self, id: &ParticipantId) -> usize {
        if let Some(slot) = self.slots.get(id) {
            return *slot;
        }
        let slot = self.next_slot % self.palette.len();
        self.next_slot += 1;
        self.slots.insert(id.clone(), slot);
        log::trace!("Assigned palette slot {slot} to {id}");
        slot
    }

    /// Color for `id`, assigning one on first sight.
    pub fn color_for(&mut self, id: &ParticipantId) -> &str {
        let slot = self.slot_for(id);
        self.palette.get(slot)
    }

    /// Color already assigned to `id`, without assigning.
    pub fn peek(&self, id: &ParticipantId) -> Option<&str> {
        self.slots.get(id).map(|slot| self.palette.get(*slot))
    }

    /// Number of ids seen so far.
    pub fn assigned(&self) -> usize {
        self.slots.len()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    #[test]
    fn test_first_ids_take_slots_in_order() {
        let mut colors = ColorAssigner::new();
        assert_eq!(colors.color_for(&pid("alice")), "#FF6B6B");
        assert_eq!(colors.color_for(&pid("bob")), "#6BCB77");
        assert_eq!(colors.color_for(&pid("carol")), "#4D96FF");
    }

    #[test]
    fn test_assignment_is_stable() {
        let mut colors = ColorAssigner::new();
        let first = colors.color_for(&pid("alice")).to_string();
        colors.color_for(&pid("bob"));
        colors.color_for(&pid("carol"));
        assert_eq!(colors.color_for(&pid("alice")), first);
        assert_eq!(colors.assigned(), 3);
    }

    #[test]
    fn test_nth_id_gets_slot_n_minus_one_mod_len() {
        let mut colors = ColorAssigner::new();
        let len = colors.palette().len();
        for n in 1..=25 {
            let slot = colors.slot_for(&pid(&format!("user-{n}")));
            assert_eq!(slot, (n - 1) % len);
        }
    }

    #[test]
    fn test_wraps_after_palette_exhausted() {
        let mut colors = ColorAssigner::new();
        let first = colors.color_for(&pid("user-0")).to_string();
        for i in 1..10 {
            colors.color_for(&pid(&format!("user-{i}")));
        }
        // Eleventh distinct id shares the first id's color.
        assert_eq!(colors.color_for(&pid("user-10")), first);
    }

    #[test]
    fn test_peek_does_not_assign() {
        let mut colors = ColorAssigner::new();
        assert!(colors.peek(&pid("alice")).is_none());
        assert_eq!(colors.assigned(), 0);
        colors.color_for(&pid("alice"));
        assert_eq!(colors.peek(&pid("alice")), Some("#FF6B6B"));
    }

    #[test]
    fn test_custom_palette() {
        let palette = Palette::new(["red", "blue"]).unwrap();
        let mut colors = ColorAssigner::with_palette(palette);
        assert_eq!(colors.color_for(&pid("a")), "red");
        assert_eq!(colors.color_for(&pid("b")), "blue");
        assert_eq!(colors.color_for(&pid("c")), "red");
    }

    #[test]
    fn test_empty_palette_rejected() {
        assert!(Palette::new(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_default_palette_has_ten_entries() {
        assert_eq!(Palette::default().len(), 10);
        assert_eq!(Palette::default().first(), "#FF6B6B");
    }
}
