//! Append-only conversation buffer.

use switchboard_core::{MemoryEntry, RenderPolicy, RenderedContext};

/// The ordered log of everything that happened in one session.
///
/// Entries can be appended and read, never changed or removed.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    entries: Vec<MemoryEntry>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its position.
    pub fn append(&mut self, entry: MemoryEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&MemoryEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries belonging to one turn, in order.
    pub fn turn_entries(&self, turn: u32) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().filter(move |e| e.turn() == turn)
    }

    /// Render through `policy`.
    pub fn render(&self, policy: &dyn RenderPolicy) -> RenderedContext {
        policy.render(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(turn: u32, content: &str) -> MemoryEntry {
        MemoryEntry::UserMessage {
            turn,
            content: content.into(),
        }
    }

    #[test]
    fn append_returns_positions_in_order() {
        let mut mem = ConversationMemory::new();
        assert!(mem.is_empty());
        assert_eq!(mem.append(user(1, "a")), 0);
        assert_eq!(mem.append(user(1, "b")), 1);
        assert_eq!(mem.append(user(2, "c")), 2);
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.get(1), Some(&user(1, "b")));
        assert_eq!(mem.last(), Some(&user(2, "c")));
    }

    #[test]
    fn turn_entries_filters_by_turn() {
        let mut mem = ConversationMemory::new();
        mem.append(user(1, "a"));
        mem.append(MemoryEntry::AssistantMessage {
            turn: 1,
            content: "x".into(),
        });
        mem.append(user(2, "b"));
        assert_eq!(mem.turn_entries(1).count(), 2);
        assert_eq!(mem.turn_entries(2).count(), 1);
        assert_eq!(mem.turn_entries(3).count(), 0);
    }
}
