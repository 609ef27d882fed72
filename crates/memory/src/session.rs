//! Conversation sessions.

use crate::buffer::ConversationMemory;
use switchboard_core::error::TurnError;
use switchboard_core::{MemoryEntry, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// One conversation: its memory and how many turns it has seen.
///
/// Sessions share nothing with each other; the reasoning loop borrows one
/// mutably for the length of a turn.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: SessionId,
    memory: ConversationMemory,
    state: SessionState,
    turns: u32,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            memory: ConversationMemory::new(),
            state: SessionState::Active,
            turns: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Number of turns started so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Start the next turn: allocate its index and record the user message.
    pub fn begin_turn(&mut self, input: impl Into<String>) -> Result<u32, TurnError> {
        if !self.is_active() {
            return Err(TurnError::SessionClosed(self.id.to_string()));
        }
        self.turns += 1;
        let turn = self.turns;
        self.memory.append(MemoryEntry::UserMessage {
            turn,
            content: input.into(),
        });
        tracing::debug!(session = %self.id, turn, "Turn started");
        Ok(turn)
    }

    /// Append an entry to this session's memory.
    pub fn append(&mut self, entry: MemoryEntry) -> usize {
        self.memory.append(entry)
    }

    pub fn close(&mut self) {
        if self.state == SessionState::Active {
            tracing::debug!(session = %self.id, turns = self.turns, "Session closed");
        }
        self.state = SessionState::Closed;
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}
