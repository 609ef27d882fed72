//! Memory entries: the immutable records of a conversation session.
//!
//! A session's memory is an ordered, append-only log of these entries.
//! The order is turn first, then the sub-step within the turn, and it is
//! exactly the order in which entries were appended.

use crate::invocation::{InvocationOutcome, InvocationRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record of something that happened during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEntry {
    /// Input from the user that opened a turn
    UserMessage { turn: u32, content: String },

    /// The planner chose to invoke these capabilities
    PlannerDecision {
        turn: u32,
        cycle: u32,
        requests: Vec<InvocationRequest>,
    },

    /// The result of one invocation
    InvocationOutcome {
        turn: u32,
        outcome: InvocationOutcome,
    },

    /// The final answer for a turn
    AssistantMessage { turn: u32, content: String },
}

impl MemoryEntry {
    pub fn turn(&self) -> u32 {
        match self {
            Self::UserMessage { turn, .. }
            | Self::PlannerDecision { turn, .. }
            | Self::InvocationOutcome { turn, .. }
            | Self::AssistantMessage { turn, .. } => *turn,
        }
    }

    /// Short tag used in logs and transcripts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user",
            Self::PlannerDecision { .. } => "decision",
            Self::InvocationOutcome { .. } => "outcome",
            Self::AssistantMessage { .. } => "assistant",
        }
    }
}

/// The material handed to the planner for one planning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedContext {
    /// Name of the policy that produced this context
    pub policy: String,

    /// The entries the policy chose to include, in memory order
    pub entries: Vec<MemoryEntry>,

    /// Plain-text transcript of `entries`
    pub transcript: String,
}

/// Strategy that turns a session's memory into planning context.
///
/// Implementations must be pure functions of the entry slice: two sessions
/// with identical entries must render identically. Windowing, summarizing
/// or retrieval policies plug in here without touching the reasoning loop.
pub trait RenderPolicy: Send + Sync {
    /// A short name for this policy (e.g., "full_history").
    fn name(&self) -> &str;

    /// Render the given entries.
    fn render(&self, entries: &[MemoryEntry]) -> RenderedContext;
}
