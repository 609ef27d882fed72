//! Loop events: progress notifications from the reasoning loop.
//!
//! The loop reports every state transition to its observers. Progress
//! reporting (CLI printing, tracing, streaming to a client) hangs off this
//! interface instead of being woven into control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::invocation::{InvocationOutcome, InvocationRequest};

/// Events emitted by the reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// A user turn started
    TurnStarted {
        session_id: String,
        turn: u32,
        timestamp: DateTime<Utc>,
    },

    /// Entered `AwaitingPlan`
    Planning { turn: u32, cycle: u32 },

    /// Entered `Invoking` with this batch
    Invoking {
        turn: u32,
        cycle: u32,
        requests: Vec<InvocationRequest>,
    },

    /// One invocation resolved
    InvocationFinished {
        turn: u32,
        outcome: InvocationOutcome,
    },

    /// Entered `Answered`
    Answered {
        turn: u32,
        cycles: u32,
        content: String,
    },

    /// The turn ended without an answer
    TurnFailed { turn: u32, reason: String },
}

impl LoopEvent {
    /// Short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::Planning { .. } => "planning",
            Self::Invoking { .. } => "invoking",
            Self::InvocationFinished { .. } => "invocation_finished",
            Self::Answered { .. } => "answered",
            Self::TurnFailed { .. } => "turn_failed",
        }
    }
}

/// Receives loop events as they happen.
///
/// Called inline on the loop's task; implementations must not block.
pub trait LoopObserver: Send + Sync {
    fn on_event(&self, event: &LoopEvent);
}

/// A broadcast-based event bus for loop events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<LoopEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LoopEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LoopEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LoopObserver for EventBus {
    fn on_event(&self, event: &LoopEvent) {
        self.publish(event.clone());
    }
}
