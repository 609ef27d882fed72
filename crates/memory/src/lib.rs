//! Conversation memory for Switchboard.
//!
//! A session's memory is an append-only log of [`MemoryEntry`] values.
//! [`RenderPolicy`] implementations decide how that log is shown to the
//! planner; only [`FullHistory`] ships here.
//!
//! [`MemoryEntry`]: switchboard_core::MemoryEntry
//! [`RenderPolicy`]: switchboard_core::RenderPolicy

pub mod buffer;
pub mod policy;
pub mod session;

pub use buffer::ConversationMemory;
pub use policy::FullHistory;
pub use session::{ConversationSession, SessionState};
