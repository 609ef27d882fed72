//! Capability registry and router for Switchboard.
//!
//! The [`Registry`] is the flat namespace of capability names across every
//! connected server. The [`Router`] resolves a request's name through it,
//! invokes the owning server, and supervises servers so a disconnect
//! removes their capabilities until a reconnection succeeds.

pub mod registry;
pub mod router;

pub use registry::Registry;
pub use router::{Router, RouterOptions};
