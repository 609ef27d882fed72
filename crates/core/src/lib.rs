//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the Switchboard
//! capability-routed reasoning loop. This crate defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Planner`]: the planning oracle (`switchboard-planner`)
//! - [`RenderPolicy`]: how memory becomes planning context (`switchboard-memory`)
//! - [`CapabilityService`]: the server side of the wire protocol
//!   (`switchboard-capabilities`)
//! - [`LoopObserver`]: progress reporting (`switchboard-agent`, the CLI)

pub mod capability;
pub mod error;
pub mod event;
pub mod invocation;
pub mod memory;
pub mod planner;
pub mod protocol;
pub mod server;

// Re-export key types at crate root for ergonomics
pub use capability::CapabilityDescriptor;
pub use error::{Error, Result};
pub use event::{EventBus, LoopEvent, LoopObserver};
pub use invocation::{FailureKind, InvocationOutcome, InvocationRequest, OutcomeStatus, RequestId};
pub use memory::{MemoryEntry, RenderPolicy, RenderedContext, SessionId};
pub use planner::{PlannedInvocation, Planner, PlannerDecision, PlanningRequest};
pub use protocol::{CapabilityService, ServiceError};
pub use server::{ServerSpec, TransportKind};
