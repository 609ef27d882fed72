//! The reasoning loop: the heart of Switchboard.
//!
//! Each user turn follows a **Plan → Invoke → Observe** cycle:
//!
//! 1. **Record** the user message in the session's memory
//! 2. **Plan**: render memory with the configured policy and hand it, with
//!    the live capability descriptors, to the planner
//! 3. **Invoke**: route every requested invocation concurrently; append the
//!    outcomes in request order and go back to step 2
//! 4. **Answer**: record the final answer and return it
//!
//! The loop ends at a final answer, a planner failure, an exhausted cycle
//! budget or an expired turn deadline.

pub mod loop_runner;
pub mod observer;

pub use loop_runner::{LoopOptions, ReasoningLoop, TurnAnswer};
pub use observer::TracingObserver;
