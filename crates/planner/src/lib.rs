//! Planning oracles for Switchboard.
//!
//! All planners implement the `switchboard_core::Planner` trait.
//! [`from_config`] builds the configured one.

pub mod openai_compat;
mod prompt;
pub mod react;
pub mod scripted;

pub use openai_compat::OpenAiCompatPlanner;
pub use scripted::ScriptedPlanner;

use std::sync::Arc;
use switchboard_config::PlannerConfig;
use switchboard_core::Planner;
use switchboard_core::error::PlannerError;

/// Build the planner described by `config`.
pub fn from_config(config: &PlannerConfig) -> Result<Arc<dyn Planner>, PlannerError> {
    Ok(Arc::new(OpenAiCompatPlanner::from_config(config)?))
}
