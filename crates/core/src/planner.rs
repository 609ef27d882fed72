//! Planner trait: the abstraction over the planning oracle.
//!
//! A planner looks at the rendered conversation and the capabilities that
//! are currently available and decides what happens next: invoke one or
//! more capabilities, or answer the user. The reasoning loop calls
//! `plan()` without knowing whether a hosted language model, a local model
//! or a scripted test double sits behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityDescriptor;
use crate::error::PlannerError;
use crate::memory::{RenderedContext, SessionId};

/// Everything the planner gets for one planning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningRequest {
    pub session_id: SessionId,

    /// The current user turn
    pub turn: u32,

    /// Planning step within the turn, starting at 1
    pub cycle: u32,

    /// Conversation memory as rendered by the active policy
    pub context: RenderedContext,

    /// Capabilities currently in the registry, sorted by name
    pub capabilities: Vec<CapabilityDescriptor>,
}

/// One capability call chosen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedInvocation {
    pub capability: String,

    #[serde(default)]
    pub arguments: serde_json::Value,

    /// Optional per-call timeout override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl PlannedInvocation {
    pub fn new(capability: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            capability: capability.into(),
            arguments,
            timeout_ms: None,
        }
    }
}

/// What the planner decided.
///
/// A closed variant: anything a planner produces that does not fit one of
/// these shapes is a `PlannerError::Malformed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "value", rename_all = "snake_case")]
pub enum PlannerDecision {
    /// Invoke these capabilities; they are independent of each other.
    Invoke(Vec<PlannedInvocation>),

    /// Answer the user and end the turn.
    FinalAnswer(String),
}

impl PlannerDecision {
    /// Check the decision's shape before the loop acts on it.
    ///
    /// Rejects empty invocation batches, blank capability names, argument
    /// values that are not JSON objects (null is accepted as "no
    /// arguments"), and blank final answers.
    pub fn validate(&self) -> Result<(), PlannerError> {
        match self {
            Self::Invoke(calls) => {
                if calls.is_empty() {
                    return Err(PlannerError::Malformed(
                        "invoke decision carries no invocations".into(),
                    ));
                }
                for call in calls {
                    if call.capability.trim().is_empty() {
                        return Err(PlannerError::Malformed(
                            "invocation with an empty capability name".into(),
                        ));
                    }
                    if !(call.arguments.is_object() || call.arguments.is_null()) {
                        return Err(PlannerError::Malformed(format!(
                            "arguments for '{}' are not an object: {}",
                            call.capability, call.arguments
                        )));
                    }
                }
                Ok(())
            }
            Self::FinalAnswer(text) => {
                if text.trim().is_empty() {
                    Err(PlannerError::Malformed("final answer is empty".into()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// The core Planner trait.
#[async_trait]
pub trait Planner: Send + Sync {
    /// A human-readable name for this planner (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Decide the next step.
    async fn plan(&self, request: PlanningRequest) -> Result<PlannerDecision, PlannerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_invoke_is_malformed() {
        let err = PlannerDecision::Invoke(vec![]).validate().unwrap_err();
        assert!(matches!(err, PlannerError::Malformed(_)));
    }

    #[test]
    fn non_object_arguments_are_malformed() {
        let decision = PlannerDecision::Invoke(vec![PlannedInvocation::new(
            "get_weather",
            serde_json::json!(["Paris"]),
        )]);
        assert!(decision.validate().is_err());
    }

    #[test]
    fn null_arguments_are_accepted() {
        let decision = PlannerDecision::Invoke(vec![PlannedInvocation::new(
            "get_current_time",
            serde_json::Value::Null,
        )]);
        assert!(decision.validate().is_ok());
    }

    #[test]
    fn blank_final_answer_is_malformed() {
        assert!(PlannerDecision::FinalAnswer("   ".into()).validate().is_err());
        assert!(PlannerDecision::FinalAnswer("ok".into()).validate().is_ok());
    }

    #[test]
    fn decision_serializes_with_tag() {
        let json = serde_json::to_string(&PlannerDecision::FinalAnswer("hi".into())).unwrap();
        assert_eq!(json, r#"{"decision":"final_answer","value":"hi"}"#);
    }
}
