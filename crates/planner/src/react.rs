//! Parser for ReAct-style planner output.
//!
//! ```text
//! Thought: I need the weather in Paris
//! Action: get_weather
//! Action Input: {"city": "Paris"}
//! ```
//!
//! or
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: It is 18°C and sunny in Paris.
//! ```
//!
//! Several `Action` / `Action Input` pairs in one reply become one batch of
//! independent invocations. Text that fits neither shape is
//! [`PlannerError::Malformed`].

use serde_json::Value;
use switchboard_core::error::PlannerError;
use switchboard_core::{PlannedInvocation, PlannerDecision};

const THOUGHT: &str = "Thought:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const FINAL_ANSWER: &str = "Final Answer:";

fn is_keyword(line: &str) -> bool {
    [THOUGHT, ACTION, ACTION_INPUT, OBSERVATION, FINAL_ANSWER]
        .iter()
        .any(|k| line.starts_with(k))
}

/// Parse one ReAct reply into a decision.
pub fn parse(text: &str) -> Result<PlannerDecision, PlannerError> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut invocations = Vec::new();
    let mut final_answer: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some(rest) = line.strip_prefix(FINAL_ANSWER) {
            let mut answer = vec![rest.trim()];
            answer.extend(lines[i + 1..].iter().copied());
            final_answer = Some(answer.join("\n").trim().to_string());
            break;
        }

        if let Some(name) = line.strip_prefix(ACTION) {
            let name = name.trim().trim_matches('`').to_string();
            i += 1;
            while i < lines.len() && lines[i].is_empty() {
                i += 1;
            }
            let Some(first) = lines.get(i).and_then(|l| l.strip_prefix(ACTION_INPUT)) else {
                return Err(PlannerError::Malformed(format!(
                    "Action '{name}' is not followed by an Action Input"
                )));
            };

            let mut input = vec![first.trim()];
            i += 1;
            while i < lines.len() && !is_keyword(lines[i]) {
                input.push(lines[i]);
                i += 1;
            }
            let arguments = parse_input(&name, &input.join("\n"))?;
            invocations.push(PlannedInvocation::new(name, arguments));
            continue;
        }

        i += 1;
    }

    match (final_answer, invocations.is_empty()) {
        (Some(_), false) => Err(PlannerError::Malformed(
            "output contains both an Action and a Final Answer".into(),
        )),
        (Some(answer), true) => {
            let decision = PlannerDecision::FinalAnswer(answer);
            decision.validate()?;
            Ok(decision)
        }
        (None, false) => Ok(PlannerDecision::Invoke(invocations)),
        (None, true) => Err(PlannerError::Malformed(
            "output contains neither an Action nor a Final Answer".into(),
        )),
    }
}

fn parse_input(name: &str, raw: &str) -> Result<Value, PlannerError> {
    let raw = strip_fence(raw.trim());
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(serde_json::Map::new())),
        Ok(other) => Err(PlannerError::Malformed(format!(
            "Action Input for '{name}' must be a JSON object, got {other}"
        ))),
        Err(e) => Err(PlannerError::Malformed(format!(
            "Action Input for '{name}' is not valid JSON: {e}"
        ))),
    }
}

fn strip_fence(s: &str) -> &str {
    let Some(inner) = s.strip_prefix("```") else {
        return s;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
