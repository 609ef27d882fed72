//! Built-in system prompts.

use switchboard_core::CapabilityDescriptor;

pub(crate) const TOOL_CALLING_SYSTEM_PROMPT: &str = "\
You are a helpful assistant answering the user's latest message.
You can call the available functions to look things up or compute results. \
Call several functions in one reply when the calls do not depend on each other.
Function results appear in the conversation as `result` lines.
When you have enough information, reply with the final answer as plain text.";

const REACT_INSTRUCTIONS: &str = "\
Use exactly this format:

Thought: what you need to do next
Action: the capability to call, one of [{names}]
Action Input: the arguments as a JSON object

You may write several Action / Action Input pairs after one Thought to call \
capabilities in parallel. Stop after the last Action Input; results appear in \
the conversation as `result` lines.

When you know the answer, write:

Thought: I now know the final answer
Final Answer: the answer to the user's latest message";

/// The ReAct system prompt: preamble, capability list, format rules.
pub(crate) fn react_system_prompt(preamble: Option<&str>, capabilities: &[CapabilityDescriptor]) -> String {
    let listing = if capabilities.is_empty() {
        "(no capabilities are available; answer directly)".to_string()
    } else {
        capabilities
            .iter()
            .map(|c| format!("{}: {} Parameters: {}", c.name, c.description, c.parameters))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let names = capabilities
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{}\n\nYou have access to the following capabilities:\n\n{listing}\n\n{}",
        preamble.unwrap_or("Answer the user's latest message as well as you can."),
        REACT_INSTRUCTIONS.replace("{names}", &names),
    )
}

/// The user message carrying the rendered conversation.
pub(crate) fn context_message(transcript: &str) -> String {
    format!("Conversation so far:\n{transcript}\n\nDecide the next step.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn react_prompt_lists_capabilities_and_names() {
        let caps = vec![
            CapabilityDescriptor::new("calculate", "Evaluate math.", serde_json::json!({"type": "object"})),
            CapabilityDescriptor::new("get_weather", "Current weather.", serde_json::json!({"type": "object"})),
        ];
        let prompt = react_system_prompt(None, &caps);
        assert!(prompt.contains("calculate: Evaluate math."));
        assert!(prompt.contains("one of [calculate, get_weather]"));
        assert!(prompt.contains("Final Answer:"));
    }

    #[test]
    fn custom_preamble_replaces_default() {
        let prompt = react_system_prompt(Some("Be terse."), &[]);
        assert!(prompt.starts_with("Be terse."));
        assert!(prompt.contains("no capabilities are available"));
    }
}
