//! Render policies.

use std::fmt::Write;
use switchboard_core::{MemoryEntry, RenderPolicy, RenderedContext};

/// Every entry, verbatim, in memory order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullHistory;

impl FullHistory {
    pub const NAME: &'static str = "full_history";
}

impl RenderPolicy for FullHistory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn render(&self, entries: &[MemoryEntry]) -> RenderedContext {
        let mut transcript = String::new();
        for entry in entries {
            render_line(&mut transcript, entry);
            transcript.push('\n');
        }
        RenderedContext {
            policy: Self::NAME.to_string(),
            entries: entries.to_vec(),
            transcript,
        }
    }
}

/// One transcript line per entry.
fn render_line(out: &mut String, entry: &MemoryEntry) {
    // writing to a String cannot fail
    let _ = match entry {
        MemoryEntry::UserMessage { turn, content } => {
            write!(out, "[turn {turn}] user: {content}")
        }
        MemoryEntry::PlannerDecision {
            turn,
            cycle,
            requests,
        } => {
            let calls: Vec<String> = requests
                .iter()
                .map(|r| {
                    format!(
                        "{}#{} {}",
                        r.capability,
                        r.request_id,
                        serde_json::Value::Object(r.arguments.clone())
                    )
                })
                .collect();
            write!(out, "[turn {turn}] plan (cycle {cycle}): {}", calls.join("; "))
        }
        MemoryEntry::InvocationOutcome { turn, outcome } => write!(
            out,
            "[turn {turn}] result {}#{}: {}",
            outcome.capability,
            outcome.request_id,
            outcome.summary()
        ),
        MemoryEntry::AssistantMessage { turn, content } => {
            write!(out, "[turn {turn}] assistant: {content}")
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConversationMemory;
    use proptest::prelude::*;
    use std::time::Duration;
    use switchboard_core::{FailureKind, InvocationOutcome, InvocationRequest, RequestId};

    fn weather_turn() -> Vec<MemoryEntry> {
        let mut args = serde_json::Map::new();
        args.insert("city".into(), serde_json::json!("Paris"));
        let request = InvocationRequest::new(RequestId::new(1, 1, 0), "get_weather", args, 1);
        let outcome = InvocationOutcome::success(
            &request,
            serde_json::json!("Paris: 15°C, clear"),
            Duration::from_millis(12),
        );
        vec![
            MemoryEntry::UserMessage {
                turn: 1,
                content: "What's the weather in Paris?".into(),
            },
            MemoryEntry::PlannerDecision {
                turn: 1,
                cycle: 1,
                requests: vec![request],
            },
            MemoryEntry::InvocationOutcome { turn: 1, outcome },
            MemoryEntry::AssistantMessage {
                turn: 1,
                content: "It is 15°C and clear in Paris.".into(),
            },
        ]
    }

    #[test]
    fn renders_every_entry_in_order() {
        let entries = weather_turn();
        let ctx = FullHistory.render(&entries);
        assert_eq!(ctx.policy, "full_history");
        assert_eq!(ctx.entries, entries);

        let lines: Vec<&str> = ctx.transcript.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "[turn 1] user: What's the weather in Paris?");
        assert_eq!(
            lines[1],
            r#"[turn 1] plan (cycle 1): get_weather#1.1.0 {"city":"Paris"}"#
        );
        assert_eq!(lines[2], "[turn 1] result get_weather#1.1.0: Paris: 15°C, clear");
        assert_eq!(lines[3], "[turn 1] assistant: It is 15°C and clear in Paris.");
    }

    #[test]
    fn failures_render_with_their_kind() {
        let request = InvocationRequest::new(
            RequestId::new(2, 1, 0),
            "get_news",
            serde_json::Map::new(),
            2,
        );
        let outcome = InvocationOutcome::failure(
            &request,
            FailureKind::ConnectionError,
            "server news disconnected",
            Duration::ZERO,
        );
        let ctx = FullHistory.render(&[MemoryEntry::InvocationOutcome { turn: 2, outcome }]);
        assert_eq!(
            ctx.transcript,
            "[turn 2] result get_news#2.1.0: Error (connection_error): server news disconnected\n"
        );
    }

    #[test]
    fn empty_memory_renders_empty_transcript() {
        let ctx = ConversationMemory::new().render(&FullHistory);
        assert!(ctx.entries.is_empty());
        assert!(ctx.transcript.is_empty());
    }

    proptest! {
        #[test]
        fn identical_memories_render_identically(contents in prop::collection::vec(".{0,40}", 0..12)) {
            let mut a = ConversationMemory::new();
            let mut b = ConversationMemory::new();
            for (i, content) in contents.iter().enumerate() {
                let entry = if i % 2 == 0 {
                    MemoryEntry::UserMessage { turn: i as u32 / 2 + 1, content: content.clone() }
                } else {
                    MemoryEntry::AssistantMessage { turn: i as u32 / 2 + 1, content: content.clone() }
                };
                a.append(entry.clone());
                b.append(entry);
            }
            prop_assert_eq!(a.render(&FullHistory), b.render(&FullHistory));
        }
    }
}
