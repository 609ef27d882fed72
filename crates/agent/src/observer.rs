//! Observer that writes loop progress to `tracing`.

use switchboard_core::{LoopEvent, LoopObserver};
use tracing::{debug, info, warn};

/// Logs each loop transition at a level matching its weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoopObserver for TracingObserver {
    fn on_event(&self, event: &LoopEvent) {
        match event {
            LoopEvent::TurnStarted { session_id, turn, .. } => {
                debug!(session = %session_id, turn, "turn started");
            }
            LoopEvent::Planning { turn, cycle } => debug!(turn, cycle, "planning"),
            LoopEvent::Invoking { turn, cycle, requests } => {
                let names: Vec<&str> = requests.iter().map(|r| r.capability.as_str()).collect();
                info!(turn, cycle, capabilities = ?names, "invoking");
            }
            LoopEvent::InvocationFinished { turn, outcome } => {
                if outcome.is_success() {
                    debug!(turn, request_id = %outcome.request_id, elapsed_ms = outcome.elapsed_ms, "invocation succeeded");
                } else {
                    warn!(turn, request_id = %outcome.request_id, outcome = %outcome.summary(), "invocation failed");
                }
            }
            LoopEvent::Answered { turn, cycles, .. } => info!(turn, cycles, "answered"),
            LoopEvent::TurnFailed { turn, reason } => warn!(turn, reason = %reason, "turn failed"),
        }
    }
}
