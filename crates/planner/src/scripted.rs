//! A planner that replays a fixed script of decisions.
//!
//! Used for offline runs and tests: each `plan()` call pops the next step
//! and records the request it was given.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use switchboard_core::error::PlannerError;
use switchboard_core::{Planner, PlannerDecision, PlanningRequest};

#[derive(Default)]
pub struct ScriptedPlanner {
    steps: Mutex<VecDeque<Result<PlannerDecision, PlannerError>>>,
    seen: Mutex<Vec<PlanningRequest>>,
    delay: Option<Duration>,
}

impl ScriptedPlanner {
    pub fn new(steps: impl IntoIterator<Item = PlannerDecision>) -> Self {
        Self::with_results(steps.into_iter().map(Ok))
    }

    /// A script that may include planner failures.
    pub fn with_results(steps: impl IntoIterator<Item = Result<PlannerDecision, PlannerError>>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append a step after construction.
    pub fn push(&self, step: Result<PlannerDecision, PlannerError>) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<PlanningRequest> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn plan(&self, request: PlanningRequest) -> Result<PlannerDecision, PlannerError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(PlannerError::Malformed("planner script exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{RenderedContext, SessionId};

    fn request(cycle: u32) -> PlanningRequest {
        PlanningRequest {
            session_id: SessionId::from("s"),
            turn: 1,
            cycle,
            context: RenderedContext {
                policy: "full_history".into(),
                entries: vec![],
                transcript: String::new(),
            },
            capabilities: vec![],
        }
    }

    #[tokio::test]
    async fn replays_in_order_then_reports_exhaustion() {
        let planner = ScriptedPlanner::new([
            PlannerDecision::FinalAnswer("one".into()),
            PlannerDecision::FinalAnswer("two".into()),
        ]);
        assert_eq!(
            planner.plan(request(1)).await.unwrap(),
            PlannerDecision::FinalAnswer("one".into())
        );
        assert_eq!(
            planner.plan(request(2)).await.unwrap(),
            PlannerDecision::FinalAnswer("two".into())
        );
        assert!(matches!(planner.plan(request(3)).await, Err(PlannerError::Malformed(_))));

        let cycles: Vec<u32> = planner.requests().iter().map(|r| r.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 3]);
        assert_eq!(planner.remaining(), 0);
    }

    #[tokio::test]
    async fn scripted_failures_are_returned() {
        let planner = ScriptedPlanner::with_results([Err(PlannerError::Network("down".into()))]);
        assert!(matches!(planner.plan(request(1)).await, Err(PlannerError::Network(_))));
    }
}
