//! The reasoning loop implementation.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use switchboard_config::AppConfig;
use switchboard_core::error::{PlannerError, TurnError};
use switchboard_core::{
    InvocationOutcome, InvocationRequest, LoopEvent, LoopObserver, MemoryEntry, PlannedInvocation,
    Planner, PlannerDecision, PlanningRequest, RenderPolicy, RequestId,
};
use switchboard_memory::{ConversationSession, FullHistory};
use switchboard_router::Router;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Invoke cycles allowed per turn
    pub max_cycles: u32,

    /// Upper bound on one planner call
    pub planner_timeout: Duration,

    /// Wall-clock bound on a whole turn
    pub turn_deadline: Option<Duration>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            planner_timeout: Duration::from_secs(60),
            turn_deadline: None,
        }
    }
}

impl LoopOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_cycles: config.agent.max_cycles,
            planner_timeout: config.planner.timeout(),
            turn_deadline: config.agent.turn_deadline_ms.map(Duration::from_millis),
        }
    }
}

/// The result of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnAnswer {
    pub turn: u32,
    pub content: String,

    /// Invoke cycles executed before the answer
    pub cycles: u32,

    /// Invocations issued across those cycles
    pub invocations: usize,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Drives turns: plan, invoke, observe, until the planner answers.
pub struct ReasoningLoop {
    router: Arc<Router>,
    planner: Arc<dyn Planner>,
    policy: Arc<dyn RenderPolicy>,
    options: LoopOptions,
    observers: Vec<Arc<dyn LoopObserver>>,
}

impl ReasoningLoop {
    /// A loop with the full-history render policy and default options.
    pub fn new(router: Arc<Router>, planner: Arc<dyn Planner>) -> Self {
        Self {
            router,
            planner,
            policy: Arc::new(FullHistory),
            options: LoopOptions::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn RenderPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_cycles(mut self, max: u32) -> Self {
        self.options.max_cycles = max;
        self
    }

    pub fn with_planner_timeout(mut self, timeout: Duration) -> Self {
        self.options.planner_timeout = timeout;
        self
    }

    pub fn with_turn_deadline(mut self, deadline: Duration) -> Self {
        self.options.turn_deadline = Some(deadline);
        self
    }

    /// Register an observer; it sees every event of every later turn.
    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    fn emit(&self, event: LoopEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Run one user turn to completion.
    ///
    /// Everything the turn produces is appended to `session`'s memory:
    /// the user message, each executed planner decision, every invocation
    /// outcome in request order, and the final answer. A failed turn keeps
    /// whatever it appended before failing.
    pub async fn run_turn(
        &self,
        session: &mut ConversationSession,
        input: impl Into<String>,
    ) -> Result<TurnAnswer, TurnError> {
        let turn = session.begin_turn(input)?;
        let deadline = self.options.turn_deadline.map(|budget| Deadline {
            at: Instant::now() + budget,
            budget,
        });

        info!(session = %session.id(), turn, "Processing turn");
        self.emit(LoopEvent::TurnStarted {
            session_id: session.id().to_string(),
            turn,
            timestamp: chrono::Utc::now(),
        });

        let result = self.drive(session, turn, deadline).await;
        match &result {
            Ok(answer) => info!(
                session = %session.id(),
                turn,
                cycles = answer.cycles,
                invocations = answer.invocations,
                "Turn answered"
            ),
            Err(e) => {
                warn!(session = %session.id(), turn, error = %e, "Turn failed");
                self.emit(LoopEvent::TurnFailed {
                    turn,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        session: &mut ConversationSession,
        turn: u32,
        deadline: Option<Deadline>,
    ) -> Result<TurnAnswer, TurnError> {
        let mut executed: u32 = 0;
        let mut invocations: usize = 0;

        loop {
            // ── AwaitingPlan ──
            let cycle = executed + 1;
            self.emit(LoopEvent::Planning { turn, cycle });
            let request = PlanningRequest {
                session_id: session.id().clone(),
                turn,
                cycle,
                context: session.memory().render(self.policy.as_ref()),
                capabilities: self.router.descriptors().await,
            };
            debug!(
                turn,
                cycle,
                entries = request.context.entries.len(),
                capabilities = request.capabilities.len(),
                "Planning"
            );

            match self.plan(request, deadline).await? {
                // ── Answered ──
                PlannerDecision::FinalAnswer(content) => {
                    session.append(MemoryEntry::AssistantMessage {
                        turn,
                        content: content.clone(),
                    });
                    self.emit(LoopEvent::Answered {
                        turn,
                        cycles: executed,
                        content: content.clone(),
                    });
                    return Ok(TurnAnswer {
                        turn,
                        content,
                        cycles: executed,
                        invocations,
                    });
                }

                // ── Invoking ──
                PlannerDecision::Invoke(planned) => {
                    if executed >= self.options.max_cycles {
                        return Err(TurnError::BudgetExceeded {
                            max_cycles: self.options.max_cycles,
                        });
                    }
                    executed += 1;

                    let requests = build_requests(turn, cycle, planned);
                    session.append(MemoryEntry::PlannerDecision {
                        turn,
                        cycle,
                        requests: requests.clone(),
                    });
                    self.emit(LoopEvent::Invoking {
                        turn,
                        cycle,
                        requests: requests.clone(),
                    });

                    let (outcomes, expired) = self.invoke_all(turn, &requests, deadline).await;
                    invocations += outcomes.len();
                    for outcome in outcomes {
                        session.append(MemoryEntry::InvocationOutcome { turn, outcome });
                    }

                    if expired && let Some(deadline) = deadline {
                        return Err(TurnError::DeadlineExceeded(deadline.budget));
                    }
                }
            }
        }
    }

    /// One planner call, bounded by the planner timeout and the turn
    /// deadline, whichever comes first.
    async fn plan(
        &self,
        request: PlanningRequest,
        deadline: Option<Deadline>,
    ) -> Result<PlannerDecision, TurnError> {
        let timeout = self.options.planner_timeout;
        let planner_bound = Instant::now() + timeout;
        let call = self.planner.plan(request);

        let decision = match deadline {
            Some(deadline) if deadline.at <= planner_bound => {
                match tokio::time::timeout_at(deadline.at, call).await {
                    Ok(result) => result?,
                    Err(_) => return Err(TurnError::DeadlineExceeded(deadline.budget)),
                }
            }
            _ => match tokio::time::timeout_at(planner_bound, call).await {
                Ok(result) => result?,
                Err(_) => return Err(PlannerError::Timeout(timeout).into()),
            },
        };

        decision.validate()?;
        Ok(decision)
    }

    /// Route every request concurrently. Outcomes come back in request
    /// order; the flag is set when the turn deadline cut any of them short.
    async fn invoke_all(
        &self,
        turn: u32,
        requests: &[InvocationRequest],
        deadline: Option<Deadline>,
    ) -> (Vec<InvocationOutcome>, bool) {
        let started = Instant::now();
        let calls = requests.iter().map(|request| async move {
            let routed = self.router.route(request);
            let (outcome, expired) = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline.at, routed).await {
                    Ok(outcome) => (outcome, false),
                    Err(_) => (
                        InvocationOutcome::timeout(
                            request,
                            format!("turn deadline of {}ms expired", deadline.budget.as_millis()),
                            started.elapsed(),
                        ),
                        true,
                    ),
                },
                None => (routed.await, false),
            };
            debug!(
                request_id = %outcome.request_id,
                capability = %outcome.capability,
                success = outcome.is_success(),
                elapsed_ms = outcome.elapsed_ms,
                "Invocation finished"
            );
            self.emit(LoopEvent::InvocationFinished {
                turn,
                outcome: outcome.clone(),
            });
            (outcome, expired)
        });

        let results = join_all(calls).await;
        let expired = results.iter().any(|(_, expired)| *expired);
        (results.into_iter().map(|(outcome, _)| outcome).collect(), expired)
    }
}

/// Number the planner's invocations for this cycle.
fn build_requests(turn: u32, cycle: u32, planned: Vec<PlannedInvocation>) -> Vec<InvocationRequest> {
    planned
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let arguments = match call.arguments {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            let mut request = InvocationRequest::new(
                RequestId::new(turn, cycle, index),
                call.capability,
                arguments,
                turn,
            );
            request.timeout_ms = call.timeout_ms;
            request
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_capabilities::utils::utils_server;
    use switchboard_core::{EventBus, FailureKind, ServerSpec};
    use switchboard_planner::ScriptedPlanner;
    use switchboard_router::RouterOptions;
    use switchboard_servers::{ConnectorSet, InProcessConnector};

    async fn utils_router() -> Arc<Router> {
        let in_process = Arc::new(InProcessConnector::new());
        in_process.register("utils", Arc::new(utils_server()));
        let router = Router::new(
            Arc::new(ConnectorSet::with_in_process(in_process)),
            RouterOptions::default(),
        );
        router.connect(ServerSpec::in_process("utils")).await.unwrap();
        Arc::new(router)
    }

    fn calculate(expression: &str) -> PlannedInvocation {
        PlannedInvocation::new("calculate", json!({ "expression": expression }))
    }

    #[test]
    fn requests_are_numbered_by_turn_cycle_index() {
        let mut timed = calculate("1+1");
        timed.timeout_ms = Some(250);
        let requests = build_requests(
            3,
            2,
            vec![calculate("2+2"), timed, PlannedInvocation::new("get_current_time", json!(null))],
        );
        let ids: Vec<&str> = requests.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["3.2.0", "3.2.1", "3.2.2"]);
        assert_eq!(requests[1].timeout_ms, Some(250));
        assert!(requests[2].arguments.is_empty());
        assert!(requests.iter().all(|r| r.turn == 3));
    }

    #[tokio::test]
    async fn direct_answer_appends_two_entries() {
        let planner = Arc::new(ScriptedPlanner::new([PlannerDecision::FinalAnswer("Hello!".into())]));
        let agent = ReasoningLoop::new(utils_router().await, planner.clone());
        let mut session = ConversationSession::new();

        let answer = agent.run_turn(&mut session, "Hi").await.unwrap();
        assert_eq!(answer.content, "Hello!");
        assert_eq!(answer.cycles, 0);
        assert_eq!(answer.invocations, 0);

        let kinds: Vec<&str> = session.memory().entries().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["user_message", "assistant_message"]);

        let seen = planner.requests();
        assert_eq!(seen[0].capabilities.len(), 3);
        assert_eq!(seen[0].context.entries.len(), 1);
    }

    #[tokio::test]
    async fn outcomes_feed_the_next_plan() {
        let planner = Arc::new(ScriptedPlanner::new([
            PlannerDecision::Invoke(vec![calculate("6*7")]),
            PlannerDecision::FinalAnswer("42".into()),
        ]));
        let agent = ReasoningLoop::new(utils_router().await, planner.clone());
        let mut session = ConversationSession::new();

        let answer = agent.run_turn(&mut session, "What is 6*7?").await.unwrap();
        assert_eq!(answer.cycles, 1);
        assert_eq!(answer.invocations, 1);

        let second = &planner.requests()[1];
        assert_eq!(second.cycle, 2);
        assert!(second.context.transcript.contains("Result: 6*7 = 42"));
    }

    #[tokio::test]
    async fn failures_are_recorded_not_raised() {
        let planner = Arc::new(ScriptedPlanner::new([
            PlannerDecision::Invoke(vec![calculate("1/0"), PlannedInvocation::new("teleport", json!({}))]),
            PlannerDecision::FinalAnswer("Cannot do that.".into()),
        ]));
        let agent = ReasoningLoop::new(utils_router().await, planner);
        let mut session = ConversationSession::new();

        agent.run_turn(&mut session, "Divide by zero, then teleport").await.unwrap();
        let outcomes: Vec<&InvocationOutcome> = session
            .memory()
            .entries()
            .iter()
            .filter_map(|e| match e {
                MemoryEntry::InvocationOutcome { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes[0].failure_kind(), Some(FailureKind::CapabilityError));
        assert_eq!(outcomes[1].failure_kind(), Some(FailureKind::UnknownCapability));
    }

    #[tokio::test]
    async fn planner_error_ends_turn_without_appending() {
        let planner = Arc::new(ScriptedPlanner::with_results([Err(PlannerError::Provider {
            status_code: 500,
            message: "boom".into(),
        })]));
        let agent = ReasoningLoop::new(utils_router().await, planner);
        let mut session = ConversationSession::new();

        let err = agent.run_turn(&mut session, "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::Planner(PlannerError::Provider { status_code: 500, .. })));
        assert_eq!(session.memory().len(), 1);
    }

    #[tokio::test]
    async fn malformed_decision_is_a_planner_error() {
        let planner = Arc::new(ScriptedPlanner::new([PlannerDecision::Invoke(vec![])]));
        let agent = ReasoningLoop::new(utils_router().await, planner);
        let mut session = ConversationSession::new();

        let err = agent.run_turn(&mut session, "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::Planner(PlannerError::Malformed(_))));
        assert_eq!(session.memory().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_planner_times_out() {
        let planner = Arc::new(
            ScriptedPlanner::new([PlannerDecision::FinalAnswer("late".into())])
                .with_delay(Duration::from_secs(120)),
        );
        let agent = ReasoningLoop::new(utils_router().await, planner)
            .with_planner_timeout(Duration::from_secs(60));
        let mut session = ConversationSession::new();

        let err = agent.run_turn(&mut session, "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::Planner(PlannerError::Timeout(d)) if d == Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_while_planning_is_deadline_exceeded() {
        let planner = Arc::new(
            ScriptedPlanner::new([PlannerDecision::FinalAnswer("late".into())])
                .with_delay(Duration::from_secs(10)),
        );
        let agent = ReasoningLoop::new(utils_router().await, planner)
            .with_turn_deadline(Duration::from_secs(5));
        let mut session = ConversationSession::new();

        let err = agent.run_turn(&mut session, "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::DeadlineExceeded(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn closed_session_rejects_turns() {
        let planner = Arc::new(ScriptedPlanner::default());
        let agent = ReasoningLoop::new(utils_router().await, planner.clone());
        let mut session = ConversationSession::new();
        session.close();

        let err = agent.run_turn(&mut session, "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::SessionClosed(_)));
        assert_eq!(planner.calls(), 0);
        assert!(session.memory().is_empty());
    }

    #[tokio::test]
    async fn observers_see_each_transition() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let planner = Arc::new(ScriptedPlanner::new([
            PlannerDecision::Invoke(vec![calculate("2+2")]),
            PlannerDecision::FinalAnswer("4".into()),
        ]));
        let agent = ReasoningLoop::new(utils_router().await, planner).with_observer(bus.clone());
        let mut session = ConversationSession::new();
        agent.run_turn(&mut session, "2+2?").await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "turn_started",
                "planning",
                "invoking",
                "invocation_finished",
                "planning",
                "answered"
            ]
        );
    }

    #[test]
    fn options_follow_config() {
        let mut config = AppConfig::default();
        config.agent.max_cycles = 7;
        config.agent.turn_deadline_ms = Some(1500);
        let options = LoopOptions::from_config(&config);
        assert_eq!(options.max_cycles, 7);
        assert_eq!(options.turn_deadline, Some(Duration::from_millis(1500)));
        assert_eq!(options.planner_timeout, Duration::from_secs(60));
        assert_eq!(LoopOptions::default().max_cycles, 10);
    }
}
