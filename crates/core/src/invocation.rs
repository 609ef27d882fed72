//! Invocation requests and outcomes.
//!
//! The reasoning loop creates one `InvocationRequest` per planner-chosen
//! call; the adapter that serves it always answers with an
//! `InvocationOutcome`, never an error. Every failure mode is encoded in
//! [`OutcomeStatus`] so the planner can see it on the next cycle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of one invocation within a session.
///
/// Built deterministically from the turn, the cycle within the turn, and
/// the position in the planner's batch, so replaying a session produces the
/// same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(turn: u32, cycle: u32, index: usize) -> Self {
        Self(format!("{turn}.{cycle}.{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to invoke one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub request_id: RequestId,

    /// Name of the capability to invoke
    pub capability: String,

    /// Named arguments
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,

    /// The user turn this request belongs to
    pub turn: u32,

    /// Overrides the router's default invocation timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl InvocationRequest {
    pub fn new(
        request_id: RequestId,
        capability: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        turn: u32,
    ) -> Self {
        Self {
            request_id,
            capability: capability.into(),
            arguments,
            turn,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// The per-request timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server was unreachable or disconnected mid-call
    ConnectionError,
    /// The server answered with something that is not a valid response
    ProtocolError,
    /// No live server advertises the requested name
    UnknownCapability,
    /// The capability ran and reported an application-level error
    CapabilityError,
    /// The wait was abandoned before an answer arrived
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::ProtocolError => "protocol_error",
            Self::UnknownCapability => "unknown_capability",
            Self::CapabilityError => "capability_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        payload: serde_json::Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
    Timeout {
        message: String,
    },
}

/// The outcome of one `InvocationRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// The request this outcome answers
    pub request_id: RequestId,

    /// Capability that was invoked
    pub capability: String,

    #[serde(flatten)]
    pub status: OutcomeStatus,

    /// Wall-clock time spent waiting for the result
    pub elapsed_ms: u64,
}

impl InvocationOutcome {
    pub fn success(request: &InvocationRequest, payload: serde_json::Value, elapsed: Duration) -> Self {
        Self::with_status(request, OutcomeStatus::Success { payload }, elapsed)
    }

    pub fn failure(
        request: &InvocationRequest,
        kind: FailureKind,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self::with_status(
            request,
            OutcomeStatus::Failure {
                kind,
                message: message.into(),
            },
            elapsed,
        )
    }

    pub fn timeout(request: &InvocationRequest, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::with_status(
            request,
            OutcomeStatus::Timeout {
                message: message.into(),
            },
            elapsed,
        )
    }

    fn with_status(request: &InvocationRequest, status: OutcomeStatus, elapsed: Duration) -> Self {
        Self {
            request_id: request.request_id.clone(),
            capability: request.capability.clone(),
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            OutcomeStatus::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.status, OutcomeStatus::Timeout { .. })
    }

    /// Human-readable rendering of the result, as shown to the planner.
    ///
    /// String payloads are shown verbatim; other JSON is shown compactly.
    pub fn summary(&self) -> String {
        match &self.status {
            OutcomeStatus::Success { payload } => match payload {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            OutcomeStatus::Failure { kind, message } => format!("Error ({kind}): {message}"),
            OutcomeStatus::Timeout { message } => format!("Timed out: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InvocationRequest {
        let mut args = serde_json::Map::new();
        args.insert("city".into(), serde_json::json!("Paris"));
        InvocationRequest::new(RequestId::new(1, 1, 0), "get_weather", args, 1)
    }

    #[test]
    fn request_ids_are_deterministic() {
        assert_eq!(RequestId::new(2, 3, 1).as_str(), "2.3.1");
        assert_eq!(RequestId::new(2, 3, 1), RequestId::new(2, 3, 1));
    }

    #[test]
    fn outcome_status_is_flattened_with_tag() {
        let outcome = InvocationOutcome::success(
            &request(),
            serde_json::json!("15°C, sunny"),
            Duration::from_millis(12),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["payload"], "15°C, sunny");
        assert_eq!(json["request_id"], "1.1.0");
    }

    #[test]
    fn failure_summary_names_kind() {
        let outcome = InvocationOutcome::failure(
            &request(),
            FailureKind::ConnectionError,
            "server exited",
            Duration::ZERO,
        );
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ConnectionError));
        assert_eq!(outcome.summary(), "Error (connection_error): server exited");
    }

    #[test]
    fn timeout_override_roundtrips_through_millis() {
        let req = request().with_timeout(Duration::from_secs(2));
        assert_eq!(req.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(request().timeout(), None);
    }

    #[test]
    fn structured_payload_summary_is_compact_json() {
        let outcome = InvocationOutcome::success(
            &request(),
            serde_json::json!({"temp": 15}),
            Duration::ZERO,
        );
        assert_eq!(outcome.summary(), r#"{"temp":15}"#);
    }
}
