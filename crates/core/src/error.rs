//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; failures below the turn
//! level are normally folded into an `InvocationOutcome` instead of being
//! propagated.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all Switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Capability server errors ---
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    NameCollision(#[from] NameCollisionError),

    #[error("Registry error: {0}")]
    UnknownCapability(#[from] UnknownCapabilityError),

    // --- Planning / turn errors ---
    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure to launch or attach to a capability server.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Failed to spawn '{command}' for server {server}: {reason}")]
    Spawn {
        server: String,
        command: String,
        reason: String,
    },

    #[error("Handshake with {server} failed: {reason}")]
    Handshake { server: String, reason: String },

    #[error("Handshake with {server} timed out after {}ms", .after.as_millis())]
    HandshakeTimeout { server: String, after: Duration },

    #[error("No in-process service registered for server {0}")]
    NoService(String),

    #[error("Server {0} is disconnected")]
    Disconnected(String),
}

/// Failure while listing a server's capabilities.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("Discovery on {server} timed out after {}ms", .after.as_millis())]
    Timeout { server: String, after: Duration },

    #[error("Discovery on {server} failed: {reason}")]
    Failed { server: String, reason: String },

    #[error("Server {server} returned an invalid capability listing: {reason}")]
    InvalidListing { server: String, reason: String },
}

/// Two live servers advertise the same capability name.
#[derive(Debug, Clone, Error)]
#[error("Capability '{name}' from {incoming} collides with the one already registered by {existing}")]
pub struct NameCollisionError {
    pub name: String,
    pub existing: String,
    pub incoming: String,
}

/// The planner asked for a capability the registry does not know.
#[derive(Debug, Clone, Error)]
#[error("Unknown capability: {0}")]
pub struct UnknownCapabilityError(pub String);

/// Errors raised at the planning-oracle boundary.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    #[error("Planner timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Malformed planner output: {0}")]
    Malformed(String),

    #[error("Planner request failed: {message} (status: {status_code})")]
    Provider { status_code: u16, message: String },

    #[error("Planner network error: {0}")]
    Network(String),

    #[error("Planner not configured: {0}")]
    NotConfigured(String),
}

/// Terminal failures of a single user turn.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("Turn budget of {max_cycles} invocation cycles exhausted")]
    BudgetExceeded { max_cycles: u32 },

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Turn deadline of {}ms expired", .0.as_millis())]
    DeadlineExceeded(Duration),

    #[error("Session {0} is closed")]
    SessionClosed(String),
}

/// Transport-level failures between an adapter and its server process.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_error_names_both_servers() {
        let err = Error::NameCollision(NameCollisionError {
            name: "get_weather".into(),
            existing: "weather".into(),
            incoming: "weather-v2".into(),
        });
        let text = err.to_string();
        assert!(text.contains("get_weather"));
        assert!(text.contains("weather-v2"));
    }

    #[test]
    fn planner_timeout_displays_millis() {
        let err = TurnError::Planner(PlannerError::Timeout(Duration::from_millis(1500)));
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn budget_error_is_distinct_from_planner_error() {
        let err = TurnError::BudgetExceeded { max_cycles: 3 };
        assert!(!matches!(err, TurnError::Planner(_)));
        assert!(err.to_string().contains('3'));
    }
}
