//! Capability trait and capability sets.

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchboard_core::protocol::{KIND_UNKNOWN_CAPABILITY, ServiceError};
use switchboard_core::{CapabilityDescriptor, CapabilityService};
use tracing::debug;

/// One operation a capability server offers.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "calculate").
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the planner).
    fn description(&self) -> &str;

    /// JSON Schema describing this capability's parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the capability.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ServiceError>;

    /// The descriptor advertised in discovery.
    fn to_descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// An ordered group of capabilities served under one server name.
pub struct CapabilitySet {
    server: String,
    capabilities: Vec<Box<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            capabilities: Vec::new(),
        }
    }

    /// Add a capability, replacing any with the same name.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        match self
            .capabilities
            .iter()
            .position(|c| c.name() == capability.name())
        {
            Some(i) => self.capabilities[i] = capability,
            None => self.capabilities.push(capability),
        }
    }

    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.register(Box::new(capability));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[async_trait]
impl CapabilityService for CapabilitySet {
    fn server_name(&self) -> &str {
        &self.server
    }

    fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities.iter().map(|c| c.to_descriptor()).collect()
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, ServiceError> {
        let capability = self.get(name).ok_or_else(|| {
            ServiceError::new(KIND_UNKNOWN_CAPABILITY, format!("Unknown capability: {name}"))
        })?;
        debug!(server = %self.server, capability = %name, "Executing capability");
        capability.execute(arguments).await
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────

pub(crate) fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ServiceError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::invalid_arguments(format!("Missing '{key}' argument")))
}

pub(crate) fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Accepts numbers and numeric strings; planners send both.
pub(crate) fn required_f64(args: &Map<String, Value>, key: &str) -> Result<f64, ServiceError> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ServiceError::invalid_arguments(format!("Missing or non-numeric '{key}' argument")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::protocol::KIND_INVALID_ARGUMENTS;

    struct Echo(&'static str);

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ServiceError> {
            Ok(Value::String(required_str(&arguments, "text")?.to_string()))
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn descriptors_keep_registration_order() {
        let set = CapabilitySet::new("test").with(Echo("b")).with(Echo("a"));
        let names: Vec<String> = set.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(set.descriptors()[0].required_parameters(), vec!["text"]);
    }

    #[test]
    fn register_replaces_same_name() {
        let set = CapabilitySet::new("test").with(Echo("a")).with(Echo("a"));
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn invoke_dispatches_by_name() {
        let set = CapabilitySet::new("test").with(Echo("echo"));
        let out = set
            .invoke("echo", args(serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn unknown_and_invalid_calls_carry_kinds() {
        let set = CapabilitySet::new("test").with(Echo("echo"));
        let err = set.invoke("nope", Map::new()).await.unwrap_err();
        assert_eq!(err.kind, KIND_UNKNOWN_CAPABILITY);

        let err = set.invoke("echo", Map::new()).await.unwrap_err();
        assert_eq!(err.kind, KIND_INVALID_ARGUMENTS);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let a = args(serde_json::json!({"v": "21.5", "w": 3, "x": true}));
        assert_eq!(required_f64(&a, "v").unwrap(), 21.5);
        assert_eq!(required_f64(&a, "w").unwrap(), 3.0);
        assert!(required_f64(&a, "x").is_err());
        assert!(required_f64(&a, "missing").is_err());
    }
}
