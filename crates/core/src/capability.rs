//! Capability descriptors: what a capability server advertises.
//!
//! A descriptor is the static metadata the planner sees when deciding what
//! to invoke. Descriptors are immutable once advertised; they disappear from
//! the registry when the server that owns them disconnects.

use serde::{Deserialize, Serialize};

/// Static metadata for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique name within the registry (e.g., "get_weather").
    pub name: String,

    /// What the capability does (sent to the planner).
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the capability's parameters.
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names of the parameters marked as required in the schema.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Validate a descriptor coming off the wire.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("capability name is empty".into());
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(format!("capability name '{}' contains whitespace", self.name));
        }
        if !self.parameters.is_object() {
            return Err(format!(
                "parameter schema of '{}' is not a JSON object",
                self.name
            ));
        }
        Ok(())
    }
}
