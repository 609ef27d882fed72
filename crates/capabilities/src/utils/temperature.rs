//! `convert_temperature`: Celsius, Fahrenheit and Kelvin.

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchboard_core::protocol::ServiceError;

use super::format_number;
use crate::capability::{Capability, required_f64, required_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl Unit {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "c" | "celsius" => Some(Self::Celsius),
            "f" | "fahrenheit" => Some(Self::Fahrenheit),
            "k" | "kelvin" => Some(Self::Kelvin),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }

    fn to_celsius(self, value: f64) -> f64 {
        match self {
            Self::Celsius => value,
            Self::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            Self::Kelvin => value - 273.15,
        }
    }

    fn celsius_to_unit(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            Self::Kelvin => celsius + 273.15,
        }
    }
}

pub struct ConvertTemperatureCapability;

#[async_trait]
impl Capability for ConvertTemperatureCapability {
    fn name(&self) -> &str {
        "convert_temperature"
    }

    fn description(&self) -> &str {
        "Convert a temperature between Celsius, Fahrenheit and Kelvin."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "value": { "type": "number", "description": "The temperature to convert" },
                "from_unit": {
                    "type": "string",
                    "description": "Source unit: celsius, fahrenheit or kelvin (or c, f, k)"
                },
                "to_unit": {
                    "type": "string",
                    "description": "Target unit: celsius, fahrenheit or kelvin (or c, f, k)"
                }
            },
            "required": ["value", "from_unit", "to_unit"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ServiceError> {
        let value = required_f64(&arguments, "value")?;
        let invalid = || {
            ServiceError::invalid_arguments(
                "Invalid unit. Use 'celsius' (c), 'fahrenheit' (f), or 'kelvin' (k)",
            )
        };
        let from = Unit::parse(required_str(&arguments, "from_unit")?).ok_or_else(invalid)?;
        let to = Unit::parse(required_str(&arguments, "to_unit")?).ok_or_else(invalid)?;

        let result = to.celsius_to_unit(from.to_celsius(value));
        Ok(Value::String(format!(
            "Result: {}{} = {}{}",
            format_number(value, 10),
            from.symbol(),
            format_number(result, 2),
            to.symbol()
        )))
    }
}
