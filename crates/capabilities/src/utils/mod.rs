//! Built-in `utils` capability server: local helpers that need no network
//! access or credentials.

mod calculator;
mod temperature;
mod time;

pub use calculator::{CalculateCapability, evaluate};
pub use temperature::ConvertTemperatureCapability;
pub use time::CurrentTimeCapability;

use crate::capability::CapabilitySet;

/// The `utils` capability set: `calculate`, `convert_temperature`,
/// `get_current_time`.
pub fn utils_server() -> CapabilitySet {
    CapabilitySet::new("utils")
        .with(CalculateCapability)
        .with(ConvertTemperatureCapability)
        .with(CurrentTimeCapability)
}

/// Integers print without a trailing `.0`; everything else is rounded to
/// `decimals` places and printed without trailing zeros.
pub(crate) fn format_number(value: f64, decimals: i32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let scale = 10f64.powi(decimals);
    let rounded = (value * scale).round() / scale;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}
