//! `get_current_time`: the current time in UTC, a fixed offset, or a
//! common zone abbreviation.
//!
//! Abbreviations map to fixed offsets; daylight-saving variants are listed
//! separately (`est`/`edt`) rather than inferred from the date.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{Map, Value};
use switchboard_core::protocol::ServiceError;

use crate::capability::{Capability, optional_str};

/// (abbreviation, offset from UTC in minutes)
const ZONES: &[(&str, i32)] = &[
    ("utc", 0),
    ("gmt", 0),
    ("z", 0),
    ("est", -5 * 60),
    ("edt", -4 * 60),
    ("cst", -6 * 60),
    ("cdt", -5 * 60),
    ("mst", -7 * 60),
    ("mdt", -6 * 60),
    ("pst", -8 * 60),
    ("pdt", -7 * 60),
    ("bst", 60),
    ("cet", 60),
    ("cest", 2 * 60),
    ("eet", 2 * 60),
    ("msk", 3 * 60),
    ("gst", 4 * 60),
    ("ist", 5 * 60 + 30),
    ("sgt", 8 * 60),
    ("hkt", 8 * 60),
    ("jst", 9 * 60),
    ("kst", 9 * 60),
    ("aest", 10 * 60),
    ("nzst", 12 * 60),
];

pub struct CurrentTimeCapability;

#[async_trait]
impl Capability for CurrentTimeCapability {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Accepts UTC, a zone abbreviation such as EST, CET or \
         JST, or an offset such as +05:30. Defaults to UTC."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "Zone abbreviation or UTC offset, e.g. 'PST' or '+09:00'"
                }
            }
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ServiceError> {
        let (label, offset) = match optional_str(&arguments, "timezone") {
            Some(zone) => {
                let offset = resolve_zone(zone).ok_or_else(|| unknown_zone(zone))?;
                (zone.trim().to_uppercase(), offset)
            }
            None => ("UTC".to_string(), Utc.fix()),
        };
        let now = Utc::now().with_timezone(&offset);
        Ok(Value::String(render(&label, now)))
    }
}

fn unknown_zone(zone: &str) -> ServiceError {
    let needle = zone.trim().to_lowercase();
    let suggestions: Vec<&str> = ZONES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !needle.is_empty() && (name.contains(&*needle) || needle.contains(name)))
        .take(5)
        .collect();
    if suggestions.is_empty() {
        ServiceError::invalid_arguments(format!(
            "Unknown timezone '{zone}'. Try UTC, an abbreviation like EST or JST, or an offset like +05:30"
        ))
    } else {
        ServiceError::invalid_arguments(format!(
            "Unknown timezone '{zone}'. Did you mean: {}?",
            suggestions.join(", ")
        ))
    }
}

/// Abbreviation, `±HH`, `±HHMM`, `±HH:MM`, optionally prefixed by `UTC`
/// or `GMT`.
fn resolve_zone(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim().to_lowercase();
    if let Some((_, minutes)) = ZONES.iter().find(|(name, _)| *name == zone) {
        return FixedOffset::east_opt(minutes * 60);
    }

    let offset = zone
        .strip_prefix("utc")
        .or_else(|| zone.strip_prefix("gmt"))
        .unwrap_or(&zone)
        .trim();
    parse_offset(offset)
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };
    if !rest.is_ascii() {
        return None;
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() > 2 => rest.split_at(rest.len() - 2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn render(label: &str, now: DateTime<FixedOffset>) -> String {
    format!(
        "Current Time ({label}):\nDate: {}\nTime: {} ({} 24h)\nUTC Offset: {}",
        now.format("%A, %B %d, %Y"),
        now.format("%I:%M:%S %p"),
        now.format("%H:%M:%S"),
        now.format("%z"),
    )
}
