//! Typed accessors over a Tasmota status document.
//!
//! Each accessor walks a fixed path and returns `Ok(None)` when any step
//! is missing or `null`. Absence is expected (a plain relay has no energy
//! sensor) and never an error; only a value of the wrong shape is.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike};
use serde_json::Value;
use thiserror::Error;

/// Section holding relay states, supply voltage and uptime.
pub const STATUS_STS: &str = "StatusSTS";

pub const ENERGY_TOTAL: &[&str] = &["StatusSNS", "ENERGY", "Total"];
pub const ENERGY_POWER: &[&str] = &["StatusSNS", "ENERGY", "Power"];
pub const ENERGY_VOLTAGE: &[&str] = &["StatusSNS", "ENERGY", "Voltage"];
pub const SUPPLY_VOLTAGE: &[&str] = &["StatusSTS", "Vcc"];
pub const UPTIME: &[&str] = &["StatusSTS", "Uptime"];

const SWITCH_PREFIX: &str = "POWER";
const SECONDS_PER_DAY: f64 = 86_400.0;

/// A field was present but could not be converted.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Field {path} is not a number: {value}")]
    NotNumeric { path: String, value: Value },
    #[error("Field {path} is not a string: {value}")]
    NotString { path: String, value: Value },
    #[error("Malformed uptime '{value}': {reason}")]
    MalformedUptime { value: String, reason: String },
}

/// Follow `path` through nested objects.
///
/// Returns `None` if a step is missing, a step is not an object, or the
/// final value is `null`.
pub fn get_nested<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let value = path
        .iter()
        .try_fold(doc, |current, key| current.as_object()?.get(*key))?;

    if value.is_null() { None } else { Some(value) }
}

/// Read a numeric field.
pub fn get_number(doc: &Value, path: &[&str]) -> Result<Option<f64>, FieldError> {
    match get_nested(doc, path) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| FieldError::NotNumeric {
                path: path.join("."),
                value: value.clone(),
            }),
    }
}

/// Cumulative energy in kWh (`StatusSNS.ENERGY.Total`).
pub fn energy_total(doc: &Value) -> Result<Option<f64>, FieldError> {
    get_number(doc, ENERGY_TOTAL)
}

/// Instantaneous power in W (`StatusSNS.ENERGY.Power`).
pub fn power(doc: &Value) -> Result<Option<f64>, FieldError> {
    get_number(doc, ENERGY_POWER)
}

/// Mains voltage in V (`StatusSNS.ENERGY.Voltage`).
pub fn voltage(doc: &Value) -> Result<Option<f64>, FieldError> {
    get_number(doc, ENERGY_VOLTAGE)
}

/// ESP module supply voltage in V (`StatusSTS.Vcc`).
pub fn supply_voltage(doc: &Value) -> Result<Option<f64>, FieldError> {
    get_number(doc, SUPPLY_VOLTAGE)
}

/// Device uptime in seconds, parsed from `StatusSTS.Uptime`.
pub fn uptime_seconds(doc: &Value) -> Result<Option<f64>, FieldError> {
    let Some(value) = get_nested(doc, UPTIME) else {
        return Ok(None);
    };

    let text = value.as_str().ok_or_else(|| FieldError::NotString {
        path: UPTIME.join("."),
        value: value.clone(),
    })?;

    parse_uptime(text).map(Some)
}

/// Relay states from every `POWER*` key of `StatusSTS`.
///
/// Keys match case-insensitively. A relay is on only when its value is the
/// string `"ON"`. Returns `None` when the section is missing. A section
/// without any relay keys also yields `None` rather than an empty map: an
/// empty state-set renders to no series, so no sample is produced for it.
pub fn switch_states(doc: &Value) -> Option<BTreeMap<String, bool>> {
    let section = get_nested(doc, &[STATUS_STS])?.as_object()?;

    let states: BTreeMap<String, bool> = section
        .iter()
        .filter(|(key, _)| is_switch_key(key))
        .map(|(key, value)| (key.clone(), value.as_str() == Some("ON")))
        .collect();

    if states.is_empty() { None } else { Some(states) }
}

fn is_switch_key(key: &str) -> bool {
    key.get(..SWITCH_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SWITCH_PREFIX))
}

/// Parse a Tasmota uptime string `"<days>T<HH:MM:SS>"` into total seconds.
pub fn parse_uptime(text: &str) -> Result<f64, FieldError> {
    let malformed = |reason: String| FieldError::MalformedUptime {
        value: text.to_string(),
        reason,
    };

    let (days, time) = text
        .split_once('T')
        .ok_or_else(|| malformed("missing 'T' separator".to_string()))?;

    let days: u64 = days
        .parse()
        .map_err(|e| malformed(format!("invalid day count: {}", e)))?;

    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .map_err(|e| malformed(format!("invalid time of day: {}", e)))?;

    // chrono accepts second 60 as a leap second
    if time.nanosecond() >= 1_000_000_000 {
        return Err(malformed("second out of range".to_string()));
    }

    let seconds = time.hour() * 3600 + time.minute() * 60 + time.second();

    Ok(days as f64 * SECONDS_PER_DAY + seconds as f64)
}
