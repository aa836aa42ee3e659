//! Trait datatypes and typed trait values.
//!
//! Every trait an event definition extracts is declared with one of a small,
//! closed set of datatypes. The datatype owns the conversion from the raw
//! notification value to the typed value handed to the condenser.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConversionError;

/// Declared type of a trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Text,
    Int,
    Float,
    Datetime,
}

impl Datatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Text => "text",
            Datatype::Int => "int",
            Datatype::Float => "float",
            Datatype::Datetime => "datetime",
        }
    }

    /// Convert a raw notification value to this datatype.
    pub fn convert(&self, value: &Value) -> Result<TraitValue, ConversionError> {
        match self {
            Datatype::Text => Ok(TraitValue::Text(to_text(value))),
            Datatype::Int => to_int(value).map(TraitValue::Int),
            Datatype::Float => to_float(value).map(TraitValue::Float),
            Datatype::Datetime => to_datetime(value).map(TraitValue::Datetime),
        }
    }

    fn reject(&self, value: &Value, reason: impl Into<String>) -> ConversionError {
        ConversionError {
            datatype: self.as_str(),
            value: value.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Datatype::Text),
            "int" => Ok(Datatype::Int),
            "float" => Ok(Datatype::Float),
            "datetime" => Ok(Datatype::Datetime),
            other => Err(format!("unknown trait type '{}'", other)),
        }
    }
}

/// A typed trait value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraitValue {
    Text(String),
    Int(i64),
    Float(f64),
    Datetime(DateTime<Utc>),
}

impl TraitValue {
    pub fn datatype(&self) -> Datatype {
        match self {
            TraitValue::Text(_) => Datatype::Text,
            TraitValue::Int(_) => Datatype::Int,
            TraitValue::Float(_) => Datatype::Float,
            TraitValue::Datetime(_) => Datatype::Datetime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraitValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TraitValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraitValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            TraitValue::Datetime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl fmt::Display for TraitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitValue::Text(s) => write!(f, "{}", s),
            TraitValue::Int(i) => write!(f, "{}", i),
            TraitValue::Float(fl) => write!(f, "{}", fl),
            TraitValue::Datetime(dt) => write!(f, "{}", dt),
        }
    }
}

impl Eq for TraitValue {}

impl PartialOrd for TraitValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TraitValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TraitValue::Text(a), TraitValue::Text(b)) => a.cmp(b),
            (TraitValue::Int(a), TraitValue::Int(b)) => a.cmp(b),
            (TraitValue::Float(a), TraitValue::Float(b)) => a.total_cmp(b),
            (TraitValue::Datetime(a), TraitValue::Datetime(b)) => a.cmp(b),
            (a, b) => a.datatype().cmp(&b.datatype()),
        }
    }
}

/// One extracted, typed trait.
///
/// Ordered by `(name, datatype, value)` so reports come out deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Trait {
    pub name: String,
    pub datatype: Datatype,
    pub value: TraitValue,
}

impl Trait {
    pub fn new(name: impl Into<String>, datatype: Datatype, value: TraitValue) -> Self {
        Self {
            name: name.into(),
            datatype,
            value,
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name: {}, type: {}, value: {}", self.name, self.datatype, self.value)
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_int(value: &Value) -> Result<i64, ConversionError> {
    let reject = |reason: &str| Datatype::Int.reject(value, reason);
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f.trunc() >= i64::MIN as f64 && f.trunc() <= i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(reject("number out of range"))
                }
            } else {
                Err(reject("number out of range"))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| reject(&e.to_string())),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(reject("expected a number or numeric string")),
    }
}

fn to_float(value: &Value) -> Result<f64, ConversionError> {
    let reject = |reason: &str| Datatype::Float.reject(value, reason);
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| reject("number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| reject(&e.to_string())),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(reject("expected a number or numeric string")),
    }
}

/// Convert a raw value to a UTC timestamp; only strings are accepted.
pub fn to_datetime(value: &Value) -> Result<DateTime<Utc>, ConversionError> {
    match value {
        Value::String(s) => parse_datetime(s),
        other => Err(Datatype::Datetime.reject(other, "expected a date/time string")),
    }
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an ISO-8601-like timestamp and normalize it to UTC.
///
/// Accepts `T` or a space between date and time, optional fractional
/// seconds, and an optional `Z` or `+hh:mm` offset. Values without an offset
/// are taken to be UTC. A bare date means midnight UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ConversionError> {
    let reject =
        |reason: String| Datatype::Datetime.reject(&Value::String(raw.to_string()), reason);

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(reject("empty string".to_string()));
    }

    let mut normalized = trimmed.to_string();
    if normalized.len() > 10 && normalized.as_bytes()[10] == b' ' {
        normalized.replace_range(10..11, "T");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Ok(naive.and_utc());
        }
    }
    match NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| reject("invalid date".to_string())),
        Err(e) => Err(reject(e.to_string())),
    }
}
