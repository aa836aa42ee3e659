//! Built-in trait plugins.
//!
//! - `split`: take one segment of a delimited string
//! - `bitfield`: set flag bits according to which fields are present

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::PluginError;
use crate::extraction::PathMatch;
use crate::plugin_registry::TraitPlugin;

fn parse_params<T: DeserializeOwned>(
    plugin: &str,
    params: &Map<String, Value>,
) -> Result<T, PluginError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| {
        PluginError::InvalidParameters {
            plugin: plugin.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Splits the first matched value and returns one segment.
///
/// ```yaml
/// plugin:
///   name: split
///   parameters:
///     separator: "-"
///     segment: 1
///     max_split: 1
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitterPlugin {
    pub separator: String,
    /// Segment to return; negative values count from the end
    pub segment: i64,
    /// Maximum number of splits; unlimited when absent
    pub max_split: Option<usize>,
}

impl Default for SplitterPlugin {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            segment: 0,
            max_split: None,
        }
    }
}

impl SplitterPlugin {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, PluginError> {
        let plugin: Self = parse_params("split", params)?;
        if plugin.separator.is_empty() {
            return Err(PluginError::InvalidParameters {
                plugin: "split".to_string(),
                reason: "separator must not be empty".to_string(),
            });
        }
        Ok(plugin)
    }
}

impl TraitPlugin for SplitterPlugin {
    fn trait_value(&self, matches: &[PathMatch]) -> Option<Value> {
        let first = matches.first()?;
        let text = match &first.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let segments: Vec<&str> = match self.max_split {
            Some(max) => text.splitn(max + 1, self.separator.as_str()).collect(),
            None => text.split(self.separator.as_str()).collect(),
        };

        let index = if self.segment < 0 {
            let from_end = usize::try_from(self.segment.unsigned_abs()).ok()?;
            segments.len().checked_sub(from_end)?
        } else {
            usize::try_from(self.segment).ok()?
        };

        segments.get(index).map(|s| Value::String(s.to_string()))
    }
}

/// Sets bits in an integer according to which fields matched.
///
/// ```yaml
/// plugin:
///   name: bitfield
///   parameters:
///     initial_bitfield: 0
///     flags:
///       - path: payload.foo
///         bit: 0
///         value: 42
///       - path: payload.bar
///         bit: 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BitfieldPlugin {
    pub initial_bitfield: i64,
    pub flags: Vec<BitFlag>,
}

/// One flag of a [`BitfieldPlugin`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BitFlag {
    /// Locator of the field to check
    pub path: String,
    /// Bit to set, least significant bit is 0
    pub bit: u32,
    /// Only set the bit when the field equals this; any non-null value otherwise
    #[serde(default)]
    pub value: Option<Value>,
}

impl BitfieldPlugin {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, PluginError> {
        let plugin: Self = parse_params("bitfield", params)?;
        if let Some(flag) = plugin.flags.iter().find(|f| f.bit > 62) {
            return Err(PluginError::InvalidParameters {
                plugin: "bitfield".to_string(),
                reason: format!(
                    "bit {} for '{}' does not fit in a 64-bit signed integer",
                    flag.bit, flag.path
                ),
            });
        }
        Ok(plugin)
    }
}

impl TraitPlugin for BitfieldPlugin {
    fn trait_value(&self, matches: &[PathMatch]) -> Option<Value> {
        let mut bitfield = self.initial_bitfield;
        for flag in &self.flags {
            // later matches for the same locator win
            let Some(found) = matches.iter().rev().find(|m| m.path == flag.path) else {
                continue;
            };
            let hit = match &flag.value {
                Some(expected) => *expected == found.value,
                None => true,
            };
            if hit {
                bitfield |= 1_i64 << flag.bit;
            }
        }
        Some(Value::from(bitfield))
    }
}
