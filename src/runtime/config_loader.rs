//! Loading event definitions and notifications from disk.
//!
//! Definitions live in a YAML file holding a list of event definitions.
//! Notifications are JSON, either a single object or a list of them.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Load the list of event definition configs from a YAML file.
///
/// An empty file yields no definitions.
///
/// # Example
/// ```ignore
/// use distiller::runtime::load_config;
///
/// let configs = load_config("event_definitions.yaml")?;
/// let distiller = Distiller::from_config(&configs, &PluginRegistry::builtin(), true)?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Vec<Value>, ConfigError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "event definitions file");

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_yaml::from_str(&contents).map_err(|e| match e.location() {
        Some(location) => ConfigError::YamlSyntax {
            path: path.to_path_buf(),
            line: location.line(),
            column: location.column(),
            message: e.to_string(),
        },
        None => ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let definitions = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        _ => {
            return Err(ConfigError::NotAList {
                path: path.to_path_buf(),
            })
        }
    };

    info!(
        path = %path.display(),
        definitions = definitions.len(),
        "loaded event definitions"
    );
    Ok(definitions)
}

/// Read notifications from a JSON file.
///
/// With `list`, the file must hold a JSON list of notifications; otherwise
/// it holds a single notification.
pub fn load_notifications<P: AsRef<Path>>(path: P, list: bool) -> Result<Vec<Value>, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    split_notifications(value, list).ok_or_else(|| ConfigError::NotANotificationList {
        path: path.to_path_buf(),
    })
}

/// Turn parsed JSON into notifications; `None` when `list` is set and the
/// value is not a list.
pub fn split_notifications(value: Value, list: bool) -> Option<Vec<Value>> {
    match (value, list) {
        (Value::Array(items), true) => Some(items),
        (_, true) => None,
        (single, false) => Some(vec![single]),
    }
}
