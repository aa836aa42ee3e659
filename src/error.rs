//! Error types shared across the distiller.
//!
//! Definition errors are raised while compiling configuration and are always
//! fatal. Record and conversion errors are raised per notification. A
//! notification that no definition matches is not an error at all; it is
//! reported as `Ok(None)` by [`Distiller::process`](crate::Distiller::process).

use std::path::PathBuf;

use serde_json::Value;

/// A path expression that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path '{path}' at offset {position}: {reason}")]
pub struct PathSyntaxError {
    pub path: String,
    pub position: usize,
    pub reason: String,
}

/// Malformed event or trait definition.
///
/// Carries the configuration fragment that was being compiled so the
/// offending entry can be found in a large definitions file.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (definition: {definition})")]
pub struct DefinitionError {
    pub message: String,
    pub definition: Value,
    #[source]
    pub path_error: Option<PathSyntaxError>,
}

impl DefinitionError {
    pub fn new(message: impl Into<String>, definition: &Value) -> Self {
        Self {
            message: message.into(),
            definition: definition.clone(),
            path_error: None,
        }
    }

    /// A definition whose `fields` did not compile.
    pub fn path(message: impl Into<String>, definition: &Value, source: PathSyntaxError) -> Self {
        Self {
            path_error: Some(source),
            ..Self::new(message, definition)
        }
    }
}

/// A raw value could not be converted to the declared trait type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {value} to {datatype}: {reason}")]
pub struct ConversionError {
    pub datatype: &'static str,
    pub value: Value,
    pub reason: String,
}

/// Errors raised by plugin factories while reading their parameters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("no plugin named '{0}'")]
    NotFound(String),

    #[error("invalid parameters for plugin '{plugin}': {reason}")]
    InvalidParameters { plugin: String, reason: String },
}

/// Errors raised while loading definitions or notifications from disk.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "invalid YAML syntax in {} at line {line}, column {column}: {message}",
        .path.display()
    )]
    YamlSyntax {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("YAML error reading event definitions file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("event definitions file {} must contain a list of definitions", .path.display())]
    NotAList { path: PathBuf },

    #[error("notification file {} must contain a JSON list of notifications", .path.display())]
    NotANotificationList { path: PathBuf },
}

/// Errors surfaced while distilling a single notification.
#[derive(Debug, thiserror::Error)]
pub enum DistillError {
    #[error("malformed notification: {reason}")]
    MalformedRecord { reason: String },

    #[error("trait '{name}': {source}")]
    Conversion {
        name: String,
        #[source]
        source: ConversionError,
    },

    #[error("notification timestamp: {0}")]
    Timestamp(#[source] ConversionError),
}

impl DistillError {
    pub(crate) fn missing(field: &str) -> Self {
        DistillError::MalformedRecord {
            reason: format!("required field '{}' is missing", field),
        }
    }
}

/// Result alias for distillation.
pub type Result<T> = std::result::Result<T, DistillError>;
