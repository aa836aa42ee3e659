//! The distiller: picks the event definition for a notification and applies it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error};

use crate::condenser::{Condenser, DictionaryCondenser};
use crate::error::{DefinitionError, Result};
use crate::plugin_registry::PluginRegistry;
use crate::runtime::event_definition::{envelope_field, Clock, EventDefinition};

/// Turns notifications into events.
///
/// Definitions are tried in order and the first whose event type patterns
/// match wins. A `Distiller` is immutable once built and can be shared
/// across threads; each call needs its own condenser.
#[derive(Debug)]
pub struct Distiller {
    definitions: Vec<EventDefinition>,
    catchall: bool,
    clock: Clock,
}

impl Distiller {
    /// Build a distiller from definitions already in priority order.
    ///
    /// With `catchall`, a definition matching every event type and extracting
    /// only the default traits is appended unless one is already present.
    pub fn new(
        mut definitions: Vec<EventDefinition>,
        catchall: bool,
    ) -> std::result::Result<Self, DefinitionError> {
        if catchall && !definitions.iter().any(EventDefinition::is_catchall) {
            definitions.push(EventDefinition::catchall(&PluginRegistry::new())?);
        }
        Ok(Self {
            definitions,
            catchall,
            clock: Utc::now,
        })
    }

    /// Build a distiller from a list of definition configs.
    ///
    /// Definitions declared later in the list take priority, so general
    /// definitions can be written first and specific ones appended.
    pub fn from_config(
        configs: &[Value],
        plugins: &PluginRegistry,
        catchall: bool,
    ) -> std::result::Result<Self, DefinitionError> {
        let definitions = configs
            .iter()
            .rev()
            .map(|cfg| EventDefinition::new(cfg, plugins))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(definitions = definitions.len(), catchall, "built distiller");
        Self::new(definitions, catchall)
    }

    /// Replace the clock used for notifications without a timestamp.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Definitions in the order they are tried.
    pub fn definitions(&self) -> &[EventDefinition] {
        &self.definitions
    }

    pub fn catchall(&self) -> bool {
        self.catchall
    }

    /// The definition that would handle this event type, if any.
    pub fn definition_for(&self, event_type: &str) -> Option<&EventDefinition> {
        self.definitions.iter().find(|d| d.match_type(event_type))
    }

    /// Distill one notification into `condenser`.
    ///
    /// Returns `Ok(None)` when no definition matches; the notification is
    /// dropped and `condenser` is left untouched.
    pub fn process<'c, C: Condenser>(
        &self,
        body: &Value,
        condenser: &'c mut C,
    ) -> Result<Option<&'c mut C>> {
        let event_type = envelope_field(body, "event_type")?;
        let message_id = envelope_field(body, "message_id")?;

        let Some(definition) = self.definition_for(&event_type) else {
            if self.catchall {
                error!(event_type = %event_type, message_id = %message_id, "dropping notification");
            } else {
                debug!(event_type = %event_type, message_id = %message_id, "dropping notification");
            }
            return Ok(None);
        };

        definition.apply_with_clock(body, condenser, self.clock).map(Some)
    }

    /// Distill one notification into a fresh [`DictionaryCondenser`].
    pub fn process_default(&self, body: &Value) -> Result<Option<DictionaryCondenser>> {
        let mut condenser = DictionaryCondenser::new();
        let matched = self.process(body, &mut condenser)?.is_some();
        Ok(matched.then_some(condenser))
    }
}
