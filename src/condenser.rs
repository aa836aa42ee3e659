//! Condensers collect what the distiller extracts from one notification.
//!
//! The distiller never builds events itself. It hands envelope metadata and
//! each extracted trait to a caller-owned [`Condenser`], which formats them
//! into whatever structure the application needs.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::datatype::{Datatype, Trait, TraitValue};

/// Accumulates one event.
///
/// A condenser is filled by a single [`Distiller::process`](crate::Distiller::process)
/// call. Reuse one across notifications by calling [`Condenser::clear`]
/// between them; concurrent calls need one condenser each.
pub trait Condenser {
    /// The structure produced by this condenser.
    type Event;

    /// Add one extracted trait. Called once per trait that produced a value.
    fn add_trait(&mut self, name: &str, datatype: Datatype, value: TraitValue);

    /// Add the envelope metadata. Called once per notification.
    fn add_envelope_info(&mut self, event_type: &str, message_id: &str, when: DateTime<Utc>);

    /// The event built so far.
    fn get_event(&self) -> &Self::Event;

    /// Reset to an empty state.
    fn clear(&mut self);

    /// Check the event against whatever rules this condenser has.
    fn validate(&self) -> bool {
        true
    }
}

/// Collects an event as a flat ordered map.
///
/// Keys are `event_type`, `message_id`, `when`, then one key per trait.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DictionaryCondenser {
    event: IndexMap<String, TraitValue>,
}

impl DictionaryCondenser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TraitValue> {
        self.event.get(key)
    }

    pub fn into_event(self) -> IndexMap<String, TraitValue> {
        self.event
    }
}

impl Condenser for DictionaryCondenser {
    type Event = IndexMap<String, TraitValue>;

    fn add_trait(&mut self, name: &str, _datatype: Datatype, value: TraitValue) {
        self.event.insert(name.to_string(), value);
    }

    fn add_envelope_info(&mut self, event_type: &str, message_id: &str, when: DateTime<Utc>) {
        self.event
            .insert("event_type".to_string(), TraitValue::Text(event_type.to_string()));
        self.event
            .insert("message_id".to_string(), TraitValue::Text(message_id.to_string()));
        self.event.insert("when".to_string(), TraitValue::Datetime(when));
    }

    fn get_event(&self) -> &Self::Event {
        &self.event
    }

    fn clear(&mut self) {
        self.event.clear();
    }
}

/// Keeps envelope metadata and the full list of typed traits.
///
/// Its `Display` output is the human-readable report printed by the
/// `distiller` command line tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraitCondenser {
    pub event_type: Option<String>,
    pub message_id: Option<String>,
    pub when: Option<DateTime<Utc>>,
    pub traits: Vec<Trait>,
}

impl TraitCondenser {
    pub fn new() -> Self {
        Self::default()
    }

    /// First trait with the given name.
    pub fn get_trait(&self, name: &str) -> Option<&Trait> {
        self.traits.iter().find(|t| t.name == name)
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.get_trait(name).is_some()
    }
}

impl Condenser for TraitCondenser {
    type Event = Self;

    fn add_trait(&mut self, name: &str, datatype: Datatype, value: TraitValue) {
        self.traits.push(Trait::new(name, datatype, value));
    }

    fn add_envelope_info(&mut self, event_type: &str, message_id: &str, when: DateTime<Utc>) {
        self.event_type = Some(event_type.to_string());
        self.message_id = Some(message_id.to_string());
        self.when = Some(when);
    }

    fn get_event(&self) -> &Self::Event {
        self
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn validate(&self) -> bool {
        self.event_type.is_some() && self.message_id.is_some() && self.when.is_some()
    }
}

impl fmt::Display for TraitCondenser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = self.when.map(|w| w.to_string()).unwrap_or_default();
        writeln!(
            f,
            "Event: {} (id: {}) at {}",
            self.event_type.as_deref().unwrap_or(""),
            self.message_id.as_deref().unwrap_or(""),
            when
        )?;
        let mut traits: Vec<&Trait> = self.traits.iter().collect();
        traits.sort();
        for t in traits {
            writeln!(f, "    Trait: {}", t)?;
        }
        Ok(())
    }
}
