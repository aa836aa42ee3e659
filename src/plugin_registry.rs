//! Plugin registry for trait value derivation.
//!
//! A trait definition may name a plugin instead of taking the first matched
//! value as-is. Plugins are looked up by name once, when the definition is
//! compiled, and instantiated with the parameters given in the definition.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::PluginError;
use crate::extraction::PathMatch;
use crate::plugins::{BitfieldPlugin, SplitterPlugin};

/// Derives one trait value from every match of a trait's paths.
pub trait TraitPlugin: Send + Sync {
    /// Compute the trait value.
    ///
    /// Called once per notification, even when nothing matched (the slice is
    /// then empty). Returning `None` leaves the trait out of the event.
    fn trait_value(&self, matches: &[PathMatch]) -> Option<Value>;
}

/// Builds a plugin instance from its configured parameters.
pub trait PluginFactory: Send + Sync {
    fn create(&self, params: &Map<String, Value>) -> Result<Box<dyn TraitPlugin>, PluginError>;
}

/// Simple function-based implementation of PluginFactory
impl<F> PluginFactory for F
where
    F: Fn(&Map<String, Value>) -> Result<Box<dyn TraitPlugin>, PluginError> + Send + Sync,
{
    fn create(&self, params: &Map<String, Value>) -> Result<Box<dyn TraitPlugin>, PluginError> {
        self(params)
    }
}

/// Name-to-factory mapping of available plugins.
pub struct PluginRegistry {
    factories: HashMap<String, Box<dyn PluginFactory>>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in `split` and `bitfield` plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "split",
            Box::new(|params: &Map<String, Value>| {
                SplitterPlugin::from_params(params).map(|p| Box::new(p) as Box<dyn TraitPlugin>)
            }),
        );
        registry.register(
            "bitfield",
            Box::new(|params: &Map<String, Value>| {
                BitfieldPlugin::from_params(params).map(|p| Box::new(p) as Box<dyn TraitPlugin>)
            }),
        );
        registry
    }

    /// Register a plugin factory, replacing any previous one of that name.
    ///
    /// # Example
    ///
    /// ```
    /// use distiller::{PathMatch, PluginError, PluginRegistry, TraitPlugin};
    /// use serde_json::{Map, Value};
    ///
    /// struct Count;
    ///
    /// impl TraitPlugin for Count {
    ///     fn trait_value(&self, matches: &[PathMatch]) -> Option<Value> {
    ///         Some(Value::from(matches.len()))
    ///     }
    /// }
    ///
    /// let mut registry = PluginRegistry::new();
    /// registry.register(
    ///     "count",
    ///     Box::new(|_: &Map<String, Value>| -> Result<Box<dyn TraitPlugin>, PluginError> {
    ///         Ok(Box::new(Count))
    ///     }),
    /// );
    /// assert!(registry.contains("count"));
    /// ```
    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn PluginFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate the named plugin.
    pub fn create(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Box<dyn TraitPlugin>, PluginError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        factory.create(params)
    }

    /// Check if a plugin is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered plugins, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
