//! # Distiller: notifications to events
//!
//! Distiller turns loosely structured JSON notifications into flat events
//! made of a few typed traits. Which traits to pull from which notifications
//! is described in YAML:
//!
//! ```yaml
//! - event_type: compute.instance.*
//!   traits:
//!     instance_id:
//!       fields: [payload.instance_uuid, payload.instance_id]
//!     memory_mb:
//!       type: int
//!       fields: payload.memory_mb
//!     host:
//!       fields: publisher_id
//!       plugin:
//!         name: split
//!         parameters:
//!           segment: 1
//!           max_split: 1
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use distiller::{runtime::load_config, Distiller, PluginRegistry, TraitCondenser};
//!
//! let configs = load_config("event_definitions.yaml")?;
//! let distiller = Distiller::from_config(&configs, &PluginRegistry::builtin(), true)?;
//!
//! let mut condenser = TraitCondenser::new();
//! if let Some(event) = distiller.process(&notification, &mut condenser)? {
//!     println!("{}", event);
//! }
//! ```

// Core modules
pub mod condenser;
pub mod datatype;
pub mod error;
pub mod extraction;
pub mod plugin_registry;
pub mod plugins;
pub mod serialization;

// Definitions and the distiller
pub mod runtime;

// Re-export key types
pub use condenser::{Condenser, DictionaryCondenser, TraitCondenser};
pub use datatype::{Datatype, Trait, TraitValue};
pub use error::{
    ConfigError, ConversionError, DefinitionError, DistillError, PathSyntaxError, PluginError,
    Result,
};
pub use extraction::{FieldPath, PathMatch, PathSegment};
pub use plugin_registry::{PluginFactory, PluginRegistry, TraitPlugin};
pub use serialization::{EventWriter, OutputFormat, SerializationError};

// Re-export runtime types
pub use runtime::{Distiller, EventDefinition, TraitDefinition};
