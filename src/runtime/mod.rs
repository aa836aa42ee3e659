//! Event definitions and the distiller that applies them.
//!
//! Definitions are compiled once from configuration and are immutable
//! afterwards; everything here is synchronous and free of I/O except the
//! config loader.

pub mod config_loader;
pub mod distiller;
pub mod event_definition;
pub mod trait_definition;

pub use config_loader::{load_config, load_notifications, split_notifications};
pub use distiller::Distiller;
pub use event_definition::{default_traits, Clock, EventDefinition};
pub use trait_definition::TraitDefinition;
