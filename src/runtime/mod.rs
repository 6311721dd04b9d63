//! Entity-level runtime.
//!
//! Applies a field plan to entity documents one entity at a time, keeping
//! per-entity outcomes for the run summary.

pub mod context;
pub mod entity_parser;

pub use context::{EntityContext, EntityRecord};
pub use entity_parser::EntityParser;
