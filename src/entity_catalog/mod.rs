//! # Entity Catalog
//!
//! Read-only metadata about mapped entity types: key properties, scalar
//! properties and navigation edges. The navigation expander consumes it through
//! the [`Catalog`] trait; [`ModelCatalog`] is the in-memory implementation,
//! loadable from YAML.

pub mod config;
mod entity_type;
pub mod errors;


pub use entity_type::{Catalog, EntityType, ModelCatalog, Navigation, Property, ScalarType};
