//! # Entity Catalog Error Types
//!
//! Errors raised while loading, validating or querying the entity catalog.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: Missing entity types, properties or navigations
//! - **Consistency Errors**: Key-shape mismatches and dangling navigation targets
//! - **Configuration Errors**: File I/O and YAML parsing issues while loading a catalog

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("No entity type found for `{entity}`")]
    EntityNotFound { entity: String },

    #[error("Entity type `{entity}` is defined more than once")]
    DuplicateEntity { entity: String },

    #[error("Property `{property}` not found on entity type `{entity}`")]
    PropertyNotFound { entity: String, property: String },

    #[error("Navigation `{entity}.{navigation}` targets unknown entity type `{target}`")]
    DanglingNavigation {
        entity: String,
        navigation: String,
        target: String,
    },

    #[error("Entity type `{entity}` has no primary key")]
    MissingPrimaryKey { entity: String },

    #[error(
        "Navigation `{entity}.{navigation}`: foreign key ({foreign_key}) does not match principal key ({principal_key})"
    )]
    KeyShapeMismatch {
        entity: String,
        navigation: String,
        foreign_key: String,
        principal_key: String,
    },

    #[error("Navigation `{entity}.{navigation}` is a collection but points to its principal")]
    CollectionToPrincipal { entity: String, navigation: String },

    #[error("Failed to read catalog file: {error}")]
    ConfigReadError { error: String },

    #[error("Failed to parse catalog: {error}")]
    ConfigParseError { error: String },
}

impl CatalogError {
    /// Create a key-shape error from the two property lists.
    pub fn key_shape_mismatch(
        entity: impl Into<String>,
        navigation: impl Into<String>,
        foreign_key: &[String],
        principal_key: &[String],
    ) -> Self {
        CatalogError::KeyShapeMismatch {
            entity: entity.into(),
            navigation: navigation.into(),
            foreign_key: foreign_key.join(", "),
            principal_key: principal_key.join(", "),
        }
    }
}
