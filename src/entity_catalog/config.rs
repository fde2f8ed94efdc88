/// Entity catalog configuration.
///
/// Catalogs are described in YAML with the following structure:
///
/// ```yaml
/// entities:
///   - name: Customer
///     key: Id                      # single or composite ([A, B])
///     properties:
///       - { name: Id, type: int }
///       - { name: Name, type: string, nullable: true }
///     navigations:
///       - name: Orders
///         target: Order
///         foreign_key: CustomerId  # lives on Order
///         collection: true
///   - name: Order
///     key: Id
///     properties:
///       - { name: Id, type: int }
///       - { name: CustomerId, type: int }
///     navigations:
///       - name: Customer
///         target: Customer
///         foreign_key: CustomerId  # lives on Order
///         to_principal: true
/// ```
///
/// `principal_key` defaults to the primary key of the principal side.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::entity_type::{EntityType, ModelCatalog, Navigation, Property, ScalarType};
use super::errors::CatalogError;

/// Key column list supporting both single and composite keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyColumns {
    Single(String),
    Composite(Vec<String>),
}

impl KeyColumns {
    pub fn columns(&self) -> Vec<String> {
        match self {
            KeyColumns::Single(col) => vec![col.clone()],
            KeyColumns::Composite(cols) => cols.clone(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, KeyColumns::Composite(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub key: KeyColumns,
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub navigations: Vec<NavigationDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ScalarType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationDefinition {
    pub name: String,
    pub target: String,
    pub foreign_key: KeyColumns,
    #[serde(default)]
    pub principal_key: Option<KeyColumns>,
    #[serde(default)]
    pub to_principal: bool,
    #[serde(default)]
    pub collection: bool,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl CatalogConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        serde_yaml::from_str(yaml).map_err(|e| CatalogError::ConfigParseError {
            error: e.to_string(),
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::ConfigReadError {
            error: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Resolve defaults and build a validated catalog.
    pub fn into_catalog(self) -> Result<ModelCatalog, CatalogError> {
        let primary_keys: HashMap<String, Vec<String>> = self
            .entities
            .iter()
            .map(|e| (e.name.clone(), e.key.columns()))
            .collect();

        let mut entities = Vec::with_capacity(self.entities.len());
        for def in self.entities {
            let mut navigations = Vec::with_capacity(def.navigations.len());
            for nav in def.navigations {
                let principal_entity = if nav.to_principal {
                    nav.target.as_str()
                } else {
                    def.name.as_str()
                };
                let principal_key = match nav.principal_key {
                    Some(key) => key.columns(),
                    None => primary_keys
                        .get(principal_entity)
                        .cloned()
                        .ok_or_else(|| CatalogError::DanglingNavigation {
                            entity: def.name.clone(),
                            navigation: nav.name.clone(),
                            target: nav.target.clone(),
                        })?,
                };
                navigations.push(Navigation {
                    name: nav.name,
                    target: nav.target,
                    foreign_key: nav.foreign_key.columns(),
                    principal_key,
                    is_to_principal: nav.to_principal,
                    is_collection: nav.collection,
                    is_required: nav.required,
                });
            }

            entities.push(EntityType {
                name: def.name,
                primary_key: def.key.columns(),
                properties: def
                    .properties
                    .into_iter()
                    .map(|p| Property {
                        name: p.name,
                        data_type: p.data_type,
                        nullable: p.nullable,
                    })
                    .collect(),
                navigations,
            });
        }

        ModelCatalog::new(entities)
    }
}

impl ModelCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        CatalogConfig::from_yaml_str(yaml)?.into_catalog()
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        CatalogConfig::from_yaml_file(path)?.into_catalog()
    }
}
