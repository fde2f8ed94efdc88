use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::errors::CatalogError;

/// Primitive type of a mapped property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int,
    Long,
    Float,
    Bool,
    String,
    Guid,
    DateTime,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Guid => "guid",
            ScalarType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub data_type: ScalarType,
    pub nullable: bool,
}

/// A relationship edge between two entity types.
///
/// `foreign_key` lives on the dependent side: the declaring entity when
/// `is_to_principal`, otherwise the target. `principal_key` lives on the
/// opposite side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub name: String,
    pub target: String,
    pub foreign_key: Vec<String>,
    pub principal_key: Vec<String>,
    pub is_to_principal: bool,
    pub is_collection: bool,
    pub is_required: bool,
}

impl Navigation {
    /// Key properties read from the entity declaring this navigation.
    pub fn source_key(&self) -> &[String] {
        if self.is_to_principal {
            &self.foreign_key
        } else {
            &self.principal_key
        }
    }

    /// Key properties read from the navigation target.
    pub fn target_key(&self) -> &[String] {
        if self.is_to_principal {
            &self.principal_key
        } else {
            &self.foreign_key
        }
    }

    /// A hop along this edge can yield no row: the relationship is not
    /// required, or it runs from principal to dependent.
    pub fn is_optional(&self) -> bool {
        !self.is_required || !self.is_to_principal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub primary_key: Vec<String>,
    pub properties: Vec<Property>,
    pub navigations: Vec<Navigation>,
}

impl EntityType {
    pub fn find_navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Primary key properties in declaration order.
    pub fn primary_key_properties(&self) -> Result<Vec<&Property>, CatalogError> {
        self.properties_named(&self.primary_key)
    }

    /// Resolve a list of property names, failing on the first unknown one.
    pub fn properties_named(&self, names: &[String]) -> Result<Vec<&Property>, CatalogError> {
        names
            .iter()
            .map(|name| {
                self.find_property(name)
                    .ok_or_else(|| CatalogError::PropertyNotFound {
                        entity: self.name.clone(),
                        property: name.clone(),
                    })
            })
            .collect()
    }
}

/// Read-only source of entity metadata, shared across compilations.
pub trait Catalog: Send + Sync {
    fn lookup_entity_type(&self, name: &str) -> Option<&EntityType>;

    fn entity_type(&self, name: &str) -> Result<&EntityType, CatalogError> {
        self.lookup_entity_type(name)
            .ok_or_else(|| CatalogError::EntityNotFound {
                entity: name.to_string(),
            })
    }
}

/// In-memory catalog keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entities: HashMap<String, EntityType>,
}

impl ModelCatalog {
    /// Build a catalog and check every navigation against it.
    pub fn new(entities: Vec<EntityType>) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for entity in entities {
            if map.contains_key(&entity.name) {
                return Err(CatalogError::DuplicateEntity {
                    entity: entity.name,
                });
            }
            map.insert(entity.name.clone(), entity);
        }

        let catalog = ModelCatalog { entities: map };
        catalog.validate()?;
        log::debug!(
            "ModelCatalog: loaded {} entity types",
            catalog.entities.len()
        );
        Ok(catalog)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(|k| k.as_str())
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for entity in self.entities.values() {
            if entity.primary_key.is_empty() {
                return Err(CatalogError::MissingPrimaryKey {
                    entity: entity.name.clone(),
                });
            }
            entity.primary_key_properties()?;

            for navigation in &entity.navigations {
                let target = self.lookup_entity_type(&navigation.target).ok_or_else(|| {
                    CatalogError::DanglingNavigation {
                        entity: entity.name.clone(),
                        navigation: navigation.name.clone(),
                        target: navigation.target.clone(),
                    }
                })?;

                if navigation.is_collection && navigation.is_to_principal {
                    return Err(CatalogError::CollectionToPrincipal {
                        entity: entity.name.clone(),
                        navigation: navigation.name.clone(),
                    });
                }

                let source_props = entity.properties_named(navigation.source_key())?;
                let target_props = target.properties_named(navigation.target_key())?;
                let shapes_match = source_props.len() == target_props.len()
                    && !source_props.is_empty()
                    && source_props
                        .iter()
                        .zip(target_props.iter())
                        .all(|(s, t)| s.data_type == t.data_type);
                if !shapes_match {
                    return Err(CatalogError::key_shape_mismatch(
                        &entity.name,
                        &navigation.name,
                        &navigation.foreign_key,
                        &navigation.principal_key,
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Catalog for ModelCatalog {
    fn lookup_entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }
}
