use thiserror::Error;

use crate::{
    entity_catalog::errors::CatalogError, query_planner::nav_expansion::errors::NavExpansionError,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryPlannerError {
    #[error("NavExpansionError: {0}")]
    NavExpansion(#[from] NavExpansionError),

    #[error("CatalogError: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid compiler configuration: {0}")]
    InvalidConfig(String),
}
