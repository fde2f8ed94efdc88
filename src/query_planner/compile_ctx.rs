use std::fmt;

use crate::{
    config::CompilerConfig,
    entity_catalog::{Catalog, EntityType},
    query_planner::{
        nav_expansion::errors::{NavExpansionError, Pass},
        navigation_tree::NavigationArena,
    },
};

/// Counters reported by `expand_navigations_with_stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationStats {
    pub joins_inner: usize,
    pub joins_left_outer: usize,
    pub hoisted_collections: usize,
    pub correlated_subqueries: usize,
    pub materializations: usize,
    pub nodes_bound: usize,
}

impl CompilationStats {
    pub fn joins_total(&self) -> usize {
        self.joins_inner + self.joins_left_outer
    }
}

impl fmt::Display for CompilationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "joins: {} inner / {} left outer, hoisted: {}, correlated: {}, materialized: {}, bound: {}",
            self.joins_inner,
            self.joins_left_outer,
            self.hoisted_collections,
            self.correlated_subqueries,
            self.materializations,
            self.nodes_bound
        )
    }
}

/// State owned by a single compilation. Dropped with the compilation, so
/// navigation trees never leak between queries.
pub struct CompilationContext<'a> {
    catalog: &'a dyn Catalog,
    pub config: &'a CompilerConfig,
    pub arena: NavigationArena,
    pub stats: CompilationStats,
    name_counter: usize,
}

impl<'a> CompilationContext<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a CompilerConfig) -> Self {
        Self {
            catalog,
            config,
            arena: NavigationArena::new(),
            stats: CompilationStats::default(),
            name_counter: 0,
        }
    }

    pub fn entity_type(&self, name: &str, pass: Pass) -> Result<&'a EntityType, NavExpansionError> {
        let catalog: &'a dyn Catalog = self.catalog;
        catalog
            .entity_type(name)
            .map_err(|source| NavExpansionError::Catalog { pass, source })
    }

    /// Generate a parameter name unique within this compilation ("t1", "o2", ...).
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        self.name_counter += 1;
        format!("{}{}", prefix, self.name_counter)
    }
}
