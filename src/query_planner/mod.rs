//! # Query Planner
//!
//! Entry points for navigation expansion. A composed query comes in as
//! [`query_ir::Expr`]; what comes out references only entity sets, explicit
//! joins and physical field paths, with entity-valued leaves marked as
//! [`query_ir::EntityShape`].

use validator::Validate;

use crate::{config::CompilerConfig, entity_catalog::Catalog};
use compile_ctx::{CompilationContext, CompilationStats};
use errors::QueryPlannerError;
use query_ir::Expr;

pub mod compile_ctx;
pub mod errors;
pub mod nav_expansion;
pub mod navigation_tree;
pub mod query_ir;
pub mod transformed;

/// Rewrite every navigation in `query` into joins and correlated subqueries.
pub fn expand_navigations(
    query: Expr,
    catalog: &dyn Catalog,
    config: &CompilerConfig,
) -> Result<Expr, QueryPlannerError> {
    expand_navigations_with_stats(query, catalog, config).map(|(expr, _)| expr)
}

/// Same as [`expand_navigations`], also returning what the compilation did.
pub fn expand_navigations_with_stats(
    query: Expr,
    catalog: &dyn Catalog,
    config: &CompilerConfig,
) -> Result<(Expr, CompilationStats), QueryPlannerError> {
    config
        .validate()
        .map_err(|e| QueryPlannerError::InvalidConfig(e.to_string()))?;

    log::info!("🚀 Navigation expansion: {}", query);
    let mut ctx = CompilationContext::new(catalog, config);
    let expanded = nav_expansion::expand(&mut ctx, query)?;
    let reduced = nav_expansion::reduction::reduce_query(&mut ctx, expanded)?.get_plan();

    log::info!("✓ Navigation expansion complete ({})", ctx.stats);
    log::debug!("Expanded query: {}", reduced);
    Ok((reduced, ctx.stats))
}
