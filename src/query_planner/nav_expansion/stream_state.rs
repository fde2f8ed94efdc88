use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::errors::{NavExpansionError, Pass},
    navigation_tree::NodeId,
    query_ir::{BindingPlaceholder, Expr, StreamState},
};

/// Default row parameter for a root stream: `Customer` -> `c`.
pub fn root_parameter(entity: &str) -> String {
    entity
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_else(|| "x".to_string())
}

/// Placeholder for a navigation tree node.
pub fn placeholder(ctx: &CompilationContext, node: NodeId) -> Expr {
    let data = ctx.arena.node(node);
    Expr::Binding(BindingPlaceholder {
        mapping: data.mapping,
        node,
        path: ctx.arena.logical_path(node),
    })
}

/// Fresh stream over all rows of `entity`.
pub fn root_state(ctx: &mut CompilationContext, entity: &str) -> Result<StreamState, NavExpansionError> {
    ctx.entity_type(entity, Pass::Expansion)?;
    let mapping = ctx.arena.add_source_mapping(Some(entity), false);
    let root = ctx.arena.mapping(mapping).root;
    log::debug!("🔍 Expansion: new source mapping {} for Set({})", mapping, entity);

    Ok(StreamState {
        source: Expr::entity_set(entity),
        current_parameter: root_parameter(entity),
        mappings: vec![mapping],
        pending_selector: placeholder(ctx, root),
        apply_pending_selector: false,
        ordered: false,
        pending_cardinality: None,
    })
}

/// The pending selector returns the physical row unchanged.
pub fn is_identity(ctx: &CompilationContext, state: &StreamState) -> bool {
    match &state.pending_selector {
        Expr::Binding(b) => {
            state.mappings.contains(&b.mapping)
                && ctx.arena.node(b.node).is_root()
                && ctx.arena.to_mapping(b.node).is_some_and(|p| p.is_empty())
        }
        _ => false,
    }
}

/// Entity type of the rows when the pending selector is a single entity
/// placeholder.
pub fn pending_entity<'s>(ctx: &'s CompilationContext, state: &StreamState) -> Option<&'s str> {
    match &state.pending_selector {
        Expr::Binding(b) => ctx.arena.node(b.node).entity.as_deref(),
        _ => None,
    }
}

/// Physical access expression for `path` below `param`.
pub fn physical_path(param: &str, path: &[String]) -> Expr {
    path.iter()
        .fold(Expr::param(param), |target, field| target.member(field))
}

/// Move the physical source out of the state so a new operator can wrap it.
pub fn take_source(state: &mut StreamState) -> Expr {
    std::mem::replace(&mut state.source, Expr::null())
}

impl StreamState {
    pub fn into_expr(self) -> Expr {
        Expr::StreamState(Box::new(self))
    }
}
