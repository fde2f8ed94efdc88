//! Join insertion
//!
//! Turns every referenced but unexpanded navigation node into a physical join.
//! Required edges become an inner `Join`; optional edges use the left-join
//! idiom of a `GroupJoin` followed by `SelectMany(.., DefaultIfEmpty)`.
//!
//! Each join wraps the current row in an `{ outer, inner }` record. The
//! wrapping is recorded in the flattening history of every mapping of the
//! stream (`outer` for a join, `outer.outer` for the idiom), and the new node
//! is reached through `inner`.

use std::collections::HashSet;

use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        errors::{NavExpansionError, Pass},
        stream_state::{physical_path, root_parameter, take_source},
    },
    navigation_tree::NodeId,
    query_ir::{
        visitors::{collect_placeholders, replace_parameter},
        Expr, JoinAnnotation, JoinKind, OperatorAnnotation, QueryOperator, StreamState, INNER,
        OUTER,
    },
};

/// Insert joins for the nodes referenced by `exprs` (and their ancestors),
/// parents before children. Returns the number of joins inserted.
pub fn insert_navigation_joins(
    ctx: &mut CompilationContext,
    state: &mut StreamState,
    exprs: &[&Expr],
) -> Result<usize, NavExpansionError> {
    let mut needed: HashSet<NodeId> = HashSet::new();
    for expr in exprs {
        for binding in collect_placeholders(expr) {
            if !state.mappings.contains(&binding.mapping) {
                continue;
            }
            let mut current = Some(binding.node);
            while let Some(id) = current {
                if !needed.insert(id) {
                    break;
                }
                current = ctx.arena.node(id).parent;
            }
        }
    }

    let mut inserted = 0;
    for mapping in state.mappings.clone() {
        let root = ctx.arena.mapping(mapping).root;
        for node in ctx.arena.flatten(root) {
            if needed.contains(&node) && !ctx.arena.node(node).expanded {
                insert_join(ctx, state, node)?;
                inserted += 1;
            }
        }
    }

    if inserted > 0 {
        state.apply_pending_selector = true;
        for mapping in &state.mappings {
            log::trace!("JoinInsertion: {}\n{}", mapping, ctx.arena.describe(*mapping));
        }
    }
    Ok(inserted)
}

fn insert_join(
    ctx: &mut CompilationContext,
    state: &mut StreamState,
    node_id: NodeId,
) -> Result<(), NavExpansionError> {
    let node = ctx.arena.node(node_id).clone();
    let (Some(edge), Some(parent_id)) = (node.edge.clone(), node.parent) else {
        return Err(NavExpansionError::UnreducedBinding {
            pass: Pass::JoinInsertion,
            binding: format!("{} ({})", node_id, ctx.arena.logical_path(node_id).join(".")),
        });
    };
    let parent = ctx.arena.node(parent_id).clone();
    let parent_entity = parent.entity.clone().unwrap_or_default();

    let parent_type = ctx.entity_type(&parent_entity, Pass::JoinInsertion)?;
    let target_type = ctx.entity_type(&edge.target, Pass::JoinInsertion)?;
    let catalog_err = |source| NavExpansionError::Catalog {
        pass: Pass::JoinInsertion,
        source,
    };
    let outer_props = parent_type
        .properties_named(edge.source_key())
        .map_err(catalog_err)?;
    let inner_props = target_type
        .properties_named(edge.target_key())
        .map_err(catalog_err)?;
    if outer_props.len() != inner_props.len() {
        return Err(NavExpansionError::KeyShapeMismatch {
            pass: Pass::JoinInsertion,
            context: format!("{}.{}", parent_entity, edge.name),
            outer: outer_props.len(),
            inner: inner_props.len(),
        });
    }

    let outer_param = state.current_parameter.clone();
    let inner_param = ctx.fresh_name(&root_parameter(&edge.target));
    let parent_path = match ctx.arena.to_mapping(parent_id) {
        Some(path) => physical_path(&outer_param, &path),
        None => {
            return Err(NavExpansionError::UnreducedBinding {
                pass: Pass::JoinInsertion,
                binding: format!("{} ({})", parent_id, parent_entity),
            })
        }
    };
    let guard = parent.optional;

    let mut outer_parts = Vec::with_capacity(outer_props.len());
    let mut inner_parts = Vec::with_capacity(inner_props.len());
    for (outer, inner) in outer_props.iter().zip(inner_props.iter()) {
        let nullable = outer.nullable || inner.nullable || guard;
        let read = parent_path.clone().member(&outer.name);
        let read = if nullable && !outer.nullable {
            read.convert(outer.data_type, true)
        } else {
            read
        };
        outer_parts.push(if guard {
            Expr::conditional(
                parent_path.clone().equals(Expr::null()),
                Expr::typed_null(outer.data_type),
                read,
            )
        } else {
            read
        });

        let inner_read = Expr::param(&inner_param).member(&inner.name);
        inner_parts.push(if nullable && !inner.nullable {
            inner_read.convert(inner.data_type, true)
        } else {
            inner_read
        });
    }

    let kind = if node.optional {
        JoinKind::LeftOuter
    } else {
        JoinKind::Inner
    };
    let annotation = JoinAnnotation {
        kind,
        target_entity: Some(edge.target.clone()),
        navigation: Some(format!("{}.{}", parent_entity, edge.name)),
        outer_key: outer_props.iter().map(|p| p.name.clone()).collect(),
        inner_key: inner_props.iter().map(|p| p.name.clone()).collect(),
        outer_null_guard: guard,
    };

    let source = take_source(state);
    state.source = match kind {
        JoinKind::Inner => inner_join(
            source,
            Expr::entity_set(&edge.target),
            &outer_param,
            Expr::key_expr(outer_parts),
            &inner_param,
            Expr::key_expr(inner_parts),
            annotation,
        ),
        JoinKind::LeftOuter => left_outer_join(
            ctx,
            source,
            Expr::entity_set(&edge.target),
            &outer_param,
            Expr::key_expr(outer_parts),
            &inner_param,
            Expr::key_expr(inner_parts),
            annotation,
        ),
    };

    let prefix: &[&str] = match kind {
        JoinKind::Inner => &[OUTER],
        JoinKind::LeftOuter => &[OUTER, OUTER],
    };
    for mapping in &state.mappings {
        ctx.arena.record_flattening(*mapping, prefix);
    }
    ctx.arena.mark_expanded(node_id, &[INNER]);
    match kind {
        JoinKind::Inner => ctx.stats.joins_inner += 1,
        JoinKind::LeftOuter => ctx.stats.joins_left_outer += 1,
    }
    state.current_parameter = ctx.fresh_name("t");

    log::debug!(
        "✓ JoinInsertion: {}.{} -> {} join on Set({})",
        parent_entity,
        edge.name,
        match kind {
            JoinKind::Inner => "inner",
            JoinKind::LeftOuter => "left outer",
        },
        edge.target
    );
    Ok(())
}

/// `Join(outer, inner, o => ok, i => ik, (o, i) => { outer: o, inner: i })`
pub fn inner_join(
    outer: Expr,
    inner: Expr,
    outer_param: &str,
    outer_key: Expr,
    inner_param: &str,
    inner_key: Expr,
    annotation: JoinAnnotation,
) -> Expr {
    Expr::operator_call(
        QueryOperator::Join,
        vec![
            outer,
            inner,
            Expr::lambda(&[outer_param], outer_key),
            Expr::lambda(&[inner_param], inner_key),
            Expr::lambda(
                &[outer_param, inner_param],
                Expr::flattening_record(Expr::param(outer_param), Expr::param(inner_param)),
            ),
        ],
        Some(OperatorAnnotation::Join(annotation)),
    )
}

/// Left join idiom:
///
/// ```text
/// SelectMany(
///     GroupJoin(outer, inner, o => ok, i => ik, (o, g) => { outer: o, inner: g }),
///     t => DefaultIfEmpty(t.inner),
///     (t, i) => { outer: t, inner: i })
/// ```
#[allow(clippy::too_many_arguments)]
pub fn left_outer_join(
    ctx: &mut CompilationContext,
    outer: Expr,
    inner: Expr,
    outer_param: &str,
    outer_key: Expr,
    inner_param: &str,
    inner_key: Expr,
    annotation: JoinAnnotation,
) -> Expr {
    let group = ctx.fresh_name("g");
    let row = ctx.fresh_name("t");
    let group_join = Expr::operator_call(
        QueryOperator::GroupJoin,
        vec![
            outer,
            inner,
            Expr::lambda(&[outer_param], outer_key),
            Expr::lambda(&[inner_param], inner_key),
            Expr::lambda(
                &[outer_param, &group],
                Expr::flattening_record(Expr::param(outer_param), Expr::param(&group)),
            ),
        ],
        Some(OperatorAnnotation::Join(annotation)),
    );
    Expr::operator_call(
        QueryOperator::SelectMany,
        vec![
            group_join,
            Expr::lambda(
                &[&row],
                Expr::operator_call(
                    QueryOperator::DefaultIfEmpty,
                    vec![Expr::param(&row).member(INNER)],
                    None,
                ),
            ),
            Expr::lambda(
                &[&row, inner_param],
                Expr::flattening_record(Expr::param(&row), Expr::param(inner_param)),
            ),
        ],
        Some(OperatorAnnotation::LeftJoinFlatten),
    )
}

/// Two streams combined into one; pending selectors are still expressed over
/// their own mappings, which now resolve through the merged row.
pub struct MergedStreams {
    pub state: StreamState,
    pub outer_pending: Expr,
    pub inner_pending: Expr,
}

/// How the right-hand stream is attached to the left one.
pub enum StreamJoin {
    /// Key join. Keys are unbound expressions over each stream's parameter.
    Keyed {
        outer_key: Expr,
        inner_key: Expr,
        annotation: JoinAnnotation,
    },
    /// The right-hand source is a correlated subquery over the left row,
    /// already unbound against the left parameter.
    Correlated,
}

/// Merge two expanded streams under a fresh flattening record. Left mappings
/// are re-rooted under `outer` (`outer.outer` for a left join), right mappings
/// under `inner`.
pub fn join_streams(
    ctx: &mut CompilationContext,
    outer: StreamState,
    inner: StreamState,
    mut join: StreamJoin,
) -> MergedStreams {
    let outer_param = outer.current_parameter;
    let mut inner_param = inner.current_parameter;
    if inner_param == outer_param {
        let renamed = ctx.fresh_name(&inner_param);
        if let StreamJoin::Keyed { inner_key, .. } = &mut join {
            let key = std::mem::replace(inner_key, Expr::null());
            *inner_key = replace_parameter(key, &inner_param, &Expr::param(&renamed));
        }
        inner_param = renamed;
    }

    let (source, kind) = match join {
        StreamJoin::Keyed {
            outer_key,
            inner_key,
            annotation,
        } => {
            let kind = annotation.kind;
            let source = match kind {
                JoinKind::Inner => inner_join(
                    outer.source,
                    inner.source,
                    &outer_param,
                    outer_key,
                    &inner_param,
                    inner_key,
                    annotation,
                ),
                JoinKind::LeftOuter => left_outer_join(
                    ctx,
                    outer.source,
                    inner.source,
                    &outer_param,
                    outer_key,
                    &inner_param,
                    inner_key,
                    annotation,
                ),
            };
            match kind {
                JoinKind::Inner => ctx.stats.joins_inner += 1,
                JoinKind::LeftOuter => ctx.stats.joins_left_outer += 1,
            }
            (source, kind)
        }
        StreamJoin::Correlated => (
            Expr::operator_call(
                QueryOperator::SelectMany,
                vec![
                    outer.source,
                    Expr::lambda(&[&outer_param], inner.source),
                    Expr::lambda(
                        &[&outer_param, &inner_param],
                        Expr::flattening_record(
                            Expr::param(&outer_param),
                            Expr::param(&inner_param),
                        ),
                    ),
                ],
                None,
            ),
            JoinKind::Inner,
        ),
    };

    let outer_prefix: &[&str] = match kind {
        JoinKind::Inner => &[OUTER],
        JoinKind::LeftOuter => &[OUTER, OUTER],
    };
    for mapping in &outer.mappings {
        ctx.arena.record_flattening(*mapping, outer_prefix);
    }
    for mapping in &inner.mappings {
        ctx.arena.record_flattening(*mapping, &[INNER]);
        if kind == JoinKind::LeftOuter {
            ctx.arena.mark_optional(*mapping);
        }
    }

    let mut mappings = outer.mappings;
    mappings.extend(inner.mappings);
    MergedStreams {
        state: StreamState {
            source,
            current_parameter: ctx.fresh_name("t"),
            mappings,
            pending_selector: Expr::null(),
            apply_pending_selector: true,
            ordered: false,
            pending_cardinality: None,
        },
        outer_pending: outer.pending_selector,
        inner_pending: inner.pending_selector,
    }
}
