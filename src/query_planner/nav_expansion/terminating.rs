//! Terminating operators
//!
//! Operators that need a concrete row shape. When the pending selector has
//! to be applied first, it is materialized with an explicit `Select` and the
//! stream restarts from a fresh source mapping over the projected rows.

use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        errors::{NavExpansionError, Pass},
        operators::expand_source,
        reduction::unbind,
        stream_state::{pending_entity, placeholder, take_source},
    },
    query_ir::{Expr, Literal, OperatorCall, QueryOperator, StreamState},
};

pub fn expand_terminating(
    ctx: &mut CompilationContext,
    call: OperatorCall,
) -> Result<Expr, NavExpansionError> {
    let operator = call.operator;
    let mut arguments = call.arguments.into_iter();
    let Some(source) = arguments.next() else {
        return Err(NavExpansionError::InvalidArity {
            pass: Pass::Expansion,
            operator: operator.to_string(),
            expected: "at least 1".to_string(),
            actual: 0,
        });
    };
    let mut rest: Vec<Expr> = arguments.collect();

    // First(p), Any(p), ... are Where(p) followed by the plain operator.
    let source = if operator.accepts_predicate() && rest.len() == 1 {
        let predicate = rest.remove(0);
        Expr::operator_call(QueryOperator::Where, vec![source, predicate], None)
    } else {
        source
    };

    let mut state = expand_source(ctx, source)?;
    log::debug!("🔍 Expansion: terminating operator {}", operator);

    match operator {
        op if op.is_scalar_result() => {
            // Contains keeps its item argument.
            let mut arguments = vec![state.into_expr()];
            arguments.extend(rest);
            Ok(Expr::operator_call(op, arguments, None))
        }
        op if op.is_cardinality_reducing() => {
            state.pending_cardinality = Some(op);
            Ok(state.into_expr())
        }
        QueryOperator::Distinct
        | QueryOperator::Take
        | QueryOperator::Skip
        | QueryOperator::AsTracking => {
            materialize_if_needed(ctx, &mut state, None)?;
            Ok(apply_operator(state, operator, rest).into_expr())
        }
        QueryOperator::OfType => {
            let target = match rest.first() {
                Some(Expr::EntitySet(set)) => set.entity.clone(),
                Some(Expr::Constant(Literal::String(name))) => name.clone(),
                other => {
                    return Err(NavExpansionError::unsupported(
                        Pass::Expansion,
                        other.map(ToString::to_string).unwrap_or_default(),
                        "OfType expects an entity type argument",
                    ))
                }
            };
            ctx.entity_type(&target, Pass::Expansion)?;
            materialize_if_needed(ctx, &mut state, Some(&target))?;
            Ok(apply_operator(state, operator, rest).into_expr())
        }
        QueryOperator::DefaultIfEmpty => {
            materialize_if_needed(ctx, &mut state, None)?;
            for mapping in &state.mappings {
                ctx.arena.mark_optional(*mapping);
            }
            Ok(apply_operator(state, operator, rest).into_expr())
        }
        other => Err(NavExpansionError::UnsupportedOperator {
            pass: Pass::Expansion,
            operator: other.to_string(),
        }),
    }
}

fn apply_operator(mut state: StreamState, operator: QueryOperator, rest: Vec<Expr>) -> StreamState {
    let mut arguments = vec![take_source(&mut state)];
    arguments.extend(rest);
    state.source = Expr::operator_call(operator, arguments, None);
    state.ordered = false;
    state
}

/// Emit the pending selector as a `Select` when the physical rows do not have
/// its shape yet (or, for `OfType`, are not of the requested entity type).
/// The projected rows get a new source mapping: an entity root when the
/// selector is one entity placeholder, an opaque record root otherwise, with
/// field nodes for the entity-valued fields of a projected record.
pub fn materialize_if_needed(
    ctx: &mut CompilationContext,
    state: &mut StreamState,
    entity: Option<&str>,
) -> Result<(), NavExpansionError> {
    let changes_entity = entity.is_some_and(|target| pending_entity(ctx, state) != Some(target));
    if !state.apply_pending_selector && !changes_entity {
        return Ok(());
    }

    let param = state.current_parameter.clone();
    let selector = std::mem::replace(&mut state.pending_selector, Expr::null());
    let body = unbind(ctx, selector.clone(), &param, &state.mappings)?;
    let source = take_source(state);
    state.source = Expr::operator_call(
        QueryOperator::Select,
        vec![source, Expr::lambda(&[&param], body)],
        None,
    );

    let mapping = match (entity, &selector) {
        (Some(target), Expr::Binding(b)) => {
            let optional = ctx.arena.node(b.node).optional;
            ctx.arena.add_source_mapping(Some(target), optional)
        }
        (Some(target), _) => ctx.arena.add_source_mapping(Some(target), false),
        (None, Expr::Binding(b)) if ctx.arena.node(b.node).entity.is_some() => {
            let node = ctx.arena.node(b.node);
            let (entity, optional) = (node.entity.clone(), node.optional);
            ctx.arena.add_source_mapping(entity.as_deref(), optional)
        }
        (None, selector) => {
            let fields = entity_fields(ctx, selector);
            let mapping = ctx.arena.add_source_mapping(None, false);
            let root = ctx.arena.mapping(mapping).root;
            for (name, entity, optional) in fields {
                ctx.arena.add_field_node(root, &name, Some(&entity), optional);
            }
            mapping
        }
    };

    let root = ctx.arena.mapping(mapping).root;
    state.mappings = vec![mapping];
    state.pending_selector = placeholder(ctx, root);
    state.apply_pending_selector = false;
    ctx.stats.materializations += 1;
    log::debug!(
        "✓ Expansion: materialized pending selector into {} ({})",
        mapping,
        ctx.arena
            .mapping(mapping)
            .root_entity
            .as_deref()
            .unwrap_or("record")
    );
    Ok(())
}

/// Entity-valued fields of a projected record, as `(field, entity, optional)`.
/// An opaque placeholder passes on the entity fields of its own record.
fn entity_fields(ctx: &CompilationContext, selector: &Expr) -> Vec<(String, String, bool)> {
    match selector {
        Expr::Record(fields) => fields
            .iter()
            .filter_map(|field| match &field.value {
                Expr::Binding(b) => {
                    let node = ctx.arena.node(b.node);
                    node.entity
                        .clone()
                        .map(|entity| (field.name.clone(), entity, node.optional))
                }
                _ => None,
            })
            .collect(),
        Expr::Binding(b) => ctx
            .arena
            .node(b.node)
            .children
            .iter()
            .map(|child| ctx.arena.node(*child))
            .filter_map(|node| match (&node.field, &node.entity) {
                (Some(field), Some(entity)) if !node.removed => {
                    Some((field.clone(), entity.clone(), node.optional))
                }
                _ => None,
            })
            .collect(),
        _ => vec![],
    }
}
