//! Reduction pass
//!
//! Replaces binding placeholders with physical access paths and finalizes
//! stream-state wrappers. Entity placeholders become `EntityShape` markers so
//! a downstream materializer knows which fields form an entity.

use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        errors::{NavExpansionError, Pass},
        stream_state::{is_identity, physical_path, root_parameter},
    },
    navigation_tree::SourceMappingId,
    query_ir::{
        visitors::{collect_placeholders, rename_lambda_parameter},
        BindingPlaceholder, EntityShape, Expr, NullSafeEquality, QueryOperator, StreamState,
    },
    transformed::Transformed,
};

/// Replace placeholders of `mappings` in `expr` with paths below `param`.
/// Placeholders of other mappings belong to an enclosing query and are kept.
pub fn unbind(
    ctx: &mut CompilationContext,
    expr: Expr,
    param: &str,
    mappings: &[SourceMappingId],
) -> Result<Expr, NavExpansionError> {
    match expr {
        Expr::Member(access) => match *access.target {
            Expr::Binding(b) if mappings.contains(&b.mapping) => {
                let path = resolved_path(ctx, &b)?;
                if let Some(entity) = ctx.arena.node(b.node).entity.clone() {
                    let entity_type = ctx.entity_type(&entity, Pass::Reduction)?;
                    if entity_type.find_property(&access.member).is_none() {
                        return Err(NavExpansionError::UnresolvableMember {
                            pass: Pass::Reduction,
                            target: entity,
                            member: access.member,
                        });
                    }
                }
                Ok(physical_path(param, &path).member(&access.member))
            }
            target => Ok(unbind(ctx, target, param, mappings)?.member(&access.member)),
        },
        Expr::Binding(b) if mappings.contains(&b.mapping) => {
            let path = physical_path(param, &resolved_path(ctx, &b)?);
            Ok(match ctx.arena.node(b.node).entity.clone() {
                Some(entity) => Expr::EntityShape(EntityShape {
                    entity,
                    source: Box::new(path),
                }),
                None => path,
            })
        }
        Expr::NullSafeEqual(n) => {
            let guards = n
                .guards
                .into_iter()
                .map(|guard| match guard {
                    Expr::Binding(b) if mappings.contains(&b.mapping) => {
                        Ok(physical_path(param, &resolved_path(ctx, &b)?))
                    }
                    other => unbind(ctx, other, param, mappings),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::NullSafeEqual(NullSafeEquality {
                guards,
                left: Box::new(unbind(ctx, *n.left, param, mappings)?),
                right: Box::new(unbind(ctx, *n.right, param, mappings)?),
            }))
        }
        Expr::StreamState(state) => {
            let finalized = finalize_stream(ctx, *state)?;
            unbind(ctx, finalized, param, mappings)
        }
        Expr::Lambda(lambda)
            if lambda.params.iter().any(|p| p == param)
                && has_placeholders_of(&lambda.body, mappings) =>
        {
            // The nested lambda would capture the paths we are about to insert.
            let renamed = ctx.fresh_name(&root_parameter(param));
            log::trace!("Reduction: renaming nested lambda parameter {} -> {}", param, renamed);
            Expr::Lambda(rename_lambda_parameter(lambda, param, &renamed))
                .map_children(&mut |child| unbind(ctx, child, param, mappings))
        }
        other => other.map_children(&mut |child| unbind(ctx, child, param, mappings)),
    }
}

fn resolved_path(
    ctx: &CompilationContext,
    binding: &BindingPlaceholder,
) -> Result<Vec<String>, NavExpansionError> {
    ctx.arena
        .to_mapping(binding.node)
        .ok_or_else(|| NavExpansionError::UnreducedBinding {
            pass: Pass::Reduction,
            binding: Expr::Binding(binding.clone()).to_string(),
        })
}

fn has_placeholders_of(expr: &Expr, mappings: &[SourceMappingId]) -> bool {
    collect_placeholders(expr)
        .iter()
        .any(|b| mappings.contains(&b.mapping))
}

/// Turn a stream state into its physical query: apply the pending selector
/// when the rows do not already have its shape, then the pending
/// cardinality operator.
pub fn finalize_stream(
    ctx: &mut CompilationContext,
    state: StreamState,
) -> Result<Expr, NavExpansionError> {
    let needs_projection = state.apply_pending_selector || !is_identity(ctx, &state);
    let StreamState {
        source,
        current_parameter,
        mappings,
        pending_selector,
        pending_cardinality,
        ..
    } = state;

    let mut result = source;
    if needs_projection {
        let body = unbind(ctx, pending_selector, &current_parameter, &mappings)?;
        result = Expr::operator_call(
            QueryOperator::Select,
            vec![result, Expr::lambda(&[&current_parameter], body)],
            None,
        );
    }
    if let Some(operator) = pending_cardinality {
        result = Expr::operator_call(operator, vec![result], None);
    }
    Ok(result)
}

/// Finalize every remaining stream state. Returns `Transformed::No` when the
/// query was already fully reduced.
pub fn reduce_query(
    ctx: &mut CompilationContext,
    expr: Expr,
) -> Result<Transformed<Expr>, NavExpansionError> {
    let mut changed = false;
    let reduced = reduce(ctx, expr, &mut changed)?;
    if changed {
        log::debug!("✓ Reduction: {}", reduced);
        Ok(Transformed::Yes(reduced))
    } else {
        Ok(Transformed::No(reduced))
    }
}

fn reduce(
    ctx: &mut CompilationContext,
    expr: Expr,
    changed: &mut bool,
) -> Result<Expr, NavExpansionError> {
    match expr {
        Expr::StreamState(state) => {
            *changed = true;
            let finalized = finalize_stream(ctx, *state)?;
            reduce(ctx, finalized, changed)
        }
        Expr::Binding(b) => Err(NavExpansionError::UnreducedBinding {
            pass: Pass::Reduction,
            binding: Expr::Binding(b).to_string(),
        }),
        other => other.map_children(&mut |child| reduce(ctx, child, changed)),
    }
}
