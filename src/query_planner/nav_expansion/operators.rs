//! Expansion driver
//!
//! Rewrites an operator chain source-first. Each operator receives the
//! [`StreamState`] of its source, composes its lambdas onto the pending
//! selector, binds and optimizes the composed body, inserts the joins the body
//! needs and emits the operator over the new physical source with the body
//! unbound against the physical row parameter.

use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        binding::bind,
        collection_rewrite::rewrite_collection_navigations,
        comparison::optimize_comparisons,
        correlation::{self, Correlation, HoistCandidate},
        errors::{NavExpansionError, Pass},
        join_insertion::{insert_navigation_joins, join_streams, MergedStreams, StreamJoin},
        reduction::unbind,
        stream_state::{is_identity, pending_entity, placeholder, root_state, take_source},
        terminating::expand_terminating,
    },
    query_ir::{
        visitors::{collect_placeholders, replace_parameter},
        Expr, JoinAnnotation, JoinKind, Lambda, OperatorAnnotation, OperatorCall, OperatorKind,
        QueryOperator, StreamState,
    },
};

/// Expand a query expression. Sequences come back as a stream-state wrapper,
/// scalar operators (Any, Count, Contains) as a call over one.
pub fn expand(ctx: &mut CompilationContext, expr: Expr) -> Result<Expr, NavExpansionError> {
    match expr {
        Expr::EntitySet(set) => Ok(root_state(ctx, &set.entity)?.into_expr()),
        Expr::StreamState(_) => Ok(expr),
        Expr::Call(call) => expand_call(ctx, call),
        other => Err(NavExpansionError::NotAStream {
            pass: Pass::Expansion,
            expression: other.to_string(),
        }),
    }
}

/// Expand the source of an operator, which must be a sequence that further
/// operators can be applied to.
pub fn expand_source(
    ctx: &mut CompilationContext,
    expr: Expr,
) -> Result<StreamState, NavExpansionError> {
    match expand(ctx, expr)? {
        Expr::StreamState(state) => match &state.pending_cardinality {
            None => Ok(*state),
            Some(operator) => Err(NavExpansionError::unsupported(
                Pass::Expansion,
                format!("{}(..)", operator),
                "no operator can be applied after a cardinality-reducing operator",
            )),
        },
        other => Err(NavExpansionError::NotAStream {
            pass: Pass::Expansion,
            expression: other.to_string(),
        }),
    }
}

fn expand_call(ctx: &mut CompilationContext, call: OperatorCall) -> Result<Expr, NavExpansionError> {
    let Some(info) = call.operator.info() else {
        return Err(NavExpansionError::UnsupportedOperator {
            pass: Pass::Expansion,
            operator: call.operator.to_string(),
        });
    };
    let actual = call.arguments.len();
    if actual < info.min_args || actual > info.max_args {
        return Err(NavExpansionError::InvalidArity {
            pass: Pass::Expansion,
            operator: info.name.to_string(),
            expected: if info.min_args == info.max_args {
                info.min_args.to_string()
            } else {
                format!("{}-{}", info.min_args, info.max_args)
            },
            actual,
        });
    }

    match (info.kind, call.operator.clone()) {
        (OperatorKind::Lambda, QueryOperator::Where) => expand_where(ctx, call),
        (OperatorKind::Lambda, QueryOperator::Select) => expand_select(ctx, call),
        (OperatorKind::Lambda, QueryOperator::OrderBy | QueryOperator::OrderByDescending) => {
            expand_order_by(ctx, call)
        }
        (OperatorKind::Lambda, QueryOperator::ThenBy | QueryOperator::ThenByDescending) => {
            expand_then_by(ctx, call)
        }
        (OperatorKind::MultiRoot, QueryOperator::Join) => expand_join(ctx, call),
        (OperatorKind::MultiRoot, QueryOperator::SelectMany) => expand_select_many(ctx, call),
        (OperatorKind::Terminating, _) => expand_terminating(ctx, call),
        // GroupJoin is only ever emitted; adapters are compiler-inserted.
        _ => Err(NavExpansionError::UnsupportedOperator {
            pass: Pass::Expansion,
            operator: call.operator.to_string(),
        }),
    }
}

// ===== LAMBDA PIPELINE =====

fn expect_lambda(
    operator: &QueryOperator,
    expr: Expr,
    arity: usize,
) -> Result<Lambda, NavExpansionError> {
    match expr {
        Expr::Lambda(lambda) if lambda.params.len() == arity => Ok(lambda),
        other => Err(NavExpansionError::unsupported(
            Pass::Expansion,
            other,
            format!("{} expects a lambda with {} parameter(s)", operator, arity),
        )),
    }
}

/// Substitute each lambda parameter with the matching pending selector.
fn compose(lambda: Lambda, selectors: &[&Expr]) -> Expr {
    lambda
        .params
        .iter()
        .zip(selectors)
        .fold(*lambda.body, |body, (param, selector)| {
            replace_parameter(body, param, selector)
        })
}

/// Bind, optimize comparisons and rewrite collection navigations.
fn bind_and_rewrite(ctx: &mut CompilationContext, body: Expr) -> Result<Expr, NavExpansionError> {
    let body = bind(ctx, body)?;
    let body = optimize_comparisons(ctx, body)?;
    rewrite_collection_navigations(ctx, body)
}

fn prepare_body(ctx: &mut CompilationContext, body: Expr) -> Result<Expr, NavExpansionError> {
    let body = bind_and_rewrite(ctx, body)?;
    expand_subqueries(ctx, body)
}

/// Expand nested queries (operator chains over an entity set) in place.
/// Results stay wrapped in their stream state until the enclosing lambda is
/// unbound, so re-composing a pending selector never expands them twice.
fn expand_subqueries(ctx: &mut CompilationContext, expr: Expr) -> Result<Expr, NavExpansionError> {
    if matches!(expr, Expr::Call(_)) && matches!(expr.chain_root(), Expr::EntitySet(_)) {
        log::debug!("🔍 Expansion: nested query {}", expr);
        return expand(ctx, expr);
    }
    match expr {
        Expr::StreamState(_) => Ok(expr),
        other => other.map_children(&mut |child| expand_subqueries(ctx, child)),
    }
}

/// Run one single-parameter lambda through the pipeline against `state`.
/// Returns the unbound body and the number of joins inserted for it.
fn rewrite_body(
    ctx: &mut CompilationContext,
    state: &mut StreamState,
    lambda: Lambda,
) -> Result<(Expr, usize), NavExpansionError> {
    let name = lambda.params[0].clone();
    let body = prepare_body(ctx, compose(lambda, &[&state.pending_selector]))?;
    let joins = insert_navigation_joins(ctx, state, &[&body])?;
    if joins > 0 {
        state.current_parameter = name;
    }
    let body = unbind(ctx, body, &state.current_parameter, &state.mappings)?;
    Ok((body, joins))
}

fn rewrite_lambda(
    ctx: &mut CompilationContext,
    state: &mut StreamState,
    lambda: Lambda,
) -> Result<(Expr, usize), NavExpansionError> {
    let (body, joins) = rewrite_body(ctx, state, lambda)?;
    Ok((Expr::lambda(&[&state.current_parameter], body), joins))
}

/// Split a `[source, lambda]` argument list.
fn source_and_lambda(
    call: OperatorCall,
    arity: usize,
) -> Result<(Expr, Lambda, Option<OperatorAnnotation>), NavExpansionError> {
    let OperatorCall {
        operator,
        arguments,
        annotation,
    } = call;
    let mut arguments = arguments.into_iter();
    match (arguments.next(), arguments.next()) {
        (Some(source), Some(lambda)) => {
            Ok((source, expect_lambda(&operator, lambda, arity)?, annotation))
        }
        _ => Err(NavExpansionError::InvalidArity {
            pass: Pass::Expansion,
            operator: operator.to_string(),
            expected: "2".to_string(),
            actual: 0,
        }),
    }
}

// ===== ROW-WISE OPERATORS =====

fn expand_where(ctx: &mut CompilationContext, call: OperatorCall) -> Result<Expr, NavExpansionError> {
    let (source, lambda, annotation) = source_and_lambda(call, 1)?;
    let mut state = expand_source(ctx, source)?;
    let (predicate, _) = rewrite_lambda(ctx, &mut state, lambda)?;

    let source = take_source(&mut state);
    state.source = Expr::operator_call(QueryOperator::Where, vec![source, predicate], annotation);
    state.ordered = false;
    Ok(state.into_expr())
}

fn expand_select(ctx: &mut CompilationContext, call: OperatorCall) -> Result<Expr, NavExpansionError> {
    let (source, lambda, _) = source_and_lambda(call, 1)?;
    let mut state = expand_source(ctx, source)?;

    let name = lambda.params[0].clone();
    let body = prepare_body(ctx, compose(lambda, &[&state.pending_selector]))?;
    if insert_navigation_joins(ctx, &mut state, &[&body])? > 0 {
        state.current_parameter = name;
    }

    if let Expr::Record(fields) = &body {
        for field in fields {
            if let Expr::Binding(b) = &field.value {
                ctx.arena.add_from_mapping(b.node, vec![field.name.clone()]);
            }
        }
    }

    state.pending_selector = body;
    state.apply_pending_selector |= !is_identity(ctx, &state);
    state.ordered = false;
    log::debug!(
        "🔍 Expansion: Select deferred, pending selector {}",
        state.pending_selector
    );
    Ok(state.into_expr())
}

fn expand_order_by(
    ctx: &mut CompilationContext,
    call: OperatorCall,
) -> Result<Expr, NavExpansionError> {
    let operator = call.operator.clone();
    let (source, lambda, _) = source_and_lambda(call, 1)?;
    let mut state = expand_source(ctx, source)?;
    let (key, _) = rewrite_lambda(ctx, &mut state, lambda)?;

    let source = take_source(&mut state);
    state.source = Expr::operator_call(operator, vec![source, key], None);
    state.ordered = true;
    Ok(state.into_expr())
}

fn expand_then_by(
    ctx: &mut CompilationContext,
    call: OperatorCall,
) -> Result<Expr, NavExpansionError> {
    let operator = call.operator.clone();
    let (source, lambda, _) = source_and_lambda(call, 1)?;
    let mut state = expand_source(ctx, source)?;
    if !state.ordered {
        return Err(NavExpansionError::unsupported(
            Pass::Expansion,
            operator,
            "ThenBy requires an ordered source",
        ));
    }
    let (key, joins) = rewrite_lambda(ctx, &mut state, lambda)?;

    let mut source = take_source(&mut state);
    if joins > 0 {
        // Joins return an unordered sequence; re-assert the ordering.
        source = Expr::operator_call(QueryOperator::AsOrdered, vec![source], None);
    }
    state.source = Expr::operator_call(operator, vec![source, key], None);
    state.ordered = true;
    Ok(state.into_expr())
}

// ===== MULTI-ROOT OPERATORS =====

fn key_parts(key: &Expr) -> Vec<&Expr> {
    match key {
        Expr::Tuple(items) => items.iter().collect(),
        Expr::Record(fields) => fields.iter().map(|f| &f.value).collect(),
        other => vec![other],
    }
}

/// Column names of a key for the join annotation.
fn key_names(key: &Expr) -> Vec<String> {
    key_parts(key)
        .into_iter()
        .map(|part| {
            let mut current = part;
            loop {
                match current {
                    Expr::Convert(c) => current = &c.operand,
                    Expr::Member(m) => return m.member.clone(),
                    other => return other.to_string(),
                }
            }
        })
        .collect()
}

fn expand_join(ctx: &mut CompilationContext, call: OperatorCall) -> Result<Expr, NavExpansionError> {
    let operator = call.operator;
    let mut arguments = call.arguments.into_iter();
    let (Some(outer), Some(inner), Some(outer_key), Some(inner_key), Some(result)) = (
        arguments.next(),
        arguments.next(),
        arguments.next(),
        arguments.next(),
        arguments.next(),
    ) else {
        return Err(NavExpansionError::InvalidArity {
            pass: Pass::Expansion,
            operator: operator.to_string(),
            expected: "5".to_string(),
            actual: 0,
        });
    };
    let outer_key = expect_lambda(&operator, outer_key, 1)?;
    let inner_key = expect_lambda(&operator, inner_key, 1)?;
    let result = expect_lambda(&operator, result, 2)?;

    let mut outer = expand_source(ctx, outer)?;
    let mut inner = expand_source(ctx, inner)?;
    let (outer_key, _) = rewrite_body(ctx, &mut outer, outer_key)?;
    let (inner_key, _) = rewrite_body(ctx, &mut inner, inner_key)?;

    let (outer_parts, inner_parts) = (key_parts(&outer_key).len(), key_parts(&inner_key).len());
    if outer_parts != inner_parts {
        return Err(NavExpansionError::KeyShapeMismatch {
            pass: Pass::Expansion,
            context: "Join".to_string(),
            outer: outer_parts,
            inner: inner_parts,
        });
    }

    let annotation = JoinAnnotation {
        kind: JoinKind::Inner,
        target_entity: pending_entity(ctx, &inner).map(str::to_string),
        navigation: None,
        outer_key: key_names(&outer_key),
        inner_key: key_names(&inner_key),
        outer_null_guard: false,
    };
    let merged = join_streams(
        ctx,
        outer,
        inner,
        StreamJoin::Keyed {
            outer_key,
            inner_key,
            annotation,
        },
    );
    log::debug!("✓ Expansion: merged Join streams");
    apply_result_selector(ctx, merged, Some(result))
}

/// Compose the two-parameter result selector (if any) over the merged pending
/// selectors; without one the inner rows are the result.
fn apply_result_selector(
    ctx: &mut CompilationContext,
    merged: MergedStreams,
    result: Option<Lambda>,
) -> Result<Expr, NavExpansionError> {
    let MergedStreams {
        mut state,
        outer_pending,
        inner_pending,
    } = merged;
    state.pending_selector = match result {
        Some(lambda) => {
            let body = prepare_body(ctx, compose(lambda, &[&outer_pending, &inner_pending]))?;
            insert_navigation_joins(ctx, &mut state, &[&body])?;
            body
        }
        None => inner_pending,
    };
    state.apply_pending_selector = true;
    Ok(state.into_expr())
}

fn expand_select_many(
    ctx: &mut CompilationContext,
    call: OperatorCall,
) -> Result<Expr, NavExpansionError> {
    let operator = call.operator;
    let mut arguments = call.arguments.into_iter();
    let (Some(source), Some(selector)) = (arguments.next(), arguments.next()) else {
        return Err(NavExpansionError::InvalidArity {
            pass: Pass::Expansion,
            operator: operator.to_string(),
            expected: "2-3".to_string(),
            actual: 0,
        });
    };
    let selector = expect_lambda(&operator, selector, 1)?;
    let result = arguments
        .next()
        .map(|result| expect_lambda(&operator, result, 2))
        .transpose()?;

    let outer = expand_source(ctx, source)?;
    let collection = bind_and_rewrite(ctx, compose(selector, &[&outer.pending_selector]))?;

    let analysis = if ctx.config.hoist_uncorrelated_collections {
        correlation::analyze(&collection)
    } else {
        Correlation::Correlated {
            reason: "collection hoisting disabled",
        }
    };

    let merged = match analysis {
        Correlation::Hoistable(candidate) => match expand_hoisted_inner(ctx, &candidate)? {
            Some(inner) => hoist(ctx, outer, inner, candidate)?,
            None => correlated(ctx, outer, collection)?,
        },
        Correlation::Correlated { reason } => {
            log::debug!("🔍 {}: {}", Pass::CorrelationCheck, reason);
            correlated(ctx, outer, collection)?
        }
    };
    apply_result_selector(ctx, merged, result)
}

/// Expand the hoisted chain over a fresh root of the target entity. Gives up
/// (returning `None`) if the chain no longer exposes that root.
fn expand_hoisted_inner(
    ctx: &mut CompilationContext,
    candidate: &HoistCandidate,
) -> Result<Option<StreamState>, NavExpansionError> {
    let stats = ctx.stats.clone();
    let root = root_state(ctx, &candidate.target_entity)?;
    let root_mapping = root.mappings[0];
    let chain = correlation::replace_chain_root(candidate.inner_chain.clone(), root.into_expr());
    let inner = expand_source(ctx, chain)?;

    let root_node = ctx.arena.mapping(root_mapping).root;
    if !inner.mappings.contains(&root_mapping) || ctx.arena.to_mapping(root_node).is_none() {
        log::warn!(
            "⚠️ {}: hoisted chain over {} lost its root, keeping correlated subquery",
            Pass::CorrelationCheck,
            candidate.navigation
        );
        ctx.stats = stats;
        return Ok(None);
    }
    Ok(Some(inner))
}

fn hoist(
    ctx: &mut CompilationContext,
    mut outer: StreamState,
    inner: StreamState,
    candidate: HoistCandidate,
) -> Result<MergedStreams, NavExpansionError> {
    let root_mapping = inner.mappings[0];
    let root_node = ctx.arena.mapping(root_mapping).root;
    let root = placeholder(ctx, root_node);

    let inner_parts = candidate
        .inner_key
        .into_iter()
        .map(|part| {
            let part = replace_parameter(part, &candidate.inner_parameter, &root);
            unbind(ctx, part, &inner.current_parameter, &inner.mappings)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outer_refs: Vec<&Expr> = candidate.outer_key.iter().collect();
    insert_navigation_joins(ctx, &mut outer, &outer_refs)?;
    let outer_null_guard = candidate
        .outer_key
        .iter()
        .flat_map(collect_placeholders)
        .any(|b| ctx.arena.node(b.node).optional);
    let outer_parts = candidate
        .outer_key
        .into_iter()
        .map(|part| unbind(ctx, part, &outer.current_parameter, &outer.mappings))
        .collect::<Result<Vec<_>, _>>()?;

    let outer_key = Expr::key_expr(outer_parts);
    let inner_key = Expr::key_expr(inner_parts);
    let kind = if candidate.left_outer {
        JoinKind::LeftOuter
    } else {
        JoinKind::Inner
    };
    let annotation = JoinAnnotation {
        kind,
        target_entity: Some(candidate.target_entity.clone()),
        navigation: Some(candidate.navigation.clone()),
        outer_key: key_names(&outer_key),
        inner_key: key_names(&inner_key),
        outer_null_guard,
    };

    ctx.stats.hoisted_collections += 1;
    log::debug!(
        "✓ {}: hoisted {} into a{} join",
        Pass::CorrelationCheck,
        candidate.navigation,
        if kind == JoinKind::LeftOuter {
            " left outer"
        } else {
            "n inner"
        }
    );
    Ok(join_streams(
        ctx,
        outer,
        inner,
        StreamJoin::Keyed {
            outer_key,
            inner_key,
            annotation,
        },
    ))
}

fn correlated(
    ctx: &mut CompilationContext,
    mut outer: StreamState,
    collection: Expr,
) -> Result<MergedStreams, NavExpansionError> {
    let mut inner = expand_source(ctx, collection)?;
    insert_navigation_joins(
        ctx,
        &mut outer,
        &[&inner.source, &inner.pending_selector],
    )?;
    let source = take_source(&mut inner);
    inner.source = unbind(ctx, source, &outer.current_parameter, &outer.mappings)?;

    ctx.stats.correlated_subqueries += 1;
    log::debug!("🔍 Expansion: SelectMany kept as correlated subquery");
    Ok(join_streams(ctx, outer, inner, StreamJoin::Correlated))
}
