//! Comparison optimization
//!
//! Rewrites equality over bound entities into key comparisons:
//!
//! - entity == entity (same type): compare primary keys, tuple for composite keys,
//!   widening keys read through optional navigations
//! - entity == entity (different types): constant `false`
//! - entity == null: compare the key against typed nulls
//! - collection == collection: same navigation compares the owners, otherwise `false`
//! - collection == null: compare the owner against null
//!
//! `!=` yields the negated constants. `Equals(a, b)` is handled as `a == b`.
//! Equalities that read members of optional navigations, including key
//! comparisons and comparisons with a null constant, are wrapped in a null-safe
//! equality.

use crate::entity_catalog::Property;
use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        errors::{NavExpansionError, Pass},
        stream_state::placeholder,
    },
    navigation_tree::NodeId,
    query_ir::{BinaryOperator, BindingPlaceholder, Expr, NullSafeEquality},
};

#[derive(Debug, Clone, Copy)]
enum Operand {
    Entity(NodeId),
    Collection(NodeId),
    Null,
    Other,
}

pub fn optimize_comparisons(
    ctx: &mut CompilationContext,
    expr: Expr,
) -> Result<Expr, NavExpansionError> {
    let expr = expr.map_children(&mut |child| optimize_comparisons(ctx, child))?;
    match expr {
        Expr::Binary(b) if b.op.is_equality() => rewrite_equality(ctx, b.op, *b.left, *b.right),
        Expr::Function(f) if f.name == "Equals" && f.arguments.len() == 2 => {
            let mut args = f.arguments.into_iter();
            match (args.next(), args.next()) {
                (Some(left), Some(right)) => {
                    rewrite_equality(ctx, BinaryOperator::Equal, left, right)
                }
                _ => Err(NavExpansionError::unsupported(
                    Pass::ComparisonOptimization,
                    "Equals",
                    "expected two arguments",
                )),
            }
        }
        other => Ok(other),
    }
}

fn classify(ctx: &CompilationContext, expr: &Expr) -> Operand {
    match expr {
        Expr::Binding(b) => {
            let node = ctx.arena.node(b.node);
            if node.is_collection() {
                Operand::Collection(b.node)
            } else if node.entity.is_some() {
                Operand::Entity(b.node)
            } else {
                Operand::Other
            }
        }
        e if e.is_null_constant() => Operand::Null,
        _ => Operand::Other,
    }
}

fn constant(op: BinaryOperator, equal: bool) -> Expr {
    Expr::boolean(if op == BinaryOperator::Equal { equal } else { !equal })
}

fn rewrite_equality(
    ctx: &mut CompilationContext,
    op: BinaryOperator,
    left: Expr,
    right: Expr,
) -> Result<Expr, NavExpansionError> {
    match (classify(ctx, &left), classify(ctx, &right)) {
        (Operand::Collection(a), Operand::Collection(b)) => {
            let same_navigation = {
                let (na, nb) = (ctx.arena.node(a), ctx.arena.node(b));
                na.edge == nb.edge
                    && na.parent.map(|p| ctx.arena.node(p).entity.clone())
                        == nb.parent.map(|p| ctx.arena.node(p).entity.clone())
            };
            let owners = (ctx.arena.node(a).parent, ctx.arena.node(b).parent);
            ctx.arena.remove(a);
            ctx.arena.remove(b);
            log::debug!("🔍 ComparisonOptimization: collection comparison {} vs {}", a, b);

            match owners {
                (Some(pa), Some(pb)) if same_navigation => compare_entities(ctx, op, pa, pb),
                _ => Ok(constant(op, false)),
            }
        }
        (Operand::Collection(c), Operand::Null) | (Operand::Null, Operand::Collection(c)) => {
            let owner = ctx.arena.node(c).parent;
            ctx.arena.remove(c);
            match owner {
                Some(owner) => compare_with_null(ctx, op, owner),
                None => Ok(constant(op, false)),
            }
        }
        (Operand::Collection(_), _) | (_, Operand::Collection(_)) => {
            Err(NavExpansionError::unsupported(
                Pass::ComparisonOptimization,
                Expr::binary(op, left, right),
                "a collection navigation can only be compared with another collection or null",
            ))
        }
        (Operand::Entity(a), Operand::Entity(b)) => compare_entities(ctx, op, a, b),
        (Operand::Entity(e), Operand::Null) | (Operand::Null, Operand::Entity(e)) => {
            compare_with_null(ctx, op, e)
        }
        _ if op == BinaryOperator::Equal && ctx.config.null_safe_equality => {
            Ok(null_safe(ctx, left, right))
        }
        _ => Ok(Expr::binary(op, left, right)),
    }
}

/// Key property reads on a bound entity node.
fn key_reads(
    ctx: &CompilationContext,
    node: NodeId,
) -> Result<Vec<(Expr, Property)>, NavExpansionError> {
    let entity = ctx
        .arena
        .node(node)
        .entity
        .clone()
        .unwrap_or_default();
    let entity_type = ctx.entity_type(&entity, Pass::ComparisonOptimization)?;
    let properties = entity_type
        .primary_key_properties()
        .map_err(|source| NavExpansionError::Catalog {
            pass: Pass::ComparisonOptimization,
            source,
        })?;
    let target = placeholder(ctx, node);
    Ok(properties
        .into_iter()
        .map(|p| (target.clone().member(&p.name), p.clone()))
        .collect())
}

fn compare_entities(
    ctx: &mut CompilationContext,
    op: BinaryOperator,
    a: NodeId,
    b: NodeId,
) -> Result<Expr, NavExpansionError> {
    if ctx.arena.node(a).entity != ctx.arena.node(b).entity {
        return Ok(constant(op, false));
    }
    let left = key_reads(ctx, a)?;
    let right = key_reads(ctx, b)?;
    // Keys read through a left join are null when the row is absent.
    let (a_optional, b_optional) = (ctx.arena.node(a).optional, ctx.arena.node(b).optional);

    let (left_parts, right_parts): (Vec<Expr>, Vec<Expr>) = left
        .into_iter()
        .zip(right)
        .map(|((l, lp), (r, rp))| {
            reconcile(l, lp.nullable || a_optional, r, rp.nullable || b_optional, &lp)
        })
        .unzip();
    let (left, right) = (Expr::key_expr(left_parts), Expr::key_expr(right_parts));

    if op == BinaryOperator::Equal && ctx.config.null_safe_equality {
        Ok(null_safe(ctx, left, right))
    } else {
        Ok(Expr::binary(op, left, right))
    }
}

fn compare_with_null(
    ctx: &mut CompilationContext,
    op: BinaryOperator,
    node: NodeId,
) -> Result<Expr, NavExpansionError> {
    let reads = key_reads(ctx, node)?;
    let (key_parts, nulls): (Vec<Expr>, Vec<Expr>) = reads
        .into_iter()
        .map(|(read, p)| {
            let read = if p.nullable {
                read
            } else {
                read.convert(p.data_type, true)
            };
            (read, Expr::typed_null(p.data_type))
        })
        .unzip();
    Ok(Expr::binary(
        op,
        Expr::key_expr(key_parts),
        Expr::key_expr(nulls),
    ))
}

/// Widen the non-nullable side of a key pair when nullability differs.
pub(crate) fn reconcile(
    left: Expr,
    left_nullable: bool,
    right: Expr,
    right_nullable: bool,
    property: &Property,
) -> (Expr, Expr) {
    match (left_nullable, right_nullable) {
        (false, true) => (left.convert(property.data_type, true), right),
        (true, false) => (left, right.convert(property.data_type, true)),
        _ => (left, right),
    }
}

/// Wrap `left == right` so it is false whenever an optional navigation it
/// reads is absent.
fn null_safe(ctx: &CompilationContext, left: Expr, right: Expr) -> Expr {
    let mut guards: Vec<BindingPlaceholder> = Vec::new();
    collect_optional_reads(ctx, &left, &mut guards);
    collect_optional_reads(ctx, &right, &mut guards);

    if guards.is_empty() {
        return Expr::binary(BinaryOperator::Equal, left, right);
    }
    log::debug!(
        "🔍 ComparisonOptimization: null-safe equality guarded by {} optional navigation(s)",
        guards.len()
    );
    Expr::NullSafeEqual(NullSafeEquality {
        guards: guards.into_iter().map(Expr::Binding).collect(),
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn collect_optional_reads(ctx: &CompilationContext, expr: &Expr, out: &mut Vec<BindingPlaceholder>) {
    match expr {
        Expr::Member(m) => {
            if let Expr::Binding(b) = &*m.target {
                if ctx.arena.node(b.node).optional && !out.iter().any(|g| g.node == b.node) {
                    out.push(b.clone());
                }
            } else {
                collect_optional_reads(ctx, &m.target, out);
            }
        }
        Expr::Lambda(_) | Expr::Call(_) => {}
        other => {
            for child in other.children() {
                collect_optional_reads(ctx, child, out);
            }
        }
    }
}
