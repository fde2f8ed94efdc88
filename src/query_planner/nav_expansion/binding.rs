//! Binding pass
//!
//! Matches member-access chains rooted at binding placeholders against the
//! navigation tree. A member naming a navigation becomes a placeholder for the
//! (possibly new) child node; properties and unknown members stay plain member
//! accesses on the placeholder and are validated when unbound. Member access on
//! an anonymous record folds to the field so projections compose.

use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        errors::{NavExpansionError, Pass},
        stream_state::placeholder,
    },
    query_ir::{BindingPlaceholder, Expr},
};

pub fn bind(ctx: &mut CompilationContext, expr: Expr) -> Result<Expr, NavExpansionError> {
    match expr {
        Expr::Member(access) => {
            let target = bind(ctx, *access.target)?;
            bind_member(ctx, target, access.member)
        }
        other => other.map_children(&mut |child| bind(ctx, child)),
    }
}

fn bind_member(
    ctx: &mut CompilationContext,
    target: Expr,
    member: String,
) -> Result<Expr, NavExpansionError> {
    match target {
        Expr::Record(mut fields) => match fields.iter().position(|f| f.name == member) {
            Some(index) => Ok(fields.swap_remove(index).value),
            None => Ok(Expr::Record(fields).member(&member)),
        },
        Expr::Binding(binding) => bind_placeholder_member(ctx, binding, member),
        other => Ok(other.member(&member)),
    }
}

fn bind_placeholder_member(
    ctx: &mut CompilationContext,
    binding: BindingPlaceholder,
    member: String,
) -> Result<Expr, NavExpansionError> {
    let node = ctx.arena.node(binding.node);

    // Collections are consumed by the collection rewrite, never bound through.
    if node.is_collection() {
        return Ok(Expr::Binding(binding).member(&member));
    }

    if let Some(child) = ctx.arena.find_child(binding.node, &member) {
        if ctx.arena.node(child).field.is_some() {
            return Ok(placeholder(ctx, child));
        }
    }

    let entity = match &node.entity {
        Some(entity) => entity.clone(),
        None => return Ok(Expr::Binding(binding).member(&member)),
    };
    let entity_type = ctx.entity_type(&entity, Pass::Binding)?;

    let Some(navigation) = entity_type.find_navigation(&member) else {
        return Ok(Expr::Binding(binding).member(&member));
    };

    let depth = ctx.arena.depth(binding.node) + 1;
    if depth > ctx.config.max_navigation_depth {
        let mut path = binding.path.clone();
        path.push(member);
        return Err(NavExpansionError::NavigationDepthExceeded {
            pass: Pass::Binding,
            path: path.join("."),
            max_depth: ctx.config.max_navigation_depth,
        });
    }

    let before = ctx.arena.node_count();
    let child = ctx.arena.get_or_add_child(binding.node, navigation);
    if ctx.arena.node_count() > before {
        ctx.stats.nodes_bound += 1;
        log::debug!(
            "🔍 Binding: {}.{} -> new node {} ({})",
            entity,
            member,
            child,
            if ctx.arena.node(child).optional {
                "optional"
            } else {
                "required"
            }
        );
    }
    Ok(placeholder(ctx, child))
}
