use crate::query_planner::{
    compile_ctx::CompilationContext,
    nav_expansion::{
        comparison::reconcile,
        errors::{NavExpansionError, Pass},
        stream_state::{placeholder, root_parameter},
    },
    query_ir::{BindingPlaceholder, Expr, OperatorAnnotation, QueryOperator},
};

/// Replace every collection-valued placeholder with a correlated filter over
/// the target entity set:
///
/// `Where(Set(Target), e => owner.key != null && e.fk == owner.key)`
///
/// and `collection.Count` with `Count(filter)`. The collection node is removed
/// from the navigation tree; collections are never joined into the row.
pub fn rewrite_collection_navigations(
    ctx: &mut CompilationContext,
    expr: Expr,
) -> Result<Expr, NavExpansionError> {
    match expr {
        Expr::Member(access) => match *access.target {
            Expr::Binding(b) if ctx.arena.node(b.node).is_collection() => {
                if access.member == "Count" {
                    let filter = collection_filter(ctx, b)?;
                    Ok(Expr::operator_call(QueryOperator::Count, vec![filter], None))
                } else {
                    Err(NavExpansionError::UnresolvableMember {
                        pass: Pass::CollectionRewrite,
                        target: b.path.join("."),
                        member: access.member,
                    })
                }
            }
            target => Ok(rewrite_collection_navigations(ctx, target)?.member(&access.member)),
        },
        Expr::Binding(b) if ctx.arena.node(b.node).is_collection() => collection_filter(ctx, b),
        other => other.map_children(&mut |child| rewrite_collection_navigations(ctx, child)),
    }
}

fn collection_filter(
    ctx: &mut CompilationContext,
    binding: BindingPlaceholder,
) -> Result<Expr, NavExpansionError> {
    let node = ctx.arena.node(binding.node).clone();
    let (Some(edge), Some(owner)) = (node.edge, node.parent) else {
        return Err(NavExpansionError::UnreducedBinding {
            pass: Pass::CollectionRewrite,
            binding: Expr::Binding(binding).to_string(),
        });
    };
    let owner_entity = ctx.arena.node(owner).entity.clone().unwrap_or_default();

    let owner_type = ctx.entity_type(&owner_entity, Pass::CollectionRewrite)?;
    let target_type = ctx.entity_type(&edge.target, Pass::CollectionRewrite)?;
    let catalog_err = |source| NavExpansionError::Catalog {
        pass: Pass::CollectionRewrite,
        source,
    };
    let owner_keys = owner_type
        .properties_named(edge.source_key())
        .map_err(catalog_err)?;
    let element_keys = target_type
        .properties_named(edge.target_key())
        .map_err(catalog_err)?;
    if owner_keys.len() != element_keys.len() {
        return Err(NavExpansionError::KeyShapeMismatch {
            pass: Pass::CollectionRewrite,
            context: format!("{}.{}", owner_entity, edge.name),
            outer: owner_keys.len(),
            inner: element_keys.len(),
        });
    }

    let element = ctx.fresh_name(&root_parameter(&edge.target));
    let owner_ref = placeholder(ctx, owner);

    let mut guard_keys = Vec::new();
    let mut guard_nulls = Vec::new();
    let mut element_parts = Vec::new();
    let mut owner_parts = Vec::new();
    for (owner_key, element_key) in owner_keys.iter().zip(element_keys.iter()) {
        let owner_read = owner_ref.clone().member(&owner_key.name);
        guard_keys.push(if owner_key.nullable {
            owner_read.clone()
        } else {
            owner_read.clone().convert(owner_key.data_type, true)
        });
        guard_nulls.push(Expr::typed_null(owner_key.data_type));

        let (element_read, owner_read) = reconcile(
            Expr::param(&element).member(&element_key.name),
            element_key.nullable,
            owner_read,
            owner_key.nullable,
            owner_key,
        );
        element_parts.push(element_read);
        owner_parts.push(owner_read);
    }

    let predicate = Expr::key_expr(guard_keys)
        .not_equals(Expr::key_expr(guard_nulls))
        .and(Expr::key_expr(element_parts).equals(Expr::key_expr(owner_parts)));

    ctx.arena.remove(binding.node);
    log::debug!(
        "🔍 CollectionRewrite: {}.{} -> correlated filter over Set({})",
        owner_entity,
        edge.name,
        edge.target
    );

    Ok(Expr::operator_call(
        QueryOperator::Where,
        vec![
            Expr::entity_set(&edge.target),
            Expr::lambda(&[&element], predicate),
        ],
        Some(OperatorAnnotation::CollectionNavigation {
            owner_entity,
            navigation: edge.name.clone(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::query_planner::nav_expansion::{
        binding::bind, stream_state::root_state, tests::test_catalog,
    };

    #[test]
    fn test_collection_becomes_correlated_filter() {
        let catalog = test_catalog();
        let config = CompilerConfig::default();
        let mut ctx = CompilationContext::new(&catalog, &config);
        let c = root_state(&mut ctx, "Customer").unwrap().pending_selector;

        let bound = bind(&mut ctx, c.member("Orders")).unwrap();
        let orders_node = match &bound {
            Expr::Binding(b) => b.node,
            other => panic!("expected placeholder, got {}", other),
        };
        let rewritten = rewrite_collection_navigations(&mut ctx, bound).unwrap();

        assert_eq!(
            rewritten.to_string(),
            "Where(Set(Order), o1 => ((Convert(<m0:n0:>.Id, int?) != Convert(null, int?)) && (o1.CustomerId == <m0:n0:>.Id)))"
        );
        assert!(ctx.arena.node(orders_node).removed);
        match rewritten {
            Expr::Call(call) => assert!(matches!(
                call.annotation,
                Some(OperatorAnnotation::CollectionNavigation { ref navigation, .. }) if navigation == "Orders"
            )),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_collection_count() {
        let catalog = test_catalog();
        let config = CompilerConfig::default();
        let mut ctx = CompilationContext::new(&catalog, &config);
        let o = root_state(&mut ctx, "Order").unwrap().pending_selector;

        let bound = bind(&mut ctx, o.member("Lines").member("Count")).unwrap();
        let rewritten = rewrite_collection_navigations(&mut ctx, bound).unwrap();

        assert!(rewritten.to_string().starts_with("Count(Where(Set(OrderLine), o1 => "));
    }

    #[test]
    fn test_composite_collection_keys() {
        let catalog = test_catalog();
        let config = CompilerConfig::default();
        let mut ctx = CompilationContext::new(&catalog, &config);
        let l = root_state(&mut ctx, "OrderLine").unwrap().pending_selector;

        let bound = bind(&mut ctx, l.member("Shipments")).unwrap();
        let rewritten = rewrite_collection_navigations(&mut ctx, bound).unwrap();

        assert!(rewritten
            .to_string()
            .contains("((s1.OrderId, s1.LineNo) == (<m0:n0:>.OrderId, <m0:n0:>.LineNo))"));
    }

    #[test]
    fn test_unknown_collection_member() {
        let catalog = test_catalog();
        let config = CompilerConfig::default();
        let mut ctx = CompilationContext::new(&catalog, &config);
        let c = root_state(&mut ctx, "Customer").unwrap().pending_selector;

        let bound = bind(&mut ctx, c.member("Orders").member("Total")).unwrap();
        let err = rewrite_collection_navigations(&mut ctx, bound).unwrap_err();
        assert!(matches!(err, NavExpansionError::UnresolvableMember { .. }));
    }
}
