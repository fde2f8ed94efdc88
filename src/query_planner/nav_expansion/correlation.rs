//! Correlation checker for collection selectors.
//!
//! Decides whether the collection selector of a `SelectMany` can be hoisted
//! into a physical join. The selector must be a chain of row-wise operators
//! (optionally wrapped in `DefaultIfEmpty`) over a collection-navigation
//! filter whose predicate is exactly `owner.key != null && inner == outer`.
//! Once the filter is cut out, the rest of the chain must not reference the
//! outer stream.

use crate::query_planner::{
    nav_expansion::errors::Pass,
    query_ir::{
        visitors::references_parameter, BinaryOperator, Expr, OperatorAnnotation, OperatorCall,
        QueryOperator,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct HoistCandidate {
    /// Selector chain with the navigation filter replaced by `Set(target)`.
    pub inner_chain: Expr,
    pub target_entity: String,
    /// `Owner.Navigation`
    pub navigation: String,
    /// Parameter the filter used for target rows.
    pub inner_parameter: String,
    pub inner_key: Vec<Expr>,
    pub outer_key: Vec<Expr>,
    pub left_outer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    Hoistable(HoistCandidate),
    Correlated { reason: &'static str },
}

pub fn analyze(selector: &Expr) -> Correlation {
    let (chain, left_outer) = match selector {
        Expr::Call(call) if call.operator == QueryOperator::DefaultIfEmpty => {
            match call.arguments.first() {
                Some(source) => (source, true),
                None => return correlated("malformed DefaultIfEmpty"),
            }
        }
        other => (other, false),
    };

    let Some((filter, row_wise)) = find_navigation_filter(chain) else {
        return correlated("selector is not a row-wise chain over a collection navigation");
    };
    if !row_wise {
        return correlated("selector applies a non row-wise operator to the collection");
    }

    let Some(OperatorAnnotation::CollectionNavigation {
        owner_entity,
        navigation,
    }) = &filter.annotation
    else {
        return correlated("missing navigation filter");
    };
    let target_entity = match filter.arguments.first() {
        Some(Expr::EntitySet(set)) => set.entity.clone(),
        _ => return correlated("navigation filter is not over an entity set"),
    };
    let Some(Expr::Lambda(lambda)) = filter.arguments.get(1) else {
        return correlated("navigation filter has no predicate");
    };
    let [inner_parameter] = lambda.params.as_slice() else {
        return correlated("navigation filter predicate must take one parameter");
    };

    let Some((inner_key, outer_key)) = extract_key_pair(&lambda.body, inner_parameter) else {
        log::debug!(
            "🔍 {}: no single guarded equality in {}, keeping correlated subquery",
            Pass::CorrelationCheck,
            lambda.body
        );
        return correlated("no extractable key equality");
    };

    let inner_chain = replace_filter(chain.clone(), &target_entity);
    if references_outer(&inner_chain) {
        return correlated("selector references the outer stream");
    }

    Correlation::Hoistable(HoistCandidate {
        inner_chain,
        target_entity,
        navigation: format!("{}.{}", owner_entity, navigation),
        inner_parameter: inner_parameter.clone(),
        inner_key,
        outer_key,
        left_outer,
    })
}

fn correlated(reason: &'static str) -> Correlation {
    Correlation::Correlated { reason }
}

/// Walk `arguments[0]` down to the navigation filter. The flag reports whether
/// every operator above it is row-wise.
fn find_navigation_filter(expr: &Expr) -> Option<(&OperatorCall, bool)> {
    let mut current = expr;
    let mut row_wise = true;
    loop {
        let Expr::Call(call) = current else {
            return None;
        };
        if matches!(
            call.annotation,
            Some(OperatorAnnotation::CollectionNavigation { .. })
        ) {
            return Some((call, row_wise));
        }
        row_wise &= call.operator.is_row_wise();
        current = call.arguments.first()?;
    }
}

/// `guard && (inner == outer)`, where the guard is a null check.
fn extract_key_pair(body: &Expr, inner: &str) -> Option<(Vec<Expr>, Vec<Expr>)> {
    let Expr::Binary(and) = body else {
        return None;
    };
    if and.op != BinaryOperator::And {
        return None;
    }
    match &*and.left {
        Expr::Binary(guard) if guard.op == BinaryOperator::NotEqual => {
            if !guard.right.is_null_constant() && !matches!(&*guard.right, Expr::Tuple(items) if items.iter().all(Expr::is_null_constant))
            {
                return None;
            }
        }
        _ => return None,
    }
    let Expr::Binary(eq) = &*and.right else {
        return None;
    };
    if eq.op != BinaryOperator::Equal {
        return None;
    }

    let (inner_side, outer_side) = match (
        references_parameter(&eq.left, inner),
        references_parameter(&eq.right, inner),
    ) {
        (true, false) => (&*eq.left, &*eq.right),
        (false, true) => (&*eq.right, &*eq.left),
        _ => return None,
    };

    let inner_key = key_parts(inner_side);
    let outer_key = key_parts(outer_side);
    (inner_key.len() == outer_key.len()).then_some((inner_key, outer_key))
}

fn key_parts(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn replace_filter(expr: Expr, target: &str) -> Expr {
    match expr {
        Expr::Call(call)
            if matches!(
                call.annotation,
                Some(OperatorAnnotation::CollectionNavigation { .. })
            ) =>
        {
            Expr::entity_set(target)
        }
        Expr::Call(mut call) => {
            if !call.arguments.is_empty() {
                let source = call.arguments.remove(0);
                call.arguments.insert(0, replace_filter(source, target));
            }
            Expr::Call(call)
        }
        other => other,
    }
}

fn references_outer(expr: &Expr) -> bool {
    expr.any_node(|e| matches!(e, Expr::Binding(_)))
}

/// Swap the `Set(..)` at the bottom of an operator chain for `root`.
pub fn replace_chain_root(expr: Expr, root: Expr) -> Expr {
    match expr {
        Expr::Call(mut call) if !call.arguments.is_empty() => {
            let source = call.arguments.remove(0);
            call.arguments.insert(0, replace_chain_root(source, root));
            Expr::Call(call)
        }
        _ => root,
    }
}
