//! End-to-end expansion scenarios over the customer/order fixture catalog.

use std::collections::HashMap;

use navexpand::config::CompilerConfig;
use navexpand::entity_catalog::{Catalog, EntityType, ModelCatalog};
use navexpand::query_planner::query_ir::{self, Expr, JoinKind, OperatorAnnotation, QueryOperator};
use navexpand::{expand_navigations, expand_navigations_with_stats};

const FIXTURE: &str = include_str!("../../fixtures/customer_orders.yaml");

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn catalog() -> ModelCatalog {
    ModelCatalog::from_yaml_str(FIXTURE).expect("fixture catalog")
}

fn where_city_is(city: &str) -> Expr {
    Expr::entity_set("Order").call(
        "Where",
        vec![Expr::lambda(
            &["o"],
            Expr::param("o")
                .member("Address")
                .member("City")
                .equals(Expr::string(city)),
        )],
    )
}

/// Every operator call in the tree, pre-order.
fn calls(expr: &Expr) -> Vec<&query_ir::OperatorCall> {
    let mut found = Vec::new();
    expr.walk(&mut |e| {
        if let Expr::Call(call) = e {
            found.push(call);
        }
    });
    found
}

#[test]
fn test_projection_of_scalar_member() -> anyhow::Result<()> {
    init_logging();
    let query = Expr::entity_set("Customer").call(
        "Select",
        vec![Expr::lambda(&["c"], Expr::param("c").member("Name"))],
    );

    let result = expand_navigations(query, &catalog(), &CompilerConfig::default())?;
    assert_eq!(result.to_string(), "Select(Set(Customer), c => c.Name)");
    Ok(())
}

#[test]
fn test_collection_select_many_becomes_inner_join() -> anyhow::Result<()> {
    init_logging();
    let query = Expr::entity_set("Customer").call(
        "SelectMany",
        vec![Expr::lambda(&["c"], Expr::param("c").member("Orders"))],
    );

    let (result, stats) =
        expand_navigations_with_stats(query, &catalog(), &CompilerConfig::default())?;
    assert_eq!(
        result.to_string(),
        "Select(Join(Set(Customer), Set(Order), c => c.Id, o => o.CustomerId, (c, o) => { outer: c, inner: o }), t2 => Shape<Order>(t2.inner))"
    );
    assert_eq!(stats.joins_inner, 1);
    assert_eq!(stats.hoisted_collections, 1);

    let join = calls(&result)
        .into_iter()
        .find(|c| c.operator == QueryOperator::Join)
        .expect("join call");
    let annotation = join.join_annotation().expect("annotated join");
    assert_eq!(annotation.kind, JoinKind::Inner);
    assert_eq!(annotation.navigation.as_deref(), Some("Customer.Orders"));
    Ok(())
}

#[test]
fn test_optional_reference_filter_uses_left_join_idiom() -> anyhow::Result<()> {
    init_logging();
    let (result, stats) =
        expand_navigations_with_stats(where_city_is("X"), &catalog(), &CompilerConfig::default())?;

    assert_eq!(
        result.to_string(),
        "Select(Where(SelectMany(GroupJoin(Set(Order), Set(Address), o => o.Id, a1 => a1.OrderId, (o, g2) => { outer: o, inner: g2 }), t3 => DefaultIfEmpty(t3.inner), (t3, a1) => { outer: t3, inner: a1 }), o => NullSafe[o.inner](o.inner.City == \"X\")), o => Shape<Order>(o.outer.outer))"
    );
    assert_eq!(stats.joins_left_outer, 1);

    let all = calls(&result);
    let flatten = all
        .iter()
        .find(|c| c.operator == QueryOperator::SelectMany)
        .expect("flattening SelectMany");
    assert_eq!(flatten.annotation, Some(OperatorAnnotation::LeftJoinFlatten));
    let group_join = all
        .iter()
        .find(|c| c.operator == QueryOperator::GroupJoin)
        .expect("group join");
    assert_eq!(
        group_join.join_annotation().map(|a| a.kind),
        Some(JoinKind::LeftOuter)
    );
    Ok(())
}

#[test]
fn test_optional_reference_null_check() -> anyhow::Result<()> {
    init_logging();
    let query = Expr::entity_set("Order").call(
        "Where",
        vec![Expr::lambda(
            &["o"],
            Expr::param("o").member("Address").equals(Expr::null()),
        )],
    );

    let result = expand_navigations(query, &catalog(), &CompilerConfig::default())?;
    assert!(result
        .to_string()
        .contains("o => (Convert(o.inner.Id, int?) == Convert(null, int?))"));
    Ok(())
}

#[test]
fn test_collection_count_in_projection() -> anyhow::Result<()> {
    init_logging();
    let query = Expr::entity_set("Customer").call(
        "Select",
        vec![Expr::lambda(
            &["c"],
            Expr::record(vec![
                ("Name", Expr::param("c").member("Name")),
                ("Count", Expr::param("c").member("Orders").member("Count")),
            ]),
        )],
    );

    let result = expand_navigations(query, &catalog(), &CompilerConfig::default())?;
    assert_eq!(
        result.to_string(),
        "Select(Set(Customer), c => { Name: c.Name, Count: Count(Where(Set(Order), o => ((Convert(c.Id, int?) != Convert(null, int?)) && (o.CustomerId == c.Id)))) })"
    );
    Ok(())
}

#[test]
fn test_same_navigation_in_two_filters_joins_once() -> anyhow::Result<()> {
    init_logging();
    let query = Expr::entity_set("Order")
        .call(
            "Where",
            vec![Expr::lambda(
                &["o"],
                Expr::param("o")
                    .member("Customer")
                    .member("Name")
                    .equals(Expr::string("A")),
            )],
        )
        .call(
            "Where",
            vec![Expr::lambda(
                &["o"],
                Expr::param("o")
                    .member("Customer")
                    .member("CreditLimit")
                    .greater_than(Expr::int(100)),
            )],
        );

    let (result, stats) =
        expand_navigations_with_stats(query, &catalog(), &CompilerConfig::default())?;
    assert_eq!(stats.joins_total(), 1);
    assert!(result.to_string().ends_with("o => Shape<Order>(o.outer))"));
    Ok(())
}

#[test]
fn test_name_generation_is_per_compilation() -> anyhow::Result<()> {
    let catalog = catalog();
    let config = CompilerConfig::default();

    let first = expand_navigations(where_city_is("X"), &catalog, &config)?;
    let second = expand_navigations(where_city_is("X"), &catalog, &config)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_shared_catalog_across_threads() {
    let catalog = catalog();
    let config = CompilerConfig::default();
    let expected = expand_navigations(where_city_is("Y"), &catalog, &config)
        .expect("expansion")
        .to_string();

    let (catalog, config) = (&catalog, &config);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(move || expand_navigations(where_city_is("Y"), catalog, config)))
            .collect();
        for handle in handles {
            let result = handle.join().expect("thread").expect("expansion");
            assert_eq!(result.to_string(), expected);
        }
    });
}

#[test]
fn test_expanded_query_serializes_to_json() -> anyhow::Result<()> {
    let result = expand_navigations(where_city_is("X"), &catalog(), &CompilerConfig::default())?;
    let json = query_ir::to_json(&result)?;

    assert!(json.contains("\"EntityShape\""));
    assert!(json.contains("\"LeftJoinFlatten\""));
    let restored: Expr = serde_json::from_str(&json)?;
    assert_eq!(restored, result);
    Ok(())
}

/// A catalog implemented outside the crate.
struct StaticCatalog {
    entities: HashMap<String, EntityType>,
}

impl Catalog for StaticCatalog {
    fn lookup_entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }
}

#[test]
fn test_custom_catalog_implementation() -> anyhow::Result<()> {
    let model = catalog();
    let entities = model
        .entity_names()
        .filter_map(|name| model.lookup_entity_type(name).cloned())
        .map(|entity| (entity.name.clone(), entity))
        .collect();
    let custom = StaticCatalog { entities };

    let from_model = expand_navigations(where_city_is("Z"), &model, &CompilerConfig::default())?;
    let from_custom = expand_navigations(where_city_is("Z"), &custom, &CompilerConfig::default())?;
    assert_eq!(from_model, from_custom);
    Ok(())
}
