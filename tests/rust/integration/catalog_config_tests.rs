//! Integration tests for catalog loading, compiler configuration and error
//! reporting through the public entry points.

use std::io::Write;

use navexpand::config::CompilerConfig;
use navexpand::entity_catalog::errors::CatalogError;
use navexpand::entity_catalog::ModelCatalog;
use navexpand::expand_navigations;
use navexpand::query_planner::errors::QueryPlannerError;
use navexpand::query_planner::nav_expansion::errors::NavExpansionError;
use navexpand::query_planner::query_ir::{Expr, QueryOperator};

const BLOG_CATALOG: &str = r#"
entities:
  - name: Blog
    key: Id
    properties:
      - { name: Id, type: long }
      - { name: Title, type: string }
    navigations:
      - name: Posts
        target: Post
        foreign_key: BlogId
        collection: true
  - name: Post
    key: Id
    properties:
      - { name: Id, type: long }
      - { name: BlogId, type: long, nullable: true }
      - { name: Title, type: string }
    navigations:
      - name: Blog
        target: Blog
        foreign_key: BlogId
        to_principal: true
        required: false
"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_catalog_from_yaml_file() -> anyhow::Result<()> {
    let file = write_temp(BLOG_CATALOG);
    let catalog = ModelCatalog::from_yaml_file(file.path())?;

    let query = Expr::entity_set("Post").call(
        "Select",
        vec![Expr::lambda(
            &["p"],
            Expr::param("p").member("Blog").member("Title"),
        )],
    );
    let result = expand_navigations(query, &catalog, &CompilerConfig::default())?;

    // Optional principal with a nullable foreign key: left join, no widening on the outer side.
    assert_eq!(
        result.to_string(),
        "Select(SelectMany(GroupJoin(Set(Post), Set(Blog), p => p.BlogId, b1 => Convert(b1.Id, long?), (p, g2) => { outer: p, inner: g2 }), t3 => DefaultIfEmpty(t3.inner), (t3, b1) => { outer: t3, inner: b1 }), p => p.inner.Title)"
    );
    Ok(())
}

#[test]
fn test_missing_catalog_file() {
    let err = ModelCatalog::from_yaml_file("/nonexistent/catalog.yaml").unwrap_err();
    assert!(matches!(err, CatalogError::ConfigReadError { .. }));
}

#[test]
fn test_dangling_navigation_is_rejected() {
    let yaml = r#"
entities:
  - name: Post
    key: Id
    properties:
      - { name: Id, type: int }
      - { name: AuthorId, type: int }
    navigations:
      - name: Author
        target: Person
        foreign_key: AuthorId
        to_principal: true
"#;
    let err = ModelCatalog::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::DanglingNavigation { ref target, .. } if target == "Person"
    ));
}

#[test]
fn test_key_type_mismatch_is_rejected() {
    let yaml = r#"
entities:
  - name: Blog
    key: Id
    properties:
      - { name: Id, type: guid }
  - name: Post
    key: Id
    properties:
      - { name: Id, type: int }
      - { name: BlogId, type: int }
    navigations:
      - name: Blog
        target: Blog
        foreign_key: BlogId
        to_principal: true
"#;
    let err = ModelCatalog::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, CatalogError::KeyShapeMismatch { .. }));
}

#[test]
fn test_malformed_catalog_yaml() {
    let err = ModelCatalog::from_yaml_str("entities: [ { name: 1").unwrap_err();
    assert!(matches!(err, CatalogError::ConfigParseError { .. }));
}

#[test]
fn test_compiler_config_from_file_disables_hoisting() -> anyhow::Result<()> {
    let file = write_temp("hoist_uncorrelated_collections: false\n");
    let config = CompilerConfig::from_yaml_file(file.path())?;
    let catalog = ModelCatalog::from_yaml_str(BLOG_CATALOG)?;

    let query = Expr::entity_set("Blog").call(
        "SelectMany",
        vec![Expr::lambda(&["b"], Expr::param("b").member("Posts"))],
    );
    let result = expand_navigations(query, &catalog, &config)?;

    assert!(result
        .to_string()
        .starts_with("Select(SelectMany(Set(Blog), b => Where(Set(Post), p => "));
    Ok(())
}

#[test]
fn test_invalid_compiler_config_is_rejected() {
    let catalog = ModelCatalog::from_yaml_str(BLOG_CATALOG).unwrap();
    let config = CompilerConfig {
        max_navigation_depth: 0,
        ..Default::default()
    };

    let err = expand_navigations(Expr::entity_set("Blog"), &catalog, &config).unwrap_err();
    assert!(matches!(err, QueryPlannerError::InvalidConfig(_)));
}

#[test]
fn test_unsupported_operator_error_message() {
    let catalog = ModelCatalog::from_yaml_str(BLOG_CATALOG).unwrap();
    let query = Expr::operator_call(
        QueryOperator::GroupJoin,
        vec![
            Expr::entity_set("Blog"),
            Expr::entity_set("Post"),
            Expr::lambda(&["b"], Expr::param("b").member("Id")),
            Expr::lambda(&["p"], Expr::param("p").member("BlogId")),
            Expr::lambda(&["b", "ps"], Expr::param("ps")),
        ],
        None,
    );

    let err = expand_navigations(query, &catalog, &CompilerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        QueryPlannerError::NavExpansion(NavExpansionError::UnsupportedOperator { .. })
    ));
    assert!(err
        .to_string()
        .contains("Expansion: Operator `GroupJoin` is not supported."));
}

#[test]
fn test_unknown_entity_set() {
    let catalog = ModelCatalog::from_yaml_str(BLOG_CATALOG).unwrap();
    let err = expand_navigations(Expr::entity_set("Comment"), &catalog, &CompilerConfig::default())
        .unwrap_err();

    match err {
        QueryPlannerError::NavExpansion(NavExpansionError::Catalog { source, .. }) => {
            assert_eq!(
                source,
                CatalogError::EntityNotFound {
                    entity: "Comment".to_string()
                }
            );
        }
        other => panic!("expected catalog error, got {:?}", other),
    }
}
