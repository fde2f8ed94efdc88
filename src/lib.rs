//! navexpand - Navigation expansion for entity queries
//!
//! This crate rewrites composed entity queries whose lambdas traverse
//! relationships into queries over explicit joins:
//! - Reference navigations become inner joins or left-join idioms
//! - Collection navigations become correlated filters, hoisted into joins when possible
//! - Entity and collection comparisons become key comparisons
//! - Entity-valued results are marked for a downstream materializer
//!
//! Entity metadata comes from a [`entity_catalog::Catalog`]; the compiler is
//! tuned by [`config::CompilerConfig`].

pub mod config;
pub mod entity_catalog;
pub mod query_planner;

pub use query_planner::{expand_navigations, expand_navigations_with_stats};
