//! # Navigation Expansion
//!
//! Rewrites a composed query whose lambdas navigate relationships
//! (`o.Customer.Name`, `c.Orders`) into one that only uses explicit joins,
//! filters, projections and orderings over physical field paths.
//!
//! ## Pass Pipeline Overview
//!
//! Every operator lambda goes through the same pipeline, source-first:
//!
//! ```text
//! 1. Compose              - Substitute the lambda parameter with the pending selector
//! 2. Binding              - Match member chains to navigation tree nodes
//! 3. ComparisonOptimization - Entity/collection/null comparisons to key comparisons
//! 4. CollectionRewrite    - Collection navigations to correlated filters
//! 5. Nested queries       - Expand operator chains inside the lambda
//! 6. JoinInsertion        - Inner join / left-join idiom per unexpanded node
//! 7. Unbind               - Placeholders to physical paths
//! ```
//!
//! After the whole query has been driven, the reduction pass finalizes the
//! remaining stream states.
//!
//! ## Module Organization
//!
//! - `operators.rs`: Expansion driver (Where, Select, OrderBy, ThenBy, Join, SelectMany)
//! - `terminating.rs`: Terminating operators and pending-selector materialization
//! - `join_insertion.rs`: Join construction and stream merging
//! - `correlation.rs`: Decides whether a collection selector can become a join
//! - `reduction.rs`: Unbinding and finalization

pub mod binding;
pub mod collection_rewrite;
pub mod comparison;
pub mod correlation;
pub mod errors;
pub mod join_insertion;
pub mod operators;
pub mod reduction;
pub mod stream_state;
pub mod terminating;


pub use operators::expand;
