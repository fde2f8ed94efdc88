//! Integration tests - exercise the public expansion API end to end
//!
//! These tests load the fixture catalog from `tests/fixtures/` and drive
//! `expand_navigations` the way an embedding query provider would.

mod catalog_config_tests;
mod scenario_tests;
