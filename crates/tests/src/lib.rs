//! Integration tests for the relay core
//!
//! This crate contains the following test modules:
//!
//! - `limiter_tests`: `BudgetRateLimiter` against in-memory and failure-injecting stores
//! - `rotation_tests`: `ClientRotationManager` triggers, handle lifetime and concurrency
//! - `admission_flow_tests`: full request flow through the limiter and rotation manager
//! - `config_env_tests`: layered config loading and environment overrides
//! - `mock_infrastructure`: reusable mock stores, client factories and helpers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```


#[cfg(test)]
mod rotation_tests;


#[cfg(test)]
mod config_env_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
