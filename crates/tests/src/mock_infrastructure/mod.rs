//! Mock infrastructure for exercising the relay core without real stores or clients.
//!
//! ## Components
//!
//! - `FaultyPlanStore`: wraps the in-memory plan store and fails chosen operations on demand
//! - `CountingClientFactory`: builds numbered mock upstream clients and can be told to fail
//! - Test helpers for configs and request details

pub mod store_mock;

pub use client_mock::{CountingClientFactory, MockUpstreamClient};
pub use store_mock::{FaultyPlanStore, StoreFault};
pub use test_helpers::*;
