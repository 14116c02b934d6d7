//! # Relay Core
//!
//! Admission control and upstream client rotation for a JSON-RPC relay that
//! fronts a ledger network.
//!
//! - **[`limiter`]**: budget-based rate limiting. A shared spend budget per reset
//!   window, plus per-caller spending plans capped by subscription tier.
//!
//! - **[`rotation`]**: keeps one live upstream client and replaces it after too
//!   many transactions, too much time, or too many trigger error codes.
//!
//! - **[`metrics`]**: Prometheus metrics for both components.
//!
//! - **[`config`]**: layered configuration (TOML file plus `RELAY__` environment overrides).
//!
//! ## Request Flow
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────────────┐
//! │ BudgetRateLimiter        │ ─── limited ──► error response
//! │   should_limit()         │
//! └────────────┬─────────────┘
//!              │ admitted
//!              ▼
//! ┌──────────────────────────┐
//! │ ClientRotationManager    │
//! │   get_handle()           │
//! └────────────┬─────────────┘
//!              │ upstream call
//!              ▼
//! ┌──────────────────────────┐
//! │ add_expense(real cost)   │
//! │ record_error_status()    │
//! └──────────────────────────┘
//! ```

pub mod config;
pub mod limiter;
pub mod logging;
pub mod metrics;
pub mod rotation;
pub mod types;
pub mod utils;
