//! Budget-based admission control.
//!
//! # Model
//!
//! ```text
//!   total budget (per reset window)
//!        │
//!        ├── spending plan A (BASIC)      ← 0xabc…  (eth address link)
//!        ├── spending plan B (EXTENDED)   ← 0xdef…
//!        └── spending plan C (BASIC)      ← 203.0.113.9 (ip address link)
//! ```
//!
//! Every paid request is checked twice before it is forwarded:
//!
//! 1. **Global budget**: refused if the remaining budget cannot cover the
//!    estimated cost. Spending the budget down to exactly zero is allowed.
//! 2. **Tier ceiling**: refused if the caller's plan has already reached its
//!    tier's ceiling, or would pass it with this request.
//!
//! Callers seen for the first time get a `BASIC` plan, created lazily and
//! linked to their eth address (preferred) or ip address.
//!
//! # Reset Windows
//!
//! The first window ends at the first multiple of the limit duration after
//! midnight UTC. Whichever request first observes the window has ended
//! performs the reset inline (see [`reset`]), so there is no background timer.
//!
//! # Storage
//!
//! Plans and address links live behind [`SpendingPlanStore`] and
//! [`AddressPlanStore`]. [`memory`] holds an in-process implementation.

pub mod budget;
pub mod memory;
pub mod plan;
pub mod provisioning;
pub mod reset;
pub mod store;
pub mod tier;

pub use budget::{BudgetRateLimiter, PlanStores};
pub use memory::{InMemoryAddressPlanStore, InMemorySpendingPlanStore};
pub use plan::{AddressKind, AddressPlan, PlanId, SpendingPlan};
pub use provisioning::{ProvisioningSummary, SpendingPlanProvisioner};
pub use store::{AddressPlanStore, SpendingPlanStore, StoreError};
pub use tier::{SubscriptionTier, TierLimits, UnknownTierError};

use thiserror::Error;

/// Error types for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Neither an eth address nor an ip address was supplied for the request
    #[error("cannot attribute expense: no eth or ip address supplied")]
    MissingIdentity,

    /// The plan or address store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Limiter settings are unusable
    #[error("invalid limiter configuration: {0}")]
    InvalidConfig(String),
}
