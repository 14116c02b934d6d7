//! Storage contracts for spending plans and address associations.
//!
//! The limiter never owns persistence. It talks to these traits, which may be
//! backed by a shared cache, a database, or the in-memory implementation in
//! [`memory`](super::memory). Implementations must provide the atomicity
//! guarantees documented on each method; the limiter relies on them instead of
//! taking its own per-plan locks.

use super::{
    plan::{AddressKind, AddressPlan, PlanId, SpendingPlan},
    tier::SubscriptionTier,
};
use crate::types::Tinybars;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by spending plan and address stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No spending plan with this id exists (or it expired).
    #[error("spending plan {0} not found")]
    PlanNotFound(PlanId),

    /// The backing store failed or timed out.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable storage of spending plan records.
#[async_trait]
pub trait SpendingPlanStore: Send + Sync {
    /// Creates a new active plan with a generated id and zero spend, stamped
    /// with `created_at`.
    ///
    /// The record expires after `ttl` unless spend is added to it.
    async fn create(
        &self,
        tier: SubscriptionTier,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<SpendingPlan, StoreError>;

    /// Inserts or replaces a plan with a fixed id and no expiry.
    ///
    /// Used for operator-provisioned plans. Existing spend for the id is kept.
    async fn upsert(&self, plan: SpendingPlan) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<SpendingPlan>, StoreError>;

    /// Atomically adds `delta` to the plan's spend and refreshes the spend expiry to `ttl`.
    ///
    /// Concurrent calls for the same plan must all be applied; no increment may be lost.
    /// Returns [`StoreError::PlanNotFound`] if the plan does not exist.
    async fn add_to_amount_spent(
        &self,
        id: &PlanId,
        delta: Tinybars,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Sets the spend of every plan back to zero.
    async fn reset_amount_spent_of_all_plans(&self) -> Result<(), StoreError>;

    async fn find_all_active_by_tier(
        &self,
        tier: SubscriptionTier,
    ) -> Result<Vec<SpendingPlan>, StoreError>;
}

/// Durable `address → plan id` mapping for one kind of address.
#[async_trait]
pub trait AddressPlanStore: Send + Sync {
    /// Which address kind this store is keyed by.
    fn kind(&self) -> AddressKind;

    async fn find_by_address(&self, address: &str) -> Result<Option<AddressPlan>, StoreError>;

    /// Links `association.address` to `association.plan_id` unless a live link already exists.
    ///
    /// This is a conditional insert keyed by address: when two callers race to link the
    /// same new address, exactly one link wins and both callers receive the winning
    /// association back. The returned value is always the association in effect.
    async fn save(&self, association: AddressPlan, ttl: Duration)
        -> Result<AddressPlan, StoreError>;

    /// Unconditionally links an address to a plan with no expiry.
    async fn overwrite(&self, association: AddressPlan) -> Result<(), StoreError>;
}
