//! Spending plan store with injectable failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::{
    limiter::{InMemorySpendingPlanStore, PlanId, SpendingPlan, SpendingPlanStore, StoreError, SubscriptionTier},
    types::Tinybars,
};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    Create,
    FindById,
    AddToAmountSpent,
    Reset,
    FindAllActiveByTier,
}

/// Delegates to [`InMemorySpendingPlanStore`] unless the called operation is armed to fail.
#[derive(Default)]
pub struct FaultyPlanStore {
    inner: InMemorySpendingPlanStore,
    faults: Mutex<HashSet<StoreFault>>,
    reset_calls: AtomicUsize,
}

impl FaultyPlanStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fault: StoreFault) {
        self.faults.lock().insert(fault);
    }

    pub fn heal(&self, fault: StoreFault) {
        self.faults.lock().remove(&fault);
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    fn check(&self, fault: StoreFault) -> Result<(), StoreError> {
        if self.faults.lock().contains(&fault) {
            return Err(StoreError::Backend(format!("injected {fault:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl SpendingPlanStore for FaultyPlanStore {
    async fn create(
        &self,
        tier: SubscriptionTier,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<SpendingPlan, StoreError> {
        self.check(StoreFault::Create)?;
        self.inner.create(tier, created_at, ttl).await
    }

    async fn upsert(&self, plan: SpendingPlan) -> Result<(), StoreError> {
        self.inner.upsert(plan).await
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<SpendingPlan>, StoreError> {
        self.check(StoreFault::FindById)?;
        self.inner.find_by_id(id).await
    }

    async fn add_to_amount_spent(
        &self,
        id: &PlanId,
        delta: Tinybars,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check(StoreFault::AddToAmountSpent)?;
        self.inner.add_to_amount_spent(id, delta, ttl).await
    }

    async fn reset_amount_spent_of_all_plans(&self) -> Result<(), StoreError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.check(StoreFault::Reset)?;
        self.inner.reset_amount_spent_of_all_plans().await
    }

    async fn find_all_active_by_tier(
        &self,
        tier: SubscriptionTier,
    ) -> Result<Vec<SpendingPlan>, StoreError> {
        self.check(StoreFault::FindAllActiveByTier)?;
        self.inner.find_all_active_by_tier(tier).await
    }
}
