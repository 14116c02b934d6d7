//! In-process implementations of the plan stores.
//!
//! Backed by `DashMap`: every mutation of a single key happens under that key's
//! shard lock, which gives the per-plan atomic add and the per-address
//! conditional insert the store contracts require. Expiry is evaluated lazily
//! on read using `tokio::time::Instant`, so paused-time tests control it.

use super::{
    plan::{AddressKind, AddressPlan, PlanId, SpendingPlan},
    store::{AddressPlanStore, SpendingPlanStore, StoreError},
    tier::SubscriptionTier,
};
use crate::types::Tinybars;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct PlanRecord {
    plan: SpendingPlan,
    expires_at: Option<Instant>,
    spent_expires_at: Option<Instant>,
}

impl PlanRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Snapshot with expired spend reported as zero.
    fn snapshot(&self, now: Instant) -> SpendingPlan {
        let mut plan = self.plan.clone();
        if self.spent_expires_at.is_some_and(|at| at <= now) {
            plan.amount_spent = 0;
        }
        plan
    }
}

/// Spending plan store held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySpendingPlanStore {
    plans: DashMap<PlanId, PlanRecord>,
}

impl InMemorySpendingPlanStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored plans, including ones that have expired but not been evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Drops expired records. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.plans.len();
        self.plans.retain(|_, record| !record.is_expired(now));
        before - self.plans.len()
    }
}

#[async_trait]
impl SpendingPlanStore for InMemorySpendingPlanStore {
    async fn create(
        &self,
        tier: SubscriptionTier,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<SpendingPlan, StoreError> {
        let plan = SpendingPlan::new(PlanId::generate(), tier, created_at);
        let record = PlanRecord {
            plan: plan.clone(),
            expires_at: Some(Instant::now() + ttl),
            spent_expires_at: None,
        };
        self.plans.insert(plan.id.clone(), record);
        Ok(plan)
    }

    async fn upsert(&self, plan: SpendingPlan) -> Result<(), StoreError> {
        let now = Instant::now();
        match self.plans.entry(plan.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                let amount_spent = record.snapshot(now).amount_spent;
                record.plan = SpendingPlan { amount_spent, ..plan };
                record.expires_at = None;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PlanRecord { plan, expires_at: None, spent_expires_at: None });
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<SpendingPlan>, StoreError> {
        let now = Instant::now();
        Ok(self
            .plans
            .get(id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.snapshot(now)))
    }

    async fn add_to_amount_spent(
        &self,
        id: &PlanId,
        delta: Tinybars,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut record = self
            .plans
            .get_mut(id)
            .filter(|record| !record.is_expired(now))
            .ok_or_else(|| StoreError::PlanNotFound(id.clone()))?;

        let current = record.snapshot(now).amount_spent;
        let spent_until = now + ttl;
        record.plan.amount_spent = current.saturating_add(delta).max(0);
        record.spent_expires_at = Some(spent_until);
        if let Some(expires_at) = record.expires_at {
            record.expires_at = Some(expires_at.max(spent_until));
        }
        Ok(())
    }

    async fn reset_amount_spent_of_all_plans(&self) -> Result<(), StoreError> {
        for mut record in self.plans.iter_mut() {
            record.plan.amount_spent = 0;
            record.spent_expires_at = None;
        }
        Ok(())
    }

    async fn find_all_active_by_tier(
        &self,
        tier: SubscriptionTier,
    ) -> Result<Vec<SpendingPlan>, StoreError> {
        let now = Instant::now();
        Ok(self
            .plans
            .iter()
            .filter(|record| {
                !record.is_expired(now) &&
                    record.plan.active &&
                    record.plan.subscription_tier == tier
            })
            .map(|record| record.snapshot(now))
            .collect())
    }
}

#[derive(Debug, Clone)]
struct AddressRecord {
    association: AddressPlan,
    expires_at: Option<Instant>,
}

impl AddressRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Address association store held in process memory.
#[derive(Debug)]
pub struct InMemoryAddressPlanStore {
    kind: AddressKind,
    links: DashMap<String, AddressRecord>,
}

impl InMemoryAddressPlanStore {
    #[must_use]
    pub fn new(kind: AddressKind) -> Self {
        Self { kind, links: DashMap::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[async_trait]
impl AddressPlanStore for InMemoryAddressPlanStore {
    fn kind(&self) -> AddressKind {
        self.kind
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<AddressPlan>, StoreError> {
        let now = Instant::now();
        Ok(self
            .links
            .get(address)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.association.clone()))
    }

    async fn save(
        &self,
        association: AddressPlan,
        ttl: Duration,
    ) -> Result<AddressPlan, StoreError> {
        let now = Instant::now();
        let fresh = AddressRecord { association: association.clone(), expires_at: Some(now + ttl) };

        match self.links.entry(association.address.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(association)
                } else {
                    Ok(occupied.get().association.clone())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(association)
            }
        }
    }

    async fn overwrite(&self, association: AddressPlan) -> Result<(), StoreError> {
        self.links.insert(
            association.address.clone(),
            AddressRecord { association, expires_at: None },
        );
        Ok(())
    }
}
