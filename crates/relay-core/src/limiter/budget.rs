use super::{
    memory::{InMemoryAddressPlanStore, InMemorySpendingPlanStore},
    plan::{normalize_eth_address, AddressKind, AddressPlan, SpendingPlan},
    reset::next_reset_timestamp,
    store::{AddressPlanStore, SpendingPlanStore, StoreError},
    tier::{SubscriptionTier, TierLimits},
    LimiterError,
};
use crate::{
    config::LimiterConfig,
    metrics::MetricsCollector,
    types::{ExecutionMode, RequestDetails, Tinybars},
    utils::clock::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// The three stores the limiter resolves identities through.
#[derive(Clone)]
pub struct PlanStores {
    pub plans: Arc<dyn SpendingPlanStore>,
    pub eth_addresses: Arc<dyn AddressPlanStore>,
    pub ip_addresses: Arc<dyn AddressPlanStore>,
}

impl PlanStores {
    /// Fresh in-process stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            plans: Arc::new(InMemorySpendingPlanStore::new()),
            eth_addresses: Arc::new(InMemoryAddressPlanStore::new(AddressKind::Eth)),
            ip_addresses: Arc::new(InMemoryAddressPlanStore::new(AddressKind::Ip)),
        }
    }
}

/// Global budget state. Every check-then-act on these fields happens under one lock.
#[derive(Debug)]
struct BudgetState {
    remaining: Tinybars,
    reset_at: DateTime<Utc>,
    unique_plans_used: HashMap<SubscriptionTier, u64>,
}

/// Caller identity for one request: eth address when known, ip address as fallback.
struct Identity<'a> {
    eth: Option<String>,
    ip: Option<&'a str>,
}

impl<'a> Identity<'a> {
    fn new(eth_address: Option<&str>, details: &'a RequestDetails) -> Self {
        let eth = eth_address.map(normalize_eth_address).filter(|eth| !eth.is_empty());
        Self { eth, ip: details.ip() }
    }

    fn is_empty(&self) -> bool {
        self.eth.is_none() && self.ip.is_none()
    }
}

/// Budget-based admission control for paid upstream operations.
///
/// Tracks one global spend budget per reset window and, per caller identity, a
/// spending plan whose tier caps how much of that budget the caller may use.
/// Windows roll over lazily: the first `should_limit` or `add_expense` call at
/// or after the reset timestamp performs the reset inline before proceeding.
///
/// # Thread Safety
///
/// Global counters live behind a single async mutex. Per-plan spend is only ever
/// changed through [`SpendingPlanStore::add_to_amount_spent`], which the store
/// applies atomically, so no per-plan lock is taken here.
pub struct BudgetRateLimiter {
    stores: PlanStores,
    tier_limits: TierLimits,
    total_budget: Tinybars,
    limit_duration: Duration,
    limit_duration_chrono: chrono::Duration,
    state: Mutex<BudgetState>,
    metrics: MetricsCollector,
    clock: Arc<dyn Clock>,
}

impl BudgetRateLimiter {
    /// Creates a limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfig`] if the limit duration is zero or too large,
    /// or the total budget is negative.
    pub fn new(
        config: &LimiterConfig,
        stores: PlanStores,
        metrics: MetricsCollector,
    ) -> Result<Self, LimiterError> {
        Self::with_clock(config, stores, metrics, Arc::new(SystemClock))
    }

    /// Creates a limiter reading wall-clock time from `clock`.
    ///
    /// # Errors
    ///
    /// See [`BudgetRateLimiter::new`].
    pub fn with_clock(
        config: &LimiterConfig,
        stores: PlanStores,
        metrics: MetricsCollector,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LimiterError> {
        let limit_duration = config.limit_duration();
        if limit_duration.is_zero() {
            return Err(LimiterError::InvalidConfig("limit duration must be positive".into()));
        }
        let limit_duration_chrono = chrono::Duration::from_std(limit_duration)
            .map_err(|e| LimiterError::InvalidConfig(format!("limit duration: {e}")))?;
        if config.total_budget_tinybars < 0 {
            return Err(LimiterError::InvalidConfig("total budget must not be negative".into()));
        }

        let tiers = &config.tier_limits;
        let tier_limits = TierLimits::new(tiers.basic, tiers.extended, tiers.privileged);
        let total_budget = config.total_budget_tinybars;
        let reset_at = next_reset_timestamp(None, clock.now(), limit_duration_chrono);

        metrics.record_remaining_budget(total_budget);

        Ok(Self {
            stores,
            tier_limits,
            total_budget,
            limit_duration,
            limit_duration_chrono,
            state: Mutex::new(BudgetState {
                remaining: total_budget,
                reset_at,
                unique_plans_used: HashMap::new(),
            }),
            metrics,
            clock,
        })
    }

    /// Decides whether a request estimated to cost `estimated_cost` must be refused.
    ///
    /// Checks the global budget first; spending it down to exactly zero is allowed.
    /// Then checks the caller's plan against its tier ceiling, where reaching the
    /// ceiling exactly already counts as exceeding it. Without any identity, or when
    /// no plan can be resolved or created, the request is let through.
    pub async fn should_limit(
        &self,
        mode: ExecutionMode,
        method: &str,
        eth_address: Option<&str>,
        details: &RequestDetails,
        estimated_cost: Tinybars,
    ) -> bool {
        self.reset_if_due(details).await;

        {
            let state = self.state.lock().await;
            if state.remaining <= 0 || state.remaining.saturating_sub(estimated_cost) < 0 {
                self.metrics.record_rate_limit_reached(mode, method);
                tracing::info!(
                    request_id = %details.request_id,
                    %mode,
                    method,
                    remaining_budget = state.remaining,
                    estimated_cost,
                    "total budget limit reached"
                );
                return true;
            }
        }

        let identity = Identity::new(eth_address, details);
        if identity.is_empty() {
            tracing::warn!(
                request_id = %details.request_id,
                method,
                "no eth or ip address supplied, cannot apply spending plan limit"
            );
            return false;
        }

        let plan = match self.resolve_plan(&identity, details).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    request_id = %details.request_id,
                    error = %e,
                    "failed to resolve spending plan, not limiting"
                );
                return false;
            }
        };

        let tier = plan.subscription_tier;
        if self.tier_limits.exceeds(tier, plan.amount_spent, estimated_cost) {
            self.metrics.record_tier_limit_reached(tier);
            tracing::info!(
                request_id = %details.request_id,
                plan_id = %plan.id,
                %tier,
                amount_spent = plan.amount_spent,
                tier_limit = self.tier_limits.limit(tier),
                estimated_cost,
                "spending plan limit reached"
            );
            return true;
        }

        tracing::debug!(
            request_id = %details.request_id,
            plan_id = %plan.id,
            %tier,
            amount_spent = plan.amount_spent,
            estimated_cost,
            "request within budget"
        );
        false
    }

    /// Records the real cost of a completed request against the caller's plan and
    /// the global budget.
    ///
    /// Once the store has accepted the increment the deduction stands, even if the
    /// caller is cancelled afterwards.
    ///
    /// A due window reset runs before the caller is identified.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::MissingIdentity`] if neither an eth nor an ip address is
    /// known, and [`LimiterError::Store`] if the plan cannot be resolved or updated.
    pub async fn add_expense(
        &self,
        cost: Tinybars,
        eth_address: Option<&str>,
        details: &RequestDetails,
    ) -> Result<(), LimiterError> {
        self.reset_if_due(details).await;

        let identity = Identity::new(eth_address, details);
        if identity.is_empty() {
            return Err(LimiterError::MissingIdentity);
        }

        let plan = self.resolve_plan(&identity, details).await?;
        let tier = plan.subscription_tier;
        let first_expense = plan.amount_spent == 0;

        self.stores.plans.add_to_amount_spent(&plan.id, cost, self.limit_duration).await?;

        let remaining = {
            let mut state = self.state.lock().await;
            if first_expense {
                let used = state.unique_plans_used.entry(tier).or_default();
                *used += 1;
                self.metrics.record_unique_plans_used(tier, *used);
            }
            state.remaining = state.remaining.saturating_sub(cost);
            self.metrics.record_remaining_budget(state.remaining);
            state.remaining
        };

        tracing::debug!(
            request_id = %details.request_id,
            plan_id = %plan.id,
            %tier,
            cost,
            remaining_budget = remaining,
            "expense recorded"
        );

        self.spawn_average_spend_update(tier);
        Ok(())
    }

    /// Starts a new window: zeroes every plan's spend, restores the full budget,
    /// clears the unique-plan counters and moves the reset timestamp forward.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Store`] if the store cannot reset plan spend. In that
    /// case the in-memory state is left untouched.
    pub async fn reset_limiter(&self, details: &RequestDetails) -> Result<(), LimiterError> {
        let mut state = self.state.lock().await;
        self.reset_locked(&mut state, details).await
    }

    async fn reset_if_due(&self, details: &RequestDetails) {
        let mut state = self.state.lock().await;
        if self.clock.now() < state.reset_at {
            return;
        }
        if let Err(e) = self.reset_locked(&mut state, details).await {
            tracing::warn!(
                request_id = %details.request_id,
                error = %e,
                "limiter reset failed, will retry on next request"
            );
        }
    }

    async fn reset_locked(
        &self,
        state: &mut BudgetState,
        details: &RequestDetails,
    ) -> Result<(), LimiterError> {
        self.stores.plans.reset_amount_spent_of_all_plans().await?;

        let now = self.clock.now();
        let mut next = next_reset_timestamp(Some(state.reset_at), now, self.limit_duration_chrono);
        if next <= now {
            next += self.limit_duration_chrono;
        }

        state.remaining = self.total_budget;
        state.reset_at = next;
        state.unique_plans_used.clear();

        self.metrics.record_limiter_reset();
        self.metrics.record_remaining_budget(self.total_budget);
        for tier in SubscriptionTier::ALL {
            self.metrics.record_unique_plans_used(tier, 0);
        }

        tracing::info!(
            request_id = %details.request_id,
            total_budget = self.total_budget,
            next_reset = %next,
            "spending limits reset"
        );
        Ok(())
    }

    /// Finds the caller's plan, creating and linking a basic one if none exists.
    async fn resolve_plan(
        &self,
        identity: &Identity<'_>,
        details: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        if let Some(plan) = self.find_plan(identity, details).await {
            return Ok(plan);
        }
        self.create_plan(identity, details).await
    }

    /// Best-effort lookup: store errors and dangling links count as "not found".
    async fn find_plan(
        &self,
        identity: &Identity<'_>,
        details: &RequestDetails,
    ) -> Option<SpendingPlan> {
        let candidates = [
            (&self.stores.eth_addresses, identity.eth.as_deref()),
            (&self.stores.ip_addresses, identity.ip),
        ];

        for (links, address) in candidates {
            let Some(address) = address else { continue };
            let kind = links.kind();

            let association = match links.find_by_address(address).await {
                Ok(Some(association)) => association,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        request_id = %details.request_id,
                        %kind,
                        address,
                        error = %e,
                        "address lookup failed"
                    );
                    continue;
                }
            };

            match self.stores.plans.find_by_id(&association.plan_id).await {
                Ok(Some(plan)) => return Some(plan),
                Ok(None) => tracing::warn!(
                    request_id = %details.request_id,
                    %kind,
                    address,
                    plan_id = %association.plan_id,
                    "address linked to a missing spending plan"
                ),
                Err(e) => tracing::warn!(
                    request_id = %details.request_id,
                    plan_id = %association.plan_id,
                    error = %e,
                    "spending plan lookup failed"
                ),
            }
        }

        tracing::warn!(
            request_id = %details.request_id,
            eth_address = identity.eth.as_deref(),
            ip_address = identity.ip,
            "no spending plan found for caller"
        );
        None
    }

    async fn create_plan(
        &self,
        identity: &Identity<'_>,
        details: &RequestDetails,
    ) -> Result<SpendingPlan, StoreError> {
        let (links, address) = match (identity.eth.as_deref(), identity.ip) {
            (Some(eth), _) => (&self.stores.eth_addresses, eth),
            (None, Some(ip)) => (&self.stores.ip_addresses, ip),
            (None, None) => {
                return Err(StoreError::Backend("cannot create a plan without an address".into()))
            }
        };

        let plan = self
            .stores
            .plans
            .create(SubscriptionTier::default(), self.clock.now(), self.limit_duration)
            .await?;
        let linked = links
            .save(AddressPlan::new(address, plan.id.clone()), self.limit_duration)
            .await?;

        if linked.plan_id == plan.id {
            tracing::debug!(
                request_id = %details.request_id,
                kind = %links.kind(),
                address,
                plan_id = %plan.id,
                "created spending plan"
            );
            return Ok(plan);
        }

        // Another request linked this address first; adopt its plan.
        tracing::debug!(
            request_id = %details.request_id,
            address,
            created = %plan.id,
            adopted = %linked.plan_id,
            "spending plan creation raced, adopting existing plan"
        );
        self.stores
            .plans
            .find_by_id(&linked.plan_id)
            .await?
            .ok_or_else(|| StoreError::PlanNotFound(linked.plan_id.clone()))
    }

    /// Recomputes the tier's average spend off the request path.
    fn spawn_average_spend_update(&self, tier: SubscriptionTier) {
        let plans = self.stores.plans.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            match plans.find_all_active_by_tier(tier).await {
                Ok(active) => {
                    #[allow(clippy::cast_precision_loss)]
                    let average = if active.is_empty() {
                        0.0
                    } else {
                        let total: Tinybars = active.iter().map(|plan| plan.amount_spent).sum();
                        total as f64 / active.len() as f64
                    };
                    metrics.record_average_spend(tier, average);
                }
                Err(e) => {
                    tracing::warn!(%tier, error = %e, "failed to update average spend");
                }
            }
        });
    }

    // Inspection

    pub async fn remaining_budget(&self) -> Tinybars {
        self.state.lock().await.remaining
    }

    pub async fn next_reset(&self) -> DateTime<Utc> {
        self.state.lock().await.reset_at
    }

    /// Distinct plans of `tier` that recorded an expense in the current window.
    pub async fn unique_plans_used(&self, tier: SubscriptionTier) -> u64 {
        self.state.lock().await.unique_plans_used.get(&tier).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_budget(&self) -> Tinybars {
        self.total_budget
    }

    #[must_use]
    pub fn tier_limit(&self, tier: SubscriptionTier) -> Tinybars {
        self.tier_limits.limit(tier)
    }

    #[must_use]
    pub fn limit_duration(&self) -> Duration {
        self.limit_duration
    }
}
