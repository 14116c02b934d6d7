use super::tier::SubscriptionTier;
use crate::types::Tinybars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a spending plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Generates a fresh random id for a lazily created plan.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PlanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cumulative spend record for one caller identity within the current reset window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingPlan {
    pub id: PlanId,
    pub subscription_tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    /// Inactive plans are skipped when computing per-tier statistics.
    pub active: bool,
    /// Spend since the last reset. Never negative.
    pub amount_spent: Tinybars,
}

impl SpendingPlan {
    /// Builds a new, empty, active plan.
    #[must_use]
    pub fn new(id: PlanId, subscription_tier: SubscriptionTier, created_at: DateTime<Utc>) -> Self {
        Self { id, subscription_tier, created_at, active: true, amount_spent: 0 }
    }
}

/// Kind of caller address an association is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Eth,
    Ip,
}

impl AddressKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eth => "eth_address",
            Self::Ip => "ip_address",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-to-one link between a caller address and a spending plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPlan {
    pub address: String,
    pub plan_id: PlanId,
}

impl AddressPlan {
    #[must_use]
    pub fn new(address: impl Into<String>, plan_id: PlanId) -> Self {
        Self { address: address.into(), plan_id }
    }
}

/// Normalizes an eth address for use as a store key.
///
/// Hex addresses are case-insensitive; checksummed and lowercase forms must
/// resolve to the same plan.
#[must_use]
pub fn normalize_eth_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
