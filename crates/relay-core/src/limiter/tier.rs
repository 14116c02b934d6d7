use crate::types::Tinybars;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription class of a spending plan.
///
/// Each tier maps to a fixed per-plan spend ceiling for one reset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    /// Default tier for callers seen for the first time.
    #[default]
    Basic,
    /// Raised ceiling for known integrators.
    Extended,
    /// Operator-trusted callers.
    Privileged,
}

impl SubscriptionTier {
    pub const ALL: [Self; 3] = [Self::Basic, Self::Extended, Self::Privileged];

    /// Label used in metrics and persisted records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Extended => "EXTENDED",
            Self::Privileged => "PRIVILEGED",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Basic => 0,
            Self::Extended => 1,
            Self::Privileged => 2,
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a tier name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subscription tier: {0}")]
pub struct UnknownTierError(pub String);

/// Parses a tier name, ignoring case.
impl std::str::FromStr for SubscriptionTier {
    type Err = UnknownTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BASIC" => Ok(Self::Basic),
            "EXTENDED" => Ok(Self::Extended),
            "PRIVILEGED" => Ok(Self::Privileged),
            _ => Err(UnknownTierError(s.to_string())),
        }
    }
}

/// Immutable tier → ceiling table, built once from configuration.
///
/// Read concurrently without locking; there is no way to mutate it after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    limits: [Tinybars; 3],
}

impl TierLimits {
    #[must_use]
    pub fn new(basic: Tinybars, extended: Tinybars, privileged: Tinybars) -> Self {
        Self { limits: [basic, extended, privileged] }
    }

    /// Maximum spend for one plan of `tier` within a reset window.
    #[must_use]
    pub fn limit(&self, tier: SubscriptionTier) -> Tinybars {
        self.limits[tier.index()]
    }

    /// Returns `true` if a plan that already spent `amount_spent` must be refused
    /// a request estimated at `estimated_cost`.
    ///
    /// A plan sitting exactly at its ceiling is refused (`<=`), unlike the global
    /// budget which may be spent down to exactly zero.
    #[must_use]
    pub fn exceeds(
        &self,
        tier: SubscriptionTier,
        amount_spent: Tinybars,
        estimated_cost: Tinybars,
    ) -> bool {
        let limit = self.limit(tier);
        limit <= amount_spent || limit < amount_spent.saturating_add(estimated_cost)
    }
}
