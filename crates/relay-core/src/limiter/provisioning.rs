use super::{
    budget::PlanStores,
    plan::{normalize_eth_address, AddressPlan, PlanId, SpendingPlan},
    store::StoreError,
};
use crate::config::SpendingPlanConfig;
use chrono::Utc;

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisioningSummary {
    pub plans: usize,
    pub eth_addresses: usize,
    pub ip_addresses: usize,
}

/// Writes operator-configured spending plans into the stores at startup.
///
/// Provisioned plans never expire and their address links replace whatever the
/// addresses were linked to before. Running it again with the same configuration
/// leaves the stores unchanged apart from tier or address edits.
pub struct SpendingPlanProvisioner {
    stores: PlanStores,
}

impl SpendingPlanProvisioner {
    #[must_use]
    pub fn new(stores: PlanStores) -> Self {
        Self { stores }
    }

    /// # Errors
    ///
    /// Returns the first [`StoreError`] encountered. Plans written before the
    /// failure stay in place.
    pub async fn provision(
        &self,
        plans: &[SpendingPlanConfig],
    ) -> Result<ProvisioningSummary, StoreError> {
        let mut summary = ProvisioningSummary::default();

        for config in plans {
            let id = PlanId::from(config.id.as_str());
            let plan = SpendingPlan::new(id.clone(), config.subscription_tier, Utc::now());
            self.stores.plans.upsert(plan).await?;
            summary.plans += 1;

            for address in &config.eth_addresses {
                let address = normalize_eth_address(address);
                self.stores.eth_addresses.overwrite(AddressPlan::new(address, id.clone())).await?;
                summary.eth_addresses += 1;
            }
            for address in &config.ip_addresses {
                self.stores
                    .ip_addresses
                    .overwrite(AddressPlan::new(address.as_str(), id.clone()))
                    .await?;
                summary.ip_addresses += 1;
            }

            tracing::info!(
                plan_id = %id,
                name = %config.name,
                tier = %config.subscription_tier,
                eth_addresses = config.eth_addresses.len(),
                ip_addresses = config.ip_addresses.len(),
                "provisioned spending plan"
            );
        }

        Ok(summary)
    }
}
