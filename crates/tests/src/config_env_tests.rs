//! Layered configuration loading: file values, `RELAY__` environment overrides,
//! and wiring the loaded configuration into both components.
//!
//! Tests that touch process environment variables run under `#[serial]`.

use relay_core::{
    config::RelayConfig,
    limiter::{
        BudgetRateLimiter, PlanId, PlanStores, SpendingPlanProvisioner, SubscriptionTier,
    },
    metrics::MetricsCollector,
    rotation::ClientRotationManager,
};
use serial_test::serial;
use std::{path::PathBuf, time::Duration};

use crate::mock_infrastructure::CountingClientFactory;

const RELAY_TOML: &str = r#"
[limiter]
total_budget_tinybars = 2000000000
limit_duration_ms = 3600000

[limiter.tier_limits]
basic = 20000000

[[limiter.spending_plans]]
id = "c758c095-342c-4607-9db5-867d7e90ab9d"
name = "partner"
subscription_tier = "EXTENDED"
eth_addresses = ["0x7D102FE71AF42790FE31B126C1F49766376CA2B5"]
ip_addresses = ["203.0.113.44"]

[rotation]
transaction_reset = 50
duration_reset_ms = 600000
error_reset = 3
error_codes = [21, 50]

[logging]
level = "debug"
format = "json"
"#;

struct TempConfig {
    path: PathBuf,
}

impl TempConfig {
    fn write(name: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!("{name}-{}.toml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        Self { path }
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
#[serial]
fn test_file_values_are_loaded() {
    let file = TempConfig::write("relay-file-values", RELAY_TOML);
    let config = RelayConfig::from_file(&file.path).unwrap();

    assert_eq!(config.limiter.total_budget_tinybars, 2_000_000_000);
    assert_eq!(config.limiter.limit_duration(), Duration::from_secs(3_600));
    assert_eq!(config.limiter.tier_limits.basic, 20_000_000);
    assert_eq!(config.limiter.tier_limits.privileged, 1_000_000_000);
    assert_eq!(config.limiter.spending_plans.len(), 1);
    assert_eq!(config.limiter.spending_plans[0].subscription_tier, SubscriptionTier::Extended);
    assert_eq!(config.rotation.transaction_reset, Some(50));
    assert_eq!(config.rotation.duration_reset(), Some(Duration::from_secs(600)));
    assert_eq!(config.rotation.error_codes.len(), 2);
    assert_eq!(config.logging.format, "json");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = TempConfig::write("relay-env-overrides", RELAY_TOML);
    std::env::set_var("RELAY__LIMITER__TOTAL_BUDGET_TINYBARS", "7");
    std::env::set_var("RELAY__ROTATION__ERROR_CODES", "10,11,12");

    let config = RelayConfig::from_file(&file.path);

    std::env::remove_var("RELAY__LIMITER__TOTAL_BUDGET_TINYBARS");
    std::env::remove_var("RELAY__ROTATION__ERROR_CODES");

    let config = config.unwrap();
    assert_eq!(config.limiter.total_budget_tinybars, 7);
    assert_eq!(config.rotation.error_codes.into_iter().collect::<Vec<_>>(), vec![10, 11, 12]);
    assert_eq!(config.rotation.transaction_reset, Some(50));
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let config = RelayConfig::from_file("/nonexistent/relay.toml").unwrap();

    assert_eq!(config.limiter.total_budget_tinybars, 5_000_000_000);
    assert_eq!(config.limiter.limit_duration(), Duration::from_secs(86_400));
    assert!(config.rotation.transaction_reset.is_none());
    assert!(config.limiter.spending_plans.is_empty());
}

#[test]
#[serial]
fn test_duplicate_address_is_rejected() {
    let duplicated = format!(
        "{RELAY_TOML}\n{}",
        r#"
[[limiter.spending_plans]]
id = "second"
name = "second"
subscription_tier = "BASIC"
eth_addresses = ["0x7d102fe71af42790fe31b126c1f49766376ca2b5"]
"#
    );
    let file = TempConfig::write("relay-duplicate", &duplicated);
    let config = RelayConfig::from_file(&file.path).unwrap();

    let error = config.validate().unwrap_err();
    assert!(error.contains("more than one plan"), "unexpected error: {error}");
}

#[tokio::test]
#[serial]
async fn test_loaded_config_drives_both_components() {
    let file = TempConfig::write("relay-wiring", RELAY_TOML);
    let config = RelayConfig::from_file(&file.path).unwrap();
    config.validate().unwrap();

    let stores = PlanStores::in_memory();
    let summary = SpendingPlanProvisioner::new(stores.clone())
        .provision(&config.limiter.spending_plans)
        .await
        .unwrap();
    assert_eq!(summary.eth_addresses, 1);

    let metrics = MetricsCollector::new();
    let limiter = BudgetRateLimiter::new(&config.limiter, stores.clone(), metrics.clone()).unwrap();
    assert_eq!(limiter.total_budget(), 2_000_000_000);
    assert_eq!(limiter.tier_limit(SubscriptionTier::Basic), 20_000_000);

    let link = stores
        .eth_addresses
        .find_by_address("0x7d102fe71af42790fe31b126c1f49766376ca2b5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.plan_id, PlanId::from("c758c095-342c-4607-9db5-867d7e90ab9d"));

    let rotation =
        ClientRotationManager::new(&config.rotation, CountingClientFactory::new(), metrics)
            .unwrap();
    assert!(rotation.is_rotation_enabled());
    assert_eq!(rotation.transactions_remaining(), Some(50));
    assert_eq!(rotation.error_counts_remaining().get(&21), Some(&3));
}
