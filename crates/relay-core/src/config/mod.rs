//! Relay configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations below
//! 2. **Config file**: TOML file named by the `RELAY_CONFIG` env var
//! 3. **Environment variables**: `RELAY__*` env vars override specific fields
//!
//! Every value is read once when a component is constructed. Changing a value
//! requires building a new limiter or rotation manager.
//!
//! # Example
//!
//! ```toml
//! [limiter]
//! total_budget_tinybars = 5000000000
//! limit_duration_ms = 86400000
//!
//! [limiter.tier_limits]
//! basic = 100000000
//!
//! [[limiter.spending_plans]]
//! id = "c758c095-342c-4607-9db5-867d7e90ab9d"
//! name = "partner"
//! subscription_tier = "EXTENDED"
//! eth_addresses = ["0x7d102fe71af42790fe31b126c1f49766376ca2b5"]
//!
//! [rotation]
//! transaction_reset = 50
//! duration_reset_ms = 3600000
//! error_reset = 3
//! error_codes = [21, 50]
//! ```

use crate::{
    limiter::SubscriptionTier,
    types::{Tinybars, TINYBARS_PER_HBAR},
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashSet},
    path::Path,
    time::Duration,
};

/// Per-tier spend ceilings in tinybars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimitsConfig {
    /// Defaults to `100_000_000` (1 ℏ).
    #[serde(default = "default_basic_limit")]
    pub basic: Tinybars,

    /// Defaults to `500_000_000` (5 ℏ).
    #[serde(default = "default_extended_limit")]
    pub extended: Tinybars,

    /// Defaults to `1_000_000_000` (10 ℏ).
    #[serde(default = "default_privileged_limit")]
    pub privileged: Tinybars,
}

fn default_basic_limit() -> Tinybars {
    TINYBARS_PER_HBAR
}

fn default_extended_limit() -> Tinybars {
    5 * TINYBARS_PER_HBAR
}

fn default_privileged_limit() -> Tinybars {
    10 * TINYBARS_PER_HBAR
}

/// A spending plan provisioned by the operator at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingPlanConfig {
    /// Fixed plan id.
    pub id: String,

    /// Human-readable label used in logs.
    pub name: String,

    pub subscription_tier: SubscriptionTier,

    #[serde(default)]
    pub eth_addresses: Vec<String>,

    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

/// Budget limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Total spend allowed across all callers per reset window. Defaults to 50 ℏ.
    #[serde(default = "default_total_budget")]
    pub total_budget_tinybars: Tinybars,

    /// Length of the reset window in milliseconds. Must be greater than 0. Defaults to one day.
    #[serde(default = "default_limit_duration_ms")]
    pub limit_duration_ms: u64,

    #[serde(default)]
    pub tier_limits: TierLimitsConfig,

    /// Operator-provisioned plans. Empty by default.
    #[serde(default)]
    pub spending_plans: Vec<SpendingPlanConfig>,
}

fn default_total_budget() -> Tinybars {
    50 * TINYBARS_PER_HBAR
}

fn default_limit_duration_ms() -> u64 {
    86_400_000
}

/// Upstream client rotation triggers.
///
/// An unset trigger never fires. A trigger set to `0` fires on every access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Rotate after this many handle acquisitions.
    #[serde(default)]
    pub transaction_reset: Option<u64>,

    /// Rotate once the current handle is this old, in milliseconds.
    #[serde(default)]
    pub duration_reset_ms: Option<u64>,

    /// Rotate after any trigger code has been observed this many times.
    #[serde(default)]
    pub error_reset: Option<u32>,

    /// Status codes that count toward `error_reset`.
    #[serde(default)]
    pub error_codes: BTreeSet<i32>,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Root configuration for the admission and rotation core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TierLimitsConfig {
    fn default() -> Self {
        Self {
            basic: default_basic_limit(),
            extended: default_extended_limit(),
            privileged: default_privileged_limit(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            total_budget_tinybars: default_total_budget(),
            limit_duration_ms: default_limit_duration_ms(),
            tier_limits: TierLimitsConfig::default(),
            spending_plans: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl LimiterConfig {
    /// Returns the reset window as a [`Duration`].
    #[must_use]
    pub fn limit_duration(&self) -> Duration {
        Duration::from_millis(self.limit_duration_ms)
    }
}

impl RotationConfig {
    /// Returns the handle age limit as a [`Duration`], if configured.
    #[must_use]
    pub fn duration_reset(&self) -> Option<Duration> {
        self.duration_reset_ms.map(Duration::from_millis)
    }
}

impl RelayConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `RELAY__` prefix override any value, using `__`
    /// as the nesting separator (e.g., `RELAY__LIMITER__LIMIT_DURATION_MS=60000`).
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("limiter.total_budget_tinybars", default_total_budget())?
            .set_default("limiter.limit_duration_ms", default_limit_duration_ms())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rotation.error_codes")
                    .try_parsing(true),
            )
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/relay.toml`, or the path in `RELAY_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/relay.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        let limiter = &self.limiter;

        if limiter.limit_duration_ms == 0 {
            return Err("Limit duration must be greater than 0".to_string());
        }

        if limiter.total_budget_tinybars < 0 {
            return Err("Total budget must not be negative".to_string());
        }

        let tiers = &limiter.tier_limits;
        if tiers.basic < 0 || tiers.extended < 0 || tiers.privileged < 0 {
            return Err("Tier limits must not be negative".to_string());
        }

        let mut plan_ids = HashSet::new();
        let mut eth_addresses = HashSet::new();
        let mut ip_addresses = HashSet::new();
        for plan in &limiter.spending_plans {
            if plan.id.is_empty() {
                return Err(format!("Spending plan '{}' has an empty id", plan.name));
            }
            if !plan_ids.insert(plan.id.as_str()) {
                return Err(format!("Duplicate spending plan id: {}", plan.id));
            }
            for address in &plan.eth_addresses {
                if !eth_addresses.insert(address.to_ascii_lowercase()) {
                    return Err(format!("Eth address {address} is assigned to more than one plan"));
                }
            }
            for address in &plan.ip_addresses {
                if !ip_addresses.insert(address.as_str()) {
                    return Err(format!("IP address {address} is assigned to more than one plan"));
                }
            }
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
