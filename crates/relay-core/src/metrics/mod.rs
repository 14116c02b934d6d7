//! # Metrics
//!
//! Side-effect counters and gauges for the limiter and the client rotation
//! manager. Nothing in here participates in admission or rotation decisions.
//!
//! All recording goes through the `metrics` facade; a process-global Prometheus
//! recorder is installed the first time a [`MetricsCollector`] is built and its
//! text exposition is available from [`MetricsCollector::render`].
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `relay_rate_limit_reached_total` | counter | `mode`, `method` |
//! | `relay_tier_limit_reached_total` | counter | `tier` |
//! | `relay_remaining_budget_tinybars` | gauge | |
//! | `relay_unique_spending_plans_used` | gauge | `tier` |
//! | `relay_average_spend_tinybars` | gauge | `tier` |
//! | `relay_limiter_resets_total` | counter | |
//! | `relay_client_rotations_total` | counter | `reason` |
//! | `relay_client_error_status_total` | counter | `code` |

use crate::{
    limiter::SubscriptionTier,
    rotation::RotationReason,
    types::{ExecutionMode, Tinybars},
};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "failed to install Prometheus recorder, attempting fallback"
                );

                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "using fallback Prometheus recorder (install error: {e}) - metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

/// Records limiter and rotation metrics.
///
/// Cheap to clone; all clones write to the same global recorder.
#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Prometheus text exposition of everything recorded so far.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }

    // Limiter Metrics

    /// A request was refused because the global budget cannot cover it.
    pub fn record_rate_limit_reached(&self, mode: ExecutionMode, method: &str) {
        counter!(
            "relay_rate_limit_reached_total",
            "mode" => mode.as_str(),
            "method" => method.to_string()
        )
        .increment(1);
    }

    /// A request was refused because its spending plan hit the tier ceiling.
    pub fn record_tier_limit_reached(&self, tier: SubscriptionTier) {
        counter!("relay_tier_limit_reached_total", "tier" => tier.as_str()).increment(1);
    }

    pub fn record_remaining_budget(&self, remaining: Tinybars) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("relay_remaining_budget_tinybars").set(remaining as f64);
    }

    /// Publishes how many distinct plans of `tier` have spent in the current window.
    ///
    /// A gauge, since a limiter reset sets it back to zero.
    pub fn record_unique_plans_used(&self, tier: SubscriptionTier, count: u64) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("relay_unique_spending_plans_used", "tier" => tier.as_str()).set(count as f64);
    }

    pub fn record_average_spend(&self, tier: SubscriptionTier, average: f64) {
        gauge!("relay_average_spend_tinybars", "tier" => tier.as_str()).set(average);
    }

    pub fn record_limiter_reset(&self) {
        counter!("relay_limiter_resets_total").increment(1);
    }

    // Client Rotation Metrics

    pub fn record_client_rotation(&self, reason: RotationReason) {
        counter!("relay_client_rotations_total", "reason" => reason.as_str()).increment(1);
    }

    /// A configured rotation-trigger status code was observed.
    pub fn record_error_status(&self, code: i32) {
        counter!("relay_client_error_status_total", "code" => code.to_string()).increment(1);
    }
}
