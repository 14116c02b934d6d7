use super::{ClientFactory, RotationError, RotationReason};
use crate::{config::RotationConfig, metrics::MetricsCollector};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;

/// Rotation thresholds, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RotationTriggers {
    transaction_ceiling: Option<u64>,
    duration: Option<Duration>,
    error_ceiling: Option<u32>,
    error_codes: BTreeSet<i32>,
}

impl RotationTriggers {
    fn from_config(config: &RotationConfig) -> Self {
        Self {
            transaction_ceiling: config.transaction_reset,
            duration: config.duration_reset(),
            error_ceiling: config.error_reset,
            error_codes: config.error_codes.clone(),
        }
    }

    /// Rotation happens at all only if some trigger has a positive ceiling.
    fn any_positive(&self) -> bool {
        self.transaction_ceiling.is_some_and(|n| n > 0) ||
            self.duration.is_some_and(|d| !d.is_zero()) ||
            (!self.error_codes.is_empty() && self.error_ceiling.is_some_and(|n| n > 0))
    }

    fn fresh_error_counters(&self) -> BTreeMap<i32, u32> {
        match self.error_ceiling {
            Some(ceiling) => self.error_codes.iter().map(|code| (*code, ceiling)).collect(),
            None => BTreeMap::new(),
        }
    }
}

/// Internal mutable state protected by a single lock.
///
/// The handle and all three counters change together on rotation, so a caller
/// never sees a new handle paired with the previous handle's counters.
#[derive(Debug)]
struct RotationState<C> {
    client: Arc<C>,
    /// `None` when the transaction trigger is not configured.
    transactions_remaining: Option<u64>,
    window_start: Instant,
    error_counters: BTreeMap<i32, u32>,
    rotations: u64,
}

/// Owns the live upstream client handle and replaces it when it has been used
/// too much, lived too long, or seen too many trigger error codes.
///
/// ```text
///   Active ──(transactions exhausted | window elapsed | error code exhausted)──► Exhausted
///     ▲                                                                              │
///     └──────────── next get_handle(): new client, counters reset, window restarted ─┘
/// ```
///
/// Transitions are evaluated lazily inside [`get_handle`](Self::get_handle); nothing
/// runs in the background. Handles are reference counted, so rotating never
/// invalidates a handle an in-flight call already holds.
pub struct ClientRotationManager<F: ClientFactory> {
    factory: F,
    triggers: RotationTriggers,
    reinit_enabled: bool,
    state: Mutex<RotationState<F::Client>>,
    metrics: MetricsCollector,
}

impl<F: ClientFactory> ClientRotationManager<F> {
    /// Builds the manager and its first client.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::ClientConstruction`] if the first client cannot be built.
    pub fn new(
        config: &RotationConfig,
        factory: F,
        metrics: MetricsCollector,
    ) -> Result<Self, RotationError> {
        let triggers = RotationTriggers::from_config(config);
        let reinit_enabled = triggers.any_positive();
        let client = Arc::new(factory.construct()?);

        let state = RotationState {
            client,
            transactions_remaining: triggers.transaction_ceiling,
            window_start: Instant::now(),
            error_counters: triggers.fresh_error_counters(),
            rotations: 0,
        };

        tracing::info!(
            reinit_enabled,
            transaction_reset = ?triggers.transaction_ceiling,
            duration_reset = ?triggers.duration,
            error_reset = ?triggers.error_ceiling,
            error_codes = ?triggers.error_codes,
            "client rotation manager initialized"
        );

        Ok(Self { factory, triggers, reinit_enabled, state: Mutex::new(state), metrics })
    }

    /// Returns the live client, rotating it first if any trigger is exhausted.
    ///
    /// Every call consumes one transaction from the allowance of the handle it
    /// returns, including the call that rotates.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::ClientConstruction`] if a due rotation fails to build a
    /// client. The old client and its counters stay in place and the rotation is
    /// retried on the next call.
    pub fn get_handle(&self) -> Result<Arc<F::Client>, RotationError> {
        let mut state = self.state.lock();
        if !self.reinit_enabled {
            return Ok(state.client.clone());
        }

        let now = Instant::now();
        if let Some(reason) = self.rotation_due(&state, now) {
            self.rotate(&mut state, reason, now)?;
        }
        if let Some(remaining) = state.transactions_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        Ok(state.client.clone())
    }

    /// Counts one occurrence of `code` if it is a configured trigger.
    ///
    /// Never rotates by itself: once a code's allowance reaches zero, the next
    /// [`get_handle`](Self::get_handle) call rotates.
    pub fn record_error_status(&self, code: i32) {
        let mut state = self.state.lock();
        let Some(remaining) = state.error_counters.get_mut(&code) else {
            return;
        };

        *remaining = remaining.saturating_sub(1);
        self.metrics.record_error_status(code);
        if *remaining == 0 {
            tracing::info!(code, "error status allowance exhausted, client will rotate");
        } else {
            tracing::debug!(code, remaining = *remaining, "counted error status");
        }
    }

    fn rotation_due(&self, state: &RotationState<F::Client>, now: Instant) -> Option<RotationReason> {
        if let Some(duration) = self.triggers.duration {
            if now >= state.window_start + duration {
                return Some(RotationReason::Duration);
            }
        }
        if state.transactions_remaining == Some(0) {
            return Some(RotationReason::Transactions);
        }
        if state.error_counters.values().any(|remaining| *remaining == 0) {
            return Some(RotationReason::ErrorStatus);
        }
        None
    }

    fn rotate(
        &self,
        state: &mut RotationState<F::Client>,
        reason: RotationReason,
        now: Instant,
    ) -> Result<(), RotationError> {
        let client = match self.factory.construct() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(%reason, error = %e, "client rotation failed, keeping current client");
                return Err(e);
            }
        };

        state.client = Arc::new(client);
        state.transactions_remaining = self.triggers.transaction_ceiling;
        state.error_counters = self.triggers.fresh_error_counters();
        state.window_start = now;
        state.rotations += 1;

        self.metrics.record_client_rotation(reason);
        tracing::info!(%reason, rotations = state.rotations, "rotated upstream client");
        Ok(())
    }

    // Inspection

    /// Acquisitions left before the transaction trigger fires, if configured.
    pub fn transactions_remaining(&self) -> Option<u64> {
        self.state.lock().transactions_remaining
    }

    /// Time left before the duration trigger fires, if configured.
    pub fn time_until_rotation(&self) -> Option<Duration> {
        let duration = self.triggers.duration?;
        let elapsed = self.state.lock().window_start.elapsed();
        Some(duration.saturating_sub(elapsed))
    }

    /// Occurrences left per configured trigger code.
    pub fn error_counts_remaining(&self) -> BTreeMap<i32, u32> {
        self.state.lock().error_counters.clone()
    }

    pub fn is_rotation_enabled(&self) -> bool {
        self.reinit_enabled
    }

    /// Rotations performed since construction.
    pub fn rotation_count(&self) -> u64 {
        self.state.lock().rotations
    }
}
