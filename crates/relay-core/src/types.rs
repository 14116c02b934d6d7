//! Request-scoped types shared by the limiter and rotation subsystems.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Fixed-point ledger currency subunit. All budget arithmetic is done in tinybars.
pub type Tinybars = i64;

/// Number of tinybars in one whole unit of the ledger currency.
pub const TINYBARS_PER_HBAR: Tinybars = 100_000_000;

/// How the relay is about to use the upstream network for a request.
///
/// Used as the `mode` label when a budget refusal is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Submitting a transaction to the network.
    #[default]
    Transaction,
    /// Paid query against the network.
    Query,
    /// Fetching a transaction record after submission.
    Record,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Query => "query",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request context threaded through the limiter for logging and identity fallback.
///
/// The caller identity has already been resolved by the request-handling layer;
/// this core never authenticates it.
#[derive(Debug, Clone, Default)]
pub struct RequestDetails {
    /// Correlation id attached to every log line emitted for this request.
    pub request_id: Arc<str>,
    /// Remote address of the caller, used when no eth address is supplied.
    pub ip_address: Option<String>,
}

impl RequestDetails {
    #[must_use]
    pub fn new(request_id: impl Into<Arc<str>>, ip_address: Option<String>) -> Self {
        Self { request_id: request_id.into(), ip_address }
    }

    /// Returns the ip address if present and non-empty.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip_address.as_deref().filter(|ip| !ip.is_empty())
    }
}
