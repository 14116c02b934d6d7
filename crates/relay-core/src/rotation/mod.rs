//! Upstream client rotation.
//!
//! [`ClientRotationManager`] keeps one live client and swaps it for a fresh one
//! when any of three triggers is exhausted:
//!
//! - **transactions**: the handle has been handed out `transaction_reset` times
//! - **duration**: `duration_reset_ms` has elapsed since the handle was built
//! - **error status**: a configured error code was recorded `error_reset` times
//!
//! An unset trigger never fires. A trigger set to zero fires on every access.

mod manager;

pub use manager::ClientRotationManager;

use std::fmt;
use thiserror::Error;

/// Error types for client rotation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// The client factory could not build a client
    #[error("failed to construct upstream client: {0}")]
    ClientConstruction(String),
}

/// Trigger that caused a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationReason {
    Transactions,
    Duration,
    ErrorStatus,
}

impl RotationReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Duration => "duration",
            Self::ErrorStatus => "error_status",
        }
    }
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds upstream clients for the rotation manager.
///
/// The manager never looks inside a client; it only hands it out behind an `Arc`.
pub trait ClientFactory: Send + Sync {
    type Client: Send + Sync;

    /// # Errors
    ///
    /// Returns [`RotationError::ClientConstruction`] if the client cannot be built.
    fn construct(&self) -> Result<Self::Client, RotationError>;
}

impl<C, F> ClientFactory for F
where
    C: Send + Sync,
    F: Fn() -> Result<C, RotationError> + Send + Sync,
{
    type Client = C;

    fn construct(&self) -> Result<C, RotationError> {
        self()
    }
}
