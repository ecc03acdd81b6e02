//! Error types for driftfix-core.
//!
//! This module distinguishes between:
//! - Configuration errors (exit code 1): bad or missing target, mode or settings
//! - Store unavailability (exit code 2): a fetch or lookup exhausted its retries
//!
//! Per-record repair failures are not errors at this level; they are reported
//! as [`RepairOutcome::Failed`](driftfix_types::RepairOutcome) and counted.

use thiserror::Error;

/// Failure reported by a store port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transient; the call may succeed if retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request; retrying will not help.
    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        StoreError::Rejected(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Bad or missing target, mode or settings. Reported before any scanning.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong with the request.
        message: String,
    },

    /// A page fetch, lookup or catalog call failed after its retry budget.
    #[error("store unavailable for {scope} after {attempts} attempt(s): {source}")]
    StoreUnavailable {
        /// Target key or catalog scope being read.
        scope: String,
        /// Attempts made before giving up.
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl AuditError {
    pub fn configuration(message: impl Into<String>) -> Self {
        AuditError::Configuration {
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AuditError::Configuration { .. })
    }

    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AuditError::Configuration { .. } => 1,
            AuditError::StoreUnavailable { .. } => 2,
        }
    }
}

/// Result type alias using AuditError.
pub type AuditResult<T> = Result<T, AuditError>;
