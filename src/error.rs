//! # Coordinator Error Types
//!
//! Unified error handling for the staging coordinator. Variants follow the
//! failure taxonomy the coordinator actually distinguishes: validation
//! failures that must never reach the network, transport/API failures whose
//! server-side effect is unknown, and state-integrity failures that indicate
//! the registry's tracking structures disagree with each other.

use thiserror::Error;

use crate::identity::ClientId;
use crate::model::TransactionId;

/// Coordinator operation result type
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Error type for all coordinator, registry, and queue operations
#[derive(Debug, Error)]
pub enum CoordinatorError {
    // --- Validation: rejected locally, before any network call ---
    #[error("batch is empty after filtering deferred items")]
    EmptyBatch,

    #[error("items belong to different patients: expected {expected}, found {found}")]
    MixedPatients { expected: i64, found: i64 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown combo code: {0}")]
    UnknownCombo(String),

    // --- Transport: server state unknown, recovery is explicit ---
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    // --- State integrity: the registry refused to leave itself inconsistent ---
    #[error("item not tracked: {0}")]
    ItemNotFound(ClientId),

    #[error("state integrity violation: {0}")]
    StateIntegrity(String),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // --- Infrastructure ---
    #[error("client id generation failed: {0}")]
    IdGeneration(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(#[from] uuid::Error),

    #[error("operation queue closed before the operation ran")]
    QueueClosed,

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
}

impl CoordinatorError {
    /// Create an API error from an HTTP response
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a state-integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::StateIntegrity(message.into())
    }

    /// True for errors rejected before any network call was made. These are
    /// always recoverable locally by fixing the staged set.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyBatch
                | Self::MixedPatients { .. }
                | Self::InvalidPayload(_)
                | Self::UnknownCombo(_)
        )
    }

    /// Check whether an explicit, user-triggered retry is worth offering.
    ///
    /// Transient transport failures and server errors qualify, as do
    /// validation failures once the staged set is fixed. Integrity failures
    /// and definitive server rejections do not; repeating those repeats the
    /// same defect.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::QueueClosed => false,
            other => other.is_validation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_classification() {
        assert!(CoordinatorError::EmptyBatch.is_validation());
        assert!(CoordinatorError::MixedPatients {
            expected: 42,
            found: 43
        }
        .is_validation());
        assert!(!CoordinatorError::api_error(500, "boom").is_validation());
        assert!(!CoordinatorError::integrity("double occupancy").is_validation());
    }

    #[test]
    fn recoverability() {
        assert!(CoordinatorError::api_error(503, "unavailable").is_recoverable());
        assert!(!CoordinatorError::api_error(422, "bad batch").is_recoverable());
        assert!(!CoordinatorError::integrity("stale handle").is_recoverable());
        assert!(!CoordinatorError::QueueClosed.is_recoverable());
    }

    #[test]
    fn mixed_patient_message_names_both_patients() {
        let err = CoordinatorError::MixedPatients {
            expected: 42,
            found: 43,
        };
        let msg = err.to_string();
        assert!(msg.contains("different patients"));
        assert!(msg.contains("42"));
        assert!(msg.contains("43"));
    }
}
