//! Error types for contract registration, lifecycle and transport.
//!
//! Match failures are not errors: they are carried as [`Mismatch`] data in
//! responses and verification results.
//!
//! [`Mismatch`]: crate::matcher::Mismatch

use thiserror::Error;

/// Errors raised by the contract core.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A pattern or interaction is malformed or self-inconsistent.
    #[error("invalid interaction '{interaction}': {reason}")]
    Validation {
        /// Description of the offending interaction
        interaction: String,
        /// What was wrong with it
        reason: String,
    },

    /// Operation attempted in a state that does not allow it.
    #[error("{operation} not allowed while mock service is {state}")]
    Lifecycle {
        /// The rejected operation
        operation: &'static str,
        /// The state the service was in
        state: String,
    },

    /// Failure talking to a live provider. Never retried here.
    #[error("provider call failed: {0}")]
    Network(String),

    /// Failure binding or running the mock listener.
    #[error("mock listener error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    pub(crate) fn validation(interaction: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            interaction: interaction.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ContractError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result alias for contract operations.
pub type Result<T> = std::result::Result<T, ContractError>;
