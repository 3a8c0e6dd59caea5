use std::time::Duration;
use thiserror::Error;

use crate::config_manager::ConfigError;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle did not answer within {0:?}")]
    OracleTimeout(Duration),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    #[error("Content policy violation: {explanation}")]
    ContentPolicyViolation {
        explanation: String,
        suggestions: Vec<String>,
    },

    #[error("Bike specification not found for session {0}. Complete the chat first.")]
    SpecificationNotFound(String),

    #[error("Image not found for session {0}")]
    ImageNotFound(String),

    #[error("Insufficient credits for user {0}")]
    InsufficientCredits(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ForgeError {
    /// True for failures of the external oracles themselves, as opposed to
    /// content or validation problems.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ForgeError::OracleUnavailable(_) | ForgeError::OracleTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
