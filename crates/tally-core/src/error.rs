//! Error types for Tally Core.

use thiserror::Error;

use crate::types::EventId;

/// Core errors that can occur while handling keys and building events.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The OS entropy source could not produce key material.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("event encoding failed: {0}")]
    EncodingFailed(String),

    /// A freshly produced signature did not verify against its own key.
    #[error("event signing failed")]
    SigningFailed,
}

/// Validation errors for events received from a relay.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("event id mismatch: claimed {claimed}, computed {computed}")]
    IdMismatch { claimed: EventId, computed: EventId },

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
