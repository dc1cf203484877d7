//! Error types for the cipher layer.
//!
//! Every variant is non-fatal: the caller drops the one message involved.

use thiserror::Error;

/// Errors that can occur during key agreement, encryption, or envelope parsing.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Counterparty key is not a valid curve point.
    #[error("invalid counterparty public key")]
    InvalidPublicKey,

    /// Envelope does not match `<b64>?iv=<b64>`.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Bad padding, wrong key, or truncated ciphertext.
    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    /// Decrypted bytes are not UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    /// Key parsing error from the core crate.
    #[error("core error: {0}")]
    Core(#[from] tally_core::CoreError),
}

/// Result type for cipher operations.
pub type Result<T> = std::result::Result<T, CipherError>;
