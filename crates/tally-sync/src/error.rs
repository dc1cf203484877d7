//! Error types for the sync module.

use std::time::Duration;

use thiserror::Error;

use crate::payload::PayloadError;

/// Errors that can occur during sync operations.
///
/// None of these are fatal to the engine. Each one drops a single frame,
/// message or publish attempt, or triggers a reconnect.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A relay frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A decrypted state record was malformed.
    #[error("invalid state payload: {0}")]
    Payload(#[from] PayloadError),

    /// Transport-level error (connect, send or receive).
    #[error("transport error: {0}")]
    Transport(String),

    /// Opening the connection or sending a frame took longer than the configured timeout.
    #[error("relay timed out after {0:?}")]
    Timeout(Duration),

    /// Key agreement or decryption failed.
    #[error("cipher error: {0}")]
    Cipher(#[from] tally_cipher::CipherError),

    /// Key handling or event construction failed.
    #[error("core error: {0}")]
    Core(#[from] tally_core::CoreError),

    /// An inbound event failed id or signature checks.
    #[error("validation error: {0}")]
    Validation(#[from] tally_core::ValidationError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
