//! Canonical event serialization.
//!
//! An event id is the SHA-256 of the JSON array
//! `[0, pubkey, created_at, kind, tags, content]`:
//! - Array form, so field order is fixed by position
//! - No whitespace between tokens
//! - `/` is never escaped; strings use the minimal JSON escape set
//!
//! The signature covers the id, so these bytes must be identical on every
//! device and every relay that re-verifies the event.

use crate::crypto::{PublicKey, Sha256Hash};
use crate::error::{CoreError, Result};
use crate::event::Tag;
use crate::types::{EventId, Kind};

/// Leading marker of the canonical array.
const CANONICAL_MARKER: u8 = 0;

/// Serialize the canonical 6-tuple to bytes.
pub fn canonical_event_bytes(
    pubkey: &PublicKey,
    created_at: u64,
    kind: Kind,
    tags: &[Tag],
    content: &str,
) -> Result<Vec<u8>> {
    serde_json::to_vec(&(CANONICAL_MARKER, pubkey, created_at, kind, tags, content))
        .map_err(|e| CoreError::EncodingFailed(e.to_string()))
}

/// Compute the event id from its constituent fields.
pub fn compute_event_id(
    pubkey: &PublicKey,
    created_at: u64,
    kind: Kind,
    tags: &[Tag],
    content: &str,
) -> Result<EventId> {
    let bytes = canonical_event_bytes(pubkey, created_at, kind, tags, content)?;
    Ok(EventId(Sha256Hash::hash(&bytes).0))
}
