//! Validation of events received from a relay.
//!
//! A relay is trusted for delivery only. Every inbound event is re-hashed and
//! its signature re-verified before any field is acted on.

use crate::canonical::compute_event_id;
use crate::error::ValidationError;
use crate::event::Event;

/// Validate an event's id and signature.
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    let computed = compute_event_id(
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    )?;

    if computed != event.id {
        return Err(ValidationError::IdMismatch {
            claimed: event.id,
            computed,
        });
    }

    event.pubkey.verify(event.id.as_bytes(), &event.sig)?;
    Ok(())
}
