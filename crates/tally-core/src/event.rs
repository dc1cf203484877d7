//! Event: the signed, content-addressed unit of relay data.
//!
//! An event is immutable once built. Local events come only from
//! [`EventBuilder::sign`]; everything else is received read-only from a relay
//! and must pass [`crate::validate_event`] before use.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::canonical::compute_event_id;
use crate::crypto::{Identity, PublicKey, SchnorrSignature};
use crate::error::{CoreError, Result, ValidationError};
use crate::types::{EventId, Kind};
use crate::validation::validate_event;

/// A tag expressed as an array of strings.
///
/// The first element names the tag type, e.g. `p` references a public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// A `p` tag naming the intended recipient.
    pub fn pubkey(pubkey: &PublicKey) -> Self {
        Self(vec!["p".to_string(), pubkey.to_hex()])
    }

    /// The tag type, if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The first value after the tag type.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// A signed event as exchanged with relays.
///
/// ```json
/// {
///   "id": "<64 hex>",
///   "pubkey": "<64 hex>",
///   "created_at": 1700000000,
///   "kind": 4,
///   "tags": [["p", "<64 hex>"]],
///   "content": "<base64>?iv=<base64>",
///   "sig": "<128 hex>"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// SHA-256 of the canonical array.
    pub id: EventId,
    /// Author x-only public key.
    pub pubkey: PublicKey,
    /// Unix seconds.
    pub created_at: u64,
    pub kind: Kind,
    pub tags: Vec<Tag>,
    pub content: String,
    /// Schnorr signature over `id`.
    pub sig: SchnorrSignature,
}

impl Event {
    /// Check the id against the content and the signature against the id.
    pub fn verify(&self) -> std::result::Result<(), ValidationError> {
        validate_event(self)
    }

    /// Recipients named by `p` tags.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|t| t.kind() == Some("p"))
            .filter_map(Tag::value)
    }
}

/// Builder for locally authored events.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    created_at: Option<u64>,
}

impl EventBuilder {
    /// Start building an event of `kind` with `content`.
    pub fn new(kind: Kind, content: impl Into<String>) -> Self {
        Self {
            kind,
            tags: Vec::new(),
            content: content.into(),
            created_at: None,
        }
    }

    /// Append a tag.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Override the creation time (defaults to now).
    pub fn created_at(mut self, secs: u64) -> Self {
        self.created_at = Some(secs);
        self
    }

    /// Hash, sign, and self-verify the event.
    ///
    /// `EncodingFailed` if the canonical array cannot be serialized,
    /// `SigningFailed` if the fresh signature does not verify.
    pub fn sign(self, identity: &Identity) -> Result<Event> {
        let pubkey = identity.public_key();
        let created_at = self.created_at.unwrap_or_else(unix_now);
        let id = compute_event_id(&pubkey, created_at, self.kind, &self.tags, &self.content)?;

        let sig = identity.sign(id.as_bytes());
        pubkey
            .verify(id.as_bytes(), &sig)
            .map_err(|_| CoreError::SigningFailed)?;

        Ok(Event {
            id,
            pubkey,
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        })
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_event_verifies() {
        let identity = Identity::generate().unwrap();
        let event = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, "payload")
            .tag(Tag::pubkey(&identity.public_key()))
            .sign(&identity)
            .unwrap();

        assert_eq!(event.pubkey, identity.public_key());
        event.pubkey.verify(event.id.as_bytes(), &event.sig).unwrap();
        event.verify().unwrap();
    }

    #[test]
    fn test_created_at_defaults_to_now() {
        let identity = Identity::generate().unwrap();
        let before = unix_now();
        let event = EventBuilder::new(Kind::TEXT_NOTE, "").sign(&identity).unwrap();
        assert!(event.created_at >= before);
        assert!(event.created_at <= unix_now());
    }

    #[test]
    fn test_json_shape() {
        let identity = Identity::from_secret_bytes(&[0x42; 32]).unwrap();
        let event = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, "c")
            .tag(Tag::pubkey(&identity.public_key()))
            .created_at(1_700_000_000)
            .sign(&identity)
            .unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], 4);
        assert_eq!(value["created_at"], 1_700_000_000u64);
        assert_eq!(value["pubkey"], identity.public_key().to_hex());
        assert_eq!(value["tags"][0][0], "p");
        assert_eq!(value["sig"].as_str().unwrap().len(), 128);

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_recipients() {
        let identity = Identity::generate().unwrap();
        let event = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, "")
            .tag(Tag(vec!["e".into(), "ignored".into()]))
            .tag(Tag::pubkey(&identity.public_key()))
            .sign(&identity)
            .unwrap();
        let hex = identity.public_key().to_hex();
        assert_eq!(event.recipients().collect::<Vec<_>>(), vec![hex.as_str()]);
    }

    mod props {
        use super::*;
        use crate::canonical::compute_event_id;
        use proptest::prelude::*;

        fn identity() -> impl Strategy<Value = Identity> {
            any::<[u8; 32]>().prop_filter_map("valid secret key", |bytes| {
                Identity::from_secret_bytes(&bytes).ok()
            })
        }

        fn tag() -> impl Strategy<Value = Tag> {
            prop::collection::vec(".{0,16}", 0..4).prop_map(Tag)
        }

        proptest! {
            #[test]
            fn test_signed_event_is_self_consistent(
                identity in identity(),
                kind in any::<u16>(),
                created_at in 0u64..4_000_000_000,
                tags in prop::collection::vec(tag(), 0..4),
                content in ".{0,64}",
            ) {
                let event = tags
                    .into_iter()
                    .fold(EventBuilder::new(Kind(kind), content), EventBuilder::tag)
                    .created_at(created_at)
                    .sign(&identity)
                    .unwrap();

                prop_assert!(event.verify().is_ok());
                let id = compute_event_id(&event.pubkey, event.created_at, event.kind, &event.tags, &event.content).unwrap();
                prop_assert_eq!(id, event.id);
                let again = compute_event_id(&event.pubkey, event.created_at, event.kind, &event.tags, &event.content).unwrap();
                prop_assert_eq!(again, id);
            }
        }
    }
}
