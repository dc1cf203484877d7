//! Relay wire protocol: JSON arrays tagged by their first element.
//!
//! Client to relay: `["EVENT", event]`, `["REQ", sub, filter...]`, `["CLOSE", sub]`.
//! Relay to client: `["EVENT", sub, event]`, `["EOSE", sub]`, `["OK", id, bool, msg]`,
//! `["NOTICE", msg]`. This client only acts on inbound `EVENT` frames.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tally_core::{CoreError, Event, EventId, Kind, PublicKey};

use crate::error::{Result, SyncError};

/// Substring that marks a frame worth decoding.
pub const EVENT_MARKER: &str = "\"EVENT\"";

/// Identifier of one subscription on one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random 32-character id.
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subscription filter. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<PublicKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Kind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// The self-addressed mailbox: the latest encrypted message authored by `pubkey`.
    pub fn mailbox(pubkey: &PublicKey) -> Self {
        Self {
            authors: vec![*pubkey],
            kinds: vec![Kind::ENCRYPTED_DIRECT_MESSAGE],
            limit: Some(1),
        }
    }

    /// Whether `event` passes the author and kind constraints. `limit` is not considered.
    pub fn matches(&self, event: &Event) -> bool {
        (self.authors.is_empty() || self.authors.contains(&event.pubkey))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }
}

/// Messages sent from a client to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Publish an event.
    Event(Box<Event>),
    /// Open (or replace) a subscription.
    Req {
        id: SubscriptionId,
        filters: Vec<Filter>,
    },
    /// Close a subscription.
    Close(SubscriptionId),
}

impl ClientMessage {
    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String> {
        let parts = match self {
            Self::Event(event) => vec![Value::from("EVENT"), to_value(event)?],
            Self::Req { id, filters } => {
                let mut parts = vec![Value::from("REQ"), Value::from(id.as_str())];
                for filter in filters {
                    parts.push(to_value(filter)?);
                }
                parts
            }
            Self::Close(id) => vec![Value::from("CLOSE"), Value::from(id.as_str())],
        };
        encode_frame(parts)
    }

    /// Parse a client frame, as a relay would.
    pub fn from_json(text: &str) -> Result<Self> {
        let parts = decode_frame(text)?;
        match (tag_of(&parts), parts.len()) {
            (Some("EVENT"), 2) => Ok(Self::Event(Box::new(from_value(&parts[1])?))),
            (Some("REQ"), n) if n >= 2 => {
                let id = subscription_at(&parts, 1)?;
                let filters = parts[2..]
                    .iter()
                    .map(from_value::<Filter>)
                    .collect::<Result<Vec<Filter>>>()?;
                Ok(Self::Req { id, filters })
            }
            (Some("CLOSE"), 2) => Ok(Self::Close(subscription_at(&parts, 1)?)),
            (tag, n) => Err(SyncError::Protocol(format!(
                "unexpected client frame {tag:?} with {n} elements"
            ))),
        }
    }
}

/// Messages sent from a relay to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// An event matching one of our subscriptions.
    Event {
        subscription: SubscriptionId,
        event: Box<Event>,
    },
    /// End of stored events for a subscription.
    EndOfStoredEvents(SubscriptionId),
    /// Publish acknowledgement.
    Ok {
        event_id: EventId,
        accepted: bool,
        message: String,
    },
    /// Human-readable relay notice.
    Notice(String),
}

impl RelayMessage {
    /// Recognise an inbound frame.
    ///
    /// Frames without the `"EVENT"` marker are not decoded at all and yield
    /// `Ok(None)`, as do well-formed frames with any other tag. A frame that
    /// carries the marker but is not a valid `["EVENT", sub, event]` is an error.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        if !text.contains(EVENT_MARKER) {
            return Ok(None);
        }

        let parts = decode_frame(text)?;
        if tag_of(&parts) != Some("EVENT") {
            return Ok(None);
        }
        if parts.len() != 3 {
            return Err(SyncError::Protocol(format!(
                "EVENT frame has {} elements, expected 3",
                parts.len()
            )));
        }

        Ok(Some(Self::Event {
            subscription: subscription_at(&parts, 1)?,
            event: Box::new(from_value(&parts[2])?),
        }))
    }

    /// Serialize to a text frame, as a relay would.
    pub fn to_json(&self) -> Result<String> {
        let parts = match self {
            Self::Event {
                subscription,
                event,
            } => vec![
                Value::from("EVENT"),
                Value::from(subscription.as_str()),
                to_value(event)?,
            ],
            Self::EndOfStoredEvents(id) => vec![Value::from("EOSE"), Value::from(id.as_str())],
            Self::Ok {
                event_id,
                accepted,
                message,
            } => vec![
                Value::from("OK"),
                Value::from(event_id.to_hex()),
                Value::from(*accepted),
                Value::from(message.as_str()),
            ],
            Self::Notice(message) => vec![Value::from("NOTICE"), Value::from(message.as_str())],
        };
        encode_frame(parts)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| SyncError::Core(CoreError::EncodingFailed(e.to_string())))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| SyncError::Protocol(e.to_string()))
}

fn encode_frame(parts: Vec<Value>) -> Result<String> {
    serde_json::to_string(&Value::Array(parts))
        .map_err(|e| SyncError::Core(CoreError::EncodingFailed(e.to_string())))
}

fn decode_frame(text: &str) -> Result<Vec<Value>> {
    serde_json::from_str(text).map_err(|e| SyncError::Protocol(format!("not a JSON array: {e}")))
}

fn tag_of(parts: &[Value]) -> Option<&str> {
    parts.first().and_then(Value::as_str)
}

fn subscription_at(parts: &[Value], index: usize) -> Result<SubscriptionId> {
    parts
        .get(index)
        .and_then(Value::as_str)
        .map(SubscriptionId::new)
        .ok_or_else(|| SyncError::Protocol("subscription id must be a string".into()))
}
