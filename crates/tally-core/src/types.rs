//! Strong type definitions for tally events.
//!
//! Identifiers are newtypes so a public key can never be passed where an
//! event id is expected. On the wire they are lowercase hex strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decode a hex string into a fixed-size byte array.
pub(crate) fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let mut arr = [0u8; N];
    hex::decode_to_slice(s, &mut arr)?;
    Ok(arr)
}

/// Implement hex-string serde for a byte-array newtype with `to_hex`/`from_hex`.
macro_rules! hex_newtype_serde {
    ($name:ident) => {
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use hex_newtype_serde;

/// A 32-byte event identifier, computed as SHA-256 of the canonical event array.
///
/// This is the content-address of an event and the message its signature commits to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    /// Create a new EventId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_hex_array(s).map(Self)
    }
}

hex_newtype_serde!(EventId);

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for EventId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Event kind, determining how relays and clients interpret the content.
///
/// Kinds are an open numbering space, so this is a newtype rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(pub u16);

impl Kind {
    /// Short text note.
    pub const TEXT_NOTE: Self = Self(1);

    /// Encrypted direct message (`?iv=` envelope content).
    pub const ENCRYPTED_DIRECT_MESSAGE: Self = Self(4);

    /// Get the numeric value.
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Kind {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_hex_roundtrip() {
        let id = EventId::from_bytes([0x42; 32]);
        let hex = id.to_hex();
        let recovered = EventId::from_hex(&hex).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_event_id_rejects_wrong_length() {
        assert!(EventId::from_hex("abcd").is_err());
        assert!(EventId::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_event_id_display() {
        let id = EventId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
    }

    #[test]
    fn test_event_id_serializes_as_hex_string() {
        let id = EventId::from_bytes([0x01; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_kind_is_transparent_number() {
        let json = serde_json::to_string(&Kind::ENCRYPTED_DIRECT_MESSAGE).unwrap();
        assert_eq!(json, "4");
    }
}
