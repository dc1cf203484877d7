//! The plaintext state record carried inside each envelope: `"<counter> <clientId>"`.

use std::fmt;

use thiserror::Error;

use tally_core::{CoreError, Identity, PublicKey};

/// A malformed state record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("expected 2 space-separated fields, got {0}")]
    FieldCount(usize),

    #[error("invalid counter value {0:?}")]
    InvalidCounter(String),

    #[error("invalid client id {0:?}")]
    InvalidClientId(String),
}

/// Origin tag of one installation.
///
/// A public key generated once per install, independent of the sync identity.
/// It only tells "my own update" apart from "another device's update".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId([u8; 32]);

impl ClientId {
    /// Generate a fresh client id.
    pub fn generate() -> Result<Self, CoreError> {
        Ok(Self(*Identity::generate()?.public_key().as_bytes()))
    }

    /// Parse a 64-character hex id.
    pub fn from_hex(s: &str) -> Result<Self, PayloadError> {
        PublicKey::from_hex(s.trim())
            .map(|pk| Self(pk.0))
            .map_err(|_| PayloadError::InvalidClientId(s.to_string()))
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Counter value tagged with the installation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatePayload {
    /// Elapsed seconds.
    pub counter: u64,
    pub origin: ClientId,
}

impl StatePayload {
    pub fn new(counter: u64, origin: ClientId) -> Self {
        Self { counter, origin }
    }

    /// Render the plaintext record.
    pub fn encode(&self) -> String {
        format!("{} {}", self.counter, self.origin)
    }

    /// Parse a plaintext record.
    ///
    /// The counter may be written as an integer or as an integral decimal
    /// (`"120.0"`), since some clients keep it as a floating-point number.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [counter, origin] = fields.as_slice() else {
            return Err(PayloadError::FieldCount(fields.len()));
        };

        Ok(Self {
            counter: parse_counter(counter)?,
            origin: ClientId::from_hex(origin)?,
        })
    }
}

fn parse_counter(field: &str) -> Result<u64, PayloadError> {
    if let Ok(value) = field.parse::<u64>() {
        return Ok(value);
    }

    let invalid = || PayloadError::InvalidCounter(field.to_string());
    let value: f64 = field.parse().map_err(|_| invalid())?;
    // Rejects NaN, infinities, negatives and fractions. The upper bound keeps
    // the cast exact.
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < 9.0e15 {
        Ok(value as u64)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn client() -> ClientId {
        ClientId::from_bytes([0xab; 32])
    }

    #[test]
    fn test_encode_layout() {
        let payload = StatePayload::new(120, client());
        assert_eq!(payload.encode(), format!("120 {}", "ab".repeat(32)));
    }

    #[test]
    fn test_parse_integral_decimal() {
        let parsed = StatePayload::parse(&format!("120.0 {}", "ab".repeat(32))).unwrap();
        assert_eq!(parsed.counter, 120);
        assert_eq!(parsed.origin, client());
    }

    #[test]
    fn test_parse_rejects_bad_counters() {
        let origin = "ab".repeat(32);
        for counter in ["-1", "1.5", "NaN", "inf", "", "twelve", "1e300"] {
            let text = format!("{counter} {origin}");
            assert!(StatePayload::parse(&text).is_err(), "{counter:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_rejects_field_count() {
        assert_eq!(StatePayload::parse("120"), Err(PayloadError::FieldCount(1)));
        assert_eq!(
            StatePayload::parse(&format!("1 {} extra", "ab".repeat(32))),
            Err(PayloadError::FieldCount(3))
        );
    }

    #[test]
    fn test_parse_rejects_bad_client_id() {
        assert!(matches!(
            StatePayload::parse("120 abcd"),
            Err(PayloadError::InvalidClientId(_))
        ));
    }

    #[test]
    fn test_generated_client_ids_differ() {
        let a = ClientId::generate().unwrap();
        let b = ClientId::generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(ClientId::from_hex(&a.to_hex()).unwrap(), a);
    }

    proptest! {
        #[test]
        fn prop_encode_parse(counter in 0u64..=u64::MAX, origin in any::<[u8; 32]>()) {
            let payload = StatePayload::new(counter, ClientId::from_bytes(origin));
            prop_assert_eq!(StatePayload::parse(&payload.encode()).unwrap(), payload);
        }
    }
}
