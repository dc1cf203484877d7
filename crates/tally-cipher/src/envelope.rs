//! The `<base64 ciphertext>?iv=<base64 iv>` content envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::crypto::{decrypt, encrypt, Iv, SharedSecret, BLOCK_SIZE};
use crate::error::{CipherError, Result};

/// Separator between ciphertext and IV in the wire form.
pub const IV_SEPARATOR: &str = "?iv=";

/// An encrypted payload together with the IV needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// AES-256-CBC ciphertext, PKCS#7 padded.
    pub ciphertext: Vec<u8>,
    /// IV used for this ciphertext.
    pub iv: Iv,
}

impl Envelope {
    /// Encrypt `plaintext` under a fresh random IV.
    pub fn seal(plaintext: &[u8], secret: &SharedSecret) -> Self {
        Self::seal_with_iv(plaintext, Iv::generate(), secret)
    }

    /// Encrypt under a caller-chosen IV. Only useful for fixed test vectors.
    pub fn seal_with_iv(plaintext: &[u8], iv: Iv, secret: &SharedSecret) -> Self {
        Self {
            ciphertext: encrypt(plaintext, &iv, secret),
            iv,
        }
    }

    /// Decrypt and interpret the plaintext as UTF-8.
    pub fn open(&self, secret: &SharedSecret) -> Result<String> {
        let plaintext = decrypt(&self.ciphertext, &self.iv, secret)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }

    /// Render the wire form.
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            STANDARD.encode(&self.ciphertext),
            IV_SEPARATOR,
            STANDARD.encode(self.iv.as_bytes())
        )
    }

    /// Parse the wire form. Exactly one `?` is allowed, and it must start `?iv=`.
    pub fn decode(s: &str) -> Result<Self> {
        let mut parts = s.split('?');
        let (Some(body), Some(tail), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CipherError::MalformedEnvelope(
                "expected exactly one '?' separator".into(),
            ));
        };

        let iv_b64 = tail
            .strip_prefix("iv=")
            .ok_or_else(|| CipherError::MalformedEnvelope("missing 'iv=' marker".into()))?;

        let ciphertext = STANDARD
            .decode(body)
            .map_err(|e| CipherError::MalformedEnvelope(format!("ciphertext: {e}")))?;
        let iv_bytes = STANDARD
            .decode(iv_b64)
            .map_err(|e| CipherError::MalformedEnvelope(format!("iv: {e}")))?;

        let iv: [u8; BLOCK_SIZE] = iv_bytes.try_into().map_err(|v: Vec<u8>| {
            CipherError::MalformedEnvelope(format!("iv must be {BLOCK_SIZE} bytes, got {}", v.len()))
        })?;

        Ok(Self {
            ciphertext,
            iv: Iv::from_bytes(iv),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_core::Identity;

    const SEQUENTIAL_IV: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    fn scalar_one() -> Identity {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        Identity::from_secret_bytes(&bytes).unwrap()
    }

    fn state_plaintext() -> String {
        format!("120 {}", "ab".repeat(32))
    }

    #[test]
    fn test_known_answer_scalar_one() {
        let secret = SharedSecret::for_self(&scalar_one()).unwrap();
        let envelope =
            Envelope::seal_with_iv(state_plaintext().as_bytes(), Iv::from_bytes(SEQUENTIAL_IV), &secret);
        assert_eq!(
            envelope.encode(),
            "DmWUlOMrdGmUhIQZD1lcTo5bhAyyQNbnEehP3oB0IpQNawMg65CfwRg+OlOq8tDzkTgCUKwhsMhRoCXo4Td0oekp6ht9f46mTVJ1c6CkDnM=?iv=AAECAwQFBgcICQoLDA0ODw=="
        );
    }

    #[test]
    fn test_known_answer_opens() {
        let identity = Identity::from_secret_bytes(&[0x42; 32]).unwrap();
        let secret = SharedSecret::for_self(&identity).unwrap();
        let wire = "qx6QnPSEPWzoJ8SP6ktoeMJI0E6zeVFBmtHcdVdwilQomWIBzABQZZnc+/WrMF+Wf+Hd9VibyXMLzgsGt+LkW/hiGHxiMTugZoahRG2JJX0=?iv=AAECAwQFBgcICQoLDA0ODw==";
        let opened = Envelope::decode(wire).unwrap().open(&secret).unwrap();
        assert_eq!(opened, state_plaintext());
    }

    #[test]
    fn test_seal_uses_fresh_iv() {
        let secret = SharedSecret::from_bytes([3; 32]);
        let a = Envelope::seal(b"same", &secret);
        let b = Envelope::seal(b"same", &secret);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert!(matches!(
            Envelope::decode("AAAA"),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_rejects_extra_separator() {
        assert!(matches!(
            Envelope::decode("AAAA?iv=AAECAwQFBgcICQoLDA0ODw==?iv=AA=="),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_marker() {
        assert!(matches!(
            Envelope::decode("AAAA?nonce=AAECAwQFBgcICQoLDA0ODw=="),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(Envelope::decode("!!!?iv=AAECAwQFBgcICQoLDA0ODw==").is_err());
        assert!(Envelope::decode("AAAA?iv=###").is_err());
    }

    #[test]
    fn test_decode_rejects_short_iv() {
        assert!(matches!(
            Envelope::decode("AAAA?iv=AAECAw=="),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_open_with_wrong_secret_fails() {
        let envelope = Envelope::seal(b"120 abc", &SharedSecret::from_bytes([1; 32]));
        let result = envelope.open(&SharedSecret::from_bytes([2; 32]));
        assert!(result.map(|s| s != "120 abc").unwrap_or(true));
    }

    #[test]
    fn test_open_rejects_non_utf8() {
        let secret = SharedSecret::from_bytes([5; 32]);
        let envelope = Envelope::seal(&[0xff, 0xfe, 0xfd], &secret);
        assert!(matches!(envelope.open(&secret), Err(CipherError::InvalidUtf8)));
    }

    proptest! {
        #[test]
        fn prop_wire_roundtrip(key in any::<[u8; 32]>(), text in "[ -~]{0,120}") {
            let secret = SharedSecret::from_bytes(key);
            let wire = Envelope::seal(text.as_bytes(), &secret).encode();
            let opened = Envelope::decode(&wire).unwrap().open(&secret).unwrap();
            prop_assert_eq!(opened, text);
        }
    }
}
