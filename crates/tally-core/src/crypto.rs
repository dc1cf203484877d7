//! Cryptographic primitives for tally events.
//!
//! Wraps secp256k1 BIP-340 Schnorr signing and SHA-256 hashing with strong types.
//! Public keys are x-only (32 bytes), the form relays index authors by.

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{schnorr, Keypair, Message, SecretKey, XOnlyPublicKey, SECP256K1};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{decode_hex_array, hex_newtype_serde};

/// SHA-256 digest. Event ids and signed messages are both 32-byte digests.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({}..)", &self.to_hex()[..12])
    }
}

/// A 32-byte x-only secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Create from raw bytes.
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
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        decode_hex_array(s).map(Self)
    }

    /// Convert to the secp256k1 x-only key, checking it lies on the curve.
    pub fn to_xonly(&self) -> Result<XOnlyPublicKey> {
        XOnlyPublicKey::from_slice(&self.0).map_err(|_| CoreError::InvalidPublicKey)
    }

    /// Verify a Schnorr signature over a 32-byte digest.
    pub fn verify(&self, digest: &[u8; 32], signature: &SchnorrSignature) -> Result<()> {
        let pubkey = self.to_xonly()?;
        let sig = schnorr::Signature::from_slice(&signature.0)
            .map_err(|_| CoreError::InvalidSignature)?;

        SECP256K1
            .verify_schnorr(&sig, &Message::from_digest(*digest), &pubkey)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

hex_newtype_serde!(PublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 64-byte BIP-340 Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature(pub [u8; 64]);

impl SchnorrSignature {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        decode_hex_array(s).map(Self)
    }

    /// All-zero bytes. Never verifies.
    pub const ZERO: Self = Self([0u8; 64]);
}

hex_newtype_serde!(SchnorrSignature);

impl fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchnorrSig({}...)", &self.to_hex()[..16])
    }
}

/// The signing identity of one installation.
///
/// The same identity is both author and recipient of every synced message.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
}

impl Identity {
    /// Generate a new identity from the OS entropy source.
    ///
    /// Fails only when the entropy source itself fails.
    pub fn generate() -> Result<Self> {
        loop {
            let mut bytes = [0u8; 32];
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| CoreError::Entropy(e.to_string()))?;

            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(identity) = Self::from_secret_bytes(&bytes) {
                return Ok(identity);
            }
        }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self {
            keypair: Keypair::from_secret_key(SECP256K1, &secret),
        })
    }

    /// Create from a 64-char hex secret, as persisted in settings.
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let bytes: [u8; 32] = decode_hex_array(s.trim())?;
        Self::from_secret_bytes(&bytes)
    }

    /// Get the x-only public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.keypair.x_only_public_key().0.serialize())
    }

    /// Sign a 32-byte digest.
    ///
    /// Uses BIP-340 nonce derivation without auxiliary randomness, so the
    /// signature is deterministic for a given key and digest.
    pub fn sign(&self, digest: &[u8; 32]) -> SchnorrSignature {
        let sig = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(*digest), &self.keypair);
        SchnorrSignature(sig.serialize())
    }

    /// Get the secret key for key agreement.
    pub fn secret_key(&self) -> SecretKey {
        self.keypair.secret_key()
    }

    /// Hex encoding of the secret scalar, for persistence.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_X: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn scalar_one() -> Identity {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        Identity::from_secret_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_identity_sign_verify() {
        let identity = Identity::generate().unwrap();
        let digest = Sha256Hash::hash(b"hello world").0;
        let signature = identity.sign(&digest);

        identity
            .public_key()
            .verify(&digest, &signature)
            .expect("valid signature should verify");

        let tampered = Sha256Hash::hash(b"hello worlD").0;
        assert!(identity.public_key().verify(&tampered, &signature).is_err());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let identity = Identity::from_secret_bytes(&[0x42; 32]).unwrap();
        let digest = [7u8; 32];
        assert_eq!(identity.sign(&digest), identity.sign(&digest));
    }

    #[test]
    fn test_public_key_of_scalar_one_is_generator() {
        assert_eq!(scalar_one().public_key().to_hex(), GENERATOR_X);
    }

    #[test]
    fn test_zero_and_overflow_scalars_rejected() {
        assert!(matches!(
            Identity::from_secret_bytes(&[0u8; 32]),
            Err(CoreError::InvalidSecretKey)
        ));
        assert!(matches!(
            Identity::from_secret_bytes(&[0xff; 32]),
            Err(CoreError::InvalidSecretKey)
        ));
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let identity = Identity::generate().unwrap();
        let restored = Identity::from_secret_hex(&identity.secret_hex()).unwrap();
        assert_eq!(identity.public_key(), restored.public_key());
    }

    #[test]
    fn test_bad_secret_hex() {
        assert!(matches!(
            Identity::from_secret_hex("not hex"),
            Err(CoreError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = Identity::generate().unwrap().public_key();
        let recovered = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }

    #[test]
    fn test_zero_signature_rejected() {
        let identity = scalar_one();
        assert!(identity
            .public_key()
            .verify(&[1u8; 32], &SchnorrSignature::ZERO)
            .is_err());
    }

    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            Sha256Hash::hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
