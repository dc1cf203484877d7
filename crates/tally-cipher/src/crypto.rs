//! Key agreement and symmetric encryption.
//!
//! Provides secp256k1 ECDH and AES-256-CBC with PKCS#7 padding.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use secp256k1::ecdh::shared_secret_point;
use tally_core::{Identity, PublicKey};

use crate::error::{CipherError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Parity prefix for reconstructing a compressed point from an x-only key.
const EVEN_PARITY: u8 = 0x02;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// A 32-byte secret derived from ECDH.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Run ECDH between `identity` and an x-only counterparty key.
    ///
    /// The x-only key is lifted to the even-parity point. Parity does not
    /// affect the x-coordinate of the product, so either lift agrees with the
    /// counterparty's own computation.
    pub fn derive(identity: &Identity, their_pubkey: &PublicKey) -> Result<Self> {
        let mut compressed = [0u8; 33];
        compressed[0] = EVEN_PARITY;
        compressed[1..].copy_from_slice(their_pubkey.as_bytes());

        let point = secp256k1::PublicKey::from_slice(&compressed)
            .map_err(|_| CipherError::InvalidPublicKey)?;

        let shared = shared_secret_point(&point, &identity.secret_key());
        let mut x = [0u8; 32];
        x.copy_from_slice(&shared[..32]);
        Ok(Self(x))
    }

    /// Like [`SharedSecret::derive`], with the counterparty given as hex.
    pub fn derive_from_hex(identity: &Identity, their_pubkey_hex: &str) -> Result<Self> {
        let pubkey = PublicKey::from_hex(their_pubkey_hex)
            .map_err(|_| CipherError::InvalidPublicKey)?;
        Self::derive(identity, &pubkey)
    }

    /// The secret for messages addressed to oneself.
    pub fn for_self(identity: &Identity) -> Result<Self> {
        Self::derive(identity, &identity.public_key())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// A 128-bit CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv(pub [u8; BLOCK_SIZE]);

impl Iv {
    /// Generate a new random IV. Never reuse one across messages.
    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }
}

/// Encrypt with AES-256-CBC and PKCS#7 padding.
pub fn encrypt(plaintext: &[u8], iv: &Iv, secret: &SharedSecret) -> Vec<u8> {
    Aes256CbcEnc::new(&secret.0.into(), &iv.0.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt AES-256-CBC and strip PKCS#7 padding.
///
/// A wrong key almost always surfaces here as a padding failure.
pub fn decrypt(ciphertext: &[u8], iv: &Iv, secret: &SharedSecret) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::DecryptFailed(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    Aes256CbcDec::new(&secret.0.into(), &iv.0.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::DecryptFailed("invalid padding".into()))
}
