//! # Tally Cipher
//!
//! Shared-secret encryption for self-addressed messages.
//!
//! ## Encryption Model
//!
//! 1. **Shared secret**: secp256k1 ECDH between the identity's secret scalar and
//!    an x-only public key (even-parity point). The x-coordinate of the shared
//!    point is the 32-byte secret, with no further hashing.
//! 2. **Cipher**: AES-256-CBC with PKCS#7 padding and a fresh 16-byte IV per
//!    message.
//! 3. **Envelope**: `base64(ciphertext) + "?iv=" + base64(iv)`.
//!
//! Because every message is encrypted to the sender's own public key, the
//! secret is a deterministic function of the private key alone. The relay
//! becomes a private single-writer mailbox.
//!
//! ## Usage
//!
//! ```rust
//! use tally_cipher::{Envelope, SharedSecret};
//! use tally_core::Identity;
//!
//! let identity = Identity::generate().unwrap();
//! let secret = SharedSecret::for_self(&identity).unwrap();
//!
//! let wire = Envelope::seal(b"120 abcd", &secret).encode();
//! let plaintext = Envelope::decode(&wire).unwrap().open(&secret).unwrap();
//! assert_eq!(plaintext, "120 abcd");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;

pub use crypto::{decrypt, encrypt, Iv, SharedSecret};
pub use envelope::{Envelope, IV_SEPARATOR};
pub use error::{CipherError, Result};
