//! # Tally Core
//!
//! Pure primitives for tally: identities, canonical events, and signatures.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Identity`] - A secp256k1 keypair that authors and signs events
//! - [`PublicKey`] - The x-only public key (64 hex chars on the wire)
//! - [`Event`] - The signed, content-addressed unit of relay data
//! - [`EventId`] - SHA-256 of the canonical event serialization
//!
//! ## Canonicalization
//!
//! Event ids commit to a fixed-position JSON array. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod types;
pub mod validation;

pub use canonical::{canonical_event_bytes, compute_event_id};
pub use crypto::{Identity, PublicKey, SchnorrSignature, Sha256Hash};
pub use error::{CoreError, Result, ValidationError};
pub use event::{unix_now, Event, EventBuilder, Tag};
pub use types::{EventId, Kind};
pub use validation::validate_event;
