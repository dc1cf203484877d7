//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::time::Duration;

use tally_cipher::{Envelope, SharedSecret};
use tally_core::{Event, EventBuilder, Identity, Kind, PublicKey, Tag};
use tally_sync::{ClientId, StatePayload, SyncConfig};

/// One installation: a sync identity plus its client id.
#[derive(Debug, Clone)]
pub struct TestFixture {
    pub identity: Identity,
    pub client_id: ClientId,
}

impl TestFixture {
    /// Create a new fixture with a random identity and client id.
    pub fn new() -> Self {
        Self {
            identity: Identity::generate().expect("entropy available"),
            client_id: ClientId::generate().expect("entropy available"),
        }
    }

    /// Create with a deterministic identity. The client id is derived from the seed too.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        let mut origin = seed;
        origin[31] ^= 0xff;
        Self {
            identity: Identity::from_secret_bytes(&seed).expect("seed is a valid secret"),
            client_id: ClientId::from_bytes(origin),
        }
    }

    pub fn from_identity(identity: Identity, client_id: ClientId) -> Self {
        Self { identity, client_id }
    }

    /// Another installation of the same user: same key, different client id.
    pub fn sibling(&self, seed: u8) -> Self {
        Self {
            identity: self.identity.clone(),
            client_id: ClientId::from_bytes([seed; 32]),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Create a signed, self-addressed state event.
    pub fn make_state_event(&self, value: u64, origin: ClientId, created_at: u64) -> Event {
        let payload = StatePayload::new(value, origin).encode();
        self.make_event_with_plaintext(&payload, created_at)
    }

    /// Create a signed, self-addressed event sealing arbitrary plaintext.
    pub fn make_event_with_plaintext(&self, plaintext: &str, created_at: u64) -> Event {
        let secret = SharedSecret::for_self(&self.identity).expect("own public key is valid");
        let content = Envelope::seal(plaintext.as_bytes(), &secret).encode();
        EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, content)
            .tag(Tag::pubkey(&self.public_key()))
            .created_at(created_at)
            .sign(&self.identity)
            .expect("fixture event signs")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for several installations sharing one key.
///
/// Client ids are seeded 1..=count, so at most 255 installations.
pub fn shared_key_fixtures(count: usize) -> Vec<TestFixture> {
    assert!(count <= usize::from(u8::MAX), "at most 255 installations, got {count}");
    let first = TestFixture::with_seed([0x42; 32]);
    (1..=count)
        .filter_map(|i| u8::try_from(i).ok())
        .map(|seed| first.sibling(seed))
        .collect()
}

/// Engine configuration for tests against an in-memory relay.
///
/// The relay address is never dialed; it only has to validate.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        connect_timeout: Duration::from_secs(1),
        ..SyncConfig::with_relay("ws://relay.test")
    }
}
