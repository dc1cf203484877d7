//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tally_core::{Identity, Kind};
use tally_sync::{ClientId, StatePayload};

/// Generate a random identity. Out-of-range scalars are skipped.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>().prop_filter_map("secret out of range", |seed| {
        Identity::from_secret_bytes(&seed).ok()
    })
}

/// Generate a random client id.
pub fn client_id() -> impl Strategy<Value = ClientId> {
    any::<[u8; 32]>().prop_map(ClientId::from_bytes)
}

/// Generate a counter within the workday ceiling.
pub fn counter() -> impl Strategy<Value = u64> {
    0u64..=24_000
}

/// Generate a plausible `created_at`.
pub fn created_at() -> impl Strategy<Value = u64> {
    1_600_000_000u64..=2_000_000_000
}

/// Generate a kind.
pub fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::ENCRYPTED_DIRECT_MESSAGE),
        Just(Kind::TEXT_NOTE),
        any::<u16>().prop_map(Kind),
    ]
}

/// Generate arbitrary UTF-8 plaintext, including the empty string.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}

/// Generate a state payload.
pub fn state_payload() -> impl Strategy<Value = StatePayload> {
    (counter(), client_id()).prop_map(|(value, origin)| StatePayload::new(value, origin))
}

/// Parameters for generating a signed state event.
#[derive(Debug, Clone)]
pub struct StateParams {
    pub identity: Identity,
    pub payload: StatePayload,
    pub created_at: u64,
}

impl Arbitrary for StateParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (identity(), state_payload(), created_at())
            .prop_map(|(identity, payload, created_at)| StateParams {
                identity,
                payload,
                created_at,
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestFixture;
    use tally_cipher::{Envelope, SharedSecret};

    proptest! {
        #[test]
        fn test_state_event_verifies_and_decrypts(params: StateParams) {
            let fixture = TestFixture::from_identity(params.identity.clone(), params.payload.origin);
            let event = fixture.make_state_event(params.payload.counter, params.payload.origin, params.created_at);

            prop_assert!(event.verify().is_ok());
            prop_assert_eq!(event.pubkey, params.identity.public_key());

            let secret = SharedSecret::for_self(&params.identity).unwrap();
            let text = Envelope::decode(&event.content).unwrap().open(&secret).unwrap();
            prop_assert_eq!(StatePayload::parse(&text).unwrap(), params.payload);
        }

        #[test]
        fn test_fresh_iv_changes_event_id(params: StateParams) {
            let fixture = TestFixture::from_identity(params.identity, params.payload.origin);
            let a = fixture.make_state_event(params.payload.counter, params.payload.origin, params.created_at);
            let b = fixture.make_state_event(params.payload.counter, params.payload.origin, params.created_at);

            // Fresh IVs make the content differ, so the ids must too.
            prop_assert_ne!(a.content, b.content);
            prop_assert_ne!(a.id, b.id);
        }
    }
}
