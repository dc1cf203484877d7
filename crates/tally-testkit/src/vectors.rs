//! Golden test vectors for deterministic verification.
//!
//! Every expected value here was computed with an independent secp256k1,
//! AES-CBC and SHA-256 stack, so a match proves interoperability with other
//! clients rather than just self-consistency.

use tally_cipher::{Envelope, Iv, SharedSecret};
use tally_core::{canonical_event_bytes, compute_event_id, EventBuilder, Identity, Kind, PublicKey, Tag};

/// IV used by every envelope vector: the bytes `0, 1, .., 15`.
pub const VECTOR_IV: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Creation time used by every event vector.
pub const VECTOR_CREATED_AT: u64 = 1_700_000_000;

/// A golden test vector: one key, one state message, one self-addressed event.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Secret scalar (hex).
    pub secret_hex: &'static str,
    /// Expected x-only public key (hex).
    pub expected_pubkey: &'static str,
    /// Expected ECDH(self, self) x-coordinate (hex).
    pub expected_shared: &'static str,
    /// State message sealed into the envelope.
    pub plaintext: &'static str,
    /// Expected envelope under [`VECTOR_IV`].
    pub expected_envelope: &'static str,
    /// Expected id of the kind-4 event carrying the envelope.
    pub expected_event_id: &'static str,
}

/// A canonical-serialization vector exercising JSON string escaping.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    pub name: &'static str,
    pub pubkey: [u8; 32],
    pub created_at: u64,
    pub kind: Kind,
    pub content: &'static str,
    pub expected_json: &'static str,
    pub expected_event_id: &'static str,
}

/// Get all key/envelope/event vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "secret key one (generator point)",
            secret_hex: "0000000000000000000000000000000000000000000000000000000000000001",
            expected_pubkey: "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            expected_shared: "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            plaintext: "120 abababababababababababababababababababababababababababababababab",
            expected_envelope: "DmWUlOMrdGmUhIQZD1lcTo5bhAyyQNbnEehP3oB0IpQNawMg65CfwRg+OlOq8tDzkTgCUKwhsMhRoCXo4Td0oekp6ht9f46mTVJ1c6CkDnM=?iv=AAECAwQFBgcICQoLDA0ODw==",
            expected_event_id: "7717c5d99fa9da7bfe25eaf81479b27254feeba6cda3fa23ce6a8447bffca981",
        },
        GoldenVector {
            name: "secret key 0x42 repeated",
            secret_hex: "4242424242424242424242424242424242424242424242424242424242424242",
            expected_pubkey: "24653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1c",
            expected_shared: "69857c6338d0c21becd9c6502b8edc5967c1e3c6a0fab23e1cf0dfe440c89f0c",
            plaintext: "120 abababababababababababababababababababababababababababababababab",
            expected_envelope: "qx6QnPSEPWzoJ8SP6ktoeMJI0E6zeVFBmtHcdVdwilQomWIBzABQZZnc+/WrMF+Wf+Hd9VibyXMLzgsGt+LkW/hiGHxiMTugZoahRG2JJX0=?iv=AAECAwQFBgcICQoLDA0ODw==",
            expected_event_id: "ab6bc0578253c1b7a5fb4245daa8afdc928dfe7beaa08527dc1ef6a312847c0e",
        },
    ]
}

/// Get the canonical-serialization vectors.
pub fn canonical_vectors() -> Vec<CanonicalVector> {
    vec![CanonicalVector {
        name: "slash unescaped, newline and quotes escaped",
        pubkey: [0xaa; 32],
        created_at: 1,
        kind: Kind::TEXT_NOTE,
        content: "a/b\n\"q\"",
        expected_json: r#"[0,"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",1,1,[],"a/b\n\"q\""]"#,
        expected_event_id: "7a40c67885817af84f2c36cd0edb0d6536c79eff37e4e9a8bf81e930b949cc3a",
    }]
}

/// The identity a vector describes.
pub fn identity_from_vector(vector: &GoldenVector) -> Identity {
    Identity::from_secret_hex(vector.secret_hex).expect("golden vector secret is valid")
}

/// Seal the vector's plaintext under its own ECDH secret and [`VECTOR_IV`].
pub fn envelope_from_vector(vector: &GoldenVector) -> String {
    let identity = identity_from_vector(vector);
    let secret = SharedSecret::for_self(&identity).expect("own public key is valid");
    Envelope::seal_with_iv(vector.plaintext.as_bytes(), Iv::from_bytes(VECTOR_IV), &secret).encode()
}

/// Build the signed, self-addressed kind-4 event a vector describes.
pub fn event_from_vector(vector: &GoldenVector) -> tally_core::Event {
    let identity = identity_from_vector(vector);
    EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, envelope_from_vector(vector))
        .tag(Tag::pubkey(&identity.public_key()))
        .created_at(VECTOR_CREATED_AT)
        .sign(&identity)
        .expect("golden vector event signs")
}

/// Check every vector against this implementation.
///
/// Returns `(name, matches, details)` per vector; `details` names the first
/// mismatching field.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results: Vec<(String, bool, String)> = all_vectors()
        .iter()
        .map(|v| {
            let identity = identity_from_vector(v);
            let shared = SharedSecret::for_self(&identity).expect("own public key is valid");
            let checks = [
                ("pubkey", identity.public_key().to_hex(), v.expected_pubkey),
                ("shared", hex::encode(shared.as_bytes()), v.expected_shared),
                ("envelope", envelope_from_vector(v), v.expected_envelope),
                ("event_id", event_from_vector(v).id.to_hex(), v.expected_event_id),
            ];
            report(v.name, &checks)
        })
        .collect();

    results.extend(canonical_vectors().iter().map(|v| {
        let pubkey = PublicKey(v.pubkey);
        let id = compute_event_id(&pubkey, v.created_at, v.kind, &[], v.content)
            .expect("canonical vector encodes");
        let bytes = canonical_event_bytes(&pubkey, v.created_at, v.kind, &[], v.content)
            .expect("canonical vector encodes");
        let json = String::from_utf8_lossy(&bytes).into_owned();
        report(
            v.name,
            &[("json", json, v.expected_json), ("event_id", id.to_hex(), v.expected_event_id)],
        )
    }));

    results
}

fn report(name: &str, checks: &[(&str, String, &str)]) -> (String, bool, String) {
    match checks.iter().find(|(_, got, want)| got != want) {
        Some((field, got, want)) => (name.to_string(), false, format!("{field}: got {got}, want {want}")),
        None => (name.to_string(), true, String::new()),
    }
}
