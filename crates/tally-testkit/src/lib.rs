//! # Tally Testkit
//!
//! Testing utilities for Tally.
//!
//! ## Overview
//!
//! - **Golden vectors**: keys, shared secrets, envelopes and event ids with
//!   known answers, for interoperability with other clients
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: installations sharing a key, and signed state events
//!
//! ## Golden Vectors
//!
//! ```rust
//! use tally_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, details) in verify_all_vectors() {
//!     assert!(ok, "{name}: {details}");
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use tally_testkit::fixtures::shared_key_fixtures;
//!
//! let devices = shared_key_fixtures(2);
//! let event = devices[0].make_state_event(120, devices[0].client_id, 1_700_000_000);
//! assert!(event.verify().is_ok());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{shared_key_fixtures, test_config, TestFixture};
pub use generators::StateParams;
pub use vectors::{all_vectors, canonical_vectors, verify_all_vectors, GoldenVector};
