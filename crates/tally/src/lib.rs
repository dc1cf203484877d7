//! # Tally
//!
//! Private cross-device counter sync over a public relay.
//!
//! ## Overview
//!
//! A work timer running on several machines shares one secp256k1 key.
//! Each installation publishes its elapsed seconds as a kind-4 event encrypted to
//! itself and subscribes to the newest such event. Whichever device the
//! user touched last wins, and the others briefly lock their editors so two
//! devices cannot ping-pong values.
//!
//! - **Identity**: one Schnorr key per user, shared by copying the secret.
//! - **Envelope**: AES-256-CBC under ECDH(self, self), `base64?iv=base64`.
//! - **Coordinator**: decides which inbound updates apply.
//! - **Engine**: a single task that owns the relay connection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use tally::{Engine, NoopObserver, Settings, WsConnector};
//!
//! async fn example() -> tally::Result<()> {
//!     let settings = Settings::load_or_init(Path::new("tally.json"))?;
//!
//!     let (handle, task) = Engine::spawn(
//!         settings.identity()?,
//!         settings.client_id()?,
//!         settings.sync_config(),
//!         Arc::new(WsConnector),
//!         Arc::new(NoopObserver),
//!     )?;
//!
//!     // Two minutes into the workday, paused.
//!     handle.counter_changed(120, false)?;
//!
//!     handle.shutdown()?;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tally::core` - keys, events, canonical hashing
//! - `tally::cipher` - the self-addressed envelope
//! - `tally::sync` - wire codec, relay connection, coordinator

pub mod config;
pub mod engine;
pub mod error;

// Re-export component crates
pub use tally_cipher as cipher;
pub use tally_core as core;
pub use tally_sync as sync;

pub use config::Settings;
pub use engine::{Engine, EngineHandle};
pub use error::{Result, TallyError};

// Re-export commonly used types
pub use tally_core::{Event, EventId, Identity, Kind, PublicKey};
pub use tally_sync::{
    ClientId, ConnectionHealth, ConnectionState, Connector, MemoryRelay, NoopObserver,
    SyncConfig, SyncObserver, WsConnector,
};
