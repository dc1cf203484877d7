//! # Tally Sync
//!
//! Keeps one counter in step across installations that share a key, using
//! a public relay as a private mailbox.
//!
//! ## Overview
//!
//! Every installation publishes its state as an encrypted event addressed to
//! its own public key and subscribes to the latest such event. The relay sees
//! only ciphertext and signatures.
//!
//! ```text
//! Device A                          Relay                          Device B
//!   |-- ["REQ", sub, mailbox] ------->|<------- ["REQ", sub, mailbox] --|
//!   |-- ["EVENT", {kind 4, enc}] ---->|                                 |
//!   |                                 |-- ["EVENT", sub, {kind 4}] ---->|
//!   |                                 |                  decrypt, decide, lock
//! ```
//!
//! ## Layers
//!
//! - [`messages`]: relay wire frames.
//! - [`payload`]: the `"<counter> <clientId>"` record inside each envelope.
//! - [`transport`]: the connector seam, with WebSocket and in-memory relays.
//! - [`connection`]: one replaceable relay connection that resubscribes on every reconnect.
//! - [`coordinator`]: accept/reject rules and the anti-oscillation lock.

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod lock;
pub mod messages;
pub mod observer;
pub mod payload;
pub mod transport;

pub use config::{
    relay_url_or_default, validate_relay_url, SyncConfig, DEFAULT_MAX_COUNTER, DEFAULT_RELAY_URL,
};
pub use connection::{Inbound, InboundKind, RelayConnection};
pub use coordinator::{Coordinator, Decision, Rejection};
pub use error::{Result, SyncError};
pub use health::{ConnectionHealth, ConnectionState, HealthTracker};
pub use lock::EditLock;
pub use messages::{ClientMessage, Filter, RelayMessage, SubscriptionId};
pub use observer::{NoopObserver, SyncObserver};
pub use payload::{ClientId, PayloadError, StatePayload};
pub use transport::{
    memory::MemoryRelay, websocket::WsConnector, Connector, FrameSink, FrameStream,
};
