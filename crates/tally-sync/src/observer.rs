//! Callbacks into the embedding application.

use std::time::Duration;

use crate::health::ConnectionHealth;

/// Receives everything the sync engine reports outward.
///
/// Called from the engine task, one call at a time. Implementations should
/// hand work off rather than block.
pub trait SyncObserver: Send + Sync {
    /// A remote counter value was accepted and is now the local value.
    fn on_state_applied(&self, value: u64);

    fn on_connection_health_changed(&self, health: ConnectionHealth);

    /// Disable local counter editing for `duration`. A later call replaces the window.
    fn on_ui_should_lock(&self, duration: Duration);

    /// The edit lock elapsed.
    fn on_ui_unlocked(&self) {}

    /// A new identity was generated. The secret must be persisted by the caller.
    fn on_identity_changed(&self, _secret_hex: &str) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn on_state_applied(&self, _value: u64) {}
    fn on_connection_health_changed(&self, _health: ConnectionHealth) {}
    fn on_ui_should_lock(&self, _duration: Duration) {}
}
