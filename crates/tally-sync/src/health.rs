//! Connection health: OS reachability combined with the last I/O outcome.

/// Coarse health shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    Success,
    Error,
}

/// Observable connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last connect, send or receive failed.
    Degraded(String),
}

/// Folds reachability and send/receive outcomes into a [`ConnectionHealth`],
/// reporting only transitions.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    reachable: bool,
    last_ok: bool,
    reported: ConnectionHealth,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self {
            reachable: true,
            last_ok: false,
            reported: ConnectionHealth::Error,
        }
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current health.
    pub fn current(&self) -> ConnectionHealth {
        if self.reachable && self.last_ok {
            ConnectionHealth::Success
        } else {
            ConnectionHealth::Error
        }
    }

    /// Feed the OS network-reachability signal.
    pub fn set_reachable(&mut self, reachable: bool) -> Option<ConnectionHealth> {
        self.reachable = reachable;
        self.transition()
    }

    /// A connect, send or receive succeeded.
    pub fn record_success(&mut self) -> Option<ConnectionHealth> {
        self.last_ok = true;
        self.transition()
    }

    /// A connect, send or receive failed.
    pub fn record_failure(&mut self) -> Option<ConnectionHealth> {
        self.last_ok = false;
        self.transition()
    }

    fn transition(&mut self) -> Option<ConnectionHealth> {
        let now = self.current();
        (now != self.reported).then(|| {
            self.reported = now;
            now
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_error_until_first_success() {
        let mut health = HealthTracker::new();
        assert_eq!(health.current(), ConnectionHealth::Error);
        assert_eq!(health.record_success(), Some(ConnectionHealth::Success));
    }

    #[test]
    fn test_reports_transitions_only() {
        let mut health = HealthTracker::new();
        health.record_success();
        assert_eq!(health.record_success(), None);
        assert_eq!(health.record_failure(), Some(ConnectionHealth::Error));
        assert_eq!(health.record_failure(), None);
    }

    #[test]
    fn test_unreachable_overrides_success() {
        let mut health = HealthTracker::new();
        health.record_success();
        assert_eq!(health.set_reachable(false), Some(ConnectionHealth::Error));
        assert_eq!(health.record_success(), None);
        assert_eq!(health.set_reachable(true), Some(ConnectionHealth::Success));
    }
}
