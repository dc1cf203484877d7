//! The anti-oscillation edit lock.
//!
//! After a foreign update is applied, local edits stay disabled for a short
//! window. Re-arming replaces the deadline; it never stacks timers.

use std::time::Duration;

use tokio::time::Instant;

/// A single cancel-and-replace deadline.
#[derive(Debug, Clone)]
pub struct EditLock {
    window: Duration,
    deadline: Option<Instant>,
}

impl EditLock {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Lock until `now + window`, replacing any earlier deadline.
    pub fn arm(&mut self, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.deadline = Some(deadline);
        deadline
    }

    /// Release the lock if its deadline has passed. Returns true on release.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// Pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3);

    #[test]
    fn test_unarmed_lock_is_open() {
        let lock = EditLock::new(WINDOW);
        assert!(!lock.is_locked(Instant::now()));
        assert!(lock.deadline().is_none());
    }

    #[test]
    fn test_arm_and_expire() {
        let start = Instant::now();
        let mut lock = EditLock::new(WINDOW);
        assert_eq!(lock.arm(start), start + WINDOW);

        assert!(lock.is_locked(start + Duration::from_secs(2)));
        assert!(!lock.expire(start + Duration::from_secs(2)));
        assert!(lock.expire(start + WINDOW));
        assert!(!lock.is_locked(start + WINDOW));
        assert!(!lock.expire(start + WINDOW), "expires only once");
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let start = Instant::now();
        let mut lock = EditLock::new(WINDOW);
        lock.arm(start);
        lock.arm(start + Duration::from_secs(2));

        // The first window would have ended here.
        assert!(!lock.expire(start + WINDOW));
        assert!(lock.is_locked(start + Duration::from_secs(4)));
        assert_eq!(lock.deadline(), Some(start + Duration::from_secs(5)));
    }
}
