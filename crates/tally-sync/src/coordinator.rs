//! Conflict resolution between the local counter and updates from the relay.
//!
//! The coordinator is a synchronous decision machine. It never touches the
//! network or the clock; callers pass `now` in and carry out the returned
//! decisions. That keeps every rule testable without a relay.
//!
//! Inbound rules, in order:
//!
//! 1. Only events authored by this identity, of the encrypted-message kind,
//!    with a valid id and signature are considered.
//! 2. The event last applied is never applied twice.
//! 3. The payload must decrypt, parse and stay under the counter ceiling.
//!    An update older than the last one applied from the same installation is
//!    stale. Timestamps from different installations are never compared.
//! 4. A running local timer wins over anything remote.
//! 5. Our own update is not re-applied unless it moves the counter forward.
//! 6. Everything else is applied. An update from another installation also
//!    arms the edit lock.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use tally_cipher::{Envelope, SharedSecret};
use tally_core::{Event, EventBuilder, EventId, Identity, Kind, PublicKey, Tag};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::lock::EditLock;
use crate::messages::Filter;
use crate::payload::{ClientId, StatePayload};

/// Why an inbound event did not change the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Authored by another identity.
    ForeignAuthor,
    UnexpectedKind(Kind),
    /// Id or signature check failed.
    Invalid(String),
    /// Already applied.
    Duplicate,
    /// Older than the last event applied from the same installation.
    Stale { created_at: u64, last_applied: u64 },
    Undecryptable(String),
    Malformed(String),
    AboveCeiling { value: u64, max: u64 },
    TimerRunning,
    /// Our own update, not ahead of the local counter.
    SelfEcho { local: u64, inbound: u64 },
}

/// Outcome of [`Coordinator::inbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Applied {
        value: u64,
        /// Set when the update came from another installation; the edit lock
        /// is held until this instant.
        locked_until: Option<Instant>,
    },
    Rejected(Rejection),
}

/// Owns the counter, the origin tag and the edit lock of one installation.
pub struct Coordinator {
    identity: Identity,
    secret: SharedSecret,
    client_id: ClientId,
    counter: u64,
    running: bool,
    lock: EditLock,
    max_counter: Option<u64>,
    seed_on_rotate: bool,
    last_applied: Option<LastApplied>,
}

/// The event that last changed the counter.
#[derive(Debug, Clone, Copy)]
struct LastApplied {
    id: EventId,
    created_at: u64,
    origin: ClientId,
}

impl Coordinator {
    pub fn new(identity: Identity, client_id: ClientId, config: &SyncConfig) -> Result<Self> {
        let secret = SharedSecret::for_self(&identity)?;
        Ok(Self {
            identity,
            secret,
            client_id,
            counter: 0,
            running: false,
            lock: EditLock::new(config.lock_window),
            max_counter: config.max_counter,
            seed_on_rotate: config.seed_on_rotate,
            last_applied: None,
        })
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// The subscription filter for this identity's mailbox.
    pub fn mailbox(&self) -> Filter {
        Filter::mailbox(&self.public_key())
    }

    pub fn lock_deadline(&self) -> Option<Instant> {
        self.lock.deadline()
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.lock.is_locked(now)
    }

    /// Release the edit lock if its window has elapsed.
    pub fn expire_lock(&mut self, now: Instant) -> bool {
        self.lock.expire(now)
    }

    /// The external timer reported a new value or running state.
    ///
    /// Returns the event to publish, if any. Only a running timer broadcasts.
    /// While the edit lock is held the running flag is still tracked, but the
    /// value is neither stored nor broadcast.
    pub fn local_changed(&mut self, value: u64, running: bool, now: Instant) -> Result<Option<Event>> {
        self.running = running;
        if self.lock.is_locked(now) {
            debug!(value, running, "local value ignored while edits are locked");
            return Ok(None);
        }

        self.counter = value;
        if !running {
            return Ok(None);
        }
        self.state_event().map(Some)
    }

    /// Decide what to do with an event delivered on the mailbox subscription.
    pub fn inbound(&mut self, event: &Event, now: Instant) -> Decision {
        match self.evaluate(event) {
            Ok(payload) => {
                self.counter = payload.counter;
                self.last_applied = Some(LastApplied {
                    id: event.id,
                    created_at: event.created_at,
                    origin: payload.origin,
                });

                let locked_until = (payload.origin != self.client_id).then(|| self.lock.arm(now));
                info!(
                    value = payload.counter,
                    event_id = %event.id,
                    foreign = locked_until.is_some(),
                    "applied remote state"
                );
                Decision::Applied {
                    value: payload.counter,
                    locked_until,
                }
            }
            Err(rejection) => {
                debug!(event_id = %event.id, ?rejection, "inbound state rejected");
                Decision::Rejected(rejection)
            }
        }
    }

    /// Switch to a new identity.
    ///
    /// The caller must re-issue the mailbox subscription. Returns a state
    /// event to seed the new mailbox when seeding is enabled. An error means
    /// the old identity is still in use; a seed that fails to build is logged
    /// and skipped.
    pub fn rotate(&mut self, identity: Identity) -> Result<Option<Event>> {
        self.secret = SharedSecret::for_self(&identity)?;
        self.identity = identity;
        self.last_applied = None;
        info!(pubkey = %self.identity.public_key(), "identity rotated");

        if !self.seed_on_rotate {
            return Ok(None);
        }
        match self.state_event() {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                warn!(error = %e, "could not build the seed event");
                Ok(None)
            }
        }
    }

    fn evaluate(&self, event: &Event) -> std::result::Result<StatePayload, Rejection> {
        if event.pubkey != self.identity.public_key() {
            return Err(Rejection::ForeignAuthor);
        }
        if event.kind != Kind::ENCRYPTED_DIRECT_MESSAGE {
            return Err(Rejection::UnexpectedKind(event.kind));
        }
        event.verify().map_err(|e| Rejection::Invalid(e.to_string()))?;

        if self.last_applied.is_some_and(|last| last.id == event.id) {
            return Err(Rejection::Duplicate);
        }

        let plaintext = Envelope::decode(&event.content)
            .and_then(|envelope| envelope.open(&self.secret))
            .map_err(|e| Rejection::Undecryptable(e.to_string()))?;
        let payload =
            StatePayload::parse(&plaintext).map_err(|e| Rejection::Malformed(e.to_string()))?;

        if let Some(last) = self.last_applied {
            if last.origin == payload.origin && event.created_at < last.created_at {
                return Err(Rejection::Stale {
                    created_at: event.created_at,
                    last_applied: last.created_at,
                });
            }
        }

        if let Some(max) = self.max_counter {
            if payload.counter > max {
                return Err(Rejection::AboveCeiling {
                    value: payload.counter,
                    max,
                });
            }
        }
        if self.running {
            return Err(Rejection::TimerRunning);
        }
        if payload.origin == self.client_id && self.counter >= payload.counter {
            return Err(Rejection::SelfEcho {
                local: self.counter,
                inbound: payload.counter,
            });
        }
        Ok(payload)
    }

    fn state_event(&self) -> Result<Event> {
        let payload = StatePayload::new(self.counter, self.client_id).encode();
        let content = Envelope::seal(payload.as_bytes(), &self.secret).encode();
        let event = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, content)
            .tag(Tag::pubkey(&self.identity.public_key()))
            .sign(&self.identity)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(3);

    fn identity() -> Identity {
        Identity::from_secret_bytes(&[0x42; 32]).unwrap()
    }

    fn me() -> ClientId {
        ClientId::from_bytes([0xaa; 32])
    }

    fn other() -> ClientId {
        ClientId::from_bytes([0xbb; 32])
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(identity(), me(), &SyncConfig::default()).unwrap()
    }

    /// A state event as another installation sharing the key would publish it.
    fn state_event(value: u64, origin: ClientId, created_at: u64) -> Event {
        let identity = identity();
        let secret = SharedSecret::for_self(&identity).unwrap();
        let content = Envelope::seal(StatePayload::new(value, origin).encode().as_bytes(), &secret);
        EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, content.encode())
            .tag(Tag::pubkey(&identity.public_key()))
            .created_at(created_at)
            .sign(&identity)
            .unwrap()
    }

    #[test]
    fn test_foreign_update_applies_and_locks() {
        let now = Instant::now();
        let mut c = coordinator();
        c.local_changed(60, false, now).unwrap();

        let decision = c.inbound(&state_event(120, other(), 1000), now);
        assert_eq!(
            decision,
            Decision::Applied {
                value: 120,
                locked_until: Some(now + WINDOW)
            }
        );
        assert_eq!(c.counter(), 120);
        assert!(c.is_locked(now + Duration::from_secs(2)));
    }

    #[test]
    fn test_stale_self_echo_rejected() {
        let now = Instant::now();
        let mut c = coordinator();
        c.local_changed(200, false, now).unwrap();

        let decision = c.inbound(&state_event(50, me(), 1000), now);
        assert_eq!(
            decision,
            Decision::Rejected(Rejection::SelfEcho {
                local: 200,
                inbound: 50
            })
        );
        assert_eq!(c.counter(), 200);
    }

    #[test]
    fn test_own_update_ahead_of_local_applies_without_lock() {
        let now = Instant::now();
        let mut c = coordinator();
        c.local_changed(10, false, now).unwrap();

        let decision = c.inbound(&state_event(90, me(), 1000), now);
        assert_eq!(
            decision,
            Decision::Applied {
                value: 90,
                locked_until: None
            }
        );
        assert!(!c.is_locked(now));
    }

    #[test]
    fn test_running_timer_rejects_everything() {
        let now = Instant::now();
        let mut c = coordinator();
        c.local_changed(5, true, now).unwrap();

        for (value, origin) in [(1, me()), (500, me()), (1, other()), (500, other())] {
            assert_eq!(
                c.inbound(&state_event(value, origin, 1000), now),
                Decision::Rejected(Rejection::TimerRunning)
            );
        }
        assert_eq!(c.counter(), 5);
    }

    #[test]
    fn test_rapid_foreign_updates_reset_lock() {
        let start = Instant::now();
        let mut c = coordinator();

        c.inbound(&state_event(10, other(), 1000), start);
        let later = start + Duration::from_secs(2);
        c.inbound(&state_event(20, other(), 1001), later);

        assert_eq!(c.lock_deadline(), Some(later + WINDOW));
        assert!(!c.expire_lock(start + WINDOW));
        assert!(c.expire_lock(later + WINDOW));
    }

    #[test]
    fn test_locked_local_change_is_not_broadcast() {
        let now = Instant::now();
        let mut c = coordinator();
        c.inbound(&state_event(120, other(), 1000), now);

        let published = c.local_changed(121, true, now + Duration::from_secs(1)).unwrap();
        assert!(published.is_none());
        assert_eq!(c.counter(), 120);
        assert!(c.is_running());

        let published = c.local_changed(121, true, now + WINDOW).unwrap();
        assert!(published.is_some());
    }

    #[test]
    fn test_timer_started_while_locked_rejects_remote_updates() {
        let start = Instant::now();
        let mut c = coordinator();
        c.inbound(&state_event(120, other(), 1000), start);
        c.local_changed(121, true, start + Duration::from_secs(1)).unwrap();

        assert_eq!(
            c.inbound(&state_event(50, other(), 1001), start + Duration::from_secs(2)),
            Decision::Rejected(Rejection::TimerRunning)
        );
        assert_eq!(c.counter(), 120);
    }

    #[test]
    fn test_only_running_timer_broadcasts() {
        let now = Instant::now();
        let mut c = coordinator();
        assert!(c.local_changed(30, false, now).unwrap().is_none());

        let event = c.local_changed(31, true, now).unwrap().unwrap();
        assert_eq!(event.kind, Kind::ENCRYPTED_DIRECT_MESSAGE);
        assert_eq!(event.pubkey, identity().public_key());
        assert_eq!(
            event.recipients().collect::<Vec<_>>(),
            vec![identity().public_key().to_hex().as_str()]
        );
        event.verify().unwrap();

        let secret = SharedSecret::for_self(&identity()).unwrap();
        let plaintext = Envelope::decode(&event.content).unwrap().open(&secret).unwrap();
        assert_eq!(plaintext, StatePayload::new(31, me()).encode());
    }

    #[test]
    fn test_duplicate_delivery_is_ignored() {
        let now = Instant::now();
        let mut c = coordinator();
        let event = state_event(120, other(), 1000);

        assert!(matches!(c.inbound(&event, now), Decision::Applied { .. }));
        let later = now + Duration::from_secs(1);
        assert_eq!(
            c.inbound(&event, later),
            Decision::Rejected(Rejection::Duplicate)
        );
        // The lock was not re-armed by the duplicate.
        assert_eq!(c.lock_deadline(), Some(now + WINDOW));
    }

    #[test]
    fn test_older_event_is_stale() {
        let now = Instant::now();
        let mut c = coordinator();
        c.inbound(&state_event(120, other(), 1000), now);

        assert_eq!(
            c.inbound(&state_event(300, other(), 999), now),
            Decision::Rejected(Rejection::Stale {
                created_at: 999,
                last_applied: 1000
            })
        );
    }

    #[test]
    fn test_clock_skew_between_installations_is_not_stale() {
        let now = Instant::now();
        let mut c = coordinator();
        let fast_clock = ClientId::from_bytes([0xcc; 32]);
        c.inbound(&state_event(100, fast_clock, 10_600), now);

        // Published later in real time by an installation whose clock is behind.
        assert!(matches!(
            c.inbound(&state_event(140, other(), 10_010), now + Duration::from_secs(10)),
            Decision::Applied { value: 140, .. }
        ));
        assert_eq!(c.counter(), 140);
    }

    #[test]
    fn test_newer_smaller_foreign_value_is_accepted() {
        let now = Instant::now();
        let mut c = coordinator();
        c.inbound(&state_event(120, other(), 1000), now);

        // A reset on another device is a legitimate rewind.
        assert!(matches!(
            c.inbound(&state_event(0, other(), 1001), now),
            Decision::Applied { value: 0, .. }
        ));
    }

    #[test]
    fn test_ceiling_rejects_oversized_values() {
        let now = Instant::now();
        let mut c = coordinator();
        assert_eq!(
            c.inbound(&state_event(24_001, other(), 1000), now),
            Decision::Rejected(Rejection::AboveCeiling {
                value: 24_001,
                max: 24_000
            })
        );
        assert!(matches!(
            c.inbound(&state_event(24_000, other(), 1000), now),
            Decision::Applied { .. }
        ));
    }

    #[test]
    fn test_foreign_author_and_kind_filtered() {
        let now = Instant::now();
        let mut c = coordinator();

        let stranger = Identity::from_secret_bytes(&[0x24; 32]).unwrap();
        let theirs = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, "x")
            .sign(&stranger)
            .unwrap();
        assert_eq!(c.inbound(&theirs, now), Decision::Rejected(Rejection::ForeignAuthor));

        let note = EventBuilder::new(Kind::TEXT_NOTE, "hi").sign(&identity()).unwrap();
        assert_eq!(
            c.inbound(&note, now),
            Decision::Rejected(Rejection::UnexpectedKind(Kind::TEXT_NOTE))
        );
    }

    #[test]
    fn test_tampered_and_undecryptable_rejected() {
        let now = Instant::now();
        let mut c = coordinator();

        let mut tampered = state_event(120, other(), 1000);
        tampered.created_at += 1;
        assert!(matches!(
            c.inbound(&tampered, now),
            Decision::Rejected(Rejection::Invalid(_))
        ));

        let garbage = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, "no envelope here")
            .sign(&identity())
            .unwrap();
        assert!(matches!(
            c.inbound(&garbage, now),
            Decision::Rejected(Rejection::Undecryptable(_))
        ));
        assert_eq!(c.counter(), 0);
    }

    #[test]
    fn test_malformed_plaintext_rejected() {
        let now = Instant::now();
        let mut c = coordinator();
        let secret = SharedSecret::for_self(&identity()).unwrap();
        let content = Envelope::seal(b"one two three", &secret).encode();
        let event = EventBuilder::new(Kind::ENCRYPTED_DIRECT_MESSAGE, content)
            .sign(&identity())
            .unwrap();
        assert!(matches!(
            c.inbound(&event, now),
            Decision::Rejected(Rejection::Malformed(_))
        ));
    }

    #[test]
    fn test_rotate_switches_mailbox_and_seeds() {
        let now = Instant::now();
        let mut c = coordinator();
        c.local_changed(77, false, now).unwrap();

        let fresh = Identity::generate().unwrap();
        let fresh_pk = fresh.public_key();
        let seed = c.rotate(fresh).unwrap().unwrap();

        assert_eq!(c.public_key(), fresh_pk);
        assert_eq!(c.mailbox(), Filter::mailbox(&fresh_pk));
        assert_eq!(seed.pubkey, fresh_pk);

        // Events under the old key no longer count.
        assert_eq!(
            c.inbound(&state_event(5, other(), 1000), now),
            Decision::Rejected(Rejection::ForeignAuthor)
        );
    }

    #[test]
    fn test_rotate_without_seeding() {
        let config = SyncConfig {
            seed_on_rotate: false,
            ..SyncConfig::default()
        };
        let mut c = Coordinator::new(identity(), me(), &config).unwrap();
        assert!(c.rotate(Identity::generate().unwrap()).unwrap().is_none());
    }
}
