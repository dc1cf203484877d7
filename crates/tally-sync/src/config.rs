//! Sync engine configuration.

use std::time::Duration;

use tracing::warn;
use url::Url;

/// Relay used when none (or an invalid one) is configured.
pub const DEFAULT_RELAY_URL: &str = "wss://nostr-pub.wellorder.net";

/// The 400-minute workday, in seconds.
pub const DEFAULT_MAX_COUNTER: u64 = 400 * 60;

/// Configuration for a sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Relay endpoint.
    pub relay_url: Url,
    /// How long local edits stay disabled after a foreign update.
    pub lock_window: Duration,
    /// Inbound counters above this are rejected.
    pub max_counter: Option<u64>,
    /// Publish the current state after rotating keys, seeding the new mailbox.
    pub seed_on_rotate: bool,
    /// Upper bound on opening a connection or sending one frame.
    pub connect_timeout: Duration,
    /// Delay before reconnecting after the relay drops us.
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            lock_window: Duration::from_secs(3),
            max_counter: Some(DEFAULT_MAX_COUNTER),
            seed_on_rotate: true,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    /// Default configuration with the given relay address (validated, see [`relay_url_or_default`]).
    pub fn with_relay(relay: &str) -> Self {
        Self {
            relay_url: relay_url_or_default(relay),
            ..Self::default()
        }
    }
}

fn default_relay_url() -> Url {
    Url::parse(DEFAULT_RELAY_URL).expect("DEFAULT_RELAY_URL is a valid URL")
}

/// Check that `candidate` looks like a relay address: `ws` or `wss` with a host.
pub fn validate_relay_url(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate.trim()).ok()?;
    let scheme_ok = matches!(url.scheme(), "ws" | "wss");
    let host_ok = url.host_str().is_some_and(|h| !h.is_empty());
    (scheme_ok && host_ok).then_some(url)
}

/// Validate a configured relay address, falling back to [`DEFAULT_RELAY_URL`].
pub fn relay_url_or_default(candidate: &str) -> Url {
    if candidate.trim().is_empty() {
        return default_relay_url();
    }
    validate_relay_url(candidate).unwrap_or_else(|| {
        warn!(configured = candidate, fallback = DEFAULT_RELAY_URL, "invalid relay url");
        default_relay_url()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.relay_url.as_str(), "wss://nostr-pub.wellorder.net/");
        assert_eq!(config.lock_window, Duration::from_secs(3));
        assert_eq!(config.max_counter, Some(24_000));
        assert!(config.seed_on_rotate);
    }

    #[test]
    fn test_accepts_ws_and_wss() {
        assert!(validate_relay_url("ws://localhost:8080").is_some());
        assert!(validate_relay_url("wss://relay.example.com/path").is_some());
        assert!(validate_relay_url("  wss://relay.example.com ").is_some());
    }

    #[test]
    fn test_rejects_other_shapes() {
        for bad in ["https://relay.example.com", "relay.example.com", "ws://", "", "ftp://relay.example.com"] {
            assert!(validate_relay_url(bad).is_none(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_invalid_falls_back_to_default() {
        assert_eq!(relay_url_or_default("http://nope").as_str(), "wss://nostr-pub.wellorder.net/");
        assert_eq!(relay_url_or_default("").as_str(), "wss://nostr-pub.wellorder.net/");
        assert_eq!(
            SyncConfig::with_relay("ws://localhost:8080").relay_url.as_str(),
            "ws://localhost:8080/"
        );
    }
}
