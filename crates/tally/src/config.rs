//! Persisted settings: relay address, private key and client id.
//!
//! Stored as a small JSON file. Empty key fields are filled in with freshly
//! generated values by [`Settings::load_or_init`] and written back, so an
//! installation keeps its identity across restarts.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::Identity;
use tally_sync::{ClientId, SyncConfig};

use crate::error::{Result, TallyError};

/// The on-disk settings record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `ws://` or `wss://` relay. Empty or invalid means the default relay.
    pub relay_url: String,
    /// Hex secret key. Empty means "generate one".
    pub private_key: String,
    /// Hex origin tag. Empty means "generate one".
    pub client_id: String,
}

impl Settings {
    /// Read settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| TallyError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| TallyError::SettingsFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_error = |source: std::io::Error| TallyError::SettingsIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| TallyError::SettingsFormat {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_error)
    }

    /// Load settings (or start from defaults if the file does not exist),
    /// generate any missing key material, and persist the result.
    ///
    /// Fails if the entropy source is unavailable, or if a stored key is
    /// present but malformed. A malformed key is never silently replaced.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };

        let mut changed = false;
        if settings.private_key.trim().is_empty() {
            settings.private_key = Identity::generate()?.secret_hex();
            info!(path = %path.display(), "generated new sync identity");
            changed = true;
        }
        if settings.client_id.trim().is_empty() {
            settings.client_id = ClientId::generate()?.to_hex();
            changed = true;
        }

        // Validate before persisting anything.
        settings.identity()?;
        settings.client_id()?;

        if changed || !path.exists() {
            settings.save(path)?;
        }
        Ok(settings)
    }

    /// The sync identity.
    pub fn identity(&self) -> Result<Identity> {
        Ok(Identity::from_secret_hex(&self.private_key)?)
    }

    pub fn client_id(&self) -> Result<ClientId> {
        Ok(ClientId::from_hex(&self.client_id)?)
    }

    /// Engine configuration for these settings.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::with_relay(&self.relay_url)
    }
}
