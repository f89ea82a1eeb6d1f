//! Application configuration management.
//!
//! This module handles loading and saving the admin tool configuration:
//! which backend the session is persisted to, the slot keys it owns, the
//! API base URL and the last used username.
//!
//! Configuration is stored at `~/.config/minigame/config.json`. A handful
//! of `MINIGAME_*` environment variables override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{SessionStore, StorageKeys, DEFAULT_SNAPSHOT_KEY, DEFAULT_TOKEN_KEY};
use crate::storage::{DurableSlot, EncryptedSlot, FileSlot, KeyringSlot, MemorySlot, NoopSlot};

/// Application name used for config/data directory paths
const APP_NAME: &str = "minigame";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend the Express API listens on in development
const DEFAULT_API_BASE_URL: &str = "http://localhost:4000";

pub const ENV_API_URL: &str = "MINIGAME_API_URL";
pub const ENV_STORAGE: &str = "MINIGAME_STORAGE";
pub const ENV_DATA_DIR: &str = "MINIGAME_DATA_DIR";
pub const ENV_PASSPHRASE: &str = "MINIGAME_SESSION_PASSPHRASE";

/// Where the session is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
    None,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" | "keychain" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            "none" | "off" => Ok(Self::None),
            other => bail!("Unknown storage backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub data_dir: Option<PathBuf>,
    pub snapshot_key: Option<String>,
    pub token_key: Option<String>,
    pub max_session_age_minutes: Option<i64>,
    pub persist_profile_updates: bool,
    pub encrypt_at_rest: bool,
    pub last_username: Option<String>,
    /// Only ever comes from the environment, never written to disk
    #[serde(skip)]
    pub passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            data_dir: None,
            snapshot_key: None,
            token_key: None,
            max_session_age_minutes: None,
            persist_profile_updates: true,
            encrypt_at_rest: false,
            last_username: None,
            passphrase: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(storage) = get(ENV_STORAGE) {
            self.storage = storage
                .parse()
                .with_context(|| format!("Invalid {}", ENV_STORAGE))?;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(passphrase) = get(ENV_PASSPHRASE) {
            self.passphrase = Some(passphrase);
        }
        Ok(())
    }

    /// Directory the file backend writes into
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys {
            snapshot: self
                .snapshot_key
                .clone()
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_KEY.to_string()),
            token: self
                .token_key
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_KEY.to_string()),
        }
    }

    pub fn max_session_age(&self) -> Option<Duration> {
        self.max_session_age_minutes
            .filter(|minutes| *minutes > 0)
            .map(Duration::minutes)
    }

    /// Build the durable slot this configuration asks for
    pub fn open_slot(&self) -> Result<Arc<dyn DurableSlot>> {
        let passphrase = if self.encrypt_at_rest && self.storage != StorageBackend::None {
            match self.passphrase {
                Some(ref p) => Some(p.clone()),
                None => bail!("encrypt_at_rest is set but {} is empty", ENV_PASSPHRASE),
            }
        } else {
            None
        };

        let slot: Arc<dyn DurableSlot> = match (self.storage, passphrase) {
            (StorageBackend::File, None) => Arc::new(FileSlot::new(self.data_dir()?)),
            (StorageBackend::File, Some(p)) => {
                Arc::new(EncryptedSlot::new(FileSlot::new(self.data_dir()?), p))
            }
            (StorageBackend::Keyring, None) => Arc::new(KeyringSlot::default()),
            (StorageBackend::Keyring, Some(p)) => {
                Arc::new(EncryptedSlot::new(KeyringSlot::default(), p))
            }
            (StorageBackend::Memory, None) => Arc::new(MemorySlot::new()),
            (StorageBackend::Memory, Some(p)) => Arc::new(EncryptedSlot::new(MemorySlot::new(), p)),
            (StorageBackend::None, _) => Arc::new(NoopSlot),
        };
        debug!(backend = slot.name(), "Durable slot opened");
        Ok(slot)
    }

    /// Build a session store over the configured slot, rehydrating it
    pub fn open_session_store(&self) -> Result<SessionStore> {
        let mut builder = SessionStore::builder(self.open_slot()?)
            .keys(self.storage_keys())
            .persist_updates(self.persist_profile_updates);
        if let Some(max_age) = self.max_session_age() {
            builder = builder.max_age(max_age);
        }
        Ok(builder.build())
    }
}
