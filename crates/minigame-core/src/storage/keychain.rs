use keyring::Entry;

use super::{DurableSlot, StorageError};

/// Default keychain service name for session entries
pub const DEFAULT_SERVICE: &str = "minigame-admin";

/// Slot backed by the OS keychain. Each key becomes one credential entry
/// under the configured service name.
#[derive(Debug, Clone)]
pub struct KeyringSlot {
    service: String,
}

impl KeyringSlot {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key).map_err(|e| match e {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                StorageError::Unavailable(e.to_string())
            }
            other => StorageError::Keychain(other),
        })
    }
}

impl Default for KeyringSlot {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl DurableSlot for KeyringSlot {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => {
                Err(StorageError::Corrupt(format!("keychain entry {} is not UTF-8", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service() {
        assert_eq!(KeyringSlot::default().service(), DEFAULT_SERVICE);
        assert_eq!(KeyringSlot::new("other").service(), "other");
        assert_eq!(KeyringSlot::default().name(), "keyring");
    }

    // Needs a real OS keychain (Keychain, Credential Manager or kernel keyutils)
    #[test]
    #[ignore]
    fn test_value_visible_through_second_slot() {
        let service = format!("minigame-test-{}", std::process::id());
        let writer = KeyringSlot::new(service.clone());
        writer.set("session", "persisted-value").unwrap();

        let reader = KeyringSlot::new(service);
        assert_eq!(reader.get("session").unwrap().as_deref(), Some("persisted-value"));

        reader.remove("session").unwrap();
        assert_eq!(writer.get("session").unwrap(), None);
        reader.remove("session").unwrap();
    }
}
