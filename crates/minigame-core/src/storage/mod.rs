//! Durable key-value slots backing the session store.
//!
//! A `DurableSlot` is the only thing the session store knows about
//! persistence. Hosts pick a backend when they construct the store:
//!
//! - `FileSlot`: one JSON file per key in a data directory
//! - `KeyringSlot`: OS keychain entries via the `keyring` crate
//! - `MemorySlot`: process-local map, handy for tests and embedding
//! - `NoopSlot`: for contexts with no durable storage at all
//! - `EncryptedSlot`: wraps any of the above and seals values at rest

pub mod encrypted;
pub mod error;
pub mod file;
pub mod keychain;
pub mod memory;

pub use encrypted::EncryptedSlot;
pub use error::StorageError;
pub use file::FileSlot;
pub use keychain::KeyringSlot;
pub use memory::{MemorySlot, NoopSlot};

/// A synchronous string key-value slot that survives process restarts.
pub trait DurableSlot: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing whatever was there.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Short backend name for log fields.
    fn name(&self) -> &'static str;
}

impl<S: DurableSlot + ?Sized> DurableSlot for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
