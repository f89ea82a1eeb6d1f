use std::collections::HashMap;

use parking_lot::Mutex;

use super::{DurableSlot, StorageError};

/// In-process slot. Survives store re-construction, not process exit.
#[derive(Debug, Default)]
pub struct MemorySlot {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, e.g. to simulate what a previous run left behind.
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.lock().insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DurableSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Slot for hosts without durable storage. Reads find nothing and writes
/// are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSlot;

impl DurableSlot for NoopSlot {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slot_set_get_remove() {
        let slot = MemorySlot::new();
        assert_eq!(slot.get("k").unwrap(), None);

        slot.set("k", "v1").unwrap();
        slot.set("k", "v2").unwrap();
        assert_eq!(slot.get("k").unwrap().as_deref(), Some("v2"));

        slot.remove("k").unwrap();
        assert!(slot.is_empty());

        // Removing again is fine
        slot.remove("k").unwrap();
    }

    #[test]
    fn test_memory_slot_seeded() {
        let slot = MemorySlot::new().with_entry("a", "1").with_entry("b", "2");
        assert_eq!(slot.len(), 2);
        assert_eq!(slot.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_noop_slot_drops_writes() {
        let slot = NoopSlot;
        slot.set("k", "v").unwrap();
        assert_eq!(slot.get("k").unwrap(), None);
        slot.remove("k").unwrap();
    }
}
