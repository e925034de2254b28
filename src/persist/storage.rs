use crate::error::PersistenceError;
use crate::runtime;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Minimal string key/value medium, shaped like browser local storage.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove_item(&self, key: &str) -> Result<(), PersistenceError>;
}

/// In-memory storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance, used when a store has no storage configured.
    pub fn global() -> Self {
        static STORAGE: OnceLock<MemoryStorage> = OnceLock::new();
        STORAGE.get_or_init(MemoryStorage::new).clone()
    }

    pub fn len(&self) -> usize {
        runtime::read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        runtime::read(&self.items).contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(runtime::read(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        runtime::write(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        runtime::write(&self.items).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_items() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.set_item("k", "v").unwrap();
        assert_eq!(other.get_item("k").unwrap().as_deref(), Some("v"));

        other.remove_item("k").unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn global_is_shared() {
        MemoryStorage::global().set_item("storage-test-global", "1").unwrap();
        assert!(MemoryStorage::global().contains_key("storage-test-global"));
        MemoryStorage::global().remove_item("storage-test-global").unwrap();
    }
}
