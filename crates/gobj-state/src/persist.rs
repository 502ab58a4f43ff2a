//! Persistence extension point
//!
//! The runtime never chooses a storage format. It hands `PERSIST`
//! attribute snapshots to an [`AttrPersistence`] collaborator, keyed by the
//! instance's full name.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::trace;

use gobj_core::{GObjResult, Kw};

/// Storage collaborator for persistent attributes
pub trait AttrPersistence: Send + Sync {
    /// Saved snapshot for `key`, if any
    fn load(&self, key: &str) -> GObjResult<Option<Kw>>;

    /// Replace the snapshot for `key`
    fn save(&self, key: &str, attrs: &Kw) -> GObjResult<()>;

    /// Drop the snapshot for `key`; returns whether one existed
    fn remove(&self, key: &str) -> GObjResult<bool>;

    /// Keys with a stored snapshot
    fn keys(&self) -> GObjResult<Vec<String>>;
}

/// In-process store, useful for tests and for runtimes without a backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Kw>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AttrPersistence for MemoryStore {
    fn load(&self, key: &str) -> GObjResult<Option<Kw>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn save(&self, key: &str, attrs: &Kw) -> GObjResult<()> {
        trace!(key, attrs = attrs.len(), "Saving persistent attributes");
        self.entries.write().insert(key.to_string(), attrs.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> GObjResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> GObjResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gobj_core::kw_from;
    use serde_json::json;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        let attrs = kw_from(json!({"timeout": 10}));
        store.save("c_yuno^app`c_timer^t1", &attrs).unwrap();
        assert_eq!(store.load("c_yuno^app`c_timer^t1").unwrap(), Some(attrs));
        assert_eq!(store.load("missing").unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["c_yuno^app`c_timer^t1".to_string()]);
    }

    #[test]
    fn test_memory_store_remove() {
        let store = MemoryStore::new();
        store.save("k", &Kw::new()).unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert_eq!(store.len(), 0);
    }
}
