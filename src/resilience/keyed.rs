//! Lazily populated per-key instance maps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Factory<T> = Arc<dyn Fn(&str) -> Arc<T> + Send + Sync>;

/// Map from routing key (usually a model name) to a shared instance.
///
/// Lookups take the read lock; a miss re-checks under the write lock before
/// calling the factory, so each key gets exactly one instance even when many
/// calls race on first use.
pub struct KeyedRegistry<T: ?Sized> {
    entries: RwLock<HashMap<String, Arc<T>>>,
    factory: Factory<T>,
}

impl<T: ?Sized> KeyedRegistry<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            entries: RwLock::new(HashMap::new()),
            factory: Arc::new(factory),
        }
    }

    pub fn get(&self, key: &str) -> Arc<T> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = entries.get(key) {
                return existing.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(key) {
            return existing.clone();
        }
        let created = (self.factory)(key);
        entries.insert(key.to_string(), created.clone());
        created
    }

    /// Existing instance only; never creates.
    pub fn peek(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached instance; the next lookup recreates it.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
