//! Process-scoped singleton registry.
//!
//! Holds the per-context singletons (config, connection pool) keyed by a
//! stable name. A resource is stored exactly once; later `set` calls for the
//! same key are ignored, which makes the config/pool init functions
//! idempotent no matter how many call sites race to initialize them.
//!
//! Each [`crate::storage::SqliteStorage`] owns its own registry, so multiple
//! independent storage contexts can coexist in one process (e.g. in tests).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry mapping resource keys to type-erased singletons.
///
/// Writes happen once per key during initialization; all subsequent access
/// is read-only, so a `RwLock` keeps concurrent readers cheap.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    /// Map of resource key -> singleton instance
    resources: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ResourceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Store a singleton under `key` if no resource is registered yet.
    ///
    /// Once a key is set it is never overwritten; the first writer wins.
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, resource: Arc<T>) {
        let resource: Arc<dyn Any + Send + Sync> = resource;
        let mut resources = self.resources.write().unwrap();
        resources.entry(key.to_string()).or_insert(resource);
    }

    /// Look up the singleton stored under `key`.
    ///
    /// Returns `None` if the key is unset or holds a value of a different
    /// type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let resources = self.resources.read().unwrap();
        resources
            .get(key)
            .cloned()
            .and_then(|resource| resource.downcast::<T>().ok())
    }
}
