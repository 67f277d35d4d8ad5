//! Hot-reloadable catalog cache.
//!
//! Readers never block writers and writers never block readers: the cache
//! holds an `Arc<Catalog>` behind a `RwLock` and every read clones the `Arc`,
//! so a rebuild in progress never blocks a request already under way.

use std::sync::{Arc, RwLock};

use crate::model::Catalog;

/// Shared, atomically-swappable view of the live catalog.
#[derive(Clone)]
pub struct SchemaCache {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl SchemaCache {
    /// Construct a cache seeded with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Catalog::empty()))),
        }
    }

    /// Return the currently active catalog snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned by a panicking writer.
    #[must_use]
    pub fn current(&self) -> Arc<Catalog> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the active catalog snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned by a panicking writer.
    pub fn swap(&self, catalog: Catalog) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(catalog);
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_is_visible_to_subsequent_reads() {
        let cache = SchemaCache::new();
        assert_eq!(cache.current().version, 0);
        cache.swap(Catalog {
            version: 5,
            tables: vec![],
            functions: vec![],
        });
        assert_eq!(cache.current().version, 5);
    }

    #[test]
    fn outstanding_snapshot_unaffected_by_later_swap() {
        let cache = SchemaCache::new();
        let first = cache.current();
        cache.swap(Catalog {
            version: 9,
            tables: vec![],
            functions: vec![],
        });
        assert_eq!(first.version, 0);
        assert_eq!(cache.current().version, 9);
    }
}
