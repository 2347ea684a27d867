// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{PageId, PageStore};
use crate::Slice;
use quick_cache::sync::Cache;

/// Read-through page cache in front of another store.
///
/// Decoded pages are cheap to clone ([`Slice`]), so the cache holds the
/// encoded form and serves repeated `get`s without touching the inner store.
pub struct CachedStore<S: PageStore> {
    inner: S,
    cache: Cache<PageId, Slice>,
}

impl<S: PageStore> CachedStore<S> {
    /// Wraps a store with a cache holding up to `capacity` pages.
    #[must_use]
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Access to the wrapped store.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: PageStore> PageStore for CachedStore<S> {
    fn reserve(&mut self) -> PageId {
        self.inner.reserve()
    }

    fn insert(&mut self, page: &[u8]) -> crate::Result<PageId> {
        let id = self.inner.insert(page)?;
        self.cache.insert(id, Slice::from(page));
        Ok(id)
    }

    fn get(&mut self, id: PageId) -> crate::Result<Slice> {
        if let Some(page) = self.cache.get(&id) {
            return Ok(page);
        }

        let page = self.inner.get(id)?;
        self.cache.insert(id, page.clone());
        Ok(page)
    }

    fn update(&mut self, id: PageId, page: &[u8]) -> crate::Result<()> {
        self.inner.update(id, page)?;
        self.cache.insert(id, Slice::from(page));
        Ok(())
    }

    fn remove(&mut self, id: PageId) -> crate::Result<()> {
        self.cache.remove(&id);
        self.inner.remove(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPageStore;
    use test_log::test;

    #[test]
    fn cached_store_serves_and_invalidates() -> crate::Result<()> {
        let mut store = CachedStore::new(MemoryPageStore::new(), 16);

        let id = store.insert(b"one")?;
        assert_eq!(b"one" as &[u8], &*store.get(id)?);

        store.update(id, b"two")?;
        assert_eq!(b"two" as &[u8], &*store.get(id)?);

        store.remove(id)?;
        assert!(store.get(id).is_err());

        Ok(())
    }

    #[test]
    fn cached_store_hits_do_not_touch_inner() -> crate::Result<()> {
        let mut store = CachedStore::new(MemoryPageStore::new(), 16);

        let id = store.insert(b"page")?;

        // Drop the page from the inner store; the cache still serves it
        store.inner_mut().remove(id)?;
        assert_eq!(b"page" as &[u8], &*store.get(id)?);

        Ok(())
    }
}
