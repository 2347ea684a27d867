// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{PageId, PageStore};
use crate::{Error, Slice};
use rustc_hash::FxHashMap;

/// Volatile page store backed by a hash map.
///
/// Useful for tests and for trees that do not need to survive the process.
#[derive(Default)]
pub struct MemoryPageStore {
    pages: FxHashMap<PageId, Slice>,
    next_id: PageId,
}

impl MemoryPageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryPageStore {
    fn reserve(&mut self) -> PageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, page: &[u8]) -> crate::Result<PageId> {
        let id = self.reserve();
        self.pages.insert(id, Slice::from(page));
        Ok(id)
    }

    fn get(&mut self, id: PageId) -> crate::Result<Slice> {
        self.pages
            .get(&id)
            .cloned()
            .ok_or(Error::Corrupted("page not found"))
    }

    fn update(&mut self, id: PageId, page: &[u8]) -> crate::Result<()> {
        self.pages.insert(id, Slice::from(page));
        Ok(())
    }

    fn remove(&mut self, id: PageId) -> crate::Result<()> {
        self.pages
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::Corrupted("page not found"))
    }

    fn len(&self) -> usize {
        self.pages.len()
    }
}
