// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub(crate) mod block_file;
pub(crate) mod cache;
pub(crate) mod memory;

pub use block_file::BlockFile;
pub use cache::CachedStore;
pub use memory::MemoryPageStore;

use crate::Slice;
use enum_dispatch::enum_dispatch;

/// Identifier of a page inside a [`PageStore`]
pub type PageId = u64;

/// Block storage the trees are built on.
///
/// A store hands out ids and persists opaque encoded pages of at most the
/// configured block size. Stores are the engine's only blocking calls; the
/// tree issues plain read-modify-write cycles and never keeps a page pinned
/// across them.
#[enum_dispatch]
pub trait PageStore {
    /// Allocates a fresh page id without contents.
    fn reserve(&mut self) -> PageId;

    /// Stores a new page, returning its id.
    fn insert(&mut self, page: &[u8]) -> crate::Result<PageId>;

    /// Reads the page with the given id.
    fn get(&mut self, id: PageId) -> crate::Result<Slice>;

    /// Replaces the contents of an existing page.
    fn update(&mut self, id: PageId, page: &[u8]) -> crate::Result<()>;

    /// Deletes a page.
    fn remove(&mut self, id: PageId) -> crate::Result<()>;

    /// Number of pages currently stored.
    fn len(&self) -> usize;

    /// Returns `true` if no pages are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of an encoded page id in bytes.
    fn id_size(&self) -> usize {
        std::mem::size_of::<PageId>()
    }
}

/// May be a [`MemoryPageStore`] or a [`BlockFile`]
#[enum_dispatch(PageStore)]
pub enum AnyStore {
    /// Volatile in-memory store, see [`MemoryPageStore`]
    Memory(MemoryPageStore),

    /// Single-file disk store, see [`BlockFile`]
    File(BlockFile),
}
