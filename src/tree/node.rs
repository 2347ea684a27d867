// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    binary_search::partition_point,
    coding::{Codec, DecodeError, EncodeError, KeyExtractor},
    store::PageId,
    Error,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Handle to a child page: its id plus the routing separator.
///
/// The separator is the largest key of the subtree behind `id`; the child
/// itself is only reachable through the page store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry<K> {
    /// Page id of the subtree root
    pub id: PageId,

    /// Largest key of the subtree
    pub separator: K,
}

/// Per-level entry storage
#[derive(Clone, Debug)]
pub enum NodeContent<K, V> {
    /// Values, sorted by key
    Leaf(Vec<V>),

    /// Child handles, sorted by separator
    Inner(Vec<IndexEntry<K>>),
}

/// In-memory form of one page
#[derive(Clone, Debug)]
pub struct Node<K, V> {
    /// Distance from the leaf level; 0 = leaf
    pub level: u32,

    /// Entries
    pub content: NodeContent<K, V>,

    /// Next leaf in key order (leaves only)
    pub next: Option<IndexEntry<K>>,
}

/// Node capacities derived from the block size and the codec maximum sizes
#[derive(Copy, Clone, Debug)]
pub struct NodeLayout {
    /// Block size the capacities were computed for
    pub block_size: u32,

    /// Maximum number of values in a leaf
    pub b_leaf: usize,

    /// Minimum number of values in a non-root leaf
    pub d_leaf: usize,

    /// Maximum number of children of an inner node
    pub b_inner: usize,

    /// Minimum number of children of a non-root inner node
    pub d_inner: usize,
}

impl NodeLayout {
    /// Derives capacities from the block size and entry sizes.
    pub fn compute(
        block_size: u32,
        min_capacity_ratio: f32,
        header_size: usize,
        leaf_entry_size: usize,
        inner_entry_size: usize,
    ) -> crate::Result<Self> {
        let usable = (block_size as usize)
            .checked_sub(header_size)
            .ok_or(Error::InvalidInput("block_size smaller than page header"))?;

        let b_leaf = usable / leaf_entry_size;
        let b_inner = usable / inner_entry_size;

        if b_leaf < 2 || b_inner < 2 {
            return Err(Error::InvalidInput(
                "block_size too small for two entries per node",
            ));
        }

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let min = |b: usize| -> usize { ((b as f32) * min_capacity_ratio).floor() as usize };

        let d_leaf = min(b_leaf).max(1);
        let d_inner = min(b_inner).max(1);

        Ok(Self {
            block_size,
            b_leaf,
            d_leaf,
            b_inner,
            d_inner,
        })
    }

    /// Maximum entry count at the given level.
    #[must_use]
    pub fn capacity(&self, level: u32) -> usize {
        if level == 0 {
            self.b_leaf
        } else {
            self.b_inner
        }
    }

    /// Minimum entry count of non-root nodes at the given level.
    #[must_use]
    pub fn min_count(&self, level: u32) -> usize {
        if level == 0 {
            self.d_leaf
        } else {
            self.d_inner
        }
    }
}

impl<K: Ord + Clone, V> Node<K, V> {
    /// Creates an empty leaf.
    #[must_use]
    pub fn empty_leaf() -> Self {
        Self {
            level: 0,
            content: NodeContent::Leaf(Vec::new()),
            next: None,
        }
    }

    /// Creates an inner node from child handles.
    #[must_use]
    pub fn inner(level: u32, entries: Vec<IndexEntry<K>>) -> Self {
        Self {
            level,
            content: NodeContent::Inner(entries),
            next: None,
        }
    }

    /// Returns `true` if this is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.content {
            NodeContent::Leaf(values) => values.len(),
            NodeContent::Inner(entries) => entries.len(),
        }
    }

    /// Returns `true` if the node holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The values of a leaf.
    #[must_use]
    pub fn values(&self) -> &[V] {
        match &self.content {
            NodeContent::Leaf(values) => values,
            NodeContent::Inner(_) => &[],
        }
    }

    /// Mutable values of a leaf.
    pub fn values_mut(&mut self) -> &mut Vec<V> {
        debug_assert!(self.is_leaf());

        match &mut self.content {
            NodeContent::Leaf(values) => values,
            NodeContent::Inner(_) => unreachable!("values_mut on inner node"),
        }
    }

    /// The child handles of an inner node.
    #[must_use]
    pub fn children(&self) -> &[IndexEntry<K>] {
        match &self.content {
            NodeContent::Leaf(_) => &[],
            NodeContent::Inner(entries) => entries,
        }
    }

    /// Mutable child handles of an inner node.
    pub fn children_mut(&mut self) -> &mut Vec<IndexEntry<K>> {
        debug_assert!(!self.is_leaf());

        match &mut self.content {
            NodeContent::Leaf(_) => unreachable!("children_mut on leaf node"),
            NodeContent::Inner(entries) => entries,
        }
    }

    /// Largest key in this node.
    #[must_use]
    pub fn max_key(&self, extractor: &dyn KeyExtractor<K, V>) -> Option<K> {
        match &self.content {
            NodeContent::Leaf(values) => values.last().map(|v| extractor.key_of(v)),
            NodeContent::Inner(entries) => entries.last().map(|e| e.separator.clone()),
        }
    }

    /// Smallest key in this node.
    #[must_use]
    pub fn min_key(&self, extractor: &dyn KeyExtractor<K, V>) -> Option<K> {
        match &self.content {
            NodeContent::Leaf(values) => values.first().map(|v| extractor.key_of(v)),
            NodeContent::Inner(entries) => entries.first().map(|e| e.separator.clone()),
        }
    }

    /// Inserts a value into a leaf at its unique position.
    ///
    /// In duplicate mode, equal keys insert to the right of existing ones so
    /// that insertion order is preserved.
    pub fn grow_leaf(
        &mut self,
        value: V,
        extractor: &dyn KeyExtractor<K, V>,
        allow_duplicates: bool,
    ) -> crate::Result<()> {
        let key = extractor.key_of(&value);
        let values = self.values_mut();

        let idx = if allow_duplicates {
            partition_point(values, |v| extractor.key_of(v) <= key)
        } else {
            let idx = partition_point(values, |v| extractor.key_of(v) < key);

            if values.get(idx).is_some_and(|v| extractor.key_of(v) == key) {
                return Err(Error::InvalidInput("duplicate key"));
            }

            idx
        };

        values.insert(idx, value);
        Ok(())
    }

    /// Inserts a child handle at its position in separator order.
    pub fn grow_inner(&mut self, entry: IndexEntry<K>) {
        let entries = self.children_mut();
        let idx = partition_point(entries, |e| e.separator < entry.separator);
        entries.insert(idx, entry);
    }

    /// Routes a key to a child slot without modifying the node.
    ///
    /// Returns the leftmost child whose separator is `>= key`, clamped to the
    /// last child.
    #[must_use]
    pub fn route(&self, key: &K) -> usize {
        let entries = self.children();
        let idx = partition_point(entries, |e| e.separator < *key);
        idx.min(entries.len().saturating_sub(1))
    }

    /// Routes a key for insertion.
    ///
    /// If the key exceeds the rightmost separator, that separator is widened
    /// in place and the caller must propagate the change to the parent. In
    /// duplicate mode a new duplicate goes right of all existing ones, so
    /// the rightmost child with an equal separator is chosen.
    pub fn choose_subtree(&mut self, key: &K, allow_duplicates: bool) -> (usize, bool) {
        let entries = self.children_mut();

        let idx = if allow_duplicates {
            let upper = partition_point(entries, |e| e.separator <= *key);

            if upper > 0 && entries.get(upper - 1).is_some_and(|e| e.separator == *key) {
                upper - 1
            } else {
                upper
            }
        } else {
            partition_point(entries, |e| e.separator < *key)
        };

        if idx == entries.len() {
            let last = entries.len().saturating_sub(1);

            if let Some(entry) = entries.get_mut(last) {
                entry.separator = key.clone();
            }

            (last, true)
        } else {
            (idx, false)
        }
    }

    /// Returns the entry slice `[min_idx, max_idx)` of leaf values with keys
    /// in `[lo, hi]`.
    ///
    /// Both bounds are found independently; in duplicate mode they skip
    /// through runs of equal keys.
    #[must_use]
    pub fn leaf_range(&self, lo: &K, hi: &K, extractor: &dyn KeyExtractor<K, V>) -> (usize, usize) {
        let values = self.values();
        let min_idx = partition_point(values, |v| extractor.key_of(v) < *lo);
        let max_idx = partition_point(values, |v| extractor.key_of(v) <= *hi);
        (min_idx, max_idx)
    }

    fn split_index(
        &self,
        extractor: &dyn KeyExtractor<K, V>,
        allow_duplicates: bool,
    ) -> crate::Result<usize> {
        let n = self.len();

        let split_at = if self.is_leaf() && allow_duplicates {
            let values = self.values();

            let last_key = values.last().map(|v| extractor.key_of(v));
            let three_quarters = 3 * n / 4;
            let pivot_key = values.get(three_quarters).map(|v| extractor.key_of(v));

            if last_key.is_some() && last_key == pivot_key {
                // Keep the run of equal keys contiguous: find its start,
                // scanning at most down to the 25% mark, and split before it
                let quarter = n / 4;
                let mut i = three_quarters;

                while i > quarter
                    && values.get(i - 1).map(|v| extractor.key_of(v)) == last_key
                {
                    i -= 1;
                }

                i.max(1)
            } else {
                n / 2
            }
        } else {
            n / 2
        };

        if split_at == 0 || split_at >= n {
            return Err(Error::Corrupted("split yielded empty partition"));
        }

        Ok(split_at)
    }

    /// Moves the right half of the entries into a new sibling.
    ///
    /// The new node takes over the next-neighbor link; the caller points
    /// `self.next` at the new sibling once its page id is known.
    pub fn split_off(
        &mut self,
        extractor: &dyn KeyExtractor<K, V>,
        allow_duplicates: bool,
    ) -> crate::Result<Self> {
        let split_at = self.split_index(extractor, allow_duplicates)?;

        let content = match &mut self.content {
            NodeContent::Leaf(values) => NodeContent::Leaf(values.split_off(split_at)),
            NodeContent::Inner(entries) => NodeContent::Inner(entries.split_off(split_at)),
        };

        Ok(Self {
            level: self.level,
            content,
            next: self.next.take(),
        })
    }
}

pub(crate) fn encode_page_id<W: Write + ?Sized>(
    id: Option<PageId>,
    writer: &mut W,
) -> Result<(), EncodeError> {
    match id {
        Some(id) => {
            writer.write_u8(1)?;
            writer.write_u64::<BigEndian>(id)?;
        }
        None => {
            writer.write_u8(0)?;
            writer.write_u64::<BigEndian>(0)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_page_id<R: Read + ?Sized>(
    reader: &mut R,
) -> Result<Option<PageId>, DecodeError> {
    let tag = reader.read_u8()?;
    let id = reader.read_u64::<BigEndian>()?;

    match tag {
        0 => Ok(None),
        1 => Ok(Some(id)),
        _ => Err(DecodeError::InvalidTag(("PageId", tag))),
    }
}

impl<K: Ord + Clone, V> Node<K, V> {
    /// Fixed page header size for the given key codec.
    #[must_use]
    pub fn header_size(key_size: usize) -> usize {
        // level + count + next flag + next id + next separator
        4 + 4 + 1 + 8 + key_size
    }

    /// Serializes the node.
    ///
    /// Layout: header, then entries; inner nodes store all child ids first
    /// and all separator keys after them, so key-only scans touch one
    /// contiguous area.
    pub fn encode_into(
        &self,
        key_codec: &dyn Codec<K>,
        value_codec: &dyn Codec<V>,
        writer: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        writer.write_u32::<BigEndian>(self.level)?;

        // NOTE: Entry counts are bounded by the block size
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.len() as u32)?;

        encode_page_id(self.next.as_ref().map(|e| e.id), writer)?;

        // The separator slot is budgeted in the fixed header size but only
        // written when a neighbor exists
        if let Some(entry) = &self.next {
            key_codec.encode_into(&entry.separator, writer)?;
        }

        match &self.content {
            NodeContent::Leaf(values) => {
                for value in values {
                    value_codec.encode_into(value, writer)?;
                }
            }
            NodeContent::Inner(entries) => {
                for entry in entries {
                    writer.write_u64::<BigEndian>(entry.id)?;
                }
                for entry in entries {
                    key_codec.encode_into(&entry.separator, writer)?;
                }
            }
        }

        Ok(())
    }

    /// Deserializes a node.
    pub fn decode_from(
        key_codec: &dyn Codec<K>,
        value_codec: &dyn Codec<V>,
        reader: &mut dyn Read,
    ) -> Result<Self, DecodeError> {
        let level = reader.read_u32::<BigEndian>()?;
        let count = reader.read_u32::<BigEndian>()? as usize;

        let next_id = decode_page_id(reader)?;
        let next = match next_id {
            Some(id) => {
                let separator = key_codec.decode_from(reader)?;
                Some(IndexEntry { id, separator })
            }
            None => None,
        };

        let content = if level == 0 {
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(value_codec.decode_from(reader)?);
            }
            NodeContent::Leaf(values)
        } else {
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(reader.read_u64::<BigEndian>()?);
            }

            let mut entries = Vec::with_capacity(count);
            for id in ids {
                let separator = key_codec.decode_from(reader)?;
                entries.push(IndexEntry { id, separator });
            }
            NodeContent::Inner(entries)
        };

        Ok(Self {
            level,
            content,
            next,
        })
    }
}
