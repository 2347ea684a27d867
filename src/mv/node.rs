// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    binary_search::partition_point,
    coding::{Codec, Decode, DecodeError, Encode, EncodeError},
    region::MvSeparator,
    store::PageId,
    version::{Lifespan, Version, LIFESPAN_ENCODED_SIZE},
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Subtree weight counters, maintained during bulk operations.
///
/// `live` tracks live entries below the subtree, `total` the operations
/// applied since the subtree page was created.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightCounters {
    /// Live entries in the subtree
    pub live: i64,

    /// Operations since the page was created
    pub total: u64,
}

/// Handle to a multi-version child page
#[derive(Clone, Debug)]
pub struct MvIndexEntry<K> {
    /// Page id of the subtree root
    pub id: PageId,

    /// Minimum-bound separator with the page's lifespan
    pub separator: MvSeparator<K>,

    /// Bulk-load weight counters (zero outside bulk operations)
    pub weight: WeightCounters,
}

/// One record in a multi-version leaf
#[derive(Clone, Debug)]
pub struct MvLeafEntry<V> {
    /// The payload
    pub value: V,

    /// Versions at which the record is visible
    pub lifespan: Lifespan,
}

/// Per-level entry storage of a multi-version node
#[derive(Clone, Debug)]
pub enum MvNodeContent<K, V> {
    /// Records, sorted by (key, lifespan begin)
    Leaf(Vec<MvLeafEntry<V>>),

    /// Child handles, sorted by (separator key, lifespan begin)
    Inner(Vec<MvIndexEntry<K>>),
}

/// In-memory form of one multi-version page.
///
/// Unlike the single-version node there is no next-neighbor link; leaves
/// instead carry up to two predecessor handles pointing at prior time
/// versions of the same key region. Inner nodes use the predecessor slot for
/// overflow-chain pages holding evicted history.
#[derive(Clone, Debug)]
pub struct MvNode<K, V> {
    /// Distance from the leaf level; 0 = leaf
    pub level: u32,

    /// Entries
    pub content: MvNodeContent<K, V>,

    /// Prior time versions of this key region (weak, by id)
    pub predecessors: Vec<MvIndexEntry<K>>,
}

impl<K: Ord + Clone, V> MvNode<K, V> {
    /// Creates an empty leaf.
    #[must_use]
    pub fn empty_leaf() -> Self {
        Self {
            level: 0,
            content: MvNodeContent::Leaf(Vec::new()),
            predecessors: Vec::new(),
        }
    }

    /// Creates an inner node from child handles.
    #[must_use]
    pub fn inner(level: u32, entries: Vec<MvIndexEntry<K>>) -> Self {
        Self {
            level,
            content: MvNodeContent::Inner(entries),
            predecessors: Vec::new(),
        }
    }

    /// Returns `true` if this is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Number of entries, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.content {
            MvNodeContent::Leaf(entries) => entries.len(),
            MvNodeContent::Inner(entries) => entries.len(),
        }
    }

    /// Returns `true` if the node holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The records of a leaf.
    #[must_use]
    pub fn leaf_entries(&self) -> &[MvLeafEntry<V>] {
        match &self.content {
            MvNodeContent::Leaf(entries) => entries,
            MvNodeContent::Inner(_) => &[],
        }
    }

    /// Mutable records of a leaf.
    pub fn leaf_entries_mut(&mut self) -> &mut Vec<MvLeafEntry<V>> {
        debug_assert!(self.is_leaf());

        match &mut self.content {
            MvNodeContent::Leaf(entries) => entries,
            MvNodeContent::Inner(_) => unreachable!("leaf_entries_mut on inner node"),
        }
    }

    /// The child handles of an inner node.
    #[must_use]
    pub fn children(&self) -> &[MvIndexEntry<K>] {
        match &self.content {
            MvNodeContent::Leaf(_) => &[],
            MvNodeContent::Inner(entries) => entries,
        }
    }

    /// Mutable child handles of an inner node.
    pub fn children_mut(&mut self) -> &mut Vec<MvIndexEntry<K>> {
        debug_assert!(!self.is_leaf());

        match &mut self.content {
            MvNodeContent::Leaf(_) => unreachable!("children_mut on leaf node"),
            MvNodeContent::Inner(entries) => entries,
        }
    }

    /// Number of entries visible at the given version.
    #[must_use]
    pub fn live_count(&self, version: Version) -> usize {
        match &self.content {
            MvNodeContent::Leaf(entries) => entries
                .iter()
                .filter(|e| e.lifespan.contains(version))
                .count(),
            MvNodeContent::Inner(entries) => entries
                .iter()
                .filter(|e| e.separator.is_live_at(version))
                .count(),
        }
    }

    /// Indices of child handles visible at the given version, in key order.
    #[must_use]
    pub fn live_children(&self, version: Version) -> Vec<usize> {
        self.children()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.separator.is_live_at(version))
            .map(|(i, _)| i)
            .collect()
    }

    /// Routes a key among the children visible at the given version.
    ///
    /// Picks the rightmost live child whose separator key is `<= key`,
    /// clamped to the leftmost live child.
    #[must_use]
    pub fn route_live(&self, key: &K, version: Version) -> Option<usize> {
        let live = self.live_children(version);

        let pos = partition_point(&live, |&i| {
            self.children()
                .get(i)
                .is_some_and(|e| e.separator.key() <= key)
        });

        // pos == 0 means the key lies left of every live region; clamp to
        // the leftmost live child
        live.get(pos.saturating_sub(1)).copied()
    }

    /// Inserts a record at its position in (key, insertion version) order.
    pub fn grow_leaf(&mut self, entry: MvLeafEntry<V>, key_of: &dyn Fn(&V) -> K) {
        let key = key_of(&entry.value);
        let begin = entry.lifespan.begin();

        let entries = self.leaf_entries_mut();
        let idx = partition_point(entries, |e| {
            let existing = key_of(&e.value);
            existing < key || (existing == key && e.lifespan.begin() <= begin)
        });

        entries.insert(idx, entry);
    }

    /// Inserts a child handle at its position in (key, insertion version)
    /// order.
    pub fn grow_inner(&mut self, entry: MvIndexEntry<K>) {
        let entries = self.children_mut();
        let idx = partition_point(entries, |e| e.separator <= entry.separator);
        entries.insert(idx, entry);
    }

    /// Finds the record visible at `version` with the given key for which
    /// the predicate holds.
    #[must_use]
    pub fn find_live(
        &self,
        key: &K,
        version: Version,
        key_of: &dyn Fn(&V) -> K,
        pred: &dyn Fn(&V) -> bool,
    ) -> Option<usize> {
        self.leaf_entries().iter().position(|e| {
            e.lifespan.contains(version) && key_of(&e.value) == *key && pred(&e.value)
        })
    }

    /// Smallest live key in a leaf.
    #[must_use]
    pub fn min_live_key(&self, version: Version, key_of: &dyn Fn(&V) -> K) -> Option<K> {
        self.leaf_entries()
            .iter()
            .filter(|e| e.lifespan.contains(version))
            .map(|e| key_of(&e.value))
            .min()
    }
}

/// Sizes of the on-disk multi-version layout
pub(crate) struct MvLayoutSizes;

impl MvLayoutSizes {
    /// An inner entry: child id, separator key, separator lifespan, weights.
    pub fn inner_entry(key_size: usize) -> usize {
        8 + key_size + LIFESPAN_ENCODED_SIZE + 8 + 8
    }

    /// A leaf entry: lifespan, then the value.
    pub fn leaf_entry(value_size: usize) -> usize {
        LIFESPAN_ENCODED_SIZE + value_size
    }

    /// Fixed header: level, count, predecessor count, and space for two
    /// predecessor handles.
    pub fn header(key_size: usize) -> usize {
        4 + 4 + 4 + 2 * Self::inner_entry(key_size)
    }
}

fn encode_index_entry<K: Ord + Clone>(
    entry: &MvIndexEntry<K>,
    key_codec: &dyn Codec<K>,
    writer: &mut dyn Write,
) -> Result<(), EncodeError> {
    writer.write_u64::<BigEndian>(entry.id)?;
    entry.separator.encode_into(key_codec, writer)?;
    writer.write_i64::<BigEndian>(entry.weight.live)?;
    writer.write_u64::<BigEndian>(entry.weight.total)?;
    Ok(())
}

fn decode_index_entry<K: Ord + Clone>(
    key_codec: &dyn Codec<K>,
    reader: &mut dyn Read,
) -> Result<MvIndexEntry<K>, DecodeError> {
    let id = reader.read_u64::<BigEndian>()?;
    let separator = MvSeparator::decode_from(key_codec, reader)?;
    let live = reader.read_i64::<BigEndian>()?;
    let total = reader.read_u64::<BigEndian>()?;

    Ok(MvIndexEntry {
        id,
        separator,
        weight: WeightCounters { live, total },
    })
}

impl<K: Ord + Clone, V> MvNode<K, V> {
    /// Serializes the node: header, predecessors, entries.
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

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.predecessors.len() as u32)?;

        for pred in &self.predecessors {
            encode_index_entry(pred, key_codec, writer)?;
        }

        match &self.content {
            MvNodeContent::Leaf(entries) => {
                for entry in entries {
                    entry.lifespan.encode_into(writer)?;
                    value_codec.encode_into(&entry.value, writer)?;
                }
            }
            MvNodeContent::Inner(entries) => {
                for entry in entries {
                    encode_index_entry(entry, key_codec, writer)?;
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
        let pred_count = reader.read_u32::<BigEndian>()? as usize;

        let mut predecessors = Vec::with_capacity(pred_count);
        for _ in 0..pred_count {
            predecessors.push(decode_index_entry(key_codec, reader)?);
        }

        let content = if level == 0 {
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let lifespan = Lifespan::decode_from(reader)?;
                let value = value_codec.decode_from(reader)?;
                entries.push(MvLeafEntry { value, lifespan });
            }
            MvNodeContent::Leaf(entries)
        } else {
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(decode_index_entry(key_codec, reader)?);
            }
            MvNodeContent::Inner(entries)
        };

        Ok(Self {
            level,
            content,
            predecessors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::I32Codec;
    use test_log::test;

    fn key_of(v: &i32) -> i32 {
        *v
    }

    fn leaf_entry(value: i32, begin: Version) -> MvLeafEntry<i32> {
        MvLeafEntry {
            value,
            lifespan: Lifespan::from(begin),
        }
    }

    #[test]
    fn leaf_sorted_by_key_then_version() {
        let mut node = MvNode::<i32, i32>::empty_leaf();

        node.grow_leaf(leaf_entry(20, 1), &key_of);
        node.grow_leaf(leaf_entry(10, 3), &key_of);
        node.grow_leaf(leaf_entry(10, 1), &key_of);

        let keys: Vec<_> = node
            .leaf_entries()
            .iter()
            .map(|e| (e.value, e.lifespan.begin()))
            .collect();

        assert_eq!(vec![(10, 1), (10, 3), (20, 1)], keys);
    }

    #[test]
    fn live_count_ignores_dead_entries() {
        let mut node = MvNode::<i32, i32>::empty_leaf();
        node.grow_leaf(leaf_entry(10, 1), &key_of);
        node.grow_leaf(leaf_entry(20, 1), &key_of);

        if let Some(entry) = node.leaf_entries_mut().get_mut(1) {
            entry.lifespan.kill(5);
        }

        assert_eq!(2, node.live_count(4));
        assert_eq!(1, node.live_count(5));
    }

    #[test]
    fn route_live_picks_rightmost_covering() {
        use crate::region::MvSeparator;

        let entry = |key: i32, begin: Version, id: u64| MvIndexEntry {
            id,
            separator: MvSeparator::new(key, Lifespan::from(begin)),
            weight: WeightCounters::default(),
        };

        let mut dead = entry(30, 1, 9);
        dead.separator.lifespan_mut().kill(5);

        let node = MvNode::<i32, i32>::inner(
            1,
            vec![entry(i32::MIN, 1, 1), dead, entry(30, 5, 2), entry(60, 5, 3)],
        );

        // At version 6 the live children are MIN, 30@5, 60
        let route = |key: i32, v: Version| {
            node.route_live(&key, v)
                .and_then(|i| node.children().get(i))
                .map(|e| e.id)
        };

        assert_eq!(Some(1), route(10, 6));
        assert_eq!(Some(2), route(30, 6));
        assert_eq!(Some(2), route(45, 6));
        assert_eq!(Some(3), route(99, 6));

        // At version 4 the dead entry is live instead
        assert_eq!(Some(9), route(45, 4));
    }

    #[test]
    fn node_roundtrip() -> Result<(), DecodeError> {
        let mut leaf = MvNode::<i32, i32>::empty_leaf();
        leaf.grow_leaf(leaf_entry(10, 1), &key_of);
        leaf.grow_leaf(
            MvLeafEntry {
                value: 20,
                lifespan: Lifespan::between(1, 7),
            },
            &key_of,
        );

        leaf.predecessors.push(MvIndexEntry {
            id: 4,
            separator: MvSeparator::new(10, Lifespan::between(1, 5)),
            weight: WeightCounters { live: 2, total: 3 },
        });

        let mut buf = vec![];
        leaf.encode_into(&I32Codec, &I32Codec, &mut buf)
            .expect("encode");

        let decoded = MvNode::<i32, i32>::decode_from(&I32Codec, &I32Codec, &mut &buf[..])?;

        assert_eq!(leaf.len(), decoded.len());
        assert_eq!(1, decoded.predecessors.len());
        assert_eq!(
            leaf.leaf_entries().first().map(|e| (e.value, e.lifespan)),
            decoded.leaf_entries().first().map(|e| (e.value, e.lifespan)),
        );

        Ok(())
    }
}
