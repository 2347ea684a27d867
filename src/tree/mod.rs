// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Single-version page layout
pub mod node;

/// The leaf-chain range cursor
pub mod range;

use crate::{
    coding::{SharedCodec, SharedKeyExtractor},
    config::Config,
    key_range::KeyRange,
    meta::TreeMeta,
    store::{PageId, PageStore},
    Error,
};
use std::path::Path;
use node::{IndexEntry, Node, NodeContent, NodeLayout};
use range::RangeScan;

struct PathFrame<K, V> {
    id: PageId,
    node: Node<K, V>,
    child_idx: usize,
    dirty: bool,
}

/// A single-version paginated B+-tree.
///
/// Values are stored in leaves in key order; keys are derived through the
/// extractor. Leaves are chained through next-neighbor links for range
/// scans. In duplicate mode, multiple values may share one key.
pub struct BPlusTree<K, V, S: PageStore> {
    pub(crate) store: S,
    pub(crate) layout: NodeLayout,
    pub(crate) key_codec: SharedCodec<K>,
    pub(crate) value_codec: SharedCodec<V>,
    pub(crate) extractor: SharedKeyExtractor<K, V>,
    allow_duplicates: bool,
    pub(crate) root: Option<IndexEntry<K>>,
    pub(crate) root_level: u32,
    range: Option<KeyRange<K>>,
    len: u64,
}

impl<K, V, S> BPlusTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug,
    V: Clone,
    S: PageStore,
{
    /// Opens an empty tree on the given store.
    pub fn new(
        config: Config,
        store: S,
        key_codec: SharedCodec<K>,
        value_codec: SharedCodec<V>,
        extractor: SharedKeyExtractor<K, V>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let layout = NodeLayout::compute(
            config.block_size,
            config.min_capacity_ratio,
            Node::<K, V>::header_size(key_codec.max_size()),
            value_codec.max_size(),
            8 + key_codec.max_size(),
        )?;

        log::debug!(
            "opening b+-tree: B_leaf={}, D_leaf={}, B_inner={}, D_inner={}",
            layout.b_leaf,
            layout.d_leaf,
            layout.b_inner,
            layout.d_inner,
        );

        Ok(Self {
            store,
            layout,
            key_codec,
            value_codec,
            extractor,
            allow_duplicates: config.allow_duplicates,
            root: None,
            root_level: 0,
            range: None,
            len: 0,
        })
    }

    /// Number of values in the tree.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the tree holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, 0 for an empty tree.
    #[must_use]
    pub fn height(&self) -> u32 {
        if self.root.is_some() {
            self.root_level + 1
        } else {
            0
        }
    }

    /// The range spanned by all keys, `None` for an empty tree.
    #[must_use]
    pub fn key_range(&self) -> Option<&KeyRange<K>> {
        self.range.as_ref()
    }

    /// The node capacities derived at open time.
    #[must_use]
    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    /// Access to the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub(crate) fn key_of(&self, value: &V) -> K {
        self.extractor.key_of(value)
    }

    pub(crate) fn read_node(&mut self, id: PageId) -> crate::Result<Node<K, V>> {
        let page = self.store.get(id)?;
        Ok(Node::decode_from(
            &*self.key_codec,
            &*self.value_codec,
            &mut &page[..],
        )?)
    }

    pub(crate) fn write_node(&mut self, id: PageId, node: &Node<K, V>) -> crate::Result<()> {
        let buf = self.encode_node(node)?;
        self.store.update(id, &buf)
    }

    fn insert_node(&mut self, node: &Node<K, V>) -> crate::Result<PageId> {
        let buf = self.encode_node(node)?;
        self.store.insert(&buf)
    }

    fn encode_node(&mut self, node: &Node<K, V>) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.layout.block_size as usize);
        node.encode_into(&*self.key_codec, &*self.value_codec, &mut buf)?;

        if buf.len() > self.layout.block_size as usize {
            return Err(Error::Corrupted("encoded page exceeds block size"));
        }

        Ok(buf)
    }

    /// Inserts a value.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if the key already exists and duplicates are
    /// not allowed.
    pub fn insert(&mut self, value: V) -> crate::Result<()> {
        let key = self.key_of(&value);

        let Some(root) = self.root.clone() else {
            let mut leaf = Node::empty_leaf();
            leaf.grow_leaf(value, &*self.extractor.clone(), self.allow_duplicates)?;

            let id = self.insert_node(&leaf)?;
            self.root = Some(IndexEntry {
                id,
                separator: key.clone(),
            });
            self.root_level = 0;
            self.range = Some(KeyRange::point(key));
            self.len = 1;

            return Ok(());
        };

        let mut path: Vec<PathFrame<K, V>> = Vec::new();
        let mut id = root.id;

        loop {
            let mut node = self.read_node(id)?;

            if node.is_leaf() {
                node.grow_leaf(value, &*self.extractor.clone(), self.allow_duplicates)?;

                self.len += 1;
                if let Some(range) = &mut self.range {
                    range.extend_with_key(&key);
                }
                if let Some(root) = &mut self.root {
                    if key > root.separator {
                        root.separator = key.clone();
                    }
                }

                return self.complete_insert(path, id, node);
            }

            let (idx, widened) = node.choose_subtree(&key, self.allow_duplicates);
            let child = node
                .children()
                .get(idx)
                .ok_or(Error::Corrupted("routing into empty inner node"))?
                .id;

            path.push(PathFrame {
                id,
                node,
                child_idx: idx,
                dirty: widened,
            });
            id = child;
        }
    }

    /// Unwinds an insertion path, splitting overflowed nodes bottom-up.
    fn complete_insert(
        &mut self,
        mut path: Vec<PathFrame<K, V>>,
        leaf_id: PageId,
        leaf: Node<K, V>,
    ) -> crate::Result<()> {
        let mut current_id = leaf_id;
        let mut current = leaf;

        loop {
            if current.len() <= self.layout.capacity(current.level) {
                self.write_node(current_id, &current)?;
                break;
            }

            // Right-neighbor redistribution would be tried here; the default
            // policy always splits
            let right = current.split_off(&*self.extractor.clone(), self.allow_duplicates)?;

            let right_id = self.store.reserve();

            let extractor = self.extractor.clone();
            let left_sep = current
                .max_key(&*extractor)
                .ok_or(Error::Corrupted("split yielded empty partition"))?;
            let right_sep = right
                .max_key(&*extractor)
                .ok_or(Error::Corrupted("split yielded empty partition"))?;

            if current.is_leaf() {
                current.next = Some(IndexEntry {
                    id: right_id,
                    separator: right_sep.clone(),
                });
            }

            self.write_node(right_id, &right)?;
            self.write_node(current_id, &current)?;

            log::trace!(
                "split node {current_id} (level {}) -> new right sibling {right_id}",
                current.level,
            );

            match path.pop() {
                Some(mut frame) => {
                    if let Some(entry) = frame.node.children_mut().get_mut(frame.child_idx) {
                        entry.separator = left_sep;
                    }

                    // The new sibling sits directly right of the split child;
                    // positional insert also handles equal separators in
                    // duplicate mode
                    frame.node.children_mut().insert(
                        frame.child_idx + 1,
                        IndexEntry {
                            id: right_id,
                            separator: right_sep,
                        },
                    );

                    current_id = frame.id;
                    current = frame.node;
                }
                None => {
                    // Root split: grow the tree by one level
                    let new_root = Node::inner(
                        current.level + 1,
                        vec![
                            IndexEntry {
                                id: current_id,
                                separator: left_sep,
                            },
                            IndexEntry {
                                id: right_id,
                                separator: right_sep.clone(),
                            },
                        ],
                    );

                    let new_root_id = self.insert_node(&new_root)?;
                    self.root_level = new_root.level;
                    self.root = Some(IndexEntry {
                        id: new_root_id,
                        separator: right_sep,
                    });

                    log::trace!("tree grew to height {}", self.root_level + 1);
                    return Ok(());
                }
            }
        }

        // Ancestors whose rightmost separator was widened still need to land
        while let Some(frame) = path.pop() {
            if frame.dirty {
                self.write_node(frame.id, &frame.node)?;
            }
        }

        Ok(())
    }

    /// Removes the first value with an equal key for which the predicate
    /// holds; returns it, or `None` if nothing matched.
    pub fn remove<F: Fn(&V, &V) -> bool>(
        &mut self,
        value: &V,
        eq: F,
    ) -> crate::Result<Option<V>> {
        let key = self.key_of(value);
        self.remove_where(&key, &|candidate| eq(candidate, value))
    }

    /// Removes the leftmost value with the given key.
    pub fn remove_first_with_key(&mut self, key: &K) -> crate::Result<Option<V>> {
        self.remove_where(key, &|_| true)
    }

    pub(crate) fn remove_where(
        &mut self,
        key: &K,
        pred: &dyn Fn(&V) -> bool,
    ) -> crate::Result<Option<V>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let (root_node, removed) = self.remove_rec(root.id, key, pred)?;

        let Some(removed) = removed else {
            return Ok(None);
        };

        self.len -= 1;
        self.write_node(root.id, &root_node)?;

        self.collapse_root()?;
        self.shrink_descriptor(key)?;

        Ok(Some(removed))
    }

    /// Removes within the subtree rooted at `id`, merging underflowed
    /// children on the way back up.
    ///
    /// The returned node has not been written; the caller owns that.
    fn remove_rec(
        &mut self,
        id: PageId,
        key: &K,
        pred: &dyn Fn(&V) -> bool,
    ) -> crate::Result<(Node<K, V>, Option<V>)> {
        let mut node = self.read_node(id)?;

        if node.is_leaf() {
            let extractor = self.extractor.clone();
            let (lo, hi) = node.leaf_range(key, key, &*extractor);

            let found = (lo..hi).find(|&i| node.values().get(i).is_some_and(|v| pred(v)));

            let removed = found.map(|i| node.values_mut().remove(i));
            return Ok((node, removed));
        }

        // Every child whose subtree may contain the key: the first one with
        // separator >= key, plus following ones while duplicates can spill
        // over the shared separator
        let mut child_idx = node.route(key);

        loop {
            let child_entry = node
                .children()
                .get(child_idx)
                .ok_or(Error::Corrupted("routing into empty inner node"))?
                .clone();

            let (child, removed) = self.remove_rec(child_entry.id, key, pred)?;

            if let Some(removed) = removed {
                if child.len() < self.layout.min_count(child.level) {
                    self.merge(&mut node, child_idx, child_entry.id, child)?;
                } else {
                    self.write_node(child_entry.id, &child)?;
                }

                return Ok((node, Some(removed)));
            }

            let next = child_idx + 1;
            let can_spill = self.allow_duplicates
                && child_entry.separator == *key
                && next < node.children().len();

            if can_spill {
                child_idx = next;
            } else {
                return Ok((node, None));
            }
        }
    }

    /// Rebalances an underflowed child against a sibling.
    ///
    /// The left sibling is preferred when it exists. If the sibling has
    /// enough surplus, entries are redistributed; otherwise the two nodes
    /// are concatenated and one page is freed.
    fn merge(
        &mut self,
        parent: &mut Node<K, V>,
        child_idx: usize,
        child_id: PageId,
        mut child: Node<K, V>,
    ) -> crate::Result<()> {
        let min = self.layout.min_count(child.level);

        let (sib_idx, sibling_is_left) = if child_idx > 0 {
            (child_idx - 1, true)
        } else {
            (child_idx + 1, false)
        };

        let Some(sib_entry) = parent.children().get(sib_idx).cloned() else {
            // No sibling to borrow from (single-child parent); leave the
            // underflow for the root fixups
            return self.write_node(child_id, &child);
        };

        let mut sibling = self.read_node(sib_entry.id)?;
        let surplus = sibling.len().saturating_sub(min);

        if sibling.len() > min && child.len() + surplus > min {
            let move_count = surplus / 2;

            match (&mut sibling.content, &mut child.content) {
                (NodeContent::Leaf(sib), NodeContent::Leaf(mine)) => {
                    if sibling_is_left {
                        let cut = sib.len() - move_count;
                        let mut moved = sib.split_off(cut);
                        moved.append(mine);
                        *mine = moved;
                    } else {
                        mine.extend(sib.drain(..move_count));
                    }
                }
                (NodeContent::Inner(sib), NodeContent::Inner(mine)) => {
                    if sibling_is_left {
                        let cut = sib.len() - move_count;
                        let mut moved = sib.split_off(cut);
                        moved.append(mine);
                        *mine = moved;
                    } else {
                        mine.extend(sib.drain(..move_count));
                    }
                }
                _ => return Err(Error::Corrupted("sibling level mismatch")),
            }

            let extractor = self.extractor.clone();

            if let Some(sep) = sibling.max_key(&*extractor) {
                if let Some(entry) = parent.children_mut().get_mut(sib_idx) {
                    entry.separator = sep;
                }
            }
            if let Some(sep) = child.max_key(&*extractor) {
                if let Some(entry) = parent.children_mut().get_mut(child_idx) {
                    entry.separator = sep;
                }
            }

            log::trace!(
                "redistributed {move_count} entries between {child_id} and {}",
                sib_entry.id,
            );

            self.write_node(sib_entry.id, &sibling)?;
            self.write_node(child_id, &child)?;

            return Ok(());
        }

        // Concatenate. The absorbing node is always the left one of the two,
        // so next-neighbor links of untouched leaves stay valid.
        if sibling_is_left {
            match (&mut sibling.content, &mut child.content) {
                (NodeContent::Leaf(sib), NodeContent::Leaf(mine)) => sib.append(mine),
                (NodeContent::Inner(sib), NodeContent::Inner(mine)) => sib.append(mine),
                _ => return Err(Error::Corrupted("sibling level mismatch")),
            }
            sibling.next = child.next.take();

            let extractor = self.extractor.clone();
            if let Some(sep) = sibling.max_key(&*extractor) {
                if let Some(entry) = parent.children_mut().get_mut(sib_idx) {
                    entry.separator = sep;
                }
            }

            parent.children_mut().remove(child_idx);

            self.write_node(sib_entry.id, &sibling)?;
            self.store.remove(child_id)?;

            log::trace!("concatenated {child_id} into left sibling {}", sib_entry.id);
        } else {
            match (&mut child.content, &mut sibling.content) {
                (NodeContent::Leaf(mine), NodeContent::Leaf(sib)) => mine.append(sib),
                (NodeContent::Inner(mine), NodeContent::Inner(sib)) => mine.append(sib),
                _ => return Err(Error::Corrupted("sibling level mismatch")),
            }
            child.next = sibling.next.take();

            let extractor = self.extractor.clone();
            if let Some(sep) = child.max_key(&*extractor) {
                if let Some(entry) = parent.children_mut().get_mut(child_idx) {
                    entry.separator = sep;
                }
            }

            parent.children_mut().remove(sib_idx);

            self.write_node(child_id, &child)?;
            self.store.remove(sib_entry.id)?;

            log::trace!("concatenated right sibling {} into {child_id}", sib_entry.id);
        }

        Ok(())
    }

    /// Drops inner roots with a single child and clears an empty tree.
    fn collapse_root(&mut self) -> crate::Result<()> {
        loop {
            let Some(root) = self.root.clone() else {
                return Ok(());
            };

            let node = self.read_node(root.id)?;

            if !node.is_leaf() && node.len() == 1 {
                let child = node
                    .children()
                    .first()
                    .ok_or(Error::Corrupted("empty inner root"))?
                    .clone();

                self.store.remove(root.id)?;
                self.root_level -= 1;
                self.root = Some(child);

                log::trace!("root collapsed to height {}", self.root_level + 1);
                continue;
            }

            if node.is_leaf() && node.is_empty() {
                self.store.remove(root.id)?;
                self.root = None;
                self.root_level = 0;
                self.range = None;

                log::trace!("tree is empty");
            }

            return Ok(());
        }
    }

    /// Shrinks the root descriptor after a boundary key was removed.
    fn shrink_descriptor(&mut self, removed_key: &K) -> crate::Result<()> {
        let Some(range) = self.range.clone() else {
            return Ok(());
        };

        if removed_key == range.min() {
            if let Some(min) = self.boundary_key(false)? {
                if let Some(range) = &mut self.range {
                    range.set_min(min);
                }
            }
        }

        if removed_key == range.max() {
            if let Some(max) = self.boundary_key(true)? {
                if let Some(range) = &mut self.range {
                    range.set_max(max);
                }
            }
        }

        Ok(())
    }

    /// Smallest (or largest) key in the tree, read from the boundary leaf.
    fn boundary_key(&mut self, rightmost: bool) -> crate::Result<Option<K>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let mut node = self.read_node(root.id)?;

        while !node.is_leaf() {
            let entry = if rightmost {
                node.children().last()
            } else {
                node.children().first()
            };

            let id = entry
                .ok_or(Error::Corrupted("empty inner node on boundary path"))?
                .id;
            node = self.read_node(id)?;
        }

        let extractor = self.extractor.clone();
        Ok(if rightmost {
            node.max_key(&*extractor)
        } else {
            node.min_key(&*extractor)
        })
    }

    /// Replaces a value with another value carrying the same key.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if the keys differ or no matching value
    /// exists.
    pub fn update(&mut self, old: &V, new: V) -> crate::Result<()>
    where
        V: PartialEq,
    {
        let key = self.key_of(old);

        if key != self.key_of(&new) {
            return Err(Error::InvalidInput("update must not change the key"));
        }

        let Some((leaf_id, leaf)) = self.leaf_for(&key)? else {
            return Err(Error::InvalidInput("value to update not found"));
        };

        self.update_in_chain(leaf_id, leaf, &key, old, new)
    }

    fn update_in_chain(
        &mut self,
        mut leaf_id: PageId,
        mut leaf: Node<K, V>,
        key: &K,
        old: &V,
        new: V,
    ) -> crate::Result<()>
    where
        V: PartialEq,
    {
        loop {
            let extractor = self.extractor.clone();
            let (lo, hi) = leaf.leaf_range(key, key, &*extractor);

            if let Some(i) = (lo..hi).find(|&i| leaf.values().get(i) == Some(old)) {
                if let Some(slot) = leaf.values_mut().get_mut(i) {
                    *slot = new;
                }
                return self.write_node(leaf_id, &leaf);
            }

            // Duplicates may spill into following leaves
            let still_spilling = self.allow_duplicates
                && leaf.max_key(&*extractor).is_some_and(|max| max == *key);

            match (&leaf.next, still_spilling) {
                (Some(next), true) => {
                    leaf_id = next.id;
                    leaf = self.read_node(leaf_id)?;
                }
                _ => return Err(Error::InvalidInput("value to update not found")),
            }
        }
    }

    /// Point lookup; returns the first value with the given key.
    ///
    /// In duplicate mode, prefer [`BPlusTree::scan`] to see all of them.
    pub fn get(&mut self, key: &K) -> crate::Result<Option<V>> {
        let Some((_, leaf)) = self.leaf_for(key)? else {
            return Ok(None);
        };

        let extractor = self.extractor.clone();
        let (lo, hi) = leaf.leaf_range(key, key, &*extractor);

        Ok(leaf.values().get(lo..hi).and_then(|s| s.first()).cloned())
    }

    /// Descends to the leaf that would contain the key.
    pub(crate) fn leaf_for(&mut self, key: &K) -> crate::Result<Option<(PageId, Node<K, V>)>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let mut id = root.id;
        let mut node = self.read_node(id)?;

        while !node.is_leaf() {
            let idx = node.route(key);
            id = node
                .children()
                .get(idx)
                .ok_or(Error::Corrupted("routing into empty inner node"))?
                .id;
            node = self.read_node(id)?;
        }

        Ok(Some((id, node)))
    }

    /// Lazily yields all values with keys in `[lo, hi]`, in key order.
    pub fn scan(&mut self, lo: K, hi: K) -> RangeScan<'_, K, V, S> {
        RangeScan::new(self, lo, hi)
    }

    /// The root page and its level, for structural inspection.
    #[doc(hidden)]
    #[must_use]
    pub fn root_handle(&self) -> Option<(PageId, u32)> {
        self.root.as_ref().map(|e| (e.id, self.root_level))
    }

    /// Reads and decodes one page, for structural inspection.
    #[doc(hidden)]
    pub fn read_page(&mut self, id: PageId) -> crate::Result<Node<K, V>> {
        self.read_node(id)
    }

    /// Snapshot of the tree descriptor for the sidecar.
    #[must_use]
    pub fn to_meta(&self) -> TreeMeta<K> {
        TreeMeta {
            root: self
                .root
                .as_ref()
                .map(|e| (e.id, self.root_level, e.separator.clone())),
            range: self.range.clone(),
            len: self.len,
        }
    }

    /// Writes the tree descriptor sidecar.
    pub fn persist(&self, path: &Path) -> crate::Result<()> {
        self.to_meta().write_to(&*self.key_codec, path)
    }

    /// Reads the sidecar at `path` and adopts its state.
    pub fn recover_in_place(&mut self, path: &Path) -> crate::Result<()> {
        let meta = TreeMeta::read_from(&*self.key_codec, path)?;

        self.root = meta.root.map(|(id, level, separator)| {
            self.root_level = level;
            IndexEntry { id, separator }
        });
        self.range = meta.range;
        self.len = meta.len;

        Ok(())
    }

    /// Reopens a tree from a store plus its sidecar.
    pub fn recover(
        config: Config,
        store: S,
        key_codec: SharedCodec<K>,
        value_codec: SharedCodec<V>,
        extractor: SharedKeyExtractor<K, V>,
        path: &Path,
    ) -> crate::Result<Self> {
        let mut tree = Self::new(config, store, key_codec, value_codec, extractor)?;
        tree.recover_in_place(path)?;
        Ok(tree)
    }

    /// Returns the child handles of all nodes at the target level whose
    /// subtree may overlap `[lo, hi]`.
    ///
    /// Level 0 yields leaf handles; higher levels yield inner handles.
    pub fn query(
        &mut self,
        lo: &K,
        hi: &K,
        level: u32,
    ) -> crate::Result<std::vec::IntoIter<IndexEntry<K>>> {
        let mut out = Vec::new();

        let Some(root) = self.root.clone() else {
            return Ok(out.into_iter());
        };

        if self.root_level < level {
            return Ok(out.into_iter());
        }

        if self.root_level == level {
            out.push(root);
            return Ok(out.into_iter());
        }

        let mut stack = vec![root.id];

        while let Some(id) = stack.pop() {
            let node = self.read_node(id)?;

            let start = node.route(lo);

            // Everything strictly right of the first separator >= hi cannot
            // overlap the range
            for entry in node.children().iter().skip(start) {
                if node.level == level + 1 {
                    out.push(entry.clone());
                } else {
                    stack.push(entry.id);
                }

                if entry.separator >= *hi {
                    break;
                }
            }
        }

        out.sort_by(|a, b| a.separator.cmp(&b.separator));
        Ok(out.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coding::{I32Codec, SharedCodec, SharedKeyExtractor},
        store::MemoryPageStore,
    };
    use std::sync::Arc;
    use test_log::test;

    /// Pads values to the inner entry size (child id + key), so leaves and
    /// inner nodes both hold exactly four entries.
    struct PaddedI32Codec;

    impl crate::coding::Codec<i32> for PaddedI32Codec {
        fn encode_into(
            &self,
            item: &i32,
            writer: &mut dyn std::io::Write,
        ) -> Result<(), crate::coding::EncodeError> {
            I32Codec.encode_into(item, writer)
        }

        fn decode_from(
            &self,
            reader: &mut dyn std::io::Read,
        ) -> Result<i32, crate::coding::DecodeError> {
            I32Codec.decode_from(reader)
        }

        fn max_size(&self) -> usize {
            12
        }
    }

    fn small_tree(allow_duplicates: bool) -> BPlusTree<i32, i32, MemoryPageStore> {
        // header = 4 + 4 + 1 + 8 + 4 = 21; both entry kinds are 12 bytes,
        // so a 69-byte block gives B = 4 and D = 2 on every level
        let key_codec: SharedCodec<i32> = Arc::new(I32Codec);
        let value_codec: SharedCodec<i32> = Arc::new(PaddedI32Codec);
        let extractor: SharedKeyExtractor<i32, i32> = Arc::new(|v: &i32| *v);

        let config = Config::new(21 + 4 * 12).allow_duplicates(allow_duplicates);

        BPlusTree::new(
            config,
            MemoryPageStore::new(),
            key_codec,
            value_codec,
            extractor,
        )
        .expect("layout must fit")
    }

    #[test]
    fn capacities_from_block_size() {
        let tree = small_tree(false);
        assert_eq!(4, tree.layout.b_leaf);
        assert_eq!(2, tree.layout.d_leaf);
    }

    #[test]
    fn insert_and_get() -> crate::Result<()> {
        let mut tree = small_tree(false);

        for key in [5, 3, 8, 1, 9, 7, 2] {
            tree.insert(key)?;
        }

        assert_eq!(7, tree.len());
        assert_eq!(Some(8), tree.get(&8)?);
        assert_eq!(None, tree.get(&4)?);

        Ok(())
    }

    #[test]
    fn duplicate_key_rejected_in_unique_mode() -> crate::Result<()> {
        let mut tree = small_tree(false);
        tree.insert(5)?;

        assert!(matches!(
            tree.insert(5),
            Err(Error::InvalidInput("duplicate key"))
        ));

        Ok(())
    }

    #[test]
    fn remove_and_collapse() -> crate::Result<()> {
        let mut tree = small_tree(false);

        for key in 1..=20 {
            tree.insert(key)?;
        }

        for key in 1..=20 {
            assert_eq!(Some(key), tree.remove(&key, |a, b| a == b)?);
        }

        assert!(tree.is_empty());
        assert_eq!(0, tree.height());
        assert_eq!(None, tree.key_range());

        // The store must not leak pages
        assert!(tree.store.is_empty());

        Ok(())
    }

    #[test]
    fn descriptor_tracks_boundaries() -> crate::Result<()> {
        let mut tree = small_tree(false);

        for key in [10, 20, 30] {
            tree.insert(key)?;
        }

        let range = tree.key_range().cloned().expect("tree is not empty");
        assert_eq!((&10, &30), (range.min(), range.max()));

        tree.remove(&30, |a, b| a == b)?;
        let range = tree.key_range().cloned().expect("tree is not empty");
        assert_eq!((&10, &20), (range.min(), range.max()));

        Ok(())
    }

    #[test]
    fn update_keeps_key() -> crate::Result<()> {
        let mut tree = small_tree(false);
        tree.insert(5)?;

        // Identity value type: updating to the same value is the only
        // key-preserving update
        assert!(tree.update(&5, 5).is_ok());
        assert!(tree.update(&5, 6).is_err());

        Ok(())
    }

    #[test]
    fn query_returns_leaf_handles() -> crate::Result<()> {
        let mut tree = small_tree(false);

        for key in 1..=30 {
            tree.insert(key)?;
        }

        let handles: Vec<_> = tree.query(&1, &30, 0)?.collect();
        assert!(handles.len() > 1);

        let mut seps: Vec<_> = handles.iter().map(|h| h.separator).collect();
        let mut sorted = seps.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, seps);

        seps.dedup();
        assert_eq!(sorted.len(), seps.len());

        Ok(())
    }
}
