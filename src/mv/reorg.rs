// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    node::{MvIndexEntry, MvNode, MvNodeContent, WeightCounters},
    roots::Root,
    MvTree,
};
use crate::{
    binary_search::partition_point,
    key_range::KeyRange,
    region::{MvRegion, MvSeparator},
    store::{PageId, PageStore},
    version::{Lifespan, Version},
    Error,
};

impl<K, V, S> MvTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Whether a node violates its structural bounds.
    ///
    /// Physical overflow counts dead entries too; the weak version condition
    /// counts only live ones. The root is exempt from underflow but retires
    /// once it is inner with a single live child.
    pub(crate) fn needs_reorg(&self, node: &MvNode<K, V>, is_root: bool, version: Version) -> bool {
        if node.len() > self.layout.capacity(node.level) {
            return true;
        }

        if is_root {
            return !node.is_leaf() && node.live_count(version) == 1;
        }

        node.live_count(version) < self.layout.min_count(node.level)
    }

    /// Live entries strictly above this count strong-overflow the node.
    pub(crate) fn strong_max(&self, level: u32) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let (b, d) = (
            self.layout.capacity(level) as f64,
            self.layout.min_count(level) as f64,
        );
        b - f64::from(self.epsilon) * d
    }

    /// Live entries strictly below this count strong-underflow the node.
    pub(crate) fn strong_min(&self, level: u32) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let d = self.layout.min_count(level) as f64;
        (1.0 + f64::from(self.epsilon)) * d
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn strong_overflows(&self, node: &MvNode<K, V>) -> bool {
        node.len() as f64 > self.strong_max(node.level)
    }

    #[allow(clippy::cast_precision_loss)]
    fn strong_underflows(&self, node: &MvNode<K, V>) -> bool {
        (node.len() as f64) < self.strong_min(node.level)
    }

    /// Copies the entries live at `version` into a fresh page image.
    pub(crate) fn copy_live(&self, node: &MvNode<K, V>, version: Version) -> MvNode<K, V> {
        let content = match &node.content {
            MvNodeContent::Leaf(entries) => MvNodeContent::Leaf(
                entries
                    .iter()
                    .filter(|e| e.lifespan.contains(version))
                    .cloned()
                    .collect(),
            ),
            MvNodeContent::Inner(entries) => MvNodeContent::Inner(
                entries
                    .iter()
                    .filter(|e| e.separator.is_live_at(version))
                    .cloned()
                    .collect(),
            ),
        };

        MvNode {
            level: node.level,
            content,
            predecessors: Vec::new(),
        }
    }

    /// Splits a fresh node at the given entry index; returns the right node
    /// and its minimum key.
    pub(crate) fn split_fresh(
        &self,
        node: &mut MvNode<K, V>,
        split_at: usize,
    ) -> crate::Result<(MvNode<K, V>, K)> {
        if split_at == 0 || split_at >= node.len() {
            return Err(Error::Corrupted("split yielded empty partition"));
        }

        let (content, right_key) = match &mut node.content {
            MvNodeContent::Leaf(entries) => {
                let right = entries.split_off(split_at);
                let key = right
                    .first()
                    .map(|e| self.key_of(&e.value))
                    .ok_or(Error::Corrupted("split yielded empty partition"))?;
                (MvNodeContent::Leaf(right), key)
            }
            MvNodeContent::Inner(entries) => {
                let right = entries.split_off(split_at);
                let key = right
                    .first()
                    .map(|e| e.separator.key().clone())
                    .ok_or(Error::Corrupted("split yielded empty partition"))?;
                (MvNodeContent::Inner(right), key)
            }
        };

        Ok((
            MvNode {
                level: node.level,
                content,
                predecessors: Vec::new(),
            },
            right_key,
        ))
    }

    /// Folds another fresh node's entries into `fresh`, restoring
    /// (key, insertion version) order.
    pub(crate) fn merge_entries(&self, fresh: &mut MvNode<K, V>, other: MvNode<K, V>) -> crate::Result<()> {
        match (&mut fresh.content, other.content) {
            (MvNodeContent::Leaf(mine), MvNodeContent::Leaf(theirs)) => {
                mine.extend(theirs);

                let extractor = self.extractor.clone();
                mine.sort_by(|a, b| {
                    extractor
                        .key_of(&a.value)
                        .cmp(&extractor.key_of(&b.value))
                        .then(a.lifespan.begin().cmp(&b.lifespan.begin()))
                });
            }
            (MvNodeContent::Inner(mine), MvNodeContent::Inner(theirs)) => {
                mine.extend(theirs);
                mine.sort_by(|a, b| a.separator.cmp(&b.separator));
            }
            _ => return Err(Error::Corrupted("sibling level mismatch")),
        }

        Ok(())
    }

    /// The merge partner: the live sibling the parent would route the
    /// node's separator key to, preferring the left neighbor.
    pub(crate) fn merge_sibling(&self, parent: &MvNode<K, V>, key: &K, version: Version) -> Option<usize> {
        let live = parent.live_children(version);

        let pos = partition_point(&live, |&i| {
            parent
                .children()
                .get(i)
                .is_some_and(|e| e.separator.key() <= key)
        });

        if pos > 0 {
            live.get(pos - 1).copied()
        } else {
            live.first().copied()
        }
    }

    /// Seed counters of a freshly built page.
    pub(crate) fn seed_weight(node: &MvNode<K, V>, version: Version) -> WeightCounters {
        let live = match &node.content {
            MvNodeContent::Leaf(_) => node.live_count(version) as i64,
            MvNodeContent::Inner(entries) => entries.iter().map(|e| e.weight.live).sum(),
        };

        WeightCounters {
            live,
            total: live.max(0).unsigned_abs(),
        }
    }

    /// Closes the parent entry at `idx`; point lifespans are dropped
    /// physically. Returns the closed entry.
    pub(crate) fn close_parent_entry(
        &mut self,
        parent: &mut MvNode<K, V>,
        idx: usize,
        version: Version,
    ) -> crate::Result<MvIndexEntry<K>> {
        let entry = parent
            .children_mut()
            .get_mut(idx)
            .ok_or(Error::Corrupted("parent entry missing"))?;

        entry.separator.lifespan_mut().kill(version);

        let closed = entry.clone();

        if closed.separator.lifespan().is_point() {
            parent.children_mut().remove(idx);
        }

        Ok(closed)
    }

    /// Reorganizes a violated non-root node: version split, then key split
    /// on strong overflow or strong merge on strong underflow, or both
    /// (a merge-key-split).
    pub(crate) fn reorganize_child(
        &mut self,
        child_id: PageId,
        child: MvNode<K, V>,
        parent: &mut MvNode<K, V>,
        child_idx: usize,
        version: Version,
    ) -> crate::Result<()> {
        // Persist the old page while its mutations still fit; on physical
        // overflow it keeps its pre-insert image, which is the correct
        // historical state
        if child.len() <= self.layout.capacity(child.level) {
            self.write_mv_node(child_id, &child)?;
        }

        let old_entry = self.close_parent_entry(parent, child_idx, version)?;
        self.enqueue_purge(child_id, version);

        // Version split
        let mut fresh = self.copy_live(&child, version);
        if fresh.is_leaf() {
            fresh.predecessors.push(old_entry.clone());
        }

        let mut sep_key = old_entry.separator.key().clone();
        let mut merged = false;

        if self.strong_underflows(&fresh) {
            if let Some(sib_idx) = self.merge_sibling(parent, &sep_key, version) {
                let sib_closed = self.close_parent_entry(parent, sib_idx, version)?;
                let sib_node = self.read_mv_node(sib_closed.id)?;
                self.enqueue_purge(sib_closed.id, version);

                // Strong merge: only the sibling's live entries migrate
                let sib_live = self.copy_live(&sib_node, version);
                self.merge_entries(&mut fresh, sib_live)?;

                if sib_closed.separator.key() < &sep_key {
                    sep_key = sib_closed.separator.key().clone();
                }

                if fresh.is_leaf() {
                    fresh.predecessors.push(sib_closed);
                }

                merged = true;

                log::trace!(
                    "strong merge of node {child_id} at version {version} (level {})",
                    fresh.level,
                );
            }
        }

        let mut posts: Vec<(MvNode<K, V>, K)> = Vec::new();

        if self.strong_overflows(&fresh) {
            let split_at = fresh.len() / 2;
            let (mut right, right_key) = self.split_fresh(&mut fresh, split_at)?;

            if fresh.is_leaf() {
                if merged {
                    // Merge-key-split: each old page goes to the side of the
                    // split boundary its key space starts in
                    let preds = std::mem::take(&mut fresh.predecessors);
                    for pred in preds {
                        if pred.separator.key() < &right_key {
                            fresh.predecessors.push(pred);
                        } else {
                            right.predecessors.push(pred);
                        }
                    }
                } else {
                    // A plain key split leaves copies of the old page's
                    // records on both sides
                    right.predecessors = fresh.predecessors.clone();
                }
            }

            log::trace!(
                "key split of node {child_id} at version {version} (boundary {right_key:?})",
            );

            posts.push((fresh, sep_key));
            posts.push((right, right_key));
        } else {
            posts.push((fresh, sep_key));
        }

        for (node, key) in posts {
            let weight = Self::seed_weight(&node, version);
            let id = self.insert_mv_node(&node)?;

            parent.grow_inner(MvIndexEntry {
                id,
                separator: MvSeparator::new(key, Lifespan::from(version)),
                weight,
            });
        }

        Ok(())
    }

    /// Reorganizes the root: retire on degeneracy, else a root-level version
    /// split that may grow the tree by one level.
    pub(crate) fn reorganize_root(
        &mut self,
        root_id: PageId,
        root: MvNode<K, V>,
        version: Version,
    ) -> crate::Result<()> {
        let root_entry = self.root.clone().ok_or(Error::Corrupted("missing root entry"))?;

        let fits = root.len() <= self.layout.capacity(root.level);

        if !root.is_leaf() && root.live_count(version) == 1 && fits {
            // Root degenerated to a single live child: retire and promote
            self.write_mv_node(root_id, &root)?;
            self.retire_root(root_id, &root_entry, version)?;
            self.enqueue_purge(root_id, version);

            let idx = root
                .live_children(version)
                .first()
                .copied()
                .ok_or(Error::Corrupted("degenerate root without live child"))?;
            let child = root
                .children()
                .get(idx)
                .cloned()
                .ok_or(Error::Corrupted("degenerate root without live child"))?;

            self.root = Some(child);
            self.root_level -= 1;

            log::debug!("root retired at version {version}; height is now {}", self.height());
            return Ok(());
        }

        // Root-level version split
        if fits {
            self.write_mv_node(root_id, &root)?;
        }
        self.retire_root(root_id, &root_entry, version)?;
        self.enqueue_purge(root_id, version);

        let mut old_entry = root_entry.clone();
        old_entry.separator.lifespan_mut().kill(version);

        let mut fresh = self.copy_live(&root, version);
        if fresh.is_leaf() {
            fresh.predecessors.push(old_entry);
        }

        let sep_key = root_entry.separator.key().clone();

        if self.strong_overflows(&fresh) {
            let split_at = fresh.len() / 2;
            let (mut right, right_key) = self.split_fresh(&mut fresh, split_at)?;

            if fresh.is_leaf() {
                right.predecessors = fresh.predecessors.clone();
            }

            let left_weight = Self::seed_weight(&fresh, version);
            let right_weight = Self::seed_weight(&right, version);

            let left_id = self.insert_mv_node(&fresh)?;
            let right_id = self.insert_mv_node(&right)?;

            let new_root = MvNode::inner(
                fresh.level + 1,
                vec![
                    MvIndexEntry {
                        id: left_id,
                        separator: MvSeparator::new(sep_key.clone(), Lifespan::from(version)),
                        weight: left_weight,
                    },
                    MvIndexEntry {
                        id: right_id,
                        separator: MvSeparator::new(right_key, Lifespan::from(version)),
                        weight: right_weight,
                    },
                ],
            );

            let root_weight = Self::seed_weight(&new_root, version);
            let new_root_id = self.insert_mv_node(&new_root)?;

            self.root_level = new_root.level;
            self.root = Some(MvIndexEntry {
                id: new_root_id,
                separator: MvSeparator::new(sep_key, Lifespan::from(version)),
                weight: root_weight,
            });

            log::debug!(
                "root version-split grew the tree to height {} at version {version}",
                self.height(),
            );
        } else {
            let weight = Self::seed_weight(&fresh, version);
            let id = self.insert_mv_node(&fresh)?;

            self.root = Some(MvIndexEntry {
                id,
                separator: MvSeparator::new(sep_key, Lifespan::from(version)),
                weight,
            });

            log::debug!("root version-split at version {version}");
        }

        Ok(())
    }

    /// Records the current root in the historical-root catalog, its key
    /// range widened to the root descriptor's bounds.
    pub(crate) fn retire_root(
        &mut self,
        root_id: PageId,
        root_entry: &MvIndexEntry<K>,
        version: Version,
    ) -> crate::Result<()> {
        let insert_version = root_entry.separator.lifespan().begin();

        if insert_version >= version {
            // A root created and retired at the same version covers nothing
            return Ok(());
        }

        let max = self
            .descriptor
            .as_ref()
            .map_or_else(|| self.key_domain_min.clone(), |d| d.keys().max().clone());

        let region = MvRegion::new(
            KeyRange::new((self.key_domain_min.clone(), max)),
            Lifespan::between(insert_version, version),
        );

        self.roots.retire(Root {
            region,
            id: root_id,
            level: self.root_level,
        })
    }
}
