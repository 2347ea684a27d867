// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Element queues staging the bulk stream
pub mod queue;

pub(crate) mod weight;

use crate::{
    key_range::KeyRange,
    mv::{
        node::{MvIndexEntry, MvLeafEntry, MvNode, MvNodeContent, WeightCounters},
        roots::Root,
        MvTree,
    },
    region::{MvRegion, MvSeparator},
    store::{PageId, PageStore},
    version::{Lifespan, Version},
    Error,
};
use queue::{AnyQueue, BulkOp, Element, ElementQueue, SharedQueueFactory};
use rustc_hash::FxHashMap;
use weight::{apply_op, ReorgToken, WeightBounds};

/// Parameters of a bulk load or bulk insert
pub struct BulkOptions<V> {
    /// Memory budget in number of elements; a quarter of it is used as the
    /// batch and per-buffer size
    pub memory_capacity: usize,

    /// Branching parameter of the weight bounds; defaults to `D_inner`
    pub parameter_a: Option<usize>,

    /// Factory for the staging queues
    pub queues: SharedQueueFactory<V>,
}

impl<V> BulkOptions<V> {
    /// Creates options with the default branching parameter.
    #[must_use]
    pub fn new(memory_capacity: usize, queues: SharedQueueFactory<V>) -> Self {
        Self {
            memory_capacity,
            parameter_a: None,
            queues,
        }
    }

    /// Overrides the branching parameter.
    #[must_use]
    pub fn parameter_a(mut self, parameter_a: usize) -> Self {
        self.parameter_a = Some(parameter_a);
        self
    }
}

impl<K, V, S> MvTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone + PartialEq,
    S: PageStore,
{
    /// Bulk-loads an empty tree from an element stream.
    pub fn bulk_load<I: IntoIterator<Item = Element<V>>>(
        &mut self,
        elements: I,
        opts: &BulkOptions<V>,
    ) -> crate::Result<()> {
        if self.root.is_some() {
            return Err(Error::InvalidInput("bulk_load requires an empty tree"));
        }

        self.bulk_insert(elements, opts)
    }

    /// Applies an element stream through per-node buffers with
    /// weight-balanced reorganizations, amortizing I/O over batches.
    pub fn bulk_insert<I: IntoIterator<Item = Element<V>>>(
        &mut self,
        elements: I,
        opts: &BulkOptions<V>,
    ) -> crate::Result<()> {
        let mut loader = Loader::new(self, opts)?;

        for element in elements {
            loader.offer(element)?;
        }

        loader.finish()
    }
}

struct BufferSlot<V> {
    level: u32,
    queue: AnyQueue<V>,
}

/// Buffered bulk machinery layered over a tree for the duration of one
/// stream.
struct Loader<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    tree: &'a mut MvTree<K, V, S>,
    bounds: WeightBounds,
    queues: SharedQueueFactory<V>,
    buffers: FxHashMap<PageId, BufferSlot<V>>,

    /// Nodes whose buffer exceeded its capacity, flushed after the current
    /// batch
    full_buffers: Vec<PageId>,

    root_queue: AnyQueue<V>,
    reduced_memory: usize,
    first_buffer_level: u32,
    min_version: Option<Version>,
    started_empty: bool,
}

impl<'a, K, V, S> Loader<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone + PartialEq,
    S: PageStore,
{
    fn new(tree: &'a mut MvTree<K, V, S>, opts: &BulkOptions<V>) -> crate::Result<Self> {
        if opts.memory_capacity == 0 {
            return Err(Error::InvalidInput("memory_capacity must be positive"));
        }

        let reduced_memory = (opts.memory_capacity / 4).max(1);
        let parameter_a = opts.parameter_a.unwrap_or(tree.layout.d_inner).max(2);

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let first_buffer_level = {
            let b_inner = tree.layout.b_inner as f64;
            let raw = (reduced_memory as f64 / b_inner).log(b_inner).floor();

            if raw.is_finite() && raw >= 1.0 {
                raw as u32
            } else {
                1
            }
        };

        log::debug!(
            "bulk loader: reduced_memory={reduced_memory}, first_buffer_level={first_buffer_level}, A={parameter_a}",
        );

        let bounds = WeightBounds::new(tree.layout, tree.epsilon, parameter_a);
        let root_queue = opts.queues.create_queue()?;
        let started_empty = tree.root.is_none();

        let mut loader = Self {
            tree,
            bounds,
            queues: opts.queues.clone(),
            buffers: FxHashMap::default(),
            full_buffers: Vec::new(),
            root_queue,
            reduced_memory,
            first_buffer_level,
            min_version: None,
            started_empty,
        };

        // Regular writes do not maintain weight counters, so a bulk run on
        // an existing tree starts by seeding them from the live counts
        loader.seed_weights()?;

        Ok(loader)
    }

    /// Walks the live tree bottom-up, setting every entry's counters to its
    /// subtree's live count.
    fn seed_weights(&mut self) -> crate::Result<()> {
        let Some(root) = self.tree.root.clone() else {
            return Ok(());
        };

        let version = self.tree.current_version.unwrap_or(0);
        let weight = self.seed_subtree(root.id, version)?;

        if let Some(root) = &mut self.tree.root {
            root.weight = weight;
        }

        Ok(())
    }

    fn seed_subtree(&mut self, id: PageId, version: Version) -> crate::Result<WeightCounters> {
        let mut node = self.tree.read_mv_node(id)?;

        if node.is_leaf() {
            let live = node.live_count(version) as i64;

            // The op counter starts at the physical entry count: inserts
            // raise both in lockstep, so the aging bound fires before a
            // page can physically overflow
            return Ok(WeightCounters {
                live,
                total: node.len() as u64,
            });
        }

        let mut sum = 0;

        for idx in 0..node.children().len() {
            let Some(entry) = node.children().get(idx) else {
                continue;
            };

            if !entry.separator.is_live_at(version) {
                continue;
            }

            let child_id = entry.id;
            let weight = self.seed_subtree(child_id, version)?;

            if let Some(entry) = node.children_mut().get_mut(idx) {
                entry.weight = weight;
            }
            sum += weight.live;
        }

        self.tree.write_mv_node(id, &node)?;

        Ok(WeightCounters {
            live: sum,
            total: sum.max(0).unsigned_abs(),
        })
    }

    /// Stages one stream element; drains a batch when the root queue fills.
    fn offer(&mut self, element: Element<V>) -> crate::Result<()> {
        self.root_queue.push(element)?;

        if self.root_queue.len() >= self.reduced_memory {
            self.drain_batch()?;
        }

        Ok(())
    }

    /// Drains up to one batch from the root queue, then flushes every
    /// buffer that ran full in the process.
    fn drain_batch(&mut self) -> crate::Result<()> {
        for _ in 0..self.reduced_memory {
            let Some(element) = self.root_queue.pop()? else {
                break;
            };

            self.push_entry(element)?;
        }

        while let Some(id) = self.full_buffers.pop() {
            self.flush_buffer(id)?;
        }

        Ok(())
    }

    /// Final drain: empties the root queue and all buffers, then records the
    /// span of pre-load history in the catalog.
    fn finish(mut self) -> crate::Result<()> {
        while !self.root_queue.is_empty() {
            self.drain_batch()?;
        }

        self.push_all_buffers()?;

        if self.started_empty {
            self.retire_load_span()?;
        }

        Ok(())
    }

    fn is_buffer_level(&self, level: u32) -> bool {
        level > 0 && level % self.first_buffer_level == 0
    }

    fn track_min(&mut self, version: Version) {
        self.min_version = Some(self.min_version.map_or(version, |v| v.min(version)));
    }

    /// Routes one element downward from the root.
    fn push_entry(&mut self, element: Element<V>) -> crate::Result<()> {
        if self.tree.root.is_none() {
            match element.op {
                BulkOp::Insert => {
                    self.tree.begin_write(element.version)?;
                    self.track_min(element.version);

                    let key = self.tree.key_of(&element.value);
                    return self.tree.bootstrap(element.version, element.value, key);
                }
                BulkOp::Update | BulkOp::Delete => {
                    log::debug!("dropping {:?} on an empty tree", element.op);
                    return Ok(());
                }
            }
        }

        self.tree.begin_write(element.version)?;
        self.track_min(element.version);

        if let Some(descriptor) = &mut self.tree.descriptor {
            if element.op == BulkOp::Insert {
                let key = self.tree.extractor.key_of(&element.value);
                descriptor.keys_mut().extend_with_key(&key);
            }
        }

        // Weight handling of the root entry itself: it is checked before it
        // is charged with the element
        let root_entry = self
            .tree
            .root
            .clone()
            .ok_or(Error::Corrupted("missing root entry"))?;

        if self
            .bounds
            .violates(&root_entry.weight, self.tree.root_level, true)
        {
            let token = self
                .bounds
                .choose_token(&root_entry.weight, self.tree.root_level, true, None)
                .ok_or(Error::Corrupted("weight violation without a token"))?;

            self.reorganize_root_weighted(token, element.version)?;
        }

        if let Some(root) = &mut self.tree.root {
            apply_op(&mut root.weight, element.op);
        }

        let root_id = self
            .tree
            .root
            .as_ref()
            .map(|r| r.id)
            .ok_or(Error::Corrupted("missing root entry"))?;
        let root_node = self.tree.read_mv_node(root_id)?;

        self.descend_apply(root_id, root_node, element)
    }

    /// Routes one element downward from a node, applying buffer and weight
    /// machinery at every step.
    fn descend_apply(
        &mut self,
        start_id: PageId,
        start_node: MvNode<K, V>,
        element: Element<V>,
    ) -> crate::Result<()> {
        let version = element.version;
        let key = self.tree.key_of(&element.value);

        let mut frames: Vec<(PageId, MvNode<K, V>)> = Vec::new();
        let mut current = (start_id, start_node);

        // One reorganization attempt per node visit; an unresolved
        // violation (say, an underweight subtree without a merge partner)
        // must not spin
        let mut reorganized_here = false;

        loop {
            if current.1.is_leaf() {
                self.apply_leaf(&mut current.1, &element)?;
                break;
            }

            let Some(child_idx) = current.1.route_live(&key, version) else {
                return Err(Error::Corrupted("inner node without live children"));
            };

            let Some(child_entry) = current.1.children().get(child_idx).cloned() else {
                return Err(Error::Corrupted("routing out of bounds"));
            };

            let child_level = current.1.level - 1;

            // 1. Weight violation: flush involved buffers, reorganize, and
            //    re-route within the mutated parent
            if !reorganized_here && self.bounds.violates(&child_entry.weight, child_level, false) {
                let parent_single = current.1.live_count(version) == 1;

                let neighbor_live = self
                    .tree
                    .merge_sibling(&current.1, child_entry.separator.key(), version)
                    .and_then(|i| current.1.children().get(i))
                    .map(|e| e.weight.live);

                let token = self
                    .bounds
                    .choose_token(&child_entry.weight, child_level, parent_single, neighbor_live)
                    .ok_or(Error::Corrupted("weight violation without a token"))?;

                self.flush_buffer(child_entry.id)?;

                if matches!(token, ReorgToken::Merge | ReorgToken::MergeKeySplit) {
                    let sibling_id = self
                        .tree
                        .merge_sibling(&current.1, child_entry.separator.key(), version)
                        .and_then(|i| current.1.children().get(i))
                        .map(|e| e.id);

                    if let Some(id) = sibling_id {
                        self.flush_buffer(id)?;
                    }
                }

                self.reorganize_entry(&mut current.1, child_idx, token, version)?;
                reorganized_here = true;

                // The posts can overflow this node physically even after its
                // history was evicted; cascade with version splits along the
                // stored path, exactly like the non-bulk write path
                while current.1.len() > self.tree.layout.capacity(current.1.level) {
                    let Some((parent_id, mut parent)) = frames.pop() else {
                        self.tree.reorganize_root(current.0, current.1, version)?;

                        let root_id = self
                            .tree
                            .root
                            .as_ref()
                            .map(|r| r.id)
                            .ok_or(Error::Corrupted("missing root entry"))?;
                        current = (root_id, self.tree.read_mv_node(root_id)?);
                        break;
                    };

                    let idx = parent
                        .children()
                        .iter()
                        .position(|e| e.id == current.0)
                        .ok_or(Error::Corrupted("parent entry missing"))?;

                    self.tree
                        .reorganize_child(current.0, current.1, &mut parent, idx, version)?;

                    current = (parent_id, parent);
                }

                continue;
            }

            // 2. A full buffer is only marked; the batch loop flushes it
            if self.is_buffer_level(child_level)
                && self
                    .buffers
                    .get(&child_entry.id)
                    .is_some_and(|slot| slot.queue.len() >= self.reduced_memory)
                && !self.full_buffers.contains(&child_entry.id)
            {
                self.full_buffers.push(child_entry.id);
            }

            // 3. Charge the entry with the element
            if let Some(entry) = current.1.children_mut().get_mut(child_idx) {
                apply_op(&mut entry.weight, element.op);
            }

            // 4. Park the element in the child's buffer, or step down
            if self.is_buffer_level(child_level) {
                self.buffer_push(child_entry.id, child_level, element)?;
                break;
            }

            let child_node = self.tree.read_mv_node(child_entry.id)?;
            frames.push(current);
            current = (child_entry.id, child_node);
            reorganized_here = false;
        }

        // Land the charged counters and the leaf mutation
        let (id, node) = current;
        self.tree.write_mv_node(id, &node)?;

        while let Some((id, node)) = frames.pop() {
            self.tree.write_mv_node(id, &node)?;
        }

        Ok(())
    }

    /// Applies one element at a leaf.
    fn apply_leaf(&mut self, leaf: &mut MvNode<K, V>, element: &Element<V>) -> crate::Result<()> {
        let version = element.version;
        let extractor = self.tree.extractor.clone();
        let key_fn = |v: &V| extractor.key_of(v);
        let key = key_fn(&element.value);

        match element.op {
            BulkOp::Insert => {
                leaf.grow_leaf(
                    MvLeafEntry {
                        value: element.value.clone(),
                        lifespan: Lifespan::from(version),
                    },
                    &key_fn,
                );
            }
            BulkOp::Delete => {
                let target = leaf.find_live(&key, version, &key_fn, &|v| v == &element.value);

                match target {
                    Some(idx) => Self::kill_leaf_entry(leaf, idx, version),
                    None => log::debug!("bulk delete target not found"),
                }
            }
            BulkOp::Update => {
                // Replace the live record with this key
                let target = leaf.find_live(&key, version, &key_fn, &|_| true);

                match target {
                    Some(idx) => Self::kill_leaf_entry(leaf, idx, version),
                    None => log::debug!("bulk update target not found"),
                }

                leaf.grow_leaf(
                    MvLeafEntry {
                        value: element.value.clone(),
                        lifespan: Lifespan::from(version),
                    },
                    &key_fn,
                );
            }
        }

        Ok(())
    }

    fn kill_leaf_entry(leaf: &mut MvNode<K, V>, idx: usize, version: Version) {
        let entries = leaf.leaf_entries_mut();

        if let Some(entry) = entries.get_mut(idx) {
            if entry.lifespan.begin() == version {
                entries.remove(idx);
            } else {
                entry.lifespan.kill(version);
            }
        }
    }

    fn buffer_push(&mut self, id: PageId, level: u32, element: Element<V>) -> crate::Result<()> {
        if !self.buffers.contains_key(&id) {
            let queue = self.queues.create_queue()?;
            self.buffers.insert(id, BufferSlot { level, queue });
        }

        match self.buffers.get_mut(&id) {
            Some(slot) => slot.queue.push(element),
            None => Err(Error::Corrupted("buffer slot vanished")),
        }
    }

    /// Empties one node's buffer by routing its elements below the node.
    ///
    /// Buffered elements were already charged to the node's own counters,
    /// so routing restarts underneath it.
    fn flush_buffer(&mut self, id: PageId) -> crate::Result<()> {
        let Some(mut slot) = self.buffers.remove(&id) else {
            return Ok(());
        };

        if !slot.queue.is_empty() {
            log::trace!(
                "flushing {} buffered elements of node {id} (level {})",
                slot.queue.len(),
                slot.level,
            );
        }

        while let Some(element) = slot.queue.pop()? {
            let node = self.tree.read_mv_node(id)?;
            self.descend_apply(id, node, element)?;
        }

        Ok(())
    }

    /// Final flush: drains buffer-bearing nodes top-down until every buffer
    /// is empty.
    fn push_all_buffers(&mut self) -> crate::Result<()> {
        loop {
            let next = self
                .buffers
                .iter()
                .filter(|(_, slot)| !slot.queue.is_empty())
                .max_by_key(|(_, slot)| slot.level)
                .map(|(id, _)| *id);

            let Some(id) = next else {
                break;
            };

            self.flush_buffer(id)?;
        }

        self.buffers.clear();
        self.full_buffers.clear();

        Ok(())
    }

    /// After a load from scratch, maps the loaded version span onto the
    /// final live root so time travel below its insert version resolves.
    fn retire_load_span(&mut self) -> crate::Result<()> {
        let Some(min_version) = self.min_version else {
            return Ok(());
        };

        let Some(root) = self.tree.root.clone() else {
            return Ok(());
        };

        let insert_version = root.separator.lifespan().begin();

        if insert_version <= min_version {
            return Ok(());
        }

        let max = self
            .tree
            .descriptor
            .as_ref()
            .map_or_else(|| self.tree.key_domain_min.clone(), |d| d.keys().max().clone());

        let region = MvRegion::new(
            KeyRange::new((self.tree.key_domain_min.clone(), max)),
            Lifespan::between(min_version, insert_version),
        );

        self.tree.roots.retire(Root {
            region,
            id: root.id,
            level: self.tree.root_level,
        })
    }

    /// Executes one reorganization token on a child entry: always a version
    /// split of the live entries, plus a key split, a strong merge, or
    /// both.
    fn reorganize_entry(
        &mut self,
        parent: &mut MvNode<K, V>,
        child_idx: usize,
        token: ReorgToken,
        version: Version,
    ) -> crate::Result<()> {
        let old_entry = self.tree.close_parent_entry(parent, child_idx, version)?;
        let child = self.tree.read_mv_node(old_entry.id)?;
        self.tree.enqueue_purge(old_entry.id, version);

        let mut fresh = self.tree.copy_live(&child, version);
        if fresh.is_leaf() {
            fresh.predecessors.push(old_entry.clone());
        }

        let mut sep_key = old_entry.separator.key().clone();
        let mut merged = false;

        if matches!(token, ReorgToken::Merge | ReorgToken::MergeKeySplit) {
            if let Some(sib_idx) = self.tree.merge_sibling(parent, &sep_key, version) {
                let sib_closed = self.tree.close_parent_entry(parent, sib_idx, version)?;
                let sib_node = self.tree.read_mv_node(sib_closed.id)?;
                self.tree.enqueue_purge(sib_closed.id, version);

                let sib_live = self.tree.copy_live(&sib_node, version);
                self.tree.merge_entries(&mut fresh, sib_live)?;

                if sib_closed.separator.key() < &sep_key {
                    sep_key = sib_closed.separator.key().clone();
                }

                if fresh.is_leaf() {
                    fresh.predecessors.push(sib_closed);
                }

                merged = true;
            }
        }

        let mut posts: Vec<(MvNode<K, V>, K)> = Vec::new();

        let wants_split = matches!(token, ReorgToken::KeySplit | ReorgToken::MergeKeySplit)
            || (merged && self.tree.strong_overflows(&fresh));

        if wants_split && fresh.len() >= 2 {
            let split_at = self.split_index(&fresh);
            let (mut right, right_key) = self.tree.split_fresh(&mut fresh, split_at)?;

            if fresh.is_leaf() {
                if merged {
                    let preds = std::mem::take(&mut fresh.predecessors);
                    for pred in preds {
                        if pred.separator.key() < &right_key {
                            fresh.predecessors.push(pred);
                        } else {
                            right.predecessors.push(pred);
                        }
                    }
                } else {
                    right.predecessors = fresh.predecessors.clone();
                }
            }

            posts.push((fresh, sep_key));
            posts.push((right, right_key));
        } else {
            posts.push((fresh, sep_key));
        }

        for (mut node, key) in posts {
            self.spill_history(&mut node, version)?;

            let weight = MvTree::<K, V, S>::seed_weight(&node, version);
            let id = self.tree.insert_mv_node(&node)?;

            parent.grow_inner(MvIndexEntry {
                id,
                separator: MvSeparator::new(key, Lifespan::from(version)),
                weight,
            });
        }

        // The parent itself may physically overflow from the posts; dead
        // entries are evicted into an overflow page
        self.spill_history(parent, version)?;

        Ok(())
    }

    /// Weight-balanced split index for inner nodes, median for leaves.
    fn split_index(&self, node: &MvNode<K, V>) -> usize {
        if node.is_leaf() {
            return node.len() / 2;
        }

        let target = self.bounds.max_live(node.level) / 2.0;
        let mut acc = 0.0;

        for (idx, entry) in node.children().iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            {
                acc += entry.weight.live.max(0) as f64;
            }

            if acc > target {
                return (idx + 1).clamp(1, node.len() - 1);
            }
        }

        node.len() / 2
    }

    /// Evicts an overflowing inner node's dead entries into an overflow
    /// page, backward-linked through the predecessor slot (the eager
    /// overflow-chain variant).
    fn spill_history(&mut self, node: &mut MvNode<K, V>, version: Version) -> crate::Result<()> {
        if node.is_leaf() || node.len() <= self.tree.layout.capacity(node.level) {
            return Ok(());
        }

        let (live, dead): (Vec<_>, Vec<_>) = node
            .children_mut()
            .drain(..)
            .partition(|e| e.separator.is_live_at(version));

        if dead.is_empty() {
            // Nothing to evict; the caller resolves live overflow with a
            // version split cascade
            *node.children_mut() = live;
            return Ok(());
        }

        let chain_begin = dead
            .iter()
            .map(|e| e.separator.lifespan().begin())
            .min()
            .unwrap_or(version);
        let chain_key = dead
            .iter()
            .map(|e| e.separator.key().clone())
            .min()
            .ok_or(Error::Corrupted("overflow chain without entries"))?;

        let mut page = MvNode {
            level: node.level,
            content: MvNodeContent::Inner(dead),
            predecessors: std::mem::take(&mut node.predecessors),
        };

        *node.children_mut() = live;

        // Overflow pages hold history only; weights stay zero
        let page_len = page.len();
        page.children_mut()
            .sort_by(|a, b| a.separator.cmp(&b.separator));

        let id = self.tree.insert_mv_node(&page)?;

        node.predecessors = vec![MvIndexEntry {
            id,
            separator: MvSeparator::new(
                chain_key,
                Lifespan::between(chain_begin, version),
            ),
            weight: WeightCounters::default(),
        }];

        log::trace!("evicted {page_len} historical entries into overflow page {id}");

        Ok(())
    }

    /// Root-level token execution: a version split that may grow the tree.
    fn reorganize_root_weighted(
        &mut self,
        token: ReorgToken,
        version: Version,
    ) -> crate::Result<()> {
        let root_entry = self
            .tree
            .root
            .clone()
            .ok_or(Error::Corrupted("missing root entry"))?;

        let root = self.tree.read_mv_node(root_entry.id)?;

        self.tree.retire_root(root_entry.id, &root_entry, version)?;
        self.tree.enqueue_purge(root_entry.id, version);

        let mut old_entry = root_entry.clone();
        old_entry.separator.lifespan_mut().kill(version);

        let mut fresh = self.tree.copy_live(&root, version);
        if fresh.is_leaf() {
            fresh.predecessors.push(old_entry);
        }

        let sep_key = root_entry.separator.key().clone();

        if token == ReorgToken::KeySplit && fresh.len() >= 2 {
            let split_at = self.split_index(&fresh);
            let (mut right, right_key) = self.tree.split_fresh(&mut fresh, split_at)?;

            if fresh.is_leaf() {
                right.predecessors = fresh.predecessors.clone();
            }

            let left_weight = MvTree::<K, V, S>::seed_weight(&fresh, version);
            let right_weight = MvTree::<K, V, S>::seed_weight(&right, version);

            let left_id = self.tree.insert_mv_node(&fresh)?;
            let right_id = self.tree.insert_mv_node(&right)?;

            let new_root = MvNode::inner(
                fresh.level + 1,
                vec![
                    MvIndexEntry {
                        id: left_id,
                        separator: MvSeparator::new(
                            sep_key.clone(),
                            Lifespan::from(version),
                        ),
                        weight: left_weight,
                    },
                    MvIndexEntry {
                        id: right_id,
                        separator: MvSeparator::new(
                            right_key,
                            Lifespan::from(version),
                        ),
                        weight: right_weight,
                    },
                ],
            );

            let root_weight = MvTree::<K, V, S>::seed_weight(&new_root, version);
            let new_root_id = self.tree.insert_mv_node(&new_root)?;

            self.tree.root_level = new_root.level;
            self.tree.root = Some(MvIndexEntry {
                id: new_root_id,
                separator: MvSeparator::new(sep_key, Lifespan::from(version)),
                weight: root_weight,
            });

            log::debug!(
                "bulk root key split grew the tree to height {}",
                self.tree.height(),
            );
        } else {
            let weight = MvTree::<K, V, S>::seed_weight(&fresh, version);
            let id = self.tree.insert_mv_node(&fresh)?;

            self.tree.root = Some(MvIndexEntry {
                id,
                separator: MvSeparator::new(sep_key, Lifespan::from(version)),
                weight,
            });

            log::debug!("bulk root version split at version {version}");
        }

        Ok(())
    }
}
