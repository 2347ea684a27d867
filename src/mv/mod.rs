// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Multi-version page layout
pub mod node;

/// Version-aware range and time-travel cursors
pub mod query;

pub(crate) mod reorg;

/// The historical-root catalog
pub mod roots;

use crate::{
    coding::{SharedCodec, SharedKeyExtractor},
    config::MvConfig,
    key_range::KeyRange,
    meta::MvTreeMeta,
    region::{MvRegion, MvSeparator},
    store::{PageId, PageStore},
    tree::node::NodeLayout,
    version::{Lifespan, Version},
    Error,
};
use node::{MvIndexEntry, MvLayoutSizes, MvLeafEntry, MvNode, WeightCounters};
use roots::{Root, RootCatalog};
use std::{collections::VecDeque, path::Path};

pub(crate) struct MvFrame<K, V> {
    pub id: PageId,
    pub node: MvNode<K, V>,
    pub child_idx: usize,
}

/// Where a query at some version starts
pub(crate) enum RootRef<K> {
    Live { entry: MvIndexEntry<K>, level: u32 },
    Historical(Root<K>),
}

/// A disk-resident multi-version B+-tree.
///
/// Every write carries a version; deletions close a record's lifespan
/// instead of dropping it, so point, range, and time-travel queries can be
/// answered for any version. Structural reorganizations follow the strong
/// version condition: a node that violates its capacity bounds is first
/// copied to a fresh page holding only its live records (a version split),
/// then key-split or strong-merged until the copy satisfies the
/// `epsilon`-slack bounds.
///
/// Retired roots are tracked in a historical-root catalog, itself a
/// [`crate::BPlusTree`]. Pages that became fully historical sit in a purge
/// queue until the cutoff version passes their death version.
pub struct MvTree<K, V, S: PageStore>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
{
    pub(crate) store: S,
    pub(crate) layout: NodeLayout,
    pub(crate) key_codec: SharedCodec<K>,
    pub(crate) value_codec: SharedCodec<V>,
    pub(crate) extractor: SharedKeyExtractor<K, V>,
    pub(crate) epsilon: f32,
    pub(crate) key_domain_min: K,
    pub(crate) root: Option<MvIndexEntry<K>>,
    pub(crate) root_level: u32,
    pub(crate) descriptor: Option<MvRegion<K>>,
    pub(crate) current_version: Option<Version>,
    cutoff_version: Option<Version>,
    pub(crate) roots: RootCatalog<K, S>,
    purge: VecDeque<(PageId, Version)>,
}

impl<K, V, S> MvTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Opens an empty multi-version tree.
    ///
    /// `store` holds the tree's pages, `roots_store` the historical-root
    /// catalog's.
    pub fn new(
        config: MvConfig<K>,
        store: S,
        roots_store: S,
        key_codec: SharedCodec<K>,
        value_codec: SharedCodec<V>,
        extractor: SharedKeyExtractor<K, V>,
    ) -> crate::Result<Self> {
        config.base.validate()?;

        let layout = NodeLayout::compute(
            config.base.block_size,
            config.base.min_capacity_ratio,
            MvLayoutSizes::header(key_codec.max_size()),
            MvLayoutSizes::leaf_entry(value_codec.max_size()),
            MvLayoutSizes::inner_entry(key_codec.max_size()),
        )?;

        for (b, d) in [
            (layout.b_leaf, layout.d_leaf),
            (layout.b_inner, layout.d_inner),
        ] {
            #[allow(clippy::cast_precision_loss)]
            let (b, d) = (b as f32, d as f32);

            // Admissible range of the strong version condition slack
            if d < 2.0 || config.epsilon <= 0.0 || config.epsilon >= 1.0 - 1.0 / d {
                return Err(Error::Corrupted("epsilon outside admissible range"));
            }

            // The scenario-sized trees in common use violate this bound
            // while still behaving; surface it without refusing to open
            let k = b / d;
            if k < 2.0 + 3.0 * config.epsilon - 1.0 / d {
                log::warn!(
                    "strong version condition k >= 2 + 3e - 1/D not satisfied \
                     (B={b}, D={d}, epsilon={}); amortized I/O bounds degrade",
                    config.epsilon,
                );
            }
        }

        log::debug!(
            "opening mv-tree: B_leaf={}, D_leaf={}, B_inner={}, D_inner={}, epsilon={}",
            layout.b_leaf,
            layout.d_leaf,
            layout.b_inner,
            layout.d_inner,
            config.epsilon,
        );

        let roots = RootCatalog::new(config.base.block_size, key_codec.clone(), roots_store)?;

        Ok(Self {
            store,
            layout,
            key_codec,
            value_codec,
            extractor,
            epsilon: config.epsilon,
            key_domain_min: config.key_domain_min,
            root: None,
            root_level: 0,
            descriptor: None,
            current_version: None,
            cutoff_version: config.cutoff_version,
            roots,
            purge: VecDeque::new(),
        })
    }

    /// The version of the most recent write.
    #[must_use]
    pub fn current_version(&self) -> Option<Version> {
        self.current_version
    }

    /// The purge cutoff.
    #[must_use]
    pub fn cutoff_version(&self) -> Option<Version> {
        self.cutoff_version
    }

    /// Number of levels of the live tree, 0 when empty.
    #[must_use]
    pub fn height(&self) -> u32 {
        if self.root.is_some() {
            self.root_level + 1
        } else {
            0
        }
    }

    /// Region bounding all live data.
    #[must_use]
    pub fn descriptor(&self) -> Option<&MvRegion<K>> {
        self.descriptor.as_ref()
    }

    /// Number of retired roots in the catalog.
    #[must_use]
    pub fn historical_root_count(&self) -> u64 {
        self.roots.len()
    }

    /// Regions of all retired roots, oldest retirement first.
    pub fn historical_root_regions(&mut self) -> crate::Result<Vec<MvRegion<K>>> {
        Ok(self
            .roots
            .all()?
            .into_iter()
            .map(|root| root.region)
            .collect())
    }

    /// The live root page and its level, for structural inspection.
    #[doc(hidden)]
    #[must_use]
    pub fn root_handle(&self) -> Option<(PageId, u32)> {
        self.root.as_ref().map(|e| (e.id, self.root_level))
    }

    /// Reads and decodes one page, for structural inspection.
    #[doc(hidden)]
    pub fn read_page(&mut self, id: PageId) -> crate::Result<MvNode<K, V>> {
        self.read_mv_node(id)
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

    /// Number of pages waiting for the cutoff to pass their death version.
    #[must_use]
    pub fn purge_queue_len(&self) -> usize {
        self.purge.len()
    }

    pub(crate) fn key_of(&self, value: &V) -> K {
        self.extractor.key_of(value)
    }

    pub(crate) fn read_mv_node(&mut self, id: PageId) -> crate::Result<MvNode<K, V>> {
        let page = self.store.get(id)?;
        Ok(MvNode::decode_from(
            &*self.key_codec,
            &*self.value_codec,
            &mut &page[..],
        )?)
    }

    pub(crate) fn write_mv_node(&mut self, id: PageId, node: &MvNode<K, V>) -> crate::Result<()> {
        let buf = self.encode_mv_node(node)?;
        self.store.update(id, &buf)
    }

    pub(crate) fn insert_mv_node(&mut self, node: &MvNode<K, V>) -> crate::Result<PageId> {
        let buf = self.encode_mv_node(node)?;
        self.store.insert(&buf)
    }

    fn encode_mv_node(&mut self, node: &MvNode<K, V>) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.layout.block_size as usize);
        node.encode_into(&*self.key_codec, &*self.value_codec, &mut buf)?;

        if buf.len() > self.layout.block_size as usize {
            return Err(Error::Corrupted("encoded page exceeds block size"));
        }

        Ok(buf)
    }

    pub(crate) fn begin_write(&mut self, version: Version) -> crate::Result<()> {
        if let Some(current) = self.current_version {
            if version < current {
                return Err(Error::InvalidInput("write version below current version"));
            }
        }

        self.current_version = Some(version);
        Ok(())
    }

    /// Inserts a record alive from `version` on.
    pub fn insert(&mut self, version: Version, value: V) -> crate::Result<()> {
        self.begin_write(version)?;

        let key = self.key_of(&value);

        if self.root.is_none() {
            self.bootstrap(version, value, key)?;
            return self.run_purge();
        }

        if let Some(descriptor) = &mut self.descriptor {
            descriptor.keys_mut().extend_with_key(&key);
        }

        let (frames, leaf_id, mut leaf) = self.descend_live(&key, version)?;

        let extractor = self.extractor.clone();
        leaf.grow_leaf(
            MvLeafEntry {
                value,
                lifespan: Lifespan::from(version),
            },
            &|v| extractor.key_of(v),
        );

        self.unwind(frames, leaf_id, leaf, version)?;
        self.run_purge()
    }

    /// Closes the lifespan of the matching live record at `version`.
    ///
    /// Returns the removed value, or `None` if no live record matched. A
    /// record inserted and removed at the same version is dropped
    /// physically.
    pub fn remove(&mut self, version: Version, value: &V) -> crate::Result<Option<V>>
    where
        V: PartialEq,
    {
        self.begin_write(version)?;

        if self.root.is_none() {
            return Ok(None);
        }

        let key = self.key_of(value);
        let (frames, leaf_id, mut leaf) = self.descend_live(&key, version)?;

        let extractor = self.extractor.clone();
        let key_fn = |v: &V| extractor.key_of(v);

        let Some(idx) = leaf.find_live(&key, version, &key_fn, &|v| v == value) else {
            self.run_purge()?;
            return Ok(None);
        };

        let removed = {
            let entries = leaf.leaf_entries_mut();

            let Some(entry) = entries.get_mut(idx) else {
                return Err(Error::Corrupted("leaf entry vanished"));
            };

            let removed = entry.value.clone();

            if entry.lifespan.begin() == version {
                // Inserted and removed at the same version: a point lifespan
                // is dropped physically
                entries.remove(idx);
            } else {
                entry.lifespan.kill(version);
            }

            removed
        };

        self.unwind(frames, leaf_id, leaf, version)?;
        self.run_purge()?;

        Ok(Some(removed))
    }

    /// Replaces a record at `version`: the old lifespan is closed and the
    /// new value inserted, both at the same version.
    pub fn update(&mut self, version: Version, old: &V, new: V) -> crate::Result<()>
    where
        V: PartialEq,
    {
        if self.key_of(old) != self.key_of(&new) {
            return Err(Error::InvalidInput("update must not change the key"));
        }

        if self.remove(version, old)?.is_none() {
            return Err(Error::InvalidInput("value to update not found"));
        }

        self.insert(version, new)
    }

    pub(crate) fn bootstrap(&mut self, version: Version, value: V, key: K) -> crate::Result<()> {
        let mut leaf = MvNode::empty_leaf();

        let extractor = self.extractor.clone();
        leaf.grow_leaf(
            MvLeafEntry {
                value,
                lifespan: Lifespan::from(version),
            },
            &|v| extractor.key_of(v),
        );

        let id = self.insert_mv_node(&leaf)?;

        self.root = Some(MvIndexEntry {
            id,
            separator: MvSeparator::new(self.key_domain_min.clone(), Lifespan::from(version)),
            weight: WeightCounters { live: 1, total: 1 },
        });
        self.root_level = 0;
        self.descriptor = Some(MvRegion::new(
            KeyRange::new((self.key_domain_min.clone(), key)),
            Lifespan::from(version),
        ));

        log::debug!("bootstrapped live root region {}", self);
        Ok(())
    }

    pub(crate) fn descend_live(
        &mut self,
        key: &K,
        version: Version,
    ) -> crate::Result<(Vec<MvFrame<K, V>>, PageId, MvNode<K, V>)> {
        let root = self
            .root
            .clone()
            .ok_or(Error::Corrupted("descend on empty tree"))?;

        let mut frames = Vec::new();
        let mut id = root.id;

        loop {
            let node = self.read_mv_node(id)?;

            if node.is_leaf() {
                return Ok((frames, id, node));
            }

            let idx = node
                .route_live(key, version)
                .ok_or(Error::Corrupted("inner node without live children"))?;

            let child = node
                .children()
                .get(idx)
                .ok_or(Error::Corrupted("routing out of bounds"))?
                .id;

            frames.push(MvFrame {
                id,
                node,
                child_idx: idx,
            });
            id = child;
        }
    }

    /// Unwinds a write path, reorganizing every violated node bottom-up.
    pub(crate) fn unwind(
        &mut self,
        mut frames: Vec<MvFrame<K, V>>,
        leaf_id: PageId,
        leaf: MvNode<K, V>,
        version: Version,
    ) -> crate::Result<()> {
        let mut current = (leaf_id, leaf);

        loop {
            let is_root = frames.is_empty();
            let (id, node) = current;

            if !self.needs_reorg(&node, is_root, version) {
                return self.write_mv_node(id, &node);
            }

            let Some(mut frame) = frames.pop() else {
                return self.reorganize_root(id, node, version);
            };

            self.reorganize_child(id, node, &mut frame.node, frame.child_idx, version)?;

            current = (frame.id, frame.node);
        }
    }

    /// Resolves the root covering the given version.
    pub(crate) fn determine_root(&mut self, version: Version) -> crate::Result<Option<RootRef<K>>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let live_begin = root.separator.lifespan().begin();

        if version >= live_begin {
            return Ok(Some(RootRef::Live {
                entry: root,
                level: self.root_level,
            }));
        }

        Ok(self
            .roots
            .find(version, live_begin)?
            .map(RootRef::Historical))
    }

    /// Point lookup: the value with the given key that is alive at
    /// `version`, or `None`.
    pub fn get(&mut self, key: &K, version: Version) -> crate::Result<Option<V>> {
        let Some(root_ref) = self.determine_root(version)? else {
            return Ok(None);
        };

        let mut id = match root_ref {
            RootRef::Live { entry, .. } => entry.id,
            RootRef::Historical(root) => root.id,
        };

        loop {
            let node = self.read_mv_node(id)?;

            if node.is_leaf() {
                let extractor = self.extractor.clone();
                let key_fn = |v: &V| extractor.key_of(v);

                return Ok(node
                    .leaf_entries()
                    .iter()
                    .find(|e| e.lifespan.contains(version) && key_fn(&e.value) == *key)
                    .map(|e| e.value.clone()));
            }

            let Some(idx) = node.route_live(key, version) else {
                return Ok(None);
            };

            id = node
                .children()
                .get(idx)
                .ok_or(Error::Corrupted("routing out of bounds"))?
                .id;
        }
    }

    pub(crate) fn enqueue_purge(&mut self, id: PageId, death_version: Version) {
        self.purge.push_back((id, death_version));
    }

    /// Advances the cutoff version and removes all pages that died at or
    /// before it.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if the cutoff would move backwards or past
    /// the current version.
    pub fn set_cutoff_version(&mut self, version: Version) -> crate::Result<()> {
        if let Some(cutoff) = self.cutoff_version {
            if version < cutoff {
                return Err(Error::InvalidInput("cutoff version must not move backwards"));
            }
        }

        if version > self.current_version.unwrap_or(0) {
            return Err(Error::InvalidInput(
                "cutoff version must not exceed the current version",
            ));
        }

        self.cutoff_version = Some(version);
        self.run_purge()
    }

    /// Removes dead pages whose death version is covered by the cutoff.
    fn run_purge(&mut self) -> crate::Result<()> {
        let Some(cutoff) = self.cutoff_version else {
            return Ok(());
        };

        // Pages enter the queue in death order, so the front is the oldest
        while let Some(&(id, death_version)) = self.purge.front() {
            if death_version > cutoff {
                break;
            }

            self.purge.pop_front();
            self.store.remove(id)?;

            log::trace!("purged page {id} (died at {death_version})");
        }

        Ok(())
    }

    /// Writes the tree descriptor and the catalog's sidecar into `dir`.
    ///
    /// The purge queue is session state and not persisted.
    pub fn persist<P: AsRef<Path>>(&mut self, dir: P) -> crate::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let meta = MvTreeMeta {
            root: self
                .root
                .as_ref()
                .map(|r| (r.id, self.root_level, r.separator.clone())),
            descriptor: self.descriptor.clone(),
            current_version: self.current_version,
            cutoff_version: self.cutoff_version,
        };
        meta.write_to(&*self.key_codec, &dir.join("tree.meta"))?;

        self.roots.tree_mut().persist(&dir.join("roots.meta"))
    }

    /// Reopens a tree from its stores and the sidecars in `dir`.
    pub fn recover<P: AsRef<Path>>(
        config: MvConfig<K>,
        store: S,
        roots_store: S,
        key_codec: SharedCodec<K>,
        value_codec: SharedCodec<V>,
        extractor: SharedKeyExtractor<K, V>,
        dir: P,
    ) -> crate::Result<Self> {
        let dir = dir.as_ref();

        let mut tree = Self::new(
            config,
            store,
            roots_store,
            key_codec,
            value_codec,
            extractor,
        )?;

        let meta = MvTreeMeta::read_from(&*tree.key_codec, &dir.join("tree.meta"))?;

        if let Some((id, level, separator)) = meta.root {
            tree.root = Some(MvIndexEntry {
                id,
                separator,
                weight: WeightCounters::default(),
            });
            tree.root_level = level;
        }
        tree.descriptor = meta.descriptor;
        tree.current_version = meta.current_version;
        tree.cutoff_version = meta.cutoff_version;

        tree.roots.tree_mut().recover_in_place(&dir.join("roots.meta"))?;

        Ok(tree)
    }
}

impl<K, V, S> std::fmt::Display for MvTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.descriptor {
            Some(region) => write!(f, "MvTree({region})"),
            None => write!(f, "MvTree(empty)"),
        }
    }
}
