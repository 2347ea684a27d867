// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    node::{MvIndexEntry, MvNode},
    MvTree, RootRef,
};
use crate::{
    key_range::KeyRange,
    region::MvRegion,
    store::{PageId, PageStore},
    version::{Lifespan, Version},
};
use interval_heap::IntervalHeap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

impl<K, V, S> MvTree<K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Lazily yields all values with keys in `[lo, hi]` that are alive at
    /// `version`, in key order.
    pub fn scan(&mut self, lo: K, hi: K, version: Version) -> MvRangeScan<'_, K, V, S> {
        MvRangeScan {
            tree: self,
            lo,
            hi,
            version,
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    /// Yields every record whose key lies in `[lo, hi]` and whose lifespan
    /// overlaps `[v_lo, v_hi]`, each exactly once, together with its
    /// recorded lifespan.
    ///
    /// The traversal hops across historical roots and predecessor links; a
    /// record held by several pages (version splits copy live records
    /// forward) is attributed through its reference point to exactly one of
    /// them.
    pub fn range_period(
        &mut self,
        lo: K,
        hi: K,
        v_lo: Version,
        v_hi: Version,
    ) -> TimeRangeScan<'_, K, V, S> {
        TimeRangeScan {
            tree: self,
            query_keys: KeyRange::new((lo, hi)),
            query_life: Lifespan::closed(v_lo, v_hi),
            stack: Vec::new(),
            covered: FxHashMap::default(),
            started: false,
            done: false,
        }
    }

    /// Like [`MvTree::range_period`], but yields records in key order under
    /// a caller-supplied comparator, best-first across live and historical
    /// roots.
    pub fn range_period_ordered(
        &mut self,
        lo: K,
        hi: K,
        v_lo: Version,
        v_hi: Version,
        comparator: Arc<dyn Fn(&K, &K) -> std::cmp::Ordering + Send + Sync>,
    ) -> PriorityScan<'_, K, V, S> {
        PriorityScan {
            tree: self,
            query_keys: KeyRange::new((lo, hi)),
            query_life: Lifespan::closed(v_lo, v_hi),
            heap: IntervalHeap::with_capacity(16),
            covered: FxHashMap::default(),
            comparator,
            started: false,
        }
    }

    /// The region a query starts in for the given root.
    pub(crate) fn root_region(&self, root_ref: &RootRef<K>) -> MvRegion<K> {
        match root_ref {
            RootRef::Live { entry, .. } => {
                let max = self
                    .descriptor
                    .as_ref()
                    .map_or_else(|| self.key_domain_min.clone(), |d| d.keys().max().clone());

                MvRegion::new(
                    KeyRange::new((self.key_domain_min.clone(), max)),
                    entry.separator.lifespan(),
                )
            }
            RootRef::Historical(root) => root.region.clone(),
        }
    }
}

/// Derives a child's region from its parent's: the
/// child brings its own minimum bound; the maximum bound comes from the
/// next co-live sibling or is inherited; the lifespan is the child
/// separator's clipped to the parent's slice.
pub(crate) fn derive_child_region<K: Ord + Clone, V>(
    node: &MvNode<K, V>,
    idx: usize,
    parent_region: &MvRegion<K>,
) -> Option<MvRegion<K>> {
    let entry = node.children().get(idx)?;

    let min = entry.separator.key().clone();
    let lifespan = entry
        .separator
        .lifespan()
        .intersect(&parent_region.lifespan())?;

    let mut max = parent_region.keys().max().clone().max(min.clone());

    for sibling in node.children().iter().skip(idx + 1) {
        if sibling.separator.key() > entry.separator.key()
            && sibling
                .separator
                .lifespan()
                .overlaps(&entry.separator.lifespan())
        {
            max = sibling.separator.key().clone();
            break;
        }
    }

    Some(MvRegion::new(KeyRange::new((min, max)), lifespan))
}

/// Derives the region of a predecessor page from the successor's.
///
/// Predecessor handles were closed when the page was replaced, so their
/// lifespan is exact; the key bounds are conservative.
pub(crate) fn derive_pred_region<K: Ord + Clone>(
    preds: &[MvIndexEntry<K>],
    idx: usize,
    node_region: &MvRegion<K>,
) -> Option<MvRegion<K>> {
    let pred = preds.get(idx)?;

    let min = pred.separator.key().clone();

    // With two predecessors (after a merge) their key spaces abut at the
    // higher separator
    let max = preds
        .iter()
        .filter(|p| p.separator.key() > pred.separator.key())
        .map(|p| p.separator.key().clone())
        .min()
        .unwrap_or_else(|| node_region.keys().max().clone())
        .max(min.clone());

    Some(MvRegion::new(
        KeyRange::new((min, max)),
        pred.separator.lifespan(),
    ))
}

/// Returns `true` if any of the spans contains the version.
fn spans_cover(spans: &[Lifespan], version: Version) -> bool {
    spans.iter().any(|s| s.contains(version))
}

/// Returns `true` if a single recorded span subsumes the whole region span
/// (conservative; a false negative only costs a re-visit, emission stays
/// exactly-once).
fn span_subsumed(spans: &[Lifespan], region: &Lifespan) -> bool {
    spans.iter().any(|s| {
        s.contains(region.begin())
            && match region.last_alive() {
                None => s.is_alive(),
                Some(last) => s.contains(last),
            }
    })
}

/// The emission rule shared by the time-travel cursors.
///
/// A record is reported by the page visit whose time slice contains its
/// reference time `min(query upper version, last alive version)` - and by
/// no earlier visit of the same page (`prior`). Copies of one record live
/// in pages with disjoint lifespans, so this attributes each record to
/// exactly one page.
fn emit_check<K: Ord + Clone>(
    query_keys: &KeyRange<K>,
    query_life: &Lifespan,
    query_hi: Version,
    key: &K,
    lifespan: &Lifespan,
    region: &MvRegion<K>,
    prior: &[Lifespan],
) -> bool {
    if !query_keys.contains_key(key) {
        return false;
    }
    if !query_life.overlaps(lifespan) {
        return false;
    }

    let ref_time = lifespan
        .last_alive()
        .map_or(query_hi, |last| last.min(query_hi));

    region.lifespan().contains(ref_time) && !spans_cover(prior, ref_time)
}

struct ScanFrame<K, V> {
    node: MvNode<K, V>,

    /// Indices of live children, key-ordered
    live: Vec<usize>,

    /// Next position in `live` (inner) or the entry list (leaf)
    pos: usize,
}

/// Forward cursor over the records alive at one version.
///
/// Multi-version leaves carry no next-neighbor link, so the cursor advances
/// through its path stack instead.
pub struct MvRangeScan<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    tree: &'a mut MvTree<K, V, S>,
    lo: K,
    hi: K,
    version: Version,
    stack: Vec<ScanFrame<K, V>>,
    started: bool,
    done: bool,
}

impl<K, V, S> MvRangeScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Drops the cursor, releasing its borrow of the tree.
    pub fn close(self) {}

    fn start(&mut self) -> crate::Result<()> {
        self.started = true;

        let Some(root_ref) = self.tree.determine_root(self.version)? else {
            self.done = true;
            return Ok(());
        };

        let id = match root_ref {
            RootRef::Live { ref entry, .. } => entry.id,
            RootRef::Historical(ref root) => root.id,
        };

        self.descend(id, true)
    }

    /// Pushes the path to the first candidate leaf of the subtree.
    fn descend(&mut self, id: PageId, route_to_lo: bool) -> crate::Result<()> {
        let mut id = id;

        loop {
            let node = self.tree.read_mv_node(id)?;

            if node.is_leaf() {
                let extractor = self.tree.extractor.clone();

                let pos = if route_to_lo {
                    node.leaf_entries()
                        .iter()
                        .position(|e| extractor.key_of(&e.value) >= self.lo)
                        .unwrap_or(node.len())
                } else {
                    0
                };

                self.stack.push(ScanFrame {
                    node,
                    live: Vec::new(),
                    pos,
                });
                return Ok(());
            }

            let live = node.live_children(self.version);

            let pos = if route_to_lo {
                match node.route_live(&self.lo, self.version) {
                    Some(child_idx) => live.iter().position(|&i| i == child_idx).unwrap_or(0),
                    None => {
                        self.done = true;
                        return Ok(());
                    }
                }
            } else {
                0
            };

            let Some(&child_idx) = live.get(pos) else {
                self.done = true;
                return Ok(());
            };

            let child_id = node
                .children()
                .get(child_idx)
                .ok_or(crate::Error::Corrupted("routing out of bounds"))?
                .id;

            self.stack.push(ScanFrame {
                node,
                live,
                pos: pos + 1,
            });
            id = child_id;
        }
    }

    fn advance(&mut self) -> crate::Result<Option<V>> {
        if !self.started {
            self.start()?;
        }

        loop {
            if self.done {
                return Ok(None);
            }

            let Some(top) = self.stack.last_mut() else {
                self.done = true;
                return Ok(None);
            };

            if top.node.is_leaf() {
                let extractor = self.tree.extractor.clone();

                while let Some(entry) = top.node.leaf_entries().get(top.pos) {
                    top.pos += 1;

                    if !entry.lifespan.contains(self.version) {
                        continue;
                    }

                    let key = extractor.key_of(&entry.value);

                    if key < self.lo {
                        continue;
                    }
                    if key > self.hi {
                        self.done = true;
                        return Ok(None);
                    }

                    return Ok(Some(entry.value.clone()));
                }

                self.stack.pop();
                continue;
            }

            // Inner frame: descend into the next live child, if any
            let next = top.pos;

            let Some(&child_idx) = top.live.get(next) else {
                self.stack.pop();
                continue;
            };
            top.pos += 1;

            let child_id = top
                .node
                .children()
                .get(child_idx)
                .ok_or(crate::Error::Corrupted("routing out of bounds"))?
                .id;

            self.descend(child_id, false)?;
        }
    }
}

impl<K, V, S> Iterator for MvRangeScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

struct TrFrame<K, V> {
    node: MvNode<K, V>,
    region: MvRegion<K>,

    /// Time spans of earlier visits of this page
    prior: Vec<Lifespan>,

    pos: usize,
    pred_pos: usize,

    /// Predecessor visit order (handles not exceeding the query's lower key
    /// first)
    pred_order: Vec<usize>,
}

/// Reference-point cursor over all records whose key range and lifespan
/// overlap a two-dimensional query window.
pub struct TimeRangeScan<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    tree: &'a mut MvTree<K, V, S>,
    query_keys: KeyRange<K>,
    query_life: Lifespan,
    stack: Vec<TrFrame<K, V>>,

    /// Per page, the time spans already attributed to a visit
    covered: FxHashMap<PageId, Vec<Lifespan>>,

    started: bool,
    done: bool,
}

impl<K, V, S> TimeRangeScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Drops the cursor, releasing its borrow of the tree.
    pub fn close(self) {}

    fn query_hi(&self) -> Version {
        self.query_life.last_alive().unwrap_or(Version::MAX)
    }

    fn start(&mut self) -> crate::Result<()> {
        self.started = true;

        // Seed with the root covering the query's upper version plus every
        // historical root whose lifespan overlaps the window; subtrees
        // retired below older roots are not reachable from newer ones
        if let Some(root_ref) = self.tree.determine_root(self.query_hi())? {
            let region = self.tree.root_region(&root_ref);

            let id = match root_ref {
                RootRef::Live { ref entry, .. } => entry.id,
                RootRef::Historical(ref root) => root.id,
            };

            self.push_page(id, region)?;
        }

        for root in self.tree.roots.all()? {
            self.push_page(root.id, root.region.clone())?;
        }

        if self.stack.is_empty() {
            self.done = true;
        }

        Ok(())
    }

    fn overlaps_query(&self, region: &MvRegion<K>) -> bool {
        region.keys().overlaps_with(&self.query_keys)
            && region.lifespan().overlaps(&self.query_life)
    }

    fn push_page(&mut self, id: PageId, region: MvRegion<K>) -> crate::Result<()> {
        if !self.overlaps_query(&region) {
            return Ok(());
        }

        let prior = self.covered.get(&id).cloned().unwrap_or_default();

        if span_subsumed(&prior, &region.lifespan()) {
            return Ok(());
        }

        self.covered
            .entry(id)
            .or_default()
            .push(region.lifespan());

        let node = self.tree.read_mv_node(id)?;

        // Predecessors whose separator does not exceed the query's lower
        // key are tried first
        let mut pred_order: Vec<usize> = (0..node.predecessors.len()).collect();
        pred_order.sort_by(|&a, &b| {
            let rank = |i: usize| {
                node.predecessors
                    .get(i)
                    .map(|p| (p.separator.key() > self.query_keys.min(), p.separator.key()))
            };
            rank(a).cmp(&rank(b))
        });

        self.stack.push(TrFrame {
            node,
            region,
            prior,
            pos: 0,
            pred_pos: 0,
            pred_order,
        });

        Ok(())
    }

    fn advance(&mut self) -> crate::Result<Option<(V, Lifespan)>> {
        if !self.started {
            self.start()?;
        }

        let extractor = self.tree.extractor.clone();
        let query_hi = self.query_hi();

        loop {
            if self.done {
                return Ok(None);
            }

            let Some(top) = self.stack.last_mut() else {
                self.done = true;
                return Ok(None);
            };

            if top.node.is_leaf() {
                while let Some(entry) = top.node.leaf_entries().get(top.pos) {
                    top.pos += 1;

                    let key = extractor.key_of(&entry.value);

                    if emit_check(
                        &self.query_keys,
                        &self.query_life,
                        query_hi,
                        &key,
                        &entry.lifespan,
                        &top.region,
                        &top.prior,
                    ) {
                        return Ok(Some((entry.value.clone(), entry.lifespan)));
                    }
                }
            } else {
                // Recurse into every entry, live or dead, whose derived
                // region overlaps the query
                let pos = top.pos;

                if pos < top.node.children().len() {
                    top.pos += 1;

                    let parent_region = top.region.clone();
                    let child = derive_child_region(&top.node, pos, &parent_region);
                    let id = top.node.children().get(pos).map(|e| e.id);

                    if let (Some(region), Some(id)) = (child, id) {
                        self.push_page(id, region)?;
                    }

                    continue;
                }
            }

            // Entries exhausted: hop predecessors when the query reaches
            // below this page's region
            let extends_below = self.query_life.begin() < top.region.lifespan().begin();

            if extends_below && top.pred_pos < top.pred_order.len() {
                let order_idx = top.pred_pos;
                top.pred_pos += 1;

                let pred_idx = top.pred_order.get(order_idx).copied().unwrap_or(0);

                let node_region = top.region.clone();
                let pred =
                    derive_pred_region(&top.node.predecessors, pred_idx, &node_region);
                let id = top.node.predecessors.get(pred_idx).map(|p| p.id);

                if let (Some(region), Some(id)) = (pred, id) {
                    self.push_page(id, region)?;
                }

                continue;
            }

            self.stack.pop();
        }
    }
}

impl<K, V, S> Iterator for TimeRangeScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    type Item = crate::Result<(V, Lifespan)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

enum HeapPayload<K, V> {
    Page {
        id: PageId,
        region: MvRegion<K>,
    },
    Record {
        value: V,
        lifespan: Lifespan,
    },
}

struct HeapItem<K, V> {
    key: K,

    /// Pages sort before records with the same key so that no record is
    /// emitted while a page that may hold smaller keys is pending
    rank: u8,

    payload: HeapPayload<K, V>,
    comparator: Arc<dyn Fn(&K, &K) -> std::cmp::Ordering + Send + Sync>,
}

impl<K, V> PartialEq for HeapItem<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl<K, V> Eq for HeapItem<K, V> {}

impl<K, V> PartialOrd for HeapItem<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for HeapItem<K, V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.comparator)(&self.key, &other.key).then(self.rank.cmp(&other.rank))
    }
}

/// Best-first cursor yielding time-range results in comparator key order
/// across all live and historical roots.
pub struct PriorityScan<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    tree: &'a mut MvTree<K, V, S>,
    query_keys: KeyRange<K>,
    query_life: Lifespan,
    heap: IntervalHeap<HeapItem<K, V>>,

    /// Per page, the time spans already attributed to a visit
    covered: FxHashMap<PageId, Vec<Lifespan>>,

    comparator: Arc<dyn Fn(&K, &K) -> std::cmp::Ordering + Send + Sync>,
    started: bool,
}

impl<K, V, S> PriorityScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    /// Drops the cursor, releasing its borrow of the tree.
    pub fn close(self) {}

    fn query_hi(&self) -> Version {
        self.query_life.last_alive().unwrap_or(Version::MAX)
    }

    fn push_page(&mut self, id: PageId, region: MvRegion<K>) {
        if !(region.keys().overlaps_with(&self.query_keys)
            && region.lifespan().overlaps(&self.query_life))
        {
            return;
        }

        // Candidate pages are deduplicated by id and covered time span
        if span_subsumed(
            self.covered.get(&id).map_or(&[], Vec::as_slice),
            &region.lifespan(),
        ) {
            return;
        }

        // A page sorts by whichever of its key bounds comes first under the
        // comparator, so no record pops while a page that may hold an
        // earlier key is pending
        let key = {
            let min = region.keys().min();
            let max = region.keys().max();

            if (self.comparator)(min, max) == std::cmp::Ordering::Greater {
                max.clone()
            } else {
                min.clone()
            }
        };

        self.heap.push(HeapItem {
            key,
            rank: 0,
            payload: HeapPayload::Page { id, region },
            comparator: self.comparator.clone(),
        });
    }

    fn start(&mut self) -> crate::Result<()> {
        self.started = true;

        // Seed with every root whose region overlaps the query window
        if let Some(root_ref) = self.tree.determine_root(self.query_hi())? {
            let region = self.tree.root_region(&root_ref);

            let id = match root_ref {
                RootRef::Live { ref entry, .. } => entry.id,
                RootRef::Historical(ref root) => root.id,
            };

            self.push_page(id, region);
        }

        for root in self.tree.roots.all()? {
            self.push_page(root.id, root.region.clone());
        }

        Ok(())
    }

    fn expand(&mut self, id: PageId, region: &MvRegion<K>) -> crate::Result<()> {
        let prior = self.covered.get(&id).cloned().unwrap_or_default();

        if span_subsumed(&prior, &region.lifespan()) {
            return Ok(());
        }

        self.covered
            .entry(id)
            .or_default()
            .push(region.lifespan());

        let node = self.tree.read_mv_node(id)?;
        let query_hi = self.query_hi();

        if node.is_leaf() {
            for entry in node.leaf_entries() {
                let key = self.tree.key_of(&entry.value);

                if emit_check(
                    &self.query_keys,
                    &self.query_life,
                    query_hi,
                    &key,
                    &entry.lifespan,
                    region,
                    &prior,
                ) {
                    self.heap.push(HeapItem {
                        key,
                        rank: 1,
                        payload: HeapPayload::Record {
                            value: entry.value.clone(),
                            lifespan: entry.lifespan,
                        },
                        comparator: self.comparator.clone(),
                    });
                }
            }
        } else {
            for idx in 0..node.children().len() {
                let child = derive_child_region(&node, idx, region);

                if let (Some(child_region), Some(entry)) = (child, node.children().get(idx)) {
                    self.push_page(entry.id, child_region);
                }
            }
        }

        if self.query_life.begin() < region.lifespan().begin() {
            for idx in 0..node.predecessors.len() {
                let pred = derive_pred_region(&node.predecessors, idx, region);

                if let (Some(pred_region), Some(entry)) = (pred, node.predecessors.get(idx)) {
                    self.push_page(entry.id, pred_region);
                }
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> crate::Result<Option<(V, Lifespan)>> {
        if !self.started {
            self.start()?;
        }

        while let Some(item) = self.heap.pop_min() {
            match item.payload {
                HeapPayload::Page { id, region } => self.expand(id, &region)?,
                HeapPayload::Record { value, lifespan } => return Ok(Some((value, lifespan))),
            }
        }

        Ok(None)
    }
}

impl<K, V, S> Iterator for PriorityScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    V: Clone,
    S: PageStore,
{
    type Item = crate::Result<(V, Lifespan)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
