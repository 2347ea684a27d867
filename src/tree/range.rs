// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{node::Node, BPlusTree};
use crate::store::{PageId, PageStore};

struct LastReturned<K> {
    key: K,

    /// Position among values with an equal key, in iteration order
    ordinal: usize,
}

/// Forward cursor over all values with keys in `[lo, hi]`.
///
/// The cursor walks the leaf chain lazily. It supports peeking without
/// advancing, removing or updating the last-returned value (after which the
/// path is re-resolved, since the leaf may have been merged away), and a
/// reset back to the range start. Interleaving unrelated tree mutations with
/// an open cursor is not supported.
pub struct RangeScan<'a, K, V, S: PageStore> {
    tree: &'a mut BPlusTree<K, V, S>,
    lo: K,
    hi: K,
    leaf: Option<(PageId, Node<K, V>)>,
    idx: usize,
    started: bool,
    exhausted: bool,
    last: Option<LastReturned<K>>,
}

impl<'a, K, V, S> RangeScan<'a, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug,
    V: Clone,
    S: PageStore,
{
    pub(crate) fn new(tree: &'a mut BPlusTree<K, V, S>, lo: K, hi: K) -> Self {
        Self {
            tree,
            lo,
            hi,
            leaf: None,
            idx: 0,
            started: false,
            exhausted: false,
            last: None,
        }
    }

    fn start(&mut self) -> crate::Result<()> {
        self.started = true;

        let Some((id, leaf)) = self.tree.leaf_for(&self.lo)? else {
            self.exhausted = true;
            return Ok(());
        };

        let extractor = self.tree.extractor.clone();
        let (lo_idx, _) = leaf.leaf_range(&self.lo, &self.hi, &*extractor);

        self.idx = lo_idx;
        self.leaf = Some((id, leaf));
        Ok(())
    }

    /// Moves to the value the cursor stands on, hopping leaves as needed,
    /// without consuming it.
    fn settle(&mut self) -> crate::Result<Option<V>> {
        if !self.started {
            self.start()?;
        }

        loop {
            if self.exhausted {
                return Ok(None);
            }

            let Some((_, leaf)) = &self.leaf else {
                self.exhausted = true;
                return Ok(None);
            };

            if let Some(value) = leaf.values().get(self.idx) {
                let key = self.tree.key_of(value);

                if key > self.hi {
                    self.exhausted = true;
                    return Ok(None);
                }

                return Ok(Some(value.clone()));
            }

            // Leaf exhausted: follow the chain
            match leaf.next.clone() {
                Some(next) => {
                    let node = self.tree.read_node(next.id)?;
                    self.leaf = Some((next.id, node));
                    self.idx = 0;
                }
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Returns the next value without advancing the cursor.
    pub fn peek(&mut self) -> Option<crate::Result<V>> {
        self.settle().transpose()
    }

    /// Restarts the scan from the lower bound.
    pub fn reset(&mut self) {
        self.started = false;
        self.exhausted = false;
        self.leaf = None;
        self.idx = 0;
        self.last = None;
    }

    /// Removes the last-returned value from the tree.
    ///
    /// With duplicate keys, the leftmost duplicate is removed so that the
    /// iteration order of the remaining values is preserved.
    pub fn remove_current(&mut self) -> crate::Result<Option<V>> {
        let Some(last) = self.last.take() else {
            return Ok(None);
        };

        let removed = self.tree.remove_first_with_key(&last.key)?;

        // The old path may be stale after a merge; re-resolve to the entry
        // after the cursor position
        self.reposition(&last.key, last.ordinal)?;

        Ok(removed)
    }

    /// Replaces the last-returned value; the key must be unchanged.
    pub fn update_current(&mut self, new: V) -> crate::Result<()>
    where
        V: PartialEq,
    {
        let Some(last) = &self.last else {
            return Err(crate::Error::InvalidInput("no value was returned yet"));
        };

        if self.tree.key_of(&new) != last.key {
            return Err(crate::Error::InvalidInput("update must not change the key"));
        }

        let key = last.key.clone();
        let ordinal = last.ordinal;

        // Locate the ordinal-th value with this key along the chain
        let Some((mut leaf_id, mut leaf)) = self.tree.leaf_for(&key)? else {
            return Err(crate::Error::InvalidInput("value to update not found"));
        };

        let extractor = self.tree.extractor.clone();
        let mut skip = ordinal;

        loop {
            let (lo, hi) = leaf.leaf_range(&key, &key, &*extractor);
            let run = hi - lo;

            if skip < run {
                if let Some(slot) = leaf.values_mut().get_mut(lo + skip) {
                    *slot = new;
                }
                self.tree.write_node(leaf_id, &leaf)?;

                // Refresh the cursor's view of the leaf it may stand on
                self.reposition(&key, ordinal + 1)?;
                return Ok(());
            }

            skip -= run;

            match leaf.next.clone() {
                Some(next) => {
                    leaf_id = next.id;
                    leaf = self.tree.read_node(next.id)?;
                }
                None => return Err(crate::Error::InvalidInput("value to update not found")),
            }
        }
    }

    /// Points the cursor at the `skip`-th value with the given key.
    fn reposition(&mut self, key: &K, mut skip: usize) -> crate::Result<()> {
        self.exhausted = false;
        self.leaf = None;
        self.started = true;

        let Some((id, leaf)) = self.tree.leaf_for(key)? else {
            self.exhausted = true;
            return Ok(());
        };

        let extractor = self.tree.extractor.clone();

        let (mut id, mut leaf) = (id, leaf);

        loop {
            let (lo, hi) = leaf.leaf_range(key, key, &*extractor);
            let run = hi - lo;

            if skip <= run {
                self.idx = lo + skip;
                self.leaf = Some((id, leaf));
                return Ok(());
            }

            skip -= run;

            match leaf.next.clone() {
                Some(next) => {
                    id = next.id;
                    leaf = self.tree.read_node(next.id)?;
                }
                None => {
                    self.exhausted = true;
                    return Ok(());
                }
            }
        }
    }

    fn advance(&mut self) -> crate::Result<Option<V>> {
        let Some(value) = self.settle()? else {
            return Ok(None);
        };

        let key = self.tree.key_of(&value);

        let ordinal = match &self.last {
            Some(last) if last.key == key => last.ordinal + 1,
            _ => 0,
        };
        self.last = Some(LastReturned { key, ordinal });

        self.idx += 1;
        Ok(Some(value))
    }
}

impl<K, V, S> Iterator for RangeScan<'_, K, V, S>
where
    K: Ord + Clone + std::fmt::Debug,
    V: Clone,
    S: PageStore,
{
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        coding::{I32Codec, SharedCodec, SharedKeyExtractor},
        store::MemoryPageStore,
        BPlusTree, Config,
    };
    use std::sync::Arc;
    use test_log::test;

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

    fn tree_with(keys: &[i32], allow_duplicates: bool) -> BPlusTree<i32, i32, MemoryPageStore> {
        let key_codec: SharedCodec<i32> = Arc::new(I32Codec);
        let value_codec: SharedCodec<i32> = Arc::new(PaddedI32Codec);
        let extractor: SharedKeyExtractor<i32, i32> = Arc::new(|v: &i32| *v);

        let mut tree = BPlusTree::new(
            Config::new(21 + 4 * 12).allow_duplicates(allow_duplicates),
            MemoryPageStore::new(),
            key_codec,
            value_codec,
            extractor,
        )
        .expect("layout must fit");

        for &key in keys {
            tree.insert(key).expect("insert");
        }

        tree
    }

    #[test]
    fn scan_is_sorted_and_bounded() -> crate::Result<()> {
        let mut tree = tree_with(&[9, 3, 7, 1, 5, 8, 2, 6, 4], false);

        let hits = tree.scan(3, 7).collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(vec![3, 4, 5, 6, 7], hits);

        let all = tree.scan(0, 100).collect::<crate::Result<Vec<_>>>()?;
        assert_eq!((1..=9).collect::<Vec<_>>(), all);

        Ok(())
    }

    #[test]
    fn scan_empty_range() -> crate::Result<()> {
        let mut tree = tree_with(&[1, 2, 3], false);

        let hits = tree.scan(10, 20).collect::<crate::Result<Vec<_>>>()?;
        assert!(hits.is_empty());

        Ok(())
    }

    #[test]
    fn peek_does_not_advance() -> crate::Result<()> {
        let mut tree = tree_with(&[1, 2, 3], false);

        let mut scan = tree.scan(1, 3);
        assert_eq!(Some(1), scan.peek().transpose()?);
        assert_eq!(Some(1), scan.peek().transpose()?);
        assert_eq!(Some(1), scan.next().transpose()?);
        assert_eq!(Some(2), scan.next().transpose()?);

        Ok(())
    }

    #[test]
    fn reset_restarts() -> crate::Result<()> {
        let mut tree = tree_with(&[1, 2, 3], false);

        let mut scan = tree.scan(1, 3);
        assert_eq!(Some(1), scan.next().transpose()?);
        assert_eq!(Some(2), scan.next().transpose()?);

        scan.reset();
        assert_eq!(Some(1), scan.next().transpose()?);

        Ok(())
    }

    #[test]
    fn remove_through_cursor() -> crate::Result<()> {
        let mut tree = tree_with(&(1..=12).collect::<Vec<_>>(), false);

        {
            let mut scan = tree.scan(0, 100);

            // Remove every other value while iterating
            while let Some(value) = scan.next().transpose()? {
                if value % 2 == 0 {
                    assert_eq!(Some(value), scan.remove_current()?);
                }
            }
        }

        let rest = tree.scan(0, 100).collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(vec![1, 3, 5, 7, 9, 11], rest);

        Ok(())
    }

    #[test]
    fn scan_sees_duplicates() -> crate::Result<()> {
        let mut tree = tree_with(&[5, 5, 5, 5, 5, 5, 3], true);

        let hits = tree.scan(5, 5).collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(vec![5; 6], hits);

        Ok(())
    }
}
