// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Codec, DecodeError, EncodeError, SharedCodec, SharedKeyExtractor, U64Codec},
    config::Config,
    region::MvRegion,
    store::{PageId, PageStore},
    tree::{node::Node, BPlusTree},
    version::Version,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::Arc,
};

/// A retired root: the region it covered, its page, and its level
#[derive(Clone, Debug)]
pub struct Root<K> {
    /// Key range and lifespan the root covered
    pub region: MvRegion<K>,

    /// Page id of the retired root
    pub id: PageId,

    /// Level the root had
    pub level: u32,
}

struct RootCodec<K> {
    key_codec: SharedCodec<K>,
}

impl<K: Ord + Clone> Codec<Root<K>> for RootCodec<K> {
    fn encode_into(&self, item: &Root<K>, writer: &mut dyn Write) -> Result<(), EncodeError> {
        item.region.encode_into(&*self.key_codec, writer)?;
        writer.write_u64::<BigEndian>(item.id)?;
        writer.write_u32::<BigEndian>(item.level)?;
        Ok(())
    }

    fn decode_from(&self, reader: &mut dyn Read) -> Result<Root<K>, DecodeError> {
        let region = MvRegion::decode_from(&*self.key_codec, reader)?;
        let id = reader.read_u64::<BigEndian>()?;
        let level = reader.read_u32::<BigEndian>()?;

        Ok(Root { region, id, level })
    }

    fn max_size(&self) -> usize {
        // Key range, lifespan, page id, level
        2 * self.key_codec.max_size() + crate::version::LIFESPAN_ENCODED_SIZE + 8 + 4
    }
}

/// The historical-root catalog: a single-version B+-tree keyed by the
/// version at which each root was retired.
///
/// Time-travel queries below the live root's insert version resolve their
/// starting page here.
pub(crate) struct RootCatalog<K, S: PageStore>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
{
    tree: BPlusTree<Version, Root<K>, S>,
}

impl<K, S> RootCatalog<K, S>
where
    K: Ord + Clone + std::fmt::Debug + 'static,
    S: PageStore,
{
    pub fn new(block_size: u32, key_codec: SharedCodec<K>, store: S) -> crate::Result<Self> {
        let value_codec = RootCodec {
            key_codec: key_codec.clone(),
        };

        // Root records are larger than user entries; widen the catalog's
        // block size until a leaf holds at least four of them
        let header = Node::<Version, Root<K>>::header_size(8);
        let needed = header + 4 * value_codec.max_size().max(8 + 8);

        // NOTE: Sidecar record sizes are far below u32::MAX
        #[allow(clippy::cast_possible_truncation)]
        let block_size = block_size.max(needed as u32);

        let key_codec_u64: SharedCodec<Version> = Arc::new(U64Codec);
        let value_codec: SharedCodec<Root<K>> = Arc::new(value_codec);
        let extractor: SharedKeyExtractor<Version, Root<K>> =
            Arc::new(|root: &Root<K>| root.region.lifespan().end_version().unwrap_or(Version::MAX));

        // Two roots can retire at the same version during cascading
        // reorganizations
        let config = Config::new(block_size).allow_duplicates(true);

        Ok(Self {
            tree: BPlusTree::new(config, store, key_codec_u64, value_codec, extractor)?,
        })
    }

    /// Records a retired root.
    pub fn retire(&mut self, root: Root<K>) -> crate::Result<()> {
        log::debug!(
            "retiring root page {} (level {}) covering {}",
            root.id,
            root.level,
            root.region,
        );

        self.tree.insert(root)
    }

    /// Finds the root whose region covers the given version.
    ///
    /// Catalog keys are retirement versions, so the covering root is the
    /// first record in `[version, live_begin]` whose lifespan contains it.
    pub fn find(&mut self, version: Version, live_begin: Version) -> crate::Result<Option<Root<K>>> {
        for root in self.tree.scan(version, live_begin) {
            let root = root?;

            if root.region.lifespan().contains(version) {
                return Ok(Some(root));
            }
        }

        Ok(None)
    }

    /// All retired roots, oldest first.
    pub fn all(&mut self) -> crate::Result<Vec<Root<K>>> {
        self.tree.scan(0, Version::MAX).collect()
    }

    /// Number of retired roots.
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Access to the backing tree, for persistence.
    pub fn tree_mut(&mut self) -> &mut BPlusTree<Version, Root<K>, S> {
        &mut self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coding::I32Codec, key_range::KeyRange, store::MemoryPageStore, version::Lifespan,
    };
    use test_log::test;

    fn catalog() -> RootCatalog<i32, MemoryPageStore> {
        RootCatalog::new(64, Arc::new(I32Codec), MemoryPageStore::new()).expect("catalog")
    }

    fn root(begin: Version, end: Version, id: PageId) -> Root<i32> {
        Root {
            region: MvRegion::new(KeyRange::new((i32::MIN, 100)), Lifespan::between(begin, end)),
            id,
            level: 0,
        }
    }

    #[test]
    fn find_covering_root() -> crate::Result<()> {
        let mut catalog = catalog();

        catalog.retire(root(1, 5, 10))?;
        catalog.retire(root(5, 9, 11))?;

        assert_eq!(Some(10), catalog.find(3, 12)?.map(|r| r.id));
        assert_eq!(Some(11), catalog.find(5, 12)?.map(|r| r.id));
        assert_eq!(Some(11), catalog.find(8, 12)?.map(|r| r.id));
        assert_eq!(None, catalog.find(9, 12)?.map(|r| r.id));

        Ok(())
    }

    #[test]
    fn all_is_ordered_by_retirement() -> crate::Result<()> {
        let mut catalog = catalog();

        catalog.retire(root(5, 9, 11))?;
        catalog.retire(root(1, 5, 10))?;

        let ids: Vec<_> = catalog.all()?.iter().map(|r| r.id).collect();
        assert_eq!(vec![10, 11], ids);

        Ok(())
    }
}
