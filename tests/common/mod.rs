use mvb_tree::{
    coding::{Codec, DecodeError, EncodeError, I32Codec},
    BPlusTree, Config, MemoryPageStore, MvConfig, MvTree,
};
use std::sync::Arc;

/// Pads entries so that leaves and inner nodes hold the same entry count.
pub struct PaddedI32Codec {
    max: usize,
}

impl PaddedI32Codec {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Codec<i32> for PaddedI32Codec {
    fn encode_into(&self, item: &i32, writer: &mut dyn std::io::Write) -> Result<(), EncodeError> {
        I32Codec.encode_into(item, writer)
    }

    fn decode_from(&self, reader: &mut dyn std::io::Read) -> Result<i32, DecodeError> {
        I32Codec.decode_from(reader)
    }

    fn max_size(&self) -> usize {
        self.max
    }
}

/// A single-version tree with `B = 4`, `D = 2` on every level.
#[allow(unused)]
pub fn small_tree(allow_duplicates: bool) -> BPlusTree<i32, i32, MemoryPageStore> {
    // header = 21, every entry padded to the 12-byte inner entry size
    let config = Config::new(21 + 4 * 12).allow_duplicates(allow_duplicates);

    BPlusTree::new(
        config,
        MemoryPageStore::new(),
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(12)),
        Arc::new(|v: &i32| *v),
    )
    .expect("scenario layout must fit")
}

/// A multi-version tree with `B_leaf = 4, D_leaf = 2, B_inner = 4,
/// D_inner = 2, epsilon = 0.25` (the scenario parameters).
#[allow(unused)]
pub fn small_mv_tree() -> MvTree<i32, i32, MemoryPageStore> {
    // mv header = 12 + 2 * 45 = 102; leaf entries padded from 21 up to the
    // 45-byte inner entry size, so a 282-byte block gives B = 4, D = 2
    let config = MvConfig::new(102 + 4 * 45, i32::MIN).epsilon(0.25);

    MvTree::new(
        config,
        MemoryPageStore::new(),
        MemoryPageStore::new(),
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(28)),
        Arc::new(|v: &i32| *v),
    )
    .expect("scenario layout must fit")
}

/// Collects a scan into a plain vector, failing the test on errors.
#[allow(unused)]
pub fn scan_all(tree: &mut MvTree<i32, i32, MemoryPageStore>, version: u64) -> Vec<i32> {
    tree.scan(i32::MIN + 1, i32::MAX, version)
        .collect::<mvb_tree::Result<_>>()
        .expect("scan must not fail")
}
