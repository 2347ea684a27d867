mod common;

use common::PaddedI32Codec;
use mvb_tree::{coding::I32Codec, BPlusTree, BlockFile, Config, MvConfig, MvTree};
use std::sync::Arc;
use test_log::test;

type DiskTree = BPlusTree<i32, i32, BlockFile>;
type DiskMvTree = MvTree<i32, i32, BlockFile>;

fn disk_tree(store: BlockFile) -> mvb_tree::Result<DiskTree> {
    BPlusTree::new(
        Config::new(21 + 4 * 12),
        store,
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(12)),
        Arc::new(|v: &i32| *v),
    )
}

#[test]
fn tree_image_round_trips() -> mvb_tree::Result<()> {
    let dir = tempfile::tempdir()?;
    let pages = dir.path().join("pages");
    let meta = dir.path().join("tree.meta");

    let fingerprint = {
        let mut tree = disk_tree(BlockFile::create(&pages, 21 + 4 * 12)?)?;

        for key in [9, 3, 7, 1, 5, 8, 2, 6, 4] {
            tree.insert(key)?;
        }
        tree.remove(&7, |a, b| a == b)?;

        tree.persist(&meta)?;
        tree.store_mut().sync()?;

        (
            tree.height(),
            tree.len(),
            tree.key_range().cloned(),
            tree.scan(0, 100).collect::<mvb_tree::Result<Vec<_>>>()?,
        )
    };

    // Read the image back through the codecs
    let mut tree = BPlusTree::recover(
        Config::new(21 + 4 * 12),
        BlockFile::open(&pages)?,
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(12)),
        Arc::new(|v: &i32| *v),
        &meta,
    )?;

    assert_eq!(fingerprint.0, tree.height());
    assert_eq!(fingerprint.1, tree.len());
    assert_eq!(fingerprint.2, tree.key_range().cloned());
    assert_eq!(
        fingerprint.3,
        tree.scan(0, 100).collect::<mvb_tree::Result<Vec<_>>>()?,
    );

    // The recovered tree accepts writes
    tree.insert(100)?;
    assert_eq!(Some(100), tree.get(&100)?);

    Ok(())
}

fn disk_mv_tree(store: BlockFile, roots: BlockFile) -> mvb_tree::Result<DiskMvTree> {
    MvTree::new(
        MvConfig::new(102 + 4 * 45, i32::MIN),
        store,
        roots,
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(28)),
        Arc::new(|v: &i32| *v),
    )
}

#[test]
fn mv_tree_image_round_trips() -> mvb_tree::Result<()> {
    let dir = tempfile::tempdir()?;
    let pages = dir.path().join("pages");
    let roots = dir.path().join("roots");
    let block_size = 102 + 4 * 45;

    let fingerprint = {
        let mut tree = disk_mv_tree(
            BlockFile::create(&pages, block_size)?,
            BlockFile::create(&roots, block_size)?,
        )?;

        for (version, key) in (1..).zip([10, 20, 30, 40, 50]) {
            tree.insert(version, key)?;
        }
        tree.remove(6, &50)?;
        tree.remove(7, &40)?;

        tree.persist(dir.path())?;
        tree.store_mut().sync()?;

        let mut history = tree
            .range_period(0, 100, 1, 7)
            .collect::<mvb_tree::Result<Vec<_>>>()?;
        history.sort_by_key(|(value, lifespan)| (*value, lifespan.begin()));

        (
            tree.height(),
            tree.current_version(),
            tree.historical_root_count(),
            history,
        )
    };

    let mut tree = MvTree::recover(
        MvConfig::new(block_size, i32::MIN),
        BlockFile::open(&pages)?,
        BlockFile::open(&roots)?,
        Arc::new(I32Codec),
        Arc::new(PaddedI32Codec::new(28)),
        Arc::new(|v: &i32| *v),
        dir.path(),
    )?;

    assert_eq!(fingerprint.0, tree.height());
    assert_eq!(fingerprint.1, tree.current_version());
    assert_eq!(fingerprint.2, tree.historical_root_count());

    let mut history = tree
        .range_period(0, 100, 1, 7)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    history.sort_by_key(|(value, lifespan)| (*value, lifespan.begin()));
    assert_eq!(fingerprint.3, history);

    // Time travel still resolves through the recovered catalog
    assert_eq!(Some(50), tree.get(&50, 5)?);
    assert_eq!(None, tree.get(&50, 6)?);

    // And the recovered tree accepts versioned writes
    tree.insert(8, 60)?;
    assert_eq!(Some(60), tree.get(&60, 8)?);

    Ok(())
}
