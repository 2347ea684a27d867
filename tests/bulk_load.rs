mod common;

use common::scan_all;
use mvb_tree::{
    bulk::queue::{Element, MemoryQueueFactory, SpillQueueFactory},
    coding::I32Codec,
    BulkOptions, PageStore,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn bulk_load_matches_incremental_inserts() -> mvb_tree::Result<()> {
    // The same five keys, loaded through the buffered path
    let mut bulk = common::small_mv_tree();
    bulk.bulk_load(
        [10, 20, 30, 40, 50].map(|key| Element::insert(key, 1)),
        &BulkOptions::new(16, Arc::new(MemoryQueueFactory)),
    )?;

    assert_eq!(2, bulk.height());
    assert_eq!(vec![10, 20, 30, 40, 50], scan_all(&mut bulk, 1));

    for key in [10, 20, 30, 40, 50] {
        assert_eq!(Some(key), bulk.get(&key, 1)?);
    }

    Ok(())
}

#[test]
fn bulk_load_is_deterministic() -> mvb_tree::Result<()> {
    let load = || -> mvb_tree::Result<(usize, Vec<i32>)> {
        let mut tree = common::small_mv_tree();
        tree.bulk_load(
            (1..=40).map(|key| Element::insert(key, 1)),
            &BulkOptions::new(16, Arc::new(MemoryQueueFactory)),
        )?;
        Ok((tree.store_mut().len(), scan_all(&mut tree, 1)))
    };

    assert_eq!(load()?, load()?);

    Ok(())
}

#[test]
fn bulk_stream_with_updates_and_deletes() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    let mut stream = Vec::new();
    for key in 1..=30 {
        stream.push(Element::insert(key, 1));
    }
    for key in (2..=30).step_by(2) {
        stream.push(Element::delete(key, 2));
    }
    stream.push(Element::update(7, 3));

    tree.bulk_insert(stream, &BulkOptions::new(20, Arc::new(MemoryQueueFactory)))?;

    // Odd keys survive
    let expect: Vec<i32> = (1..=30).filter(|k| k % 2 == 1).collect();
    assert_eq!(expect, scan_all(&mut tree, 3));

    // Deleted keys remain visible in the past
    assert_eq!(Some(2), tree.get(&2, 1)?);
    assert_eq!(None, tree.get(&2, 2)?);

    // The update closed the old record at version 3
    assert_eq!(Some(7), tree.get(&7, 3)?);
    let sevens: Vec<_> = tree
        .range_period(7, 7, 1, 3)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(2, sevens.len());

    Ok(())
}

#[test]
fn bulk_load_with_spill_queues() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    tree.bulk_load(
        (1..=60).map(|key| Element::insert(key, 1)),
        &BulkOptions::new(8, Arc::new(SpillQueueFactory::new(Arc::new(I32Codec)))),
    )?;

    let expect: Vec<i32> = (1..=60).collect();
    assert_eq!(expect, scan_all(&mut tree, 1));

    Ok(())
}

#[test]
fn bulk_load_requires_an_empty_tree() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();
    tree.insert(1, 10)?;

    assert!(tree
        .bulk_load(
            [Element::insert(20, 2)],
            &BulkOptions::new(16, Arc::new(MemoryQueueFactory)),
        )
        .is_err());

    // bulk_insert works on a non-empty tree
    tree.bulk_insert(
        [Element::insert(20, 2)],
        &BulkOptions::new(16, Arc::new(MemoryQueueFactory)),
    )?;
    assert_eq!(vec![10, 20], scan_all(&mut tree, 2));

    Ok(())
}

#[test]
fn bulk_insert_continues_version_history() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    for (version, key) in (1..).zip([10, 20, 30]) {
        tree.insert(version, key)?;
    }

    tree.bulk_insert(
        (4..=9).map(|v| Element::insert(i32::try_from(v).expect("fits") * 10, v)),
        &BulkOptions::new(16, Arc::new(MemoryQueueFactory)),
    )?;

    assert_eq!(vec![10, 20, 30], scan_all(&mut tree, 3));
    assert_eq!(
        vec![10, 20, 30, 40, 50, 60, 70, 80, 90],
        scan_all(&mut tree, 9),
    );

    Ok(())
}
