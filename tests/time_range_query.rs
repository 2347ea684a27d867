mod common;

use mvb_tree::Lifespan;
use std::sync::Arc;
use test_log::test;

fn sorted(mut records: Vec<(i32, Lifespan)>) -> Vec<(i32, Lifespan)> {
    records.sort_by_key(|(value, lifespan)| (*value, lifespan.begin()));
    records
}

/// The five-key tree with 50 removed at version 6 and 40 at version 7.
fn history_tree() -> mvb_tree::Result<mvb_tree::MvTree<i32, i32, mvb_tree::MemoryPageStore>> {
    let mut tree = common::small_mv_tree();

    for (version, key) in (1..).zip([10, 20, 30, 40, 50]) {
        tree.insert(version, key)?;
    }

    tree.remove(6, &50)?;
    tree.remove(7, &40)?;

    Ok(tree)
}

#[test]
fn each_record_is_emitted_exactly_once() -> mvb_tree::Result<()> {
    let mut tree = history_tree()?;

    let records = tree
        .range_period(0, 100, 1, 7)
        .collect::<mvb_tree::Result<Vec<_>>>()?;

    // Every record whose lifespan overlaps [1, 7], once each, with its
    // recorded lifespan - no matter how many leaves hold a copy of it
    assert_eq!(
        vec![
            (10, Lifespan::from(1)),
            (20, Lifespan::from(1)),
            (30, Lifespan::from(1)),
            (40, Lifespan::between(1, 7)),
            (50, Lifespan::between(1, 6)),
        ],
        sorted(records),
    );

    Ok(())
}

#[test]
fn window_clips_by_key_and_version() -> mvb_tree::Result<()> {
    let mut tree = history_tree()?;

    // Key window
    let records = tree
        .range_period(30, 45, 1, 7)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(
        vec![(30, Lifespan::from(1)), (40, Lifespan::between(1, 7))],
        sorted(records),
    );

    // Version window past 50's deletion
    let records = tree
        .range_period(0, 100, 6, 7)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(
        vec![
            (10, Lifespan::from(1)),
            (20, Lifespan::from(1)),
            (30, Lifespan::from(1)),
            (40, Lifespan::between(1, 7)),
        ],
        sorted(records),
    );

    // A window before anything existed
    let mut tree = common::small_mv_tree();
    tree.insert(5, 10)?;
    let records = tree
        .range_period(0, 100, 1, 4)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    assert!(records.is_empty());

    Ok(())
}

#[test]
fn priority_cursor_yields_in_key_order() -> mvb_tree::Result<()> {
    let mut tree = history_tree()?;

    let records = tree
        .range_period_ordered(0, 100, 1, 7, Arc::new(i32::cmp))
        .collect::<mvb_tree::Result<Vec<_>>>()?;

    let keys: Vec<_> = records.iter().map(|(value, _)| *value).collect();
    assert_eq!(vec![10, 20, 30, 40, 50], keys);

    // Reversing the comparator reverses the order
    let records = tree
        .range_period_ordered(0, 100, 1, 7, Arc::new(|a: &i32, b: &i32| b.cmp(a)))
        .collect::<mvb_tree::Result<Vec<_>>>()?;

    let keys: Vec<_> = records.iter().map(|(value, _)| *value).collect();
    assert_eq!(vec![50, 40, 30, 20, 10], keys);

    Ok(())
}
