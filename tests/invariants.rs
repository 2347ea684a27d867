mod common;

use common::scan_all;
use mvb_tree::{
    bulk::queue::{Element, MemoryQueueFactory},
    tree::node::NodeContent,
    BulkOptions, Lifespan, MemoryPageStore, PageId, Version,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use test_log::test;

type Tree = mvb_tree::BPlusTree<i32, i32, MemoryPageStore>;
type MvTree = mvb_tree::MvTree<i32, i32, MemoryPageStore>;

/// Walks a single-version tree, checking bounds, sortedness and separator
/// correctness, and returns the leaf pages in key order.
fn check_subtree(
    tree: &mut Tree,
    id: PageId,
    is_root: bool,
    separator: i32,
    leaves: &mut Vec<PageId>,
) -> mvb_tree::Result<()> {
    let layout = tree.layout();
    let node = tree.read_page(id)?;

    let min = if node.is_leaf() {
        layout.d_leaf
    } else {
        layout.d_inner
    };
    let max = layout.capacity(node.level);

    if is_root {
        assert!(node.len() >= 1, "root must not be empty");
    } else {
        assert!(node.len() >= min, "node {id} underflows: {}", node.len());
    }
    assert!(node.len() <= max, "node {id} overflows: {}", node.len());

    match &node.content {
        NodeContent::Leaf(values) => {
            for pair in values.windows(2) {
                assert!(pair[0] < pair[1], "leaf {id} is not strictly sorted");
            }
            if let Some(last) = values.last() {
                assert!(*last <= separator, "leaf {id} exceeds its separator");
            }
            leaves.push(id);
        }
        NodeContent::Inner(entries) => {
            for pair in entries.windows(2) {
                assert!(
                    pair[0].separator < pair[1].separator,
                    "inner {id} separators out of order",
                );
            }
            if let Some(last) = entries.last() {
                assert!(last.separator <= separator, "inner {id} exceeds its separator");
            }

            for entry in entries {
                check_subtree(tree, entry.id, false, entry.separator, leaves)?;
            }
        }
    }

    Ok(())
}

fn check_structure(tree: &mut Tree) -> mvb_tree::Result<()> {
    let Some((root_id, _)) = tree.root_handle() else {
        return Ok(());
    };

    let mut leaves = Vec::new();
    check_subtree(tree, root_id, true, i32::MAX, &mut leaves)?;

    // The next-neighbor chain visits every leaf in key order exactly once
    let mut chained = Vec::new();
    let mut cursor = leaves.first().copied();

    while let Some(id) = cursor {
        chained.push(id);
        cursor = tree.read_page(id)?.next.as_ref().map(|e| e.id);
    }

    assert_eq!(leaves, chained, "leaf chain does not match key order");

    Ok(())
}

#[test]
fn random_workload_keeps_the_structure_sound() -> mvb_tree::Result<()> {
    let mut tree = common::small_tree(false);
    let mut rng = StdRng::seed_from_u64(0xB7EE);
    let mut model = std::collections::BTreeSet::new();

    for _ in 0..400 {
        let key = rng.random_range(0..200);

        if model.contains(&key) {
            assert_eq!(Some(key), tree.remove(&key, |a, b| a == b)?);
            model.remove(&key);
        } else {
            tree.insert(key)?;
            model.insert(key);
        }

        check_structure(&mut tree)?;
    }

    let live = tree.scan(-1, 1000).collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(model.into_iter().collect::<Vec<_>>(), live);

    Ok(())
}

/// Checks the multi-version leaves reachable from the live root: lifespans
/// never degenerate to points, entries stay (key, begin)-sorted, and the
/// weak version condition holds below the root.
fn check_mv_subtree(
    tree: &mut MvTree,
    id: PageId,
    is_root: bool,
    version: Version,
) -> mvb_tree::Result<()> {
    let layout = tree.layout();
    let node = tree.read_page(id)?;

    assert!(
        node.len() <= layout.capacity(node.level),
        "mv node {id} physically overflows",
    );

    if !is_root {
        assert!(
            node.live_count(version) >= layout.min_count(node.level),
            "mv node {id} violates the weak version condition",
        );
    }

    if node.is_leaf() {
        let entries = node.leaf_entries();

        for entry in entries {
            assert!(!entry.lifespan.is_point(), "leaf {id} kept a point lifespan");
        }
        for pair in entries.windows(2) {
            assert!(
                (pair[0].value, pair[0].lifespan.begin())
                    <= (pair[1].value, pair[1].lifespan.begin()),
                "leaf {id} entries out of order",
            );
        }
    } else {
        for idx in node.live_children(version) {
            if let Some(entry) = node.children().get(idx) {
                check_mv_subtree(tree, entry.id, false, version)?;
            }
        }
    }

    Ok(())
}

#[test]
fn versioned_workload_agrees_with_a_model_at_every_version() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();
    let mut rng = StdRng::seed_from_u64(0x5EED);

    // Per key, the open record if any; plus every closed record
    let mut open: BTreeMap<i32, Version> = BTreeMap::new();
    let mut closed: Vec<(i32, Version, Version)> = Vec::new();

    for version in 1..=160_u64 {
        let key = rng.random_range(0..60);

        if let Some(begin) = open.get(&key).copied() {
            assert_eq!(Some(key), tree.remove(version, &key)?);

            open.remove(&key);
            if begin < version {
                closed.push((key, begin, version));
            }
        } else {
            tree.insert(version, key)?;
            open.insert(key, version);
        }

        if let Some((root_id, _)) = tree.root_handle() {
            check_mv_subtree(&mut tree, root_id, true, version)?;
        }
    }

    // Every historical version answers from its own snapshot
    for version in (1..=160).step_by(7) {
        let expect: Vec<i32> = open
            .iter()
            .filter(|(_, &begin)| begin <= version)
            .map(|(&key, _)| key)
            .chain(
                closed
                    .iter()
                    .filter(|&&(_, begin, end)| begin <= version && version < end)
                    .map(|&(key, _, _)| key),
            )
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        assert_eq!(expect, scan_all(&mut tree, version), "snapshot at {version}");
    }

    // The full time-range query returns every record exactly once
    let mut expect: Vec<(i32, Lifespan)> = open
        .iter()
        .map(|(&key, &begin)| (key, Lifespan::from(begin)))
        .chain(
            closed
                .iter()
                .map(|&(key, begin, end)| (key, Lifespan::between(begin, end))),
        )
        .collect();
    expect.sort_by_key(|(key, lifespan)| (*key, lifespan.begin()));

    let mut got = tree
        .range_period(0, 100, 1, 160)
        .collect::<mvb_tree::Result<Vec<_>>>()?;
    got.sort_by_key(|(key, lifespan)| (*key, lifespan.begin()));

    assert_eq!(expect, got);

    Ok(())
}

#[test]
fn bulk_load_settles_within_the_weight_bounds() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    tree.bulk_load(
        (1..=120).map(|key| Element::insert(key, 1)),
        &BulkOptions::new(32, Arc::new(MemoryQueueFactory)),
    )?;

    let layout = tree.layout();
    let parameter_a = layout.d_inner.max(2) as f64;

    let min_live = |level: u32| -> f64 {
        if level == 0 {
            layout.d_leaf as f64
        } else {
            layout.d_inner as f64 * parameter_a.powi(level as i32)
        }
    };
    let max_live = |level: u32| -> f64 {
        if level == 0 {
            layout.b_leaf as f64
        } else {
            layout.b_inner as f64 * parameter_a.powi(level as i32)
        }
    };

    // Walk every non-root entry and check its settled counters
    let (root_id, _) = tree.root_handle().expect("tree is not empty");
    let mut stack = vec![root_id];

    while let Some(id) = stack.pop() {
        let node = tree.read_page(id)?;

        for entry in node.children() {
            if !entry.separator.is_live_at(1) {
                continue;
            }

            let level = node.level - 1;
            let w = entry.weight.live as f64;
            let t = entry.weight.total as f64;

            assert!(
                w >= min_live(level) && w <= max_live(level),
                "live weight {w} out of bounds at level {level}",
            );
            assert!(t <= max_live(level), "op counter {t} out of bounds");

            stack.push(entry.id);
        }
    }

    assert_eq!((1..=120).collect::<Vec<_>>(), scan_all(&mut tree, 1));

    Ok(())
}
