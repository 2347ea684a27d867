mod common;

use mvb_tree::PageStore;
use test_log::test;

#[test]
fn five_inserts_grow_one_level() -> mvb_tree::Result<()> {
    let mut tree = common::small_tree(false);

    for key in [10, 20, 30, 40, 50] {
        tree.insert(key)?;
    }

    // The fifth insert overflows the root leaf and splits it
    assert_eq!(2, tree.height());
    assert_eq!(5, tree.len());

    // Two leaves headed by separators 20 and 50
    let separators: Vec<_> = tree.query(&0, &100, 0)?.map(|h| h.separator).collect();
    assert_eq!(vec![20, 50], separators);

    // Three pages total: two leaves plus the root
    assert_eq!(3, tree.store_mut().len());

    let all = tree.scan(0, 100).collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(vec![10, 20, 30, 40, 50], all);

    // The split put two values left and three right
    let left = tree.scan(0, 20).collect::<mvb_tree::Result<Vec<_>>>()?;
    assert_eq!(vec![10, 20], left);

    Ok(())
}

#[test]
fn four_inserts_stay_in_one_leaf() -> mvb_tree::Result<()> {
    let mut tree = common::small_tree(false);

    for key in [10, 20, 30, 40] {
        tree.insert(key)?;
    }

    assert_eq!(1, tree.height());
    assert_eq!(1, tree.store_mut().len());

    Ok(())
}

#[test]
fn descriptor_spans_all_keys() -> mvb_tree::Result<()> {
    let mut tree = common::small_tree(false);

    for key in [30, 10, 50, 20, 40] {
        tree.insert(key)?;
    }

    let range = tree.key_range().cloned().expect("tree is not empty");
    assert_eq!((&10, &50), (range.min(), range.max()));

    Ok(())
}
