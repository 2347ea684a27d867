mod common;

use common::scan_all;
use mvb_tree::Lifespan;
use test_log::test;

#[test]
fn underflow_strong_merges_into_left_sibling() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    for (version, key) in (1..).zip([10, 20, 30, 40, 50]) {
        tree.insert(version, key)?;
    }

    // Drain the right leaf; at the third removal it strong-underflows,
    // version-splits, and strong-merges into the left sibling, leaving the
    // root with a single live child
    assert_eq!(Some(30), tree.remove(6, &30)?);
    assert_eq!(Some(40), tree.remove(7, &40)?);
    assert_eq!(Some(50), tree.remove(8, &50)?);

    // The inner root retired and the merged leaf took over
    assert_eq!(1, tree.height());
    assert_eq!(vec![10, 20], scan_all(&mut tree, 8));

    // The catalog holds the root leaf retired at the version-5 split and
    // the inner root retired when it degenerated
    let regions = tree.historical_root_regions()?;
    let lifespans: Vec<_> = regions.iter().map(mvb_tree::MvRegion::lifespan).collect();
    assert_eq!(vec![Lifespan::between(1, 5), Lifespan::between(5, 7)], lifespans);

    // Earlier versions are still fully answerable
    assert_eq!(vec![10, 20, 30, 40, 50], scan_all(&mut tree, 5));
    assert_eq!(vec![10, 20, 40, 50], scan_all(&mut tree, 6));
    assert_eq!(vec![10, 20, 50], scan_all(&mut tree, 7));
    assert_eq!(Some(30), tree.get(&30, 5)?);
    assert_eq!(None, tree.get(&30, 6)?);

    Ok(())
}

#[test]
fn merge_prefers_the_left_sibling() -> mvb_tree::Result<()> {
    let mut tree = common::small_mv_tree();

    for (version, key) in (1..).zip([10, 20, 30, 40, 50]) {
        tree.insert(version, key)?;
    }

    // Drain the LEFT leaf instead; its merge partner is the right sibling
    // (there is no left one), and the survivor spans both key regions
    assert_eq!(Some(10), tree.remove(6, &10)?);
    assert_eq!(Some(20), tree.remove(7, &20)?);

    assert_eq!(vec![30, 40, 50], scan_all(&mut tree, 7));
    assert_eq!(vec![10, 20, 30, 40, 50], scan_all(&mut tree, 5));

    Ok(())
}
