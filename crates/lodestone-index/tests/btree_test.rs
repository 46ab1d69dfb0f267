//! B+Tree integration tests.
//!
//! These drive the whole stack: tree operations over a real buffer pool
//! over a real database file, with pool sizes small enough that eviction
//! and refetching happen constantly.

use rand::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

use lodestone_buffer::{
    BufferPoolConfig, BufferPoolManager, FileDiskManager, FileDiskManagerConfig,
};
use lodestone_common::page::PageId;
use lodestone_common::rid::Rid;
use lodestone_index::{node_kind, BPlusTree, DefaultComparator, InternalView, NodeKind};

type IntTree = BPlusTree<i64, Rid, DefaultComparator>;

struct Fixture {
    _dir: tempfile::TempDir,
    bpm: Arc<BufferPoolManager>,
}

fn fixture(num_frames: usize) -> Fixture {
    let dir = tempdir().unwrap();
    let disk = FileDiskManager::new(FileDiskManagerConfig {
        db_path: dir.path().join("index.db"),
        fsync_enabled: false,
    })
    .unwrap();
    let bpm = Arc::new(BufferPoolManager::new(
        BufferPoolConfig {
            num_frames,
            replacer_k: 2,
        },
        Arc::new(disk),
    ));
    Fixture { _dir: dir, bpm }
}

fn tree(fx: &Fixture, leaf_max: u32, internal_max: u32) -> IntTree {
    BPlusTree::new("test_index", fx.bpm.clone(), DefaultComparator, leaf_max, internal_max)
        .unwrap()
}

fn rid(key: i64) -> Rid {
    Rid::new(PageId(key), key as u32)
}

fn collect_keys(tree: &IntTree) -> Vec<i64> {
    tree.iter().unwrap().map(|(k, _)| k).collect()
}

fn root_kind(fx: &Fixture, tree: &IntTree) -> NodeKind {
    let frame = fx.bpm.fetch_page(tree.root_page_id()).unwrap();
    let kind = node_kind(&frame.read_data()[..]);
    fx.bpm.unpin_page(tree.root_page_id(), false);
    kind
}

#[test]
fn test_empty_tree() {
    let fx = fixture(16);
    let tree = tree(&fx, 4, 4);

    assert!(tree.is_empty());
    assert!(!tree.root_page_id().is_valid());
    assert!(tree.get_value(&1).unwrap().is_empty());
    assert!(tree.iter().unwrap().is_end());
    assert_eq!(tree.iter().unwrap().next(), None);

    // Removing from an empty tree is a silent success.
    tree.remove(&1).unwrap();
}

#[test]
fn test_insert_and_get_roundtrip() {
    let fx = fixture(16);
    let tree = tree(&fx, 4, 4);

    for key in [5i64, 1, 9, 3, 7] {
        assert!(tree.insert(&key, &rid(key)).unwrap());
    }

    for key in [5i64, 1, 9, 3, 7] {
        assert_eq!(tree.get_value(&key).unwrap(), vec![rid(key)]);
    }
    assert!(tree.get_value(&4).unwrap().is_empty());
}

#[test]
fn test_insert_duplicate_rejected() {
    let fx = fixture(16);
    let tree = tree(&fx, 4, 4);

    assert!(tree.insert(&1, &rid(1)).unwrap());
    assert!(!tree.insert(&1, &rid(2)).unwrap());

    // The original value survives.
    assert_eq!(tree.get_value(&1).unwrap(), vec![rid(1)]);
}

#[test]
fn test_leaf_split_propagation() {
    // leaf_max 3, internal_max 3: inserting 1..=4 splits a leaf, then the
    // parent, leaving an internal root of size 2 over two levels.
    let fx = fixture(16);
    let tree = tree(&fx, 3, 3);

    for key in 1..=4i64 {
        assert!(tree.insert(&key, &rid(key)).unwrap());
    }

    assert_eq!(root_kind(&fx, &tree), NodeKind::Internal);
    {
        let frame = fx.bpm.fetch_page(tree.root_page_id()).unwrap();
        let mut data = frame.write_data();
        let root = InternalView::<i64>::attach(&mut data[..]);
        assert_eq!(root.size(), 2);
        drop(data);
        fx.bpm.unpin_page(tree.root_page_id(), false);
    }

    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4]);
    for key in 1..=4i64 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![rid(key)]);
    }
}

#[test]
fn test_delete_with_coalesce_collapses_root() {
    // Starting from the split tree of 1..=4, removing 2 then 1 coalesces
    // leaves and collapses the root back to a single leaf.
    let fx = fixture(16);
    let tree = tree(&fx, 3, 3);
    for key in 1..=4i64 {
        tree.insert(&key, &rid(key)).unwrap();
    }

    tree.remove(&2).unwrap();
    tree.remove(&1).unwrap();

    assert!(!tree.is_empty());
    assert_eq!(root_kind(&fx, &tree), NodeKind::Leaf);
    assert_eq!(collect_keys(&tree), vec![3, 4]);
}

#[test]
fn test_remove_is_idempotent() {
    let fx = fixture(16);
    let tree = tree(&fx, 4, 4);
    for key in 1..=10i64 {
        tree.insert(&key, &rid(key)).unwrap();
    }

    tree.remove(&5).unwrap();
    tree.remove(&5).unwrap();

    assert!(tree.get_value(&5).unwrap().is_empty());
    assert_eq!(collect_keys(&tree).len(), 9);
}

#[test]
fn test_remove_all_then_reuse() {
    let fx = fixture(32);
    let tree = tree(&fx, 3, 3);

    for key in 1..=30i64 {
        tree.insert(&key, &rid(key)).unwrap();
    }
    for key in 1..=30i64 {
        tree.remove(&key).unwrap();
    }

    assert!(tree.is_empty());
    assert!(tree.iter().unwrap().is_end());

    // The emptied index registers a fresh root and works again.
    assert!(tree.insert(&42, &rid(42)).unwrap());
    assert_eq!(tree.get_value(&42).unwrap(), vec![rid(42)]);
    assert_eq!(collect_keys(&tree), vec![42]);
}

#[test]
fn test_iterator_fidelity() {
    let fx = fixture(64);
    let tree = tree(&fx, 4, 4);

    let mut keys: Vec<i64> = (0..200).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));
    for &key in &keys {
        tree.insert(&key, &rid(key)).unwrap();
    }

    let pairs: Vec<(i64, Rid)> = tree.iter().unwrap().collect();
    assert_eq!(pairs.len(), 200);
    for (i, (key, value)) in pairs.iter().enumerate() {
        assert_eq!(*key, i as i64);
        assert_eq!(*value, rid(*key));
    }
}

#[test]
fn test_iter_from() {
    let fx = fixture(32);
    let tree = tree(&fx, 3, 3);
    for key in (0..40i64).step_by(2) {
        tree.insert(&key, &rid(key)).unwrap();
    }

    // Exact hit.
    let keys: Vec<i64> = tree.iter_from(&10).unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys.first(), Some(&10));
    assert_eq!(keys.len(), 15);

    // Between stored keys: starts at the next larger one.
    let keys: Vec<i64> = tree.iter_from(&11).unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys.first(), Some(&12));

    // Past the maximum: an exhausted iterator.
    let mut it = tree.iter_from(&1000).unwrap();
    assert_eq!(it.next(), None);
}

#[test]
fn test_sequential_descending_insert() {
    let fx = fixture(64);
    let tree = tree(&fx, 3, 3);

    for key in (0..100i64).rev() {
        tree.insert(&key, &rid(key)).unwrap();
    }

    assert_eq!(collect_keys(&tree), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_eviction_pressure() {
    // A pool of 8 frames forces the working set through eviction and
    // refetch on nearly every operation.
    let fx = fixture(8);
    let tree = tree(&fx, 32, 32);

    for key in 0..400i64 {
        tree.insert(&key, &rid(key)).unwrap();
    }
    for key in 0..400i64 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![rid(key)], "key {key}");
    }
    assert_eq!(collect_keys(&tree).len(), 400);
}

#[test]
fn test_pin_conservation() {
    let fx = fixture(16);
    let tree = tree(&fx, 3, 3);

    let assert_unpinned = |when: &str| {
        let stats = fx.bpm.stats();
        assert_eq!(stats.pinned_frames, 0, "leaked pin {when}");
    };

    for key in 0..50i64 {
        tree.insert(&key, &rid(key)).unwrap();
        assert_unpinned("after insert");
    }
    for key in 0..50i64 {
        tree.get_value(&key).unwrap();
        assert_unpinned("after get_value");
    }

    // A live iterator owns exactly one pin, on its current leaf.
    {
        let mut it = tree.iter().unwrap();
        it.next();
        assert_eq!(fx.bpm.stats().pinned_frames, 1);
    }
    assert_unpinned("after iterator drop");

    for key in 0..50i64 {
        tree.remove(&key).unwrap();
        assert_unpinned("after remove");
    }
}

#[test]
fn test_random_workload_against_model() {
    let fx = fixture(32);
    // Small fanouts exercise splits, coalesces, and redistribution in both
    // node kinds.
    let tree = tree(&fx, 3, 5);
    let mut model = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..3000 {
        let key = rng.gen_range(0..500i64);
        if rng.gen_bool(0.6) {
            let inserted = tree.insert(&key, &rid(key)).unwrap();
            assert_eq!(inserted, model.insert(key, rid(key)).is_none());
        } else {
            tree.remove(&key).unwrap();
            model.remove(&key);
        }
    }

    for key in 0..500i64 {
        let expected: Vec<Rid> = model.get(&key).copied().into_iter().collect();
        assert_eq!(tree.get_value(&key).unwrap(), expected, "key {key}");
    }

    let pairs: Vec<(i64, Rid)> = tree.iter().unwrap().collect();
    let expected: Vec<(i64, Rid)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(pairs, expected);

    assert_eq!(fx.bpm.stats().pinned_frames, 0);
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("persist.db");

    {
        let disk = FileDiskManager::new(FileDiskManagerConfig {
            db_path: db_path.clone(),
            fsync_enabled: false,
        })
        .unwrap();
        let bpm = Arc::new(BufferPoolManager::new(
            BufferPoolConfig {
                num_frames: 32,
                replacer_k: 2,
            },
            Arc::new(disk),
        ));
        let tree: IntTree =
            BPlusTree::new("persist_index", bpm.clone(), DefaultComparator, 3, 3).unwrap();

        for key in 0..60i64 {
            tree.insert(&key, &rid(key)).unwrap();
        }
        bpm.flush_all().unwrap();
    }

    // A fresh pool over the same file restores every node verbatim.
    let disk = FileDiskManager::new(FileDiskManagerConfig {
        db_path,
        fsync_enabled: false,
    })
    .unwrap();
    let bpm = Arc::new(BufferPoolManager::new(
        BufferPoolConfig {
            num_frames: 32,
            replacer_k: 2,
        },
        Arc::new(disk),
    ));
    let tree: IntTree =
        BPlusTree::new("persist_index", bpm.clone(), DefaultComparator, 3, 3).unwrap();

    assert!(!tree.is_empty());
    for key in 0..60i64 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![rid(key)], "key {key}");
    }
    assert_eq!(collect_keys(&tree), (0..60).collect::<Vec<_>>());
}

#[test]
fn test_two_indexes_share_one_pool() {
    let fx = fixture(32);
    let orders: IntTree =
        BPlusTree::new("orders_pk", fx.bpm.clone(), DefaultComparator, 4, 4).unwrap();
    let users: IntTree =
        BPlusTree::new("users_pk", fx.bpm.clone(), DefaultComparator, 4, 4).unwrap();

    for key in 0..50i64 {
        orders.insert(&key, &rid(key)).unwrap();
        users.insert(&key, &rid(key + 1000)).unwrap();
    }

    for key in 0..50i64 {
        assert_eq!(orders.get_value(&key).unwrap(), vec![rid(key)]);
        assert_eq!(users.get_value(&key).unwrap(), vec![rid(key + 1000)]);
    }
    assert_ne!(orders.root_page_id(), users.root_page_id());
}
