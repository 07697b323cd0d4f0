//! The concrete scenarios from spec §8, exercised through the public
//! `Tree`/`NodeStore` surface rather than the pure `avl-tree` algorithms
//! directly, so this also stands as an integration test of C5/C6.

use avl_store::{MemoryNodeStore, NodeStore, Tree};

fn k(n: u8) -> Vec<u8> {
    vec![n]
}

#[test]
fn scenario_1_ascending_inserts_are_balanced_and_indexed() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    let (idx, value) = tree.get(&k(6)).unwrap();
    assert_eq!(idx, 6);
    assert_eq!(value, Some(k(6)));
}

#[test]
fn scenario_2_remove_shrinks_the_tree() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    tree.remove(&k(4)).unwrap();
    assert!(!tree.has(&k(4)).unwrap());
    assert!(tree.has(&k(5)).unwrap());
}

#[test]
fn scenario_3_iterate_range_is_end_exclusive() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    let mut seen = Vec::new();
    tree.iterate_range(Some(&k(4)), Some(&k(9)), false, true, &mut |key, _| {
        seen.push(key.to_vec());
        false
    })
    .unwrap();
    assert_eq!(seen, vec![k(4), k(5), k(6), k(7), k(8)]);
}

#[test]
fn scenario_4_existence_proof_verifies() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    let (root, version) = tree.commit().unwrap();
    let (value, proof) = tree.get_versioned_with_proof(&k(4), version).unwrap();
    let proof = proof.unwrap();
    assert_eq!(value, Some(k(4)));
    assert_eq!(proof.root_digest(tree.store().hasher()).unwrap(), root);
    proof.verify_item(tree.store().hasher(), &root, &k(4), &k(4)).unwrap();
}

#[test]
fn scenario_5_absence_proof_past_the_end() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    let (root, version) = tree.commit().unwrap();
    let (value, proof) = tree.get_versioned_with_proof(&k(0x0A), version).unwrap();
    let proof = proof.unwrap();
    assert_eq!(value, None);
    assert!(proof.tree_end(tree.store().hasher()).unwrap());
    proof.verify_absence(tree.store().hasher(), &root, &k(0x0A)).unwrap();
    let err = proof.verify_item(tree.store().hasher(), &root, &k(0x0A), &k(0x0A)).unwrap_err();
    assert!(matches!(err, avl_tree::TreeError::KeyNotInProof));
}

#[test]
fn scenario_6_commit_history_and_delete_last() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    for i in 0..10u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    tree.commit().unwrap();
    for i in 10..20u8 {
        tree.set(&k(i), &k(i)).unwrap();
    }
    tree.commit().unwrap();

    assert_eq!(tree.store().versions().unwrap(), [0, 1, 2].into_iter().collect());
    assert_eq!(tree.store().root_at(1).unwrap().unwrap().size(), 10);
    assert_eq!(tree.store().root_at(2).unwrap().unwrap().size(), 20);

    tree.delete_version(2).unwrap();
    assert_eq!(tree.store().versions().unwrap(), [0, 1].into_iter().collect());
}

#[test]
fn rollback_restores_working_hash_across_an_aborted_batch() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    tree.set(&k(1), &k(1)).unwrap();
    tree.commit().unwrap();
    let hash_before = tree.working_hash();

    tree.set(&k(2), &k(2)).unwrap();
    tree.remove(&k(1)).unwrap();
    tree.rollback().unwrap();

    assert_eq!(tree.working_hash(), hash_before);
}

#[test]
fn set_remove_round_trip_restores_absence_through_the_facade() {
    let mut tree = Tree::new(MemoryNodeStore::new());
    tree.set(b"k", b"v").unwrap();
    let (removed_value, removed) = tree.remove(b"k").unwrap();
    assert!(removed);
    assert_eq!(removed_value, Some(b"v".to_vec()));
    assert!(!tree.has(b"k").unwrap());
}
