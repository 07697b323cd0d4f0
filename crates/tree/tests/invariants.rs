//! Property tests over arbitrary sequences of `set`/`remove` (spec §8,
//! invariants 1-4 and 9), in the teacher's `proptest` style of generating
//! an operation sequence and folding it over the structure under test.

use std::collections::BTreeMap;
use std::sync::Arc;

use avl_hash::Sha256Hasher;
use avl_tree::{get, has, iterate, recursive_remove, recursive_set, Node};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<u8>()).prop_map(|(k, v)| Op::Set(k, v)),
        any::<u8>().prop_map(Op::Remove),
    ]
}

fn assert_avl_invariants(node: &Arc<Node>) {
    match node.as_ref() {
        Node::Empty { .. } => {}
        Node::Leaf { .. } => {
            assert_eq!(node.size(), 1);
            assert_eq!(node.height(), 0);
        }
        Node::Inner { left, right, .. } => {
            let balance = left.height() as i64 - right.height() as i64;
            assert!(balance.abs() <= 1, "AVL balance violated: {balance}");
            assert_eq!(node.size(), left.size() + right.size());
            assert_eq!(node.height(), 1 + left.height().max(right.height()));
            assert_avl_invariants(left);
            assert_avl_invariants(right);
        }
    }
}

fn in_order_keys(node: &Arc<Node>) -> Vec<u8> {
    let mut keys = Vec::new();
    iterate(node, true, &mut |k, _| {
        keys.push(k[0]);
        false
    });
    keys
}

proptest! {
    #[test]
    fn invariants_hold_after_arbitrary_mutations(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let hasher = Sha256Hasher;
        let mut root = Node::empty(&hasher);
        let mut model: BTreeMap<u8, u8> = BTreeMap::new();
        let mut version = 0i64;

        for op in ops {
            let mut orphans = Vec::new();
            match op {
                Op::Set(k, v) => {
                    let (new_root, _) = recursive_set(&hasher, &root, &[k], &[v], version, &mut orphans);
                    root = new_root;
                    model.insert(k, v);
                }
                Op::Remove(k) => {
                    let (new_root, _, _) = recursive_remove(&hasher, &root, &[k], version, &mut orphans);
                    root = new_root.unwrap_or_else(|| Node::empty(&hasher));
                    model.remove(&k);
                }
            }
            version += 1;

            assert_avl_invariants(&root);

            let keys = in_order_keys(&root);
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(&keys, &sorted, "in-order traversal must be ascending");

            prop_assert_eq!(root.size(), model.len() as u64);
            for (k, v) in &model {
                prop_assert!(has(&root, &[*k]));
                prop_assert_eq!(get(&root, &[*k]).1, Some(vec![*v]));
            }
        }
    }

    #[test]
    fn set_then_remove_restores_absence(key in any::<u8>(), value in any::<u8>()) {
        let hasher = Sha256Hasher;
        let empty = Node::empty(&hasher);
        let mut orphans = Vec::new();
        let (after_set, _) = recursive_set(&hasher, &empty, &[key], &[value], 0, &mut orphans);
        let (after_remove, _, removed) = recursive_remove(&hasher, &after_set, &[key], 1, &mut orphans);
        prop_assert_eq!(removed, Some(vec![value]));
        prop_assert!(after_remove.is_none());
    }

    #[test]
    fn remove_then_set_restores_value(key in any::<u8>(), value in any::<u8>(), other in any::<u8>()) {
        let hasher = Sha256Hasher;
        let mut orphans = Vec::new();
        let empty = Node::empty(&hasher);
        let (with_key, _) = recursive_set(&hasher, &empty, &[key], &[value], 0, &mut orphans);
        let (without_key, _, _) = recursive_remove(&hasher, &with_key, &[key], 1, &mut orphans);
        let without_key = without_key.unwrap_or_else(|| Node::empty(&hasher));
        let (restored, _) = recursive_set(&hasher, &without_key, &[key], &[other], 2, &mut orphans);
        prop_assert_eq!(get(&restored, &[key]).1, Some(vec![other]));
    }
}
