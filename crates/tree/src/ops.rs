use std::cmp::Ordering;
use std::sync::Arc;

use avl_hash::Hasher;

use crate::node::Node;

/// `get(key)` (spec §4.3): the in-order index of `key` if present, and its
/// value if present. When absent, the index is the position `key` would
/// occupy if inserted — the "next index" absence-proof callers use.
pub fn get(node: &Arc<Node>, key: &[u8]) -> (u64, Option<Vec<u8>>) {
    match node.as_ref() {
        Node::Empty { .. } => (0, None),
        Node::Leaf { key: lk, value, .. } => match key.cmp(lk.as_slice()) {
            Ordering::Equal => (0, Some(value.clone())),
            Ordering::Less => (0, None),
            Ordering::Greater => (1, None),
        },
        Node::Inner { key: nk, left, right, .. } => {
            if key < nk.as_slice() {
                get(left, key)
            } else {
                let (idx, value) = get(right, key);
                (left.size() + idx, value)
            }
        }
    }
}

/// `get(index)`: the leaf at the given in-order position, if any.
pub fn get_index(node: &Arc<Node>, index: u64) -> Option<(Vec<u8>, Vec<u8>)> {
    match node.as_ref() {
        Node::Empty { .. } => None,
        Node::Leaf { key, value, .. } => {
            if index == 0 {
                Some((key.clone(), value.clone()))
            } else {
                None
            }
        }
        Node::Inner { left, right, .. } => {
            if index < left.size() {
                get_index(left, index)
            } else {
                get_index(right, index - left.size())
            }
        }
    }
}

/// Whether `key` is present in the tree.
pub fn has(node: &Arc<Node>, key: &[u8]) -> bool {
    get(node, key).1.is_some()
}

/// The smallest key strictly greater than `key`, if any.
pub fn next(node: &Arc<Node>, key: &[u8]) -> Option<Vec<u8>> {
    match node.as_ref() {
        Node::Empty { .. } => None,
        Node::Leaf { key: lk, .. } => {
            if lk.as_slice() > key {
                Some(lk.clone())
            } else {
                None
            }
        }
        Node::Inner { key: nk, left, right, .. } => {
            if key < nk.as_slice() {
                next(left, key).or_else(|| Some(nk.clone()))
            } else {
                next(right, key)
            }
        }
    }
}

/// In-order (or reverse-in-order) traversal. `f` returns `true` to abort
/// early; `iterate` itself returns `true` iff `f` asked to abort.
pub fn iterate(node: &Arc<Node>, ascending: bool, f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
    match node.as_ref() {
        Node::Empty { .. } => false,
        Node::Leaf { key, value, .. } => f(key, value),
        Node::Inner { left, right, .. } => {
            let (first, second) = if ascending { (left, right) } else { (right, left) };
            iterate(first, ascending, f) || iterate(second, ascending, f)
        }
    }
}

fn in_range(key: &[u8], start: Option<&[u8]>, end: Option<&[u8]>, inclusive: bool) -> bool {
    if let Some(s) = start {
        if key < s {
            return false;
        }
    }
    if let Some(e) = end {
        if inclusive {
            if key > e {
                return false;
            }
        } else if key >= e {
            return false;
        }
    }
    true
}

/// Restricts traversal to `start <= key < end` (or `<= end` when
/// `inclusive`); either bound may be absent. Prunes subtrees that
/// provably fall outside the bound using the AVL+ invariant that an
/// inner node's key is the minimum of its right child.
pub fn iterate_range(
    node: &Arc<Node>,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    inclusive: bool,
    ascending: bool,
    f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
) -> bool {
    match node.as_ref() {
        Node::Empty { .. } => false,
        Node::Leaf { key, value, .. } => {
            if in_range(key, start, end, inclusive) {
                f(key, value)
            } else {
                false
            }
        }
        Node::Inner { key: nk, left, right, .. } => {
            let left_possible = start.is_none_or(|s| s < nk.as_slice());
            let right_possible = match end {
                None => true,
                Some(e) => {
                    if inclusive {
                        nk.as_slice() <= e
                    } else {
                        nk.as_slice() < e
                    }
                }
            };

            let visit_left = |f: &mut dyn FnMut(&[u8], &[u8]) -> bool| {
                left_possible && iterate_range(left, start, end, inclusive, ascending, f)
            };
            let visit_right = |f: &mut dyn FnMut(&[u8], &[u8]) -> bool| {
                right_possible && iterate_range(right, start, end, inclusive, ascending, f)
            };

            if ascending {
                visit_left(f) || visit_right(f)
            } else {
                visit_right(f) || visit_left(f)
            }
        }
    }
}

/// `recursive_set` (spec §4.3): inserts or updates `key`/`value` at
/// `version`, returning the new subtree root and whether this was a new
/// key (as opposed to an update of an existing one). Every node this
/// displaces is appended to `orphans`; none is ever mutated in place.
pub fn recursive_set(
    hasher: &dyn Hasher,
    node: &Arc<Node>,
    key: &[u8],
    value: &[u8],
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> (Arc<Node>, bool) {
    match node.as_ref() {
        Node::Empty { .. } => (Node::leaf(hasher, key.to_vec(), value.to_vec(), version), false),
        Node::Leaf { key: lk, .. } => match key.cmp(lk.as_slice()) {
            Ordering::Equal => {
                orphans.push(node.clone());
                (Node::leaf(hasher, key.to_vec(), value.to_vec(), version), true)
            }
            Ordering::Less => {
                let new_leaf = Node::leaf(hasher, key.to_vec(), value.to_vec(), version);
                (Node::inner(hasher, lk.clone(), new_leaf, node.clone(), version), false)
            }
            Ordering::Greater => {
                let new_leaf = Node::leaf(hasher, key.to_vec(), value.to_vec(), version);
                (Node::inner(hasher, key.to_vec(), node.clone(), new_leaf, version), false)
            }
        },
        Node::Inner { key: nk, left, right, .. } => {
            orphans.push(node.clone());
            let (new_left, new_right, new_key, updated) = if key < nk.as_slice() {
                let (nl, updated) = recursive_set(hasher, left, key, value, version, orphans);
                (nl, right.clone(), nk.clone(), updated)
            } else {
                let (nr, updated) = recursive_set(hasher, right, key, value, version, orphans);
                (left.clone(), nr, nk.clone(), updated)
            };
            let rebuilt = Node::inner(hasher, new_key, new_left, new_right, version);
            (balance(hasher, rebuilt, version, orphans), updated)
        }
    }
}

/// `recursive_remove` (spec §4.3): removes `key` at `version` if present.
/// Returns the new subtree root (`None` if the subtree became empty), a
/// boundary key that must replace an ancestor's key when the ancestor's
/// right-subtree minimum changed, and the removed value if any. A no-op
/// removal (key not found) returns the same `Arc` it was given, orphaning
/// nothing.
pub fn recursive_remove(
    hasher: &dyn Hasher,
    node: &Arc<Node>,
    key: &[u8],
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> (Option<Arc<Node>>, Option<Vec<u8>>, Option<Vec<u8>>) {
    match node.as_ref() {
        Node::Empty { .. } => (None, None, None),
        Node::Leaf { key: lk, value, .. } => {
            if key == lk.as_slice() {
                orphans.push(node.clone());
                (None, None, Some(value.clone()))
            } else {
                (Some(node.clone()), None, None)
            }
        }
        Node::Inner { key: nk, left, right, .. } => {
            if key < nk.as_slice() {
                let (new_left, replacement_key, removed) =
                    recursive_remove(hasher, left, key, version, orphans);
                match new_left {
                    None => {
                        orphans.push(node.clone());
                        (Some(right.clone()), Some(nk.clone()), removed)
                    }
                    Some(nl) if Arc::ptr_eq(&nl, left) => (Some(node.clone()), None, None),
                    Some(nl) => {
                        orphans.push(node.clone());
                        let rebuilt = Node::inner(hasher, nk.clone(), nl, right.clone(), version);
                        (Some(balance(hasher, rebuilt, version, orphans)), replacement_key, removed)
                    }
                }
            } else {
                let (new_right, replacement_key, removed) =
                    recursive_remove(hasher, right, key, version, orphans);
                match new_right {
                    None => {
                        orphans.push(node.clone());
                        (Some(left.clone()), None, removed)
                    }
                    Some(nr) if Arc::ptr_eq(&nr, right) => (Some(node.clone()), None, None),
                    Some(nr) => {
                        orphans.push(node.clone());
                        let new_key = replacement_key.unwrap_or_else(|| nk.clone());
                        let rebuilt = Node::inner(hasher, new_key, left.clone(), nr, version);
                        (Some(balance(hasher, rebuilt, version, orphans)), None, removed)
                    }
                }
            }
        }
    }
}

/// Rebalances a freshly rebuilt inner node (spec §4.3's table). A no-op
/// unless `|left.height - right.height| > 1`.
pub fn balance(hasher: &dyn Hasher, node: Arc<Node>, version: i64, orphans: &mut Vec<Arc<Node>>) -> Arc<Node> {
    let (key, left, right) = match node.as_ref() {
        Node::Inner { key, left, right, .. } => (key.clone(), left.clone(), right.clone()),
        _ => return node,
    };

    let factor = left.height() as i64 - right.height() as i64;
    if factor > 1 {
        orphans.push(node.clone());
        if left.balance_factor() >= 0 {
            tracing::trace!(height = node.height(), "left-left rotation");
            right_rotate(hasher, key, left, right, version, orphans)
        } else {
            tracing::trace!(height = node.height(), "left-right rotation");
            let new_left = rotate_left_child_left(hasher, &left, version, orphans);
            right_rotate(hasher, key, new_left, right, version, orphans)
        }
    } else if factor < -1 {
        orphans.push(node.clone());
        if right.balance_factor() <= 0 {
            tracing::trace!(height = node.height(), "right-right rotation");
            left_rotate(hasher, key, left, right, version, orphans)
        } else {
            tracing::trace!(height = node.height(), "right-left rotation");
            let new_right = rotate_right_child_right(hasher, &right, version, orphans);
            left_rotate(hasher, key, left, new_right, version, orphans)
        }
    } else {
        node
    }
}

/// Right-rotates around a node with the given `key`/`left`/`right`: `left`
/// must be `Inner`. Returns the new subtree root; orphans the old `left`.
fn right_rotate(
    hasher: &dyn Hasher,
    key: Vec<u8>,
    left: Arc<Node>,
    right: Arc<Node>,
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> Arc<Node> {
    let (l_key, l_left, l_right) = match left.as_ref() {
        Node::Inner { key, left, right, .. } => (key.clone(), left.clone(), right.clone()),
        _ => unreachable!("right_rotate requires an Inner left child"),
    };
    orphans.push(left);
    let new_right = Node::inner(hasher, key, l_right, right, version);
    Node::inner(hasher, l_key, l_left, new_right, version)
}

/// Left-rotates around a node with the given `key`/`left`/`right`: `right`
/// must be `Inner`. Returns the new subtree root; orphans the old `right`.
fn left_rotate(
    hasher: &dyn Hasher,
    key: Vec<u8>,
    left: Arc<Node>,
    right: Arc<Node>,
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> Arc<Node> {
    let (r_key, r_left, r_right) = match right.as_ref() {
        Node::Inner { key, left, right, .. } => (key.clone(), left.clone(), right.clone()),
        _ => unreachable!("left_rotate requires an Inner right child"),
    };
    orphans.push(right);
    let new_left = Node::inner(hasher, key, left, r_left, version);
    Node::inner(hasher, r_key, new_left, r_right, version)
}

/// The first half of a Left-Right double rotation: left-rotates `left`
/// in place (`left.right` must be `Inner`).
fn rotate_left_child_left(
    hasher: &dyn Hasher,
    left: &Arc<Node>,
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> Arc<Node> {
    match left.as_ref() {
        Node::Inner { key, left: ll, right: lr, .. } => {
            left_rotate(hasher, key.clone(), ll.clone(), lr.clone(), version, orphans)
        }
        _ => unreachable!("Left-Right rotation requires an Inner left child"),
    }
}

/// The first half of a Right-Left double rotation: right-rotates `right`
/// in place (`right.left` must be `Inner`).
fn rotate_right_child_right(
    hasher: &dyn Hasher,
    right: &Arc<Node>,
    version: i64,
    orphans: &mut Vec<Arc<Node>>,
) -> Arc<Node> {
    match right.as_ref() {
        Node::Inner { key, left: rl, right: rr, .. } => {
            right_rotate(hasher, key.clone(), rl.clone(), rr.clone(), version, orphans)
        }
        _ => unreachable!("Right-Left rotation requires an Inner right child"),
    }
}
