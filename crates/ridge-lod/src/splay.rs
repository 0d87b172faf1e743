//! Top-down splay tree keyed by `(priority, tile, triangle)`.
//!
//! Nodes live in a [`NodeArena`] that the caller owns and lends to every
//! operation, so one arena can back several trees. Each access splays the
//! touched node to the root, which keeps the hot ends of the queues (the
//! best split and the worst merge) a step or two from the root.

use crate::arena::{ArenaError, NodeArena, NodeHandle};

/// Ordering key of a queued triangle.
///
/// Field order gives the total order: priority, then tile id, then triangle
/// index, all ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    /// Quantized screen-space error.
    pub priority: u16,
    /// Tile the triangle belongs to.
    pub tile: u32,
    /// Triangle index inside the tile.
    pub tri: u32,
}

impl QueueKey {
    #[must_use]
    pub fn new(priority: u16, tile: u32, tri: u32) -> Self {
        Self { priority, tile, tri }
    }
}

/// A tree node: key plus child links.
#[derive(Clone, Copy, Debug)]
pub struct SplayNode {
    key: QueueKey,
    left: Option<NodeHandle>,
    right: Option<NodeHandle>,
}

impl SplayNode {
    fn leaf(key: QueueKey) -> Self {
        Self {
            key,
            left: None,
            right: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> QueueKey {
        self.key
    }

    #[must_use]
    pub fn left(&self) -> Option<NodeHandle> {
        self.left
    }

    #[must_use]
    pub fn right(&self) -> Option<NodeHandle> {
        self.right
    }
}

/// Ordered set of [`QueueKey`]s with amortized O(log n) operations.
#[derive(Debug, Default)]
pub struct SplayTree {
    root: Option<NodeHandle>,
    len: usize,
}

impl SplayTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    /// Number of keys stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert `key`, returning the handle of the node that holds it.
    ///
    /// Inserting a key that is already present allocates nothing and returns
    /// the existing node. On allocation failure the tree is left unchanged
    /// apart from the splay.
    pub fn insert(
        &mut self,
        arena: &mut NodeArena<SplayNode>,
        key: QueueKey,
    ) -> Result<NodeHandle, ArenaError> {
        let Some(root) = self.root else {
            let handle = arena.allocate(SplayNode::leaf(key))?;
            self.root = Some(handle);
            self.len = 1;
            return Ok(handle);
        };

        let root = splay(arena, root, key);
        self.root = Some(root);
        let top = *arena.get(root);

        let handle = match key.cmp(&top.key) {
            std::cmp::Ordering::Equal => return Ok(root),
            std::cmp::Ordering::Less => {
                let handle = arena.allocate(SplayNode {
                    key,
                    left: top.left,
                    right: Some(root),
                })?;
                arena.get_mut(root).left = None;
                handle
            }
            std::cmp::Ordering::Greater => {
                let handle = arena.allocate(SplayNode {
                    key,
                    left: Some(root),
                    right: top.right,
                })?;
                arena.get_mut(root).right = None;
                handle
            }
        };

        self.root = Some(handle);
        self.len += 1;
        Ok(handle)
    }

    /// Remove `key` and release its node.
    ///
    /// Removing a key that is not present is a caller bug: it trips a debug
    /// assertion and returns `false` in release builds.
    pub fn remove(&mut self, arena: &mut NodeArena<SplayNode>, key: QueueKey) -> bool {
        let Some(root) = self.root else {
            debug_assert!(false, "remove of {key:?} from an empty tree");
            return false;
        };

        let root = splay(arena, root, key);
        self.root = Some(root);
        if arena.get(root).key != key {
            debug_assert!(false, "remove of absent key {key:?}");
            return false;
        }

        let node = arena.free(root);
        self.root = match node.left {
            None => node.right,
            Some(left) => {
                // Every key on the left is smaller, so the splay brings the
                // left maximum up with an empty right subtree.
                let joined = splay(arena, left, key);
                arena.get_mut(joined).right = node.right;
                Some(joined)
            }
        };
        self.len -= 1;
        true
    }

    /// Look `key` up, splaying the closest node to the root.
    ///
    /// Returns the handle (now the root) when the key is present.
    pub fn find(&mut self, arena: &mut NodeArena<SplayNode>, key: QueueKey) -> Option<NodeHandle> {
        let root = splay(arena, self.root?, key);
        self.root = Some(root);
        (arena.get(root).key == key).then_some(root)
    }

    /// Smallest key, splayed to the root.
    pub fn find_min(&mut self, arena: &mut NodeArena<SplayNode>) -> Option<QueueKey> {
        let root = self.root?;
        let mut node = root;
        while let Some(left) = arena.get(node).left {
            node = left;
        }
        let key = arena.get(node).key;
        self.root = Some(splay(arena, root, key));
        Some(key)
    }

    /// Largest key, splayed to the root.
    pub fn find_max(&mut self, arena: &mut NodeArena<SplayNode>) -> Option<QueueKey> {
        let root = self.root?;
        let mut node = root;
        while let Some(right) = arena.get(node).right {
            node = right;
        }
        let key = arena.get(node).key;
        self.root = Some(splay(arena, root, key));
        Some(key)
    }

    /// Release every node back to the arena.
    pub fn clear(&mut self, arena: &mut NodeArena<SplayNode>) {
        let mut stack: Vec<NodeHandle> = self.root.into_iter().collect();
        while let Some(handle) = stack.pop() {
            let node = arena.free(handle);
            stack.extend(node.left);
            stack.extend(node.right);
        }
        self.root = None;
        self.len = 0;
    }

    /// Forget every node without touching the arena.
    ///
    /// Only valid when the arena itself is being reset.
    pub(crate) fn forget(&mut self) {
        self.root = None;
        self.len = 0;
    }
}

/// Sleator's top-down splay: brings the node holding `key` (or the last
/// node on its search path) to the top and returns it.
fn splay(arena: &mut NodeArena<SplayNode>, root: NodeHandle, key: QueueKey) -> NodeHandle {
    // Left tree collects nodes smaller than `key`, right tree larger ones.
    // The tails are where the next linked node attaches.
    let mut left_root: Option<NodeHandle> = None;
    let mut left_tail: Option<NodeHandle> = None;
    let mut right_root: Option<NodeHandle> = None;
    let mut right_tail: Option<NodeHandle> = None;
    let mut t = root;

    loop {
        let t_key = arena.get(t).key;
        match key.cmp(&t_key) {
            std::cmp::Ordering::Less => {
                let Some(mut child) = arena.get(t).left else {
                    break;
                };
                if key < arena.get(child).key {
                    // zig-zig: rotate right
                    arena.get_mut(t).left = arena.get(child).right;
                    arena.get_mut(child).right = Some(t);
                    t = child;
                    match arena.get(t).left {
                        Some(next) => child = next,
                        None => break,
                    }
                }
                // link right
                match right_tail {
                    Some(tail) => arena.get_mut(tail).left = Some(t),
                    None => right_root = Some(t),
                }
                right_tail = Some(t);
                t = child;
            }
            std::cmp::Ordering::Greater => {
                let Some(mut child) = arena.get(t).right else {
                    break;
                };
                if key > arena.get(child).key {
                    // zag-zag: rotate left
                    arena.get_mut(t).right = arena.get(child).left;
                    arena.get_mut(child).left = Some(t);
                    t = child;
                    match arena.get(t).right {
                        Some(next) => child = next,
                        None => break,
                    }
                }
                // link left
                match left_tail {
                    Some(tail) => arena.get_mut(tail).right = Some(t),
                    None => left_root = Some(t),
                }
                left_tail = Some(t);
                t = child;
            }
            std::cmp::Ordering::Equal => break,
        }
    }

    // assemble
    let top = *arena.get(t);
    if let Some(tail) = left_tail {
        arena.get_mut(tail).right = top.left;
        arena.get_mut(t).left = left_root;
    }
    if let Some(tail) = right_tail {
        arena.get_mut(tail).left = top.right;
        arena.get_mut(t).right = right_root;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn key(priority: u16, tile: u32, tri: u32) -> QueueKey {
        QueueKey::new(priority, tile, tri)
    }

    fn in_order(tree: &SplayTree, arena: &NodeArena<SplayNode>) -> Vec<QueueKey> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut cursor = tree.root();
        while cursor.is_some() || !stack.is_empty() {
            while let Some(h) = cursor {
                stack.push(h);
                cursor = arena.get(h).left();
            }
            let Some(h) = stack.pop() else { break };
            out.push(arena.get(h).key());
            cursor = arena.get(h).right();
        }
        out
    }

    /// A single insert into an empty tree yields a childless root.
    #[test]
    fn test_insert_then_find_single_key() {
        let mut arena = NodeArena::new(4);
        let mut tree = SplayTree::new();
        tree.insert(&mut arena, key(5, 0, 3)).unwrap();

        let found = tree.find(&mut arena, key(5, 0, 3)).unwrap();
        assert_eq!(tree.root(), Some(found));
        let node = arena.get(found);
        assert_eq!(node.key(), key(5, 0, 3));
        assert!(node.left().is_none());
        assert!(node.right().is_none());
    }

    /// Keys order by priority first, then tile, then triangle.
    #[test]
    fn test_key_order_breaks_ties_by_tile_then_triangle() {
        let mut keys = vec![key(2, 1, 0), key(1, 9, 9), key(2, 0, 7), key(2, 0, 3)];
        keys.sort();
        assert_eq!(
            keys,
            vec![key(1, 9, 9), key(2, 0, 3), key(2, 0, 7), key(2, 1, 0)]
        );
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut arena = NodeArena::new(4);
        let mut tree = SplayTree::new();
        let a = tree.insert(&mut arena, key(3, 0, 1)).unwrap();
        let b = tree.insert(&mut arena, key(3, 0, 1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(tree.len(), 1);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_min_max_are_splayed_to_root() {
        let mut arena = NodeArena::new(16);
        let mut tree = SplayTree::new();
        for p in [7, 3, 9, 1, 5] {
            tree.insert(&mut arena, key(p, 0, 0)).unwrap();
        }
        assert_eq!(tree.find_min(&mut arena), Some(key(1, 0, 0)));
        assert_eq!(arena.get(tree.root().unwrap()).key(), key(1, 0, 0));
        assert_eq!(tree.find_max(&mut arena), Some(key(9, 0, 0)));
        assert_eq!(arena.get(tree.root().unwrap()).key(), key(9, 0, 0));
    }

    #[test]
    fn test_remove_releases_node() {
        let mut arena = NodeArena::new(8);
        let mut tree = SplayTree::new();
        for t in 0..5 {
            tree.insert(&mut arena, key(1, 0, t)).unwrap();
        }
        assert!(tree.remove(&mut arena, key(1, 0, 2)));
        assert_eq!(tree.len(), 4);
        assert_eq!(arena.len(), 4);
        assert!(tree.find(&mut arena, key(1, 0, 2)).is_none());
        assert_eq!(
            in_order(&tree, &arena),
            vec![key(1, 0, 0), key(1, 0, 1), key(1, 0, 3), key(1, 0, 4)]
        );
    }

    #[test]
    fn test_insert_fails_cleanly_when_arena_full() {
        let mut arena = NodeArena::new(2);
        let mut tree = SplayTree::new();
        tree.insert(&mut arena, key(1, 0, 0)).unwrap();
        tree.insert(&mut arena, key(2, 0, 0)).unwrap();
        assert!(tree.insert(&mut arena, key(3, 0, 0)).is_err());
        assert_eq!(tree.len(), 2);
        assert_eq!(in_order(&tree, &arena), vec![key(1, 0, 0), key(2, 0, 0)]);
    }

    #[test]
    fn test_clear_returns_every_node() {
        let mut arena = NodeArena::new(32);
        let mut tree = SplayTree::new();
        for t in 0..20 {
            tree.insert(&mut arena, key((t % 4) as u16, t, 0)).unwrap();
        }
        tree.clear(&mut arena);
        assert!(tree.is_empty());
        assert!(arena.is_empty());
    }

    /// Two trees sharing one arena stay independent.
    #[test]
    fn test_two_trees_share_one_arena() {
        let mut arena = NodeArena::new(8);
        let mut split = SplayTree::new();
        let mut merge = SplayTree::new();
        split.insert(&mut arena, key(4, 0, 1)).unwrap();
        merge.insert(&mut arena, key(2, 0, 1)).unwrap();
        split.insert(&mut arena, key(6, 1, 1)).unwrap();

        assert_eq!(arena.len(), 3);
        assert_eq!(split.find_max(&mut arena), Some(key(6, 1, 1)));
        assert_eq!(merge.find_max(&mut arena), Some(key(2, 0, 1)));
        assert!(merge.remove(&mut arena, key(2, 0, 1)));
        assert_eq!(split.len(), 2);
    }

    /// Random inserts and removes agree with a sorted reference set.
    #[test]
    fn test_random_sequence_matches_btreeset() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let mut arena = NodeArena::new(512);
        let mut tree = SplayTree::new();
        let mut reference = std::collections::BTreeSet::new();

        for _ in 0..2000 {
            let k = key(rng.random_range(0..16), rng.random_range(0..4), rng.random_range(0..32));
            if reference.contains(&k) && rng.random_bool(0.6) {
                assert!(tree.remove(&mut arena, k));
                reference.remove(&k);
            } else {
                tree.insert(&mut arena, k).unwrap();
                reference.insert(k);
            }
        }

        assert_eq!(tree.len(), reference.len());
        assert_eq!(arena.len(), reference.len());
        assert_eq!(in_order(&tree, &arena), reference.iter().copied().collect::<Vec<_>>());
        assert_eq!(tree.find_min(&mut arena), reference.first().copied());
        assert_eq!(tree.find_max(&mut arena), reference.last().copied());

        let mut remaining: Vec<_> = reference.iter().copied().collect();
        remaining.shuffle(&mut rng);
        for k in remaining {
            assert!(tree.remove(&mut arena, k));
        }
        assert!(tree.is_empty());
        assert!(arena.is_empty());
    }
}
