//! In-order traversal of a [`SplayTree`] with an explicit path stack.
//!
//! The iterator borrows the tree and its arena immutably, so any mutation of
//! the tree while a traversal is live is rejected at compile time.

use crate::arena::{NodeArena, NodeHandle};
use crate::splay::{QueueKey, SplayNode, SplayTree};

/// Bidirectional cursor over the keys of a [`SplayTree`].
///
/// The stack always holds the full path from the root to the current node.
pub struct SplayIter<'a> {
    tree: &'a SplayTree,
    arena: &'a NodeArena<SplayNode>,
    stack: Vec<NodeHandle>,
    limit: usize,
    reverse: bool,
}

impl<'a> SplayIter<'a> {
    /// Cursor positioned on the smallest key.
    ///
    /// The path stack is bounded by the arena capacity.
    #[must_use]
    pub fn new(tree: &'a SplayTree, arena: &'a NodeArena<SplayNode>) -> Self {
        Self::with_stack_limit(tree, arena, arena.capacity())
    }

    /// Cursor with an explicit path-stack bound.
    ///
    /// # Panics
    ///
    /// Any traversal step whose path would exceed `limit` panics.
    #[must_use]
    pub fn with_stack_limit(
        tree: &'a SplayTree,
        arena: &'a NodeArena<SplayNode>,
        limit: usize,
    ) -> Self {
        let mut iter = Self {
            tree,
            arena,
            stack: Vec::new(),
            limit,
            reverse: false,
        };
        iter.reset(false);
        iter
    }

    /// Seek to the smallest key, or the largest when `reverse` is set.
    ///
    /// `reverse` also flips the direction of [`advance`](Self::advance).
    pub fn reset(&mut self, reverse: bool) {
        self.reverse = reverse;
        self.stack.clear();
        if let Some(root) = self.tree.root() {
            self.push(root);
            self.descend(reverse);
        }
    }

    /// Key under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<QueueKey> {
        self.stack.last().map(|&h| self.arena.get(h).key())
    }

    /// Whether the cursor has run off either end.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.stack.is_empty()
    }

    /// Step in the direction chosen by the last [`reset`](Self::reset).
    pub fn advance(&mut self) {
        if self.reverse {
            self.step_down();
        } else {
            self.step_up();
        }
    }

    /// Step against the direction chosen by the last [`reset`](Self::reset).
    pub fn retreat(&mut self) {
        if self.reverse {
            self.step_up();
        } else {
            self.step_down();
        }
    }

    fn push(&mut self, handle: NodeHandle) {
        assert!(
            self.stack.len() < self.limit,
            "splay iterator path exceeds {} nodes",
            self.limit
        );
        self.stack.push(handle);
    }

    /// Follow left links (or right links when `rightmost`) from the top of
    /// the stack to the end of the spine.
    fn descend(&mut self, rightmost: bool) {
        while let Some(&top) = self.stack.last() {
            let node = self.arena.get(top);
            let next = if rightmost { node.right() } else { node.left() };
            match next {
                Some(child) => self.push(child),
                None => break,
            }
        }
    }

    /// Move to the in-order successor.
    fn step_up(&mut self) {
        let Some(&current) = self.stack.last() else {
            return;
        };
        if let Some(right) = self.arena.get(current).right() {
            self.push(right);
            self.descend(false);
            return;
        }
        let key = self.arena.get(current).key();
        self.stack.pop();
        while let Some(&top) = self.stack.last() {
            if self.arena.get(top).key() > key {
                break;
            }
            self.stack.pop();
        }
    }

    /// Move to the in-order predecessor.
    fn step_down(&mut self) {
        let Some(&current) = self.stack.last() else {
            return;
        };
        if let Some(left) = self.arena.get(current).left() {
            self.push(left);
            self.descend(true);
            return;
        }
        let key = self.arena.get(current).key();
        self.stack.pop();
        while let Some(&top) = self.stack.last() {
            if self.arena.get(top).key() < key {
                break;
            }
            self.stack.pop();
        }
    }
}

impl Iterator for SplayIter<'_> {
    type Item = QueueKey;

    fn next(&mut self) -> Option<QueueKey> {
        let key = self.current()?;
        self.advance();
        Some(key)
    }
}
