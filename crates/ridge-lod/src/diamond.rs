//! Split and merge protocol over diamonds.
//!
//! A diamond is a split node `p` together with its hypotenuse partner `n`
//! (when not on the grid border), both of whose children are mesh leaves.
//! Splittable leaves sit in the split queue. Diamond parents sit in the
//! merge queue, both sides under the same priority, and pull their children's
//! split priorities below their own.

use crate::binmesh::BinMesh;
use crate::bintree::{BinTree, NodeState, QueueSlot};
use crate::error::LodError;
use crate::splay::QueueKey;
use crate::view::Visibility;

impl BinMesh {
    fn tile_ref(&self, tile: u32) -> &BinTree {
        &self.tiles[tile as usize]
    }

    pub(crate) fn partner_of(&self, tile: u32, i: u32) -> Option<(u32, u32)> {
        self.tile_ref(tile).partner(&self.layout, i)
    }

    /// Both sides of the diamond rooted at `(tile, p)`.
    fn sides(&self, tile: u32, p: u32) -> impl Iterator<Item = (u32, u32)> + use<> {
        std::iter::once((tile, p)).chain(self.partner_of(tile, p))
    }

    fn children_are_leaves(&self, tile: u32, p: u32) -> bool {
        let tree = self.tile_ref(tile);
        tree.state(p) == NodeState::Split
            && tree.state(2 * p) == NodeState::Leaf
            && tree.state(2 * p + 1) == NodeState::Leaf
    }

    /// Whether `(tile, p)` heads a collapsible diamond.
    #[must_use]
    pub fn is_diamond(&self, tile: u32, p: u32) -> bool {
        if p == 0 || self.layout.is_sentinel(p) || self.layout.is_leaf_level(p) {
            return false;
        }
        self.sides(tile, p).all(|(t, q)| self.children_are_leaves(t, q))
    }

    /// Whether any of the diamond's children is not outside the view.
    #[must_use]
    pub fn is_diamond_visible(&self, tile: u32, p: u32) -> bool {
        self.sides(tile, p).any(|(t, q)| {
            let tree = self.tile_ref(t);
            tree.visibility(2 * q) != Visibility::Out || tree.visibility(2 * q + 1) != Visibility::Out
        })
    }

    pub(crate) fn make_leaf(&mut self, tile: u32, i: u32, vis: Visibility) {
        let tree = &mut self.tiles[tile as usize];
        debug_assert_ne!(tree.state[i as usize], NodeState::Leaf, "node {tile}:{i} already a leaf");
        tree.state[i as usize] = NodeState::Leaf;
        tree.vis[i as usize] = vis;
        tree.delay[i as usize] = 0;
        self.active_count += 1;
        if vis != Visibility::Out {
            self.visible_count += 1;
        }
    }

    fn unmake_leaf(&mut self, tile: u32, i: u32, state: NodeState) {
        let tree = &mut self.tiles[tile as usize];
        debug_assert_eq!(tree.state[i as usize], NodeState::Leaf, "node {tile}:{i} is not a leaf");
        tree.state[i as usize] = state;
        self.active_count -= 1;
        if tree.vis[i as usize] != Visibility::Out {
            self.visible_count -= 1;
        }
    }

    /// Queue a splittable leaf under its freshly computed priority.
    pub(crate) fn insert_sq(&mut self, tile: u32, i: u32) -> Result<(), LodError> {
        if self.layout.is_leaf_level(i) {
            return Ok(());
        }
        let tree = &self.tiles[tile as usize];
        debug_assert_eq!(tree.queue_slot(i), QueueSlot::Idle, "node {tile}:{i} already queued");
        let (priority, delay) = tree.compute_priority(&self.layout, self.frame.as_ref(), &self.config, i);
        let handle = self
            .split_queue
            .insert(&mut self.arena, QueueKey::new(priority, tile, i))?;

        let tree = &mut self.tiles[tile as usize];
        tree.priority[i as usize] = priority;
        tree.delay[i as usize] = delay;
        tree.queue[i as usize] = QueueSlot::Split(handle);
        self.stats.queue_inserts += 1;
        self.stats.priority_recomputes += 1;
        Ok(())
    }

    pub(crate) fn remove_sq(&mut self, tile: u32, i: u32) {
        let tree = &mut self.tiles[tile as usize];
        let QueueSlot::Split(handle) = tree.queue[i as usize] else {
            return;
        };
        let key = QueueKey::new(tree.priority[i as usize], tile, i);
        tree.queue[i as usize] = QueueSlot::Idle;
        debug_assert_eq!(self.arena.get(handle).key(), key);
        self.split_queue.remove(&mut self.arena, key);
        self.stats.queue_removes += 1;
    }

    /// Offer the diamond at `(tile, p)` to the merge queue.
    ///
    /// No-op unless it is a complete diamond that is not queued yet.
    pub(crate) fn insert_mq(&mut self, tile: u32, p: u32) -> Result<(), LodError> {
        if !self.is_diamond(tile, p) || matches!(self.tile_ref(tile).queue_slot(p), QueueSlot::Merge(_)) {
            return Ok(());
        }
        let (priority, delay) = self.diamond_priority(tile, p);
        let sides: Vec<_> = self.sides(tile, p).collect();
        for &(t, q) in &sides {
            let handle = self
                .merge_queue
                .insert(&mut self.arena, QueueKey::new(priority, t, q))?;
            let tree = &mut self.tiles[t as usize];
            tree.priority[q as usize] = priority;
            tree.delay[q as usize] = delay;
            tree.queue[q as usize] = QueueSlot::Merge(handle);
            self.stats.queue_inserts += 1;
        }
        for &(t, q) in &sides {
            self.clamp_children(t, q, priority)?;
        }
        Ok(())
    }

    /// Take the diamond at `(tile, p)` out of the merge queue, both sides.
    pub(crate) fn remove_mq(&mut self, tile: u32, p: u32) {
        if p == 0 || !matches!(self.tile_ref(tile).queue_slot(p), QueueSlot::Merge(_)) {
            return;
        }
        let sides: Vec<_> = self.sides(tile, p).collect();
        for (t, q) in sides {
            let tree = &mut self.tiles[t as usize];
            let QueueSlot::Merge(handle) = tree.queue[q as usize] else {
                debug_assert!(false, "diamond side {t}:{q} missing from merge queue");
                continue;
            };
            let key = QueueKey::new(tree.priority[q as usize], t, q);
            tree.queue[q as usize] = QueueSlot::Idle;
            debug_assert_eq!(self.arena.get(handle).key(), key);
            self.merge_queue.remove(&mut self.arena, key);
            self.stats.queue_removes += 1;
        }
    }

    /// Larger of the two sides' priorities, and the shorter delay.
    fn diamond_priority(&mut self, tile: u32, p: u32) -> (u16, u8) {
        let mut priority = 0;
        let mut delay = u8::MAX;
        let sides: Vec<_> = self.sides(tile, p).collect();
        for (t, q) in sides {
            let (pr, d) = self.tiles[t as usize].compute_priority(&self.layout, self.frame.as_ref(), &self.config, q);
            priority = priority.max(pr);
            delay = delay.min(d);
            self.stats.priority_recomputes += 1;
        }
        (priority, delay)
    }

    /// Keep queued children of merge-queue parent `(tile, p)` strictly below
    /// `cap` (or at zero when `cap` is zero).
    fn clamp_children(&mut self, tile: u32, p: u32, cap: u16) -> Result<(), LodError> {
        let limit = cap.saturating_sub(1);
        for child in [2 * p, 2 * p + 1] {
            let tree = self.tile_ref(tile);
            if matches!(tree.queue_slot(child), QueueSlot::Split(_)) && tree.priority(child) > limit {
                self.rekey_split(tile, child, limit)?;
            }
        }
        Ok(())
    }

    fn rekey_split(&mut self, tile: u32, i: u32, priority: u16) -> Result<(), LodError> {
        let old = QueueKey::new(self.tile_ref(tile).priority(i), tile, i);
        self.split_queue.remove(&mut self.arena, old);
        let handle = self
            .split_queue
            .insert(&mut self.arena, QueueKey::new(priority, tile, i))?;
        let tree = &mut self.tiles[tile as usize];
        tree.priority[i as usize] = priority;
        tree.queue[i as usize] = QueueSlot::Split(handle);
        self.stats.queue_moves += 1;
        Ok(())
    }

    fn rekey_merge(&mut self, tile: u32, p: u32, priority: u16) -> Result<(), LodError> {
        let sides: Vec<_> = self.sides(tile, p).collect();
        for &(t, q) in &sides {
            let old = QueueKey::new(self.tile_ref(t).priority(q), t, q);
            self.merge_queue.remove(&mut self.arena, old);
            let handle = self
                .merge_queue
                .insert(&mut self.arena, QueueKey::new(priority, t, q))?;
            let tree = &mut self.tiles[t as usize];
            tree.priority[q as usize] = priority;
            tree.queue[q as usize] = QueueSlot::Merge(handle);
            self.stats.queue_moves += 1;
        }
        for &(t, q) in &sides {
            self.clamp_children(t, q, priority)?;
        }
        Ok(())
    }

    /// Recompute a queued split leaf once its delay runs out.
    pub(crate) fn refresh_split(&mut self, tile: u32, i: u32) -> Result<(), LodError> {
        let tree = &mut self.tiles[tile as usize];
        if tree.delay[i as usize] > 0 {
            tree.delay[i as usize] -= 1;
            return Ok(());
        }
        let tree = &self.tiles[tile as usize];
        let (mut priority, delay) = tree.compute_priority(&self.layout, self.frame.as_ref(), &self.config, i);
        let parent = i / 2;
        if parent >= 1 && matches!(tree.queue_slot(parent), QueueSlot::Merge(_)) {
            priority = priority.min(tree.priority(parent).saturating_sub(1));
        }
        let changed = priority != tree.priority(i);
        self.tiles[tile as usize].delay[i as usize] = delay;
        self.stats.priority_recomputes += 1;
        if changed {
            self.rekey_split(tile, i, priority)?;
        }
        Ok(())
    }

    /// Recompute a merge-queue diamond from its primary side.
    ///
    /// The primary side is the smaller `(tile, index)` of the pair; the other
    /// side is skipped so each diamond is refreshed once per frame.
    pub(crate) fn refresh_merge(&mut self, tile: u32, p: u32) -> Result<(), LodError> {
        let partner = self.partner_of(tile, p);
        if partner.is_some_and(|other| other < (tile, p)) {
            return Ok(());
        }
        let sides: Vec<_> = self.sides(tile, p).collect();
        let due = sides
            .iter()
            .any(|&(t, q)| self.tile_ref(t).delay[q as usize] == 0);
        if !due {
            for &(t, q) in &sides {
                self.tiles[t as usize].delay[q as usize] -= 1;
            }
            return Ok(());
        }

        let (priority, delay) = self.diamond_priority(tile, p);
        for &(t, q) in &sides {
            self.tiles[t as usize].delay[q as usize] = delay;
        }
        if priority != self.tile_ref(tile).priority(p) {
            self.rekey_merge(tile, p, priority)?;
        }
        Ok(())
    }

    /// Split `t` after splitting whatever must come first: its missing
    /// ancestors, then its hypotenuse partner.
    fn split_chain(&mut self, tile: u32, t: u32) -> Result<(), LodError> {
        match self.tile_ref(tile).state(t) {
            NodeState::Split => return Ok(()),
            NodeState::Absent => self.split_chain(tile, t / 2)?,
            NodeState::Leaf => {}
        }
        debug_assert_eq!(self.tile_ref(tile).state(t), NodeState::Leaf);

        self.remove_mq(tile, t / 2);
        self.remove_sq(tile, t);
        self.unmake_leaf(tile, t, NodeState::Split);
        for child in [2 * t, 2 * t + 1] {
            let vis = self
                .tile_ref(tile)
                .child_visibility(&self.layout, self.frame.as_ref(), t, child);
            self.make_leaf(tile, child, vis);
            self.insert_sq(tile, child)?;
        }

        if let Some((tn, n)) = self.partner_of(tile, t)
            && self.tile_ref(tn).state(n) != NodeState::Split
        {
            self.split_chain(tn, n)?;
        }
        Ok(())
    }

    /// Split a mesh leaf and everything needed to keep the mesh crack-free,
    /// then queue the new diamond for merging.
    ///
    /// Returns `Ok(false)` for finest-level nodes and nodes already split.
    pub(crate) fn split_node(&mut self, tile: u32, t: u32) -> Result<bool, LodError> {
        if t == 0
            || self.layout.is_sentinel(t)
            || self.layout.is_leaf_level(t)
            || self.tile_ref(tile).state(t) == NodeState::Split
        {
            return Ok(false);
        }
        self.split_chain(tile, t)?;
        self.insert_mq(tile, t)?;
        self.stats.splits += 1;
        Ok(true)
    }

    /// Collapse the diamond at `(tile, p)` back into its parent(s).
    ///
    /// Returns `Ok(false)` when `(tile, p)` is not a complete diamond.
    pub(crate) fn merge_node(&mut self, tile: u32, p: u32) -> Result<bool, LodError> {
        if !self.is_diamond(tile, p) {
            return Ok(false);
        }
        self.remove_mq(tile, p);
        let sides: Vec<_> = self.sides(tile, p).collect();
        for &(t, q) in &sides {
            for child in [2 * q, 2 * q + 1] {
                self.remove_sq(t, child);
                self.unmake_leaf(t, child, NodeState::Absent);
                self.tiles[t as usize].priority[child as usize] = 0;
            }
            let vis = self.tile_ref(t).visibility(q);
            self.make_leaf(t, q, vis);
            self.insert_sq(t, q)?;
        }
        for &(t, q) in &sides {
            self.insert_mq(t, q / 2)?;
        }
        self.stats.merges += 1;
        Ok(true)
    }
}
