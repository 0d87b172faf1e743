//! The tile grid and its per-frame refinement pipeline.
//!
//! Each frame runs visibility, priority refresh, an opportunistic merge of
//! diamonds that left the view, and finally the budget balancer that trades
//! the best pending split against the worst pending merge.

use glam::{Vec2, Vec3};
use tracing::{debug, error, info, warn};

use crate::arena::NodeArena;
use crate::bintree::{BinTree, QueueSlot};
use crate::config::MeshConfig;
use crate::error::LodError;
use crate::height_grid::{HeightGrid, HeightSource};
use crate::layout::TriangleLayout;
use crate::splay::{QueueKey, SplayNode, SplayTree};
use crate::splay_iter::SplayIter;
use crate::stats::MeshStats;
use crate::vertex::{TerrainVertex, VisibleTriangle};
use crate::view::{Frame, View, Visibility};

/// Continuous level-of-detail terrain mesh over a height grid.
///
/// The grid is cut into `tile_size` blocks, each holding a normal and a
/// mirrored triangle tile. All tiles feed one split queue and one merge queue
/// backed by a shared node arena.
pub struct BinMesh {
    pub(crate) config: MeshConfig,
    grid: HeightGrid,
    normals: Vec<Vec3>,
    pub(crate) layout: TriangleLayout,
    pub(crate) tiles: Vec<BinTree>,
    blocks: (u32, u32),
    pub(crate) arena: NodeArena<SplayNode>,
    pub(crate) split_queue: SplayTree,
    pub(crate) merge_queue: SplayTree,
    pub(crate) frame: Option<Frame>,
    pub(crate) visible_count: usize,
    pub(crate) active_count: usize,
    pub(crate) stats: MeshStats,
    poisoned: bool,
}

impl BinMesh {
    /// Build a mesh over a copy of `source`.
    ///
    /// Samples beyond the last whole block are kept but never meshed.
    pub fn new(source: &impl HeightSource, config: MeshConfig) -> Result<Self, LodError> {
        config.validate()?;
        let layout = TriangleLayout::new(config.tile_size)?;
        let s = config.tile_size as usize;
        let (rows, cols) = (source.rows(), source.cols());
        if rows < s + 1 || cols < s + 1 {
            return Err(LodError::GridTooSmall {
                rows,
                cols,
                tile_size: config.tile_size,
            });
        }

        let grid = HeightGrid::from_source(source);
        let blocks = (((rows - 1) / s) as u32, ((cols - 1) / s) as u32);
        let mut tiles = Vec::with_capacity((blocks.0 * blocks.1 * 2) as usize);
        for br in 0..blocks.0 {
            for bc in 0..blocks.1 {
                for mirrored in [false, true] {
                    tiles.push(BinTree::new(&layout, &grid, (br, bc), blocks, mirrored));
                }
            }
        }

        let capacity = config.effective_arena_capacity(tiles.len(), layout.leaf_start() as usize - 1);
        let mut mesh = Self {
            normals: Vec::new(),
            arena: NodeArena::new(capacity),
            config,
            grid,
            layout,
            tiles,
            blocks,
            split_queue: SplayTree::new(),
            merge_queue: SplayTree::new(),
            frame: None,
            visible_count: 0,
            active_count: 0,
            stats: MeshStats::default(),
            poisoned: false,
        };
        mesh.normals = mesh.compute_normals();
        mesh.seed()?;

        info!(
            rows,
            cols,
            tiles = mesh.tiles.len(),
            tile_size = mesh.config.tile_size,
            arena_capacity = capacity,
            "terrain mesh built"
        );
        Ok(mesh)
    }

    fn compute_normals(&self) -> Vec<Vec3> {
        let (rows, cols) = (self.grid.rows(), self.grid.cols());
        let mut normals = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                normals.push(self.grid.vertex_normal(row, col, self.config.cell_size));
            }
        }
        normals
    }

    /// Reset to one root leaf per tile, every root in the split queue.
    fn seed(&mut self) -> Result<(), LodError> {
        self.arena.reset();
        self.split_queue.forget();
        self.merge_queue.forget();
        self.visible_count = 0;
        self.active_count = 0;
        for tree in &mut self.tiles {
            tree.reset_state(&self.layout);
        }
        for tile in 0..self.tiles.len() as u32 {
            self.make_leaf(tile, 1, Visibility::Undefined);
            self.insert_sq(tile, 1)?;
        }
        Ok(())
    }

    /// Throw away all refinement and statistics and start over from the
    /// stored height grid. Clears a poisoned mesh.
    pub fn rebuild(&mut self) -> Result<(), LodError> {
        for tree in &mut self.tiles {
            tree.refresh_heights(&self.layout, &self.grid);
            tree.compute_thickness(&self.layout);
        }
        self.normals = self.compute_normals();
        self.frame = None;
        self.poisoned = false;
        let result = self.seed();
        self.poison_on_error(result)?;
        self.stats = MeshStats::default();
        info!(tiles = self.tiles.len(), "terrain mesh rebuilt");
        Ok(())
    }

    fn check_poisoned(&self) -> Result<(), LodError> {
        if self.poisoned {
            Err(LodError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T, LodError>) -> Result<T, LodError> {
        if let Err(LodError::Arena(err)) = &result {
            error!(%err, "queue arena exhausted, mesh needs a rebuild");
            self.poisoned = true;
        }
        result
    }

    /// Refine the mesh for one frame and return the visible triangle count.
    pub fn calculate(&mut self, view: &View) -> Result<usize, LodError> {
        self.check_poisoned()?;
        let result = self.run_frame(view);
        self.poison_on_error(result)
    }

    fn run_frame(&mut self, view: &View) -> Result<usize, LodError> {
        let frame = Frame::new(view, &self.config);
        self.frame = Some(frame);

        let mut visible = 0;
        for tree in &mut self.tiles {
            let pass = tree.update_visibility(&self.layout, &frame);
            visible += pass.visible_leaves;
            self.stats.visibility_tests += pass.tests;
        }
        self.visible_count = visible;

        self.update_priorities()?;
        let merged = self.merge_invisible()?;
        let iterations = self.balance_queue()?;

        self.stats.frames += 1;
        self.stats.triangles = self.visible_count;
        self.stats.active_triangles = self.active_count;
        debug!(
            frame = self.stats.frames,
            visible = self.visible_count,
            active = self.active_count,
            merged,
            iterations,
            split_queue = self.split_queue.len(),
            merge_queue = self.merge_queue.len(),
            "frame refined"
        );
        Ok(self.visible_count)
    }

    /// Refresh queued priorities, parents before children.
    fn update_priorities(&mut self) -> Result<(), LodError> {
        for tile in 0..self.tiles.len() as u32 {
            for i in self.tiles[tile as usize].queued_nodes() {
                match self.tiles[tile as usize].queue_slot(i) {
                    QueueSlot::Merge(_) => self.refresh_merge(tile, i)?,
                    QueueSlot::Split(_) => self.refresh_split(tile, i)?,
                    QueueSlot::Idle => {}
                }
            }
        }
        Ok(())
    }

    /// Merge every queued diamond whose children are all out of view,
    /// whatever its priority and the budget, repeating while merges expose
    /// new ones.
    fn merge_invisible(&mut self) -> Result<usize, LodError> {
        let mut total = 0;
        loop {
            let candidates: Vec<(u32, u32)> = SplayIter::new(&self.merge_queue, &self.arena)
                .map(|key| (key.tile, key.tri))
                .filter(|&(tile, p)| !self.is_diamond_visible(tile, p))
                .collect();

            let mut merged = 0;
            for (tile, p) in candidates {
                if self.merge_node(tile, p)? {
                    merged += 1;
                }
            }
            if merged == 0 {
                return Ok(total);
            }
            total += merged;
        }
    }

    fn can_split(&self) -> bool {
        self.active_count < self.config.abs_max_detail
    }

    /// Trade splits against merges until the visible count sits inside
    /// `[min_detail, max_detail]` and no split beats the worst merge.
    ///
    /// Returns the number of iterations run.
    pub fn balance_queue(&mut self) -> Result<usize, LodError> {
        let cap = self.config.balance_iteration_cap;
        let mut iterations = 0;
        let mut capped = true;

        while iterations < cap {
            iterations += 1;
            let best_split = self.split_queue.find_max(&mut self.arena);
            let worst_merge = self.merge_queue.find_min(&mut self.arena);

            let changed = if self.visible_count > self.config.max_detail {
                match worst_merge {
                    Some(m) => self.merge_node(m.tile, m.tri)?,
                    None => false,
                }
            } else if self.visible_count < self.config.min_detail {
                match best_split {
                    Some(s) if s.priority > 0 && self.can_split() => self.split_node(s.tile, s.tri)?,
                    _ => false,
                }
            } else {
                let floor = worst_merge.map_or(0, |m| m.priority);
                match best_split {
                    Some(s) if s.priority > floor => {
                        if self.visible_count < self.config.max_detail && self.can_split() {
                            self.split_node(s.tile, s.tri)?
                        } else if let Some(m) = worst_merge {
                            self.merge_node(m.tile, m.tri)?
                        } else {
                            false
                        }
                    }
                    _ => false,
                }
            };

            if !changed {
                capped = false;
                break;
            }
        }

        if capped && cap > 0 {
            warn!(cap, visible = self.visible_count, "balance loop hit its iteration cap");
        }
        self.stats.balance_iterations_total += iterations as u64;
        self.stats.balance_iterations_last = iterations;
        Ok(iterations)
    }

    /// Split mesh leaf `(tile, t)`, cascading as needed to stay crack-free.
    ///
    /// Returns `Ok(false)` if `t` is on the finest level or already split.
    pub fn force_split(&mut self, tile: u32, t: u32) -> Result<bool, LodError> {
        self.check_poisoned()?;
        let result = self.split_node(tile, t);
        self.poison_on_error(result)
    }

    /// Collapse the diamond headed by `(tile, p)`.
    ///
    /// Returns `Ok(false)` if it is not a complete diamond.
    pub fn force_merge(&mut self, tile: u32, p: u32) -> Result<bool, LodError> {
        self.check_poisoned()?;
        let result = self.merge_node(tile, p);
        self.poison_on_error(result)
    }

    /// Terrain height at world `(x, z)`, clamped to the meshed area.
    ///
    /// Interpolates over the finest triangle under the point, independent of
    /// the current refinement.
    #[must_use]
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let s = self.config.tile_size as f32;
        let (nr, nc) = self.blocks;
        let to_grid = |w: f32, blocks: u32| {
            let g = if w.is_finite() { w / self.config.cell_size } else { 0.0 };
            g.clamp(0.0, blocks as f32 * s)
        };
        let (row, col) = (to_grid(x, nr), to_grid(z, nc));
        let br = ((row / s) as u32).min(nr - 1);
        let bc = ((col / s) as u32).min(nc - 1);
        let (fr, fc) = (row - br as f32 * s, col - bc as f32 * s);

        let base = 2 * (br * nc + bc) as usize;
        if fr + fc <= s {
            self.tiles[base].interpolate(&self.layout, Vec2::new(fr, fc))
        } else {
            self.tiles[base + 1].interpolate(&self.layout, Vec2::new(s - fr, s - fc))
        }
    }

    /// First point where the world-space segment `from -> to` touches or
    /// enters the terrain, as `(tile, finest triangle, point)`.
    ///
    /// Tests the full-resolution surface, not the current refinement. A
    /// segment that starts underground hits at `from`.
    #[must_use]
    pub fn ray_test(&self, from: Vec3, to: Vec3) -> Option<(u32, u32, Vec3)> {
        if !from.is_finite() || !to.is_finite() {
            return None;
        }
        let cell = self.config.cell_size;
        let to_grid = |p: Vec3| Vec3::new(p.x / cell, p.y, p.z / cell);
        let (a, b) = (to_grid(from), to_grid(to));

        let mut best: Option<(u32, u32, f32)> = None;
        for tree in &self.tiles {
            let limit = best.map_or(f32::INFINITY, |(_, _, t)| t);
            if let Some((tri, t)) = tree.ray_test(&self.layout, a, b, limit) {
                best = Some((tree.id(), tri, t));
            }
        }
        best.map(|(tile, tri, t)| (tile, tri, from.lerp(to, t)))
    }

    /// Overwrite the sample nearest world `(x, z)` and re-derive the wedges
    /// of every tile touching it. Their priorities refresh next frame.
    pub fn set_height(&mut self, x: f32, z: f32, height: f32) -> Result<(), LodError> {
        self.check_poisoned()?;
        let nearest = |w: f32, len: usize| {
            let g = (w / self.config.cell_size).round();
            if g.is_finite() { g.clamp(0.0, (len - 1) as f32) as usize } else { 0 }
        };
        let (row, col) = (nearest(x, self.grid.rows()), nearest(z, self.grid.cols()));
        self.grid.set(row, col, height);

        let cols = self.grid.cols();
        for r in row.saturating_sub(1)..=(row + 1).min(self.grid.rows() - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(cols - 1) {
                self.normals[r * cols + c] = self.grid.vertex_normal(r, c, self.config.cell_size);
            }
        }

        let tile_size = self.config.tile_size;
        let mut touched = 0;
        for tree in &mut self.tiles {
            if tree.local_of(row, col, tile_size).is_some() {
                tree.refresh_heights(&self.layout, &self.grid);
                tree.compute_thickness(&self.layout);
                tree.delay.fill(0);
                touched += 1;
            }
        }
        debug!(row, col, height, touched, "height sample edited");
        Ok(())
    }

    fn vertex(&self, tree: &BinTree, v: u32) -> (Vec3, Vec3, Vec2) {
        let (row, col) = tree.world_sample(self.layout.pos(v));
        let cell = self.config.cell_size;
        let position = Vec3::new(row as f32 * cell, tree.vertex_height(v), col as f32 * cell);
        let normal = self.normals[row * self.grid.cols() + col];
        let uv = Vec2::new(
            row as f32 / (self.grid.rows() - 1) as f32,
            col as f32 / (self.grid.cols() - 1) as f32,
        );
        (position, normal, uv)
    }

    /// Mesh leaves not outside the view, tile by tile, depth-first.
    #[must_use]
    pub fn visible_triangles(&self) -> Vec<VisibleTriangle> {
        let mut out = Vec::with_capacity(self.visible_count);
        for tree in &self.tiles {
            tree.for_each_leaf(|i| {
                if tree.visibility(i) == Visibility::Out {
                    return;
                }
                let [a, b, c] = self.layout.corners(i).map(|v| self.vertex(tree, v));
                out.push(VisibleTriangle {
                    tile: tree.id(),
                    index: i,
                    positions: [a.0, b.0, c.0],
                    normals: [a.1, b.1, c.1],
                    uvs: [a.2, b.2, c.2],
                });
            });
        }
        out
    }

    /// Fill `out` with three vertices per visible triangle; returns the
    /// triangle count.
    pub fn write_vertices(&self, out: &mut Vec<TerrainVertex>) -> usize {
        out.clear();
        let triangles = self.visible_triangles();
        out.reserve(triangles.len() * 3);
        for tri in &triangles {
            out.extend_from_slice(&tri.vertices());
        }
        triangles.len()
    }

    /// Queue contents in ascending key order.
    #[must_use]
    pub fn split_queue_keys(&self) -> Vec<QueueKey> {
        SplayIter::new(&self.split_queue, &self.arena).collect()
    }

    #[must_use]
    pub fn merge_queue_keys(&self) -> Vec<QueueKey> {
        SplayIter::new(&self.merge_queue, &self.arena).collect()
    }

    #[must_use]
    pub fn stats(&self) -> MeshStats {
        self.stats
    }

    #[must_use]
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Replace the triangle budgets; the next frame balances toward them.
    ///
    /// The arena keeps the capacity it was built with.
    pub fn set_detail_range(&mut self, min: usize, max: usize, abs_max: usize) -> Result<(), LodError> {
        let config = MeshConfig {
            min_detail: min,
            max_detail: max,
            abs_max_detail: abs_max,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        info!(min, max, abs_max, "detail budgets changed");
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> &TriangleLayout {
        &self.layout
    }

    #[must_use]
    pub fn tiles(&self) -> &[BinTree] {
        &self.tiles
    }

    /// Blocks along rows and columns.
    #[must_use]
    pub fn blocks(&self) -> (u32, u32) {
        self.blocks
    }

    #[must_use]
    pub fn height_grid(&self) -> &HeightGrid {
        &self.grid
    }

    /// Mesh leaves not outside the view.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// All mesh leaves.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Hypotenuse partner of `(tile, i)` as `(tile, index)`.
    #[must_use]
    pub fn partner(&self, tile: u32, i: u32) -> Option<(u32, u32)> {
        self.partner_of(tile, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bintree::NodeState;

    fn small_config() -> MeshConfig {
        MeshConfig {
            tile_size: 8,
            min_detail: 0,
            max_detail: 400,
            abs_max_detail: 2000,
            far_clip: 500.0,
            ..MeshConfig::default()
        }
    }

    fn bumpy(rows: usize, cols: usize) -> HeightGrid {
        HeightGrid::from_fn(rows, cols, |r, c| {
            ((r as f32 * 0.7).sin() + (c as f32 * 0.45).cos()) * 3.0
        })
    }

    /// Camera above the grid corner, looking across the whole grid.
    fn overview() -> View {
        View::look_at(
            Vec3::new(-10.0, 30.0, -10.0),
            Vec3::new(16.0, 0.0, 16.0),
            70f32.to_radians(),
            1.5,
            0.5,
            1000.0,
        )
    }

    #[test]
    fn test_new_seeds_one_root_per_tile() {
        let mesh = BinMesh::new(&bumpy(17, 17), small_config()).unwrap();
        assert_eq!(mesh.tiles().len(), 8);
        assert_eq!(mesh.active_count(), 8);
        assert_eq!(mesh.split_queue_keys().len(), 8);
        assert!(mesh.merge_queue_keys().is_empty());
        for tree in mesh.tiles() {
            assert_eq!(tree.state(1), NodeState::Leaf);
        }
    }

    #[test]
    fn test_grid_smaller_than_a_tile_is_rejected() {
        let err = BinMesh::new(&HeightGrid::flat(5, 9, 0.0), small_config()).err();
        assert!(matches!(err, Some(LodError::GridTooSmall { rows: 5, cols: 9, tile_size: 8 })));
    }

    #[test]
    fn test_root_split_cascades_into_block_partner() {
        let mut mesh = BinMesh::new(&bumpy(9, 9), small_config()).unwrap();
        assert!(mesh.force_split(0, 1).unwrap());
        assert_eq!(mesh.tiles()[0].state(1), NodeState::Split);
        assert_eq!(mesh.tiles()[1].state(1), NodeState::Split);
        assert_eq!(mesh.active_count(), 4);
        assert!(mesh.is_diamond(0, 1));
        let merges = mesh.merge_queue_keys();
        assert_eq!(merges.len(), 2);
        assert_eq!(merges[0].priority, merges[1].priority);
    }

    /// A diamond whose parents were seen but whose children all left the
    /// view is merged even though its merge priority is still positive.
    #[test]
    fn test_invisible_diamond_merges_despite_priority() {
        let mut mesh = BinMesh::new(&bumpy(9, 9), small_config()).unwrap();
        mesh.frame = Some(Frame::new(&overview(), &mesh.config));
        for tile in 0..2 {
            mesh.tiles[tile].vis[1] = Visibility::Partial;
        }
        assert!(mesh.force_split(0, 1).unwrap());
        let merges = mesh.merge_queue_keys();
        assert_eq!(merges.len(), 2);
        assert!(merges.iter().all(|k| k.priority > 0), "{merges:?}");

        for tile in 0..2 {
            for child in [2, 3] {
                mesh.tiles[tile].vis[child] = Visibility::Out;
            }
        }
        assert!(!mesh.is_diamond_visible(0, 1));
        assert_eq!(mesh.merge_invisible().unwrap(), 1);
        assert_eq!(mesh.tiles()[0].state(1), NodeState::Leaf);
        assert_eq!(mesh.tiles()[1].state(1), NodeState::Leaf);
        assert!(mesh.merge_queue_keys().is_empty());
        assert_eq!(mesh.split_queue_keys().len(), 2);
    }

    /// Visible diamonds are left to the balancer.
    #[test]
    fn test_visible_diamond_survives_merge_pass() {
        let mut mesh = BinMesh::new(&bumpy(9, 9), small_config()).unwrap();
        mesh.frame = Some(Frame::new(&overview(), &mesh.config));
        assert!(mesh.force_split(0, 1).unwrap());
        mesh.tiles[1].vis[3] = Visibility::Partial;
        assert_eq!(mesh.merge_invisible().unwrap(), 0);
        assert!(mesh.is_diamond(0, 1));
    }

    #[test]
    fn test_finest_level_is_never_split() {
        let mut mesh = BinMesh::new(&bumpy(3, 3), MeshConfig { tile_size: 2, ..small_config() }).unwrap();
        let leaf_start = mesh.layout().leaf_start();
        assert!(!mesh.force_split(0, leaf_start).unwrap());
        assert!(!mesh.force_split(0, leaf_start + 1).unwrap());
    }

    /// Splitting a deep node pulls in its ancestors and neighbours.
    #[test]
    fn test_deep_split_pulls_in_ancestors() {
        let mut mesh = BinMesh::new(&bumpy(9, 9), small_config()).unwrap();
        let deep = mesh.layout().node_at(3, 3).unwrap();
        assert!(mesh.force_split(0, 1).unwrap());
        let mut i = deep;
        while mesh.tiles()[0].state(i) == NodeState::Absent {
            i /= 2;
        }
        assert!(mesh.force_split(0, i).unwrap());
        assert_eq!(mesh.tiles()[0].state(i), NodeState::Split);
    }

    #[test]
    fn test_calculate_reaches_detail_window() {
        let config = MeshConfig {
            min_detail: 100,
            max_detail: 200,
            ..small_config()
        };
        let mut mesh = BinMesh::new(&bumpy(33, 33), config).unwrap();
        let visible = mesh.calculate(&overview()).unwrap();
        assert!(visible >= 100, "only {visible} visible");
        assert!(visible <= 200 + 2 * mesh.layout().max_level() as usize * 4, "{visible} visible");
        assert_eq!(mesh.stats().frames, 1);
        assert_eq!(mesh.visible_triangles().len(), visible);
    }

    #[test]
    fn test_flat_terrain_stays_coarse() {
        let config = MeshConfig {
            min_detail: 50,
            ..small_config()
        };
        let mut mesh = BinMesh::new(&HeightGrid::flat(17, 17, 2.0), config).unwrap();
        mesh.calculate(&overview()).unwrap();
        assert!(mesh.split_queue_keys().iter().all(|k| k.priority == 0));
        assert_eq!(mesh.active_count(), 8);
    }

    #[test]
    fn test_detail_range_change_rebalances() {
        let config = MeshConfig {
            min_detail: 100,
            max_detail: 200,
            ..small_config()
        };
        let mut mesh = BinMesh::new(&bumpy(33, 33), config).unwrap();
        assert!(mesh.calculate(&overview()).unwrap() >= 100);

        mesh.set_detail_range(0, 40, 2000).unwrap();
        let visible = mesh.calculate(&overview()).unwrap();
        assert!(visible <= 40 + 2 * mesh.layout().max_level() as usize * 4, "{visible} visible");
        assert_eq!(mesh.config().max_detail, 40);

        let err = mesh.set_detail_range(50, 10, 2000).unwrap_err();
        assert!(matches!(err, LodError::InvalidDetailRange { min: 50, max: 10, .. }));
        assert_eq!(mesh.config().max_detail, 40);
    }

    #[test]
    fn test_height_interpolates_a_plane() {
        let grid = HeightGrid::from_fn(17, 17, |r, c| r as f32 * 0.5 + c as f32 * 0.25);
        let mesh = BinMesh::new(&grid, small_config()).unwrap();
        for (x, z) in [(1.5, 2.25), (7.9, 8.1), (12.0, 3.0), (16.0, 16.0)] {
            let expected = x * 0.5 + z * 0.25;
            assert!((mesh.height(x, z) - expected).abs() < 1e-4, "({x}, {z})");
        }
    }

    #[test]
    fn test_height_clamps_outside_the_grid() {
        let grid = HeightGrid::from_fn(9, 9, |r, c| (r + c) as f32);
        let mesh = BinMesh::new(&grid, small_config()).unwrap();
        assert!((mesh.height(-5.0, -5.0) - 0.0).abs() < 1e-5);
        assert!((mesh.height(100.0, 100.0) - 16.0).abs() < 1e-5);
        assert!((mesh.height(f32::NAN, 4.0) - 4.0).abs() < 1e-5);
    }

    fn tilted() -> HeightGrid {
        HeightGrid::from_fn(17, 17, |r, c| r as f32 * 0.5 + c as f32 * 0.25)
    }

    #[test]
    fn test_ray_drops_onto_both_tile_kinds() {
        let mesh = BinMesh::new(&tilted(), small_config()).unwrap();

        let (tile, tri, hit) = mesh
            .ray_test(Vec3::new(3.3, 50.0, 4.6), Vec3::new(3.3, -50.0, 4.6))
            .unwrap();
        assert_eq!(tile, 0);
        assert!(mesh.layout().is_leaf_level(tri));
        assert!((hit.y - 2.8).abs() < 1e-3, "{hit}");

        let (tile, _, hit) = mesh
            .ray_test(Vec3::new(12.5, 50.0, 13.0), Vec3::new(12.5, -50.0, 13.0))
            .unwrap();
        assert_eq!(tile, 7);
        assert!(mesh.tiles()[tile as usize].is_mirrored());
        assert!((hit.y - 9.5).abs() < 1e-3, "{hit}");
    }

    #[test]
    fn test_slanted_ray_meets_the_surface() {
        let mesh = BinMesh::new(&tilted(), small_config()).unwrap();
        let (_, _, hit) = mesh
            .ray_test(Vec3::new(-2.0, 40.0, -3.0), Vec3::new(18.0, -20.0, 15.0))
            .unwrap();
        let t = 41.75 / 74.5;
        assert!((hit.x - (-2.0 + 20.0 * t)).abs() < 1e-2, "{hit}");
        assert!((hit.z - (-3.0 + 18.0 * t)).abs() < 1e-2, "{hit}");
        assert!((hit.y - mesh.height(hit.x, hit.z)).abs() < 1e-2, "{hit}");
    }

    #[test]
    fn test_ray_misses_past_the_grid_and_above_it() {
        let mesh = BinMesh::new(&tilted(), small_config()).unwrap();
        assert!(mesh.ray_test(Vec3::new(30.0, 5.0, 30.0), Vec3::new(60.0, 5.0, 60.0)).is_none());
        assert!(mesh.ray_test(Vec3::new(0.0, 100.0, 0.0), Vec3::new(16.0, 100.0, 16.0)).is_none());
        assert!(mesh.ray_test(Vec3::new(8.0, 50.0, 8.0), Vec3::new(8.0, 20.0, 8.0)).is_none());
        assert!(mesh.ray_test(Vec3::new(f32::NAN, 5.0, 0.0), Vec3::ZERO).is_none());
    }

    #[test]
    fn test_ray_starting_underground_hits_at_its_start() {
        let mesh = BinMesh::new(&tilted(), small_config()).unwrap();
        let from = Vec3::new(4.0, -10.0, 4.0);
        let (_, _, hit) = mesh.ray_test(from, Vec3::new(4.0, -20.0, 4.0)).unwrap();
        assert!(hit.distance(from) < 1e-4, "{hit}");
    }

    #[test]
    fn test_set_height_reshapes_wedges() {
        let mut mesh = BinMesh::new(&HeightGrid::flat(9, 9, 0.0), small_config()).unwrap();
        assert_eq!(mesh.tiles()[0].thickness(1), 0.0);
        mesh.set_height(2.0, 2.0, 5.0).unwrap();
        assert!(mesh.tiles()[0].thickness(1) > 0.0);
        assert_eq!(mesh.tiles()[1].thickness(1), 0.0);
        assert!((mesh.height(2.0, 2.0) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_write_vertices_emits_three_per_triangle() {
        let mut mesh = BinMesh::new(&bumpy(17, 17), small_config()).unwrap();
        mesh.calculate(&overview()).unwrap();
        let mut buffer = Vec::new();
        let count = mesh.write_vertices(&mut buffer);
        assert_eq!(count, mesh.visible_count());
        assert_eq!(buffer.len(), count * 3);
        for v in &buffer {
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-4);
            assert!(v.uv.iter().all(|&t| (0.0..=1.0).contains(&t)));
        }
    }

    #[test]
    fn test_arena_exhaustion_poisons_until_rebuild() {
        let config = MeshConfig {
            min_detail: 500,
            max_detail: 1000,
            arena_capacity: Some(12),
            ..small_config()
        };
        let mut mesh = BinMesh::new(&bumpy(17, 17), config).unwrap();
        let err = mesh.calculate(&overview()).unwrap_err();
        assert!(matches!(err, LodError::Arena(_)));
        assert!(mesh.is_poisoned());
        assert!(matches!(mesh.calculate(&overview()), Err(LodError::Poisoned)));
        assert!(matches!(mesh.force_split(0, 1), Err(LodError::Poisoned)));

        mesh.rebuild().unwrap();
        assert!(!mesh.is_poisoned());
        assert_eq!(mesh.stats(), MeshStats::default());
        assert_eq!(mesh.active_count(), 8);
    }
}

#[cfg(test)]
#[path = "mesh_invariant_tests.rs"]
mod invariant_tests;
