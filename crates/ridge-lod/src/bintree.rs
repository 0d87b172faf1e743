//! Per-tile binary triangle tree: placement, wedge thickness, visibility and
//! priority evaluation.
//!
//! A tile only stores dynamic state; every shape question goes through the
//! shared [`TriangleLayout`]. Operations that cross tile boundaries (forced
//! splits, merges, queue moves) live on the mesh.

use glam::{Vec2, Vec3};

use crate::arena::NodeHandle;
use crate::config::MeshConfig;
use crate::height_grid::{HeightGrid, HeightSource};
use crate::layout::{Edge, TriangleLayout};
use crate::view::{Frame, TileBasis, Visibility};

/// Recompute delay given to nodes outside the view volume.
pub const MAX_DELAY: u8 = 15;

/// Where a node sits in the current mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not part of the mesh.
    #[default]
    Absent,
    /// A rendered triangle.
    Leaf,
    /// Replaced by its two children.
    Split,
}

/// Queue membership of a node, with the handle of its splay node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueSlot {
    #[default]
    Idle,
    Split(NodeHandle),
    Merge(NodeHandle),
}

/// One normal or mirrored half of a grid block.
#[derive(Debug)]
pub struct BinTree {
    id: u32,
    mirrored: bool,
    /// World grid `(row, col)` of local `(0, 0)`.
    origin: (u32, u32),
    /// Tile ids across the top, left and diagonal edges.
    neighbours: [Option<u32>; 3],
    height: Vec<f32>,
    thickness: Vec<f32>,
    pub(crate) state: Vec<NodeState>,
    pub(crate) vis: Vec<Visibility>,
    pub(crate) queue: Vec<QueueSlot>,
    pub(crate) priority: Vec<u16>,
    pub(crate) delay: Vec<u8>,
}

/// Tallies from one visibility pass.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct VisibilityPass {
    pub tests: u64,
    pub visible_leaves: usize,
}

impl BinTree {
    /// Tile for block `(block_row, block_col)` of a `blocks.0 x blocks.1` grid.
    #[must_use]
    pub fn new(
        layout: &TriangleLayout,
        grid: &HeightGrid,
        block: (u32, u32),
        blocks: (u32, u32),
        mirrored: bool,
    ) -> Self {
        let (br, bc) = block;
        let (nr, nc) = blocks;
        let s = layout.tile_size();
        let tile_id = |r: u32, c: u32, m: bool| 2 * (r * nc + c) + u32::from(m);

        let (origin, neighbours) = if mirrored {
            (
                ((br + 1) * s, (bc + 1) * s),
                [
                    (br + 1 < nr).then(|| tile_id(br + 1, bc, false)),
                    (bc + 1 < nc).then(|| tile_id(br, bc + 1, false)),
                    Some(tile_id(br, bc, false)),
                ],
            )
        } else {
            (
                (br * s, bc * s),
                [
                    (br > 0).then(|| tile_id(br - 1, bc, true)),
                    (bc > 0).then(|| tile_id(br, bc - 1, true)),
                    Some(tile_id(br, bc, true)),
                ],
            )
        };

        let slots = layout.slot_count();
        let mut tree = Self {
            id: tile_id(br, bc, mirrored),
            mirrored,
            origin,
            neighbours,
            height: vec![0.0; slots],
            thickness: vec![0.0; slots],
            state: vec![NodeState::Absent; slots],
            vis: vec![Visibility::Undefined; slots],
            queue: vec![QueueSlot::Idle; slots],
            priority: vec![0; slots],
            delay: vec![0; slots],
        };
        tree.refresh_heights(layout, grid);
        tree.compute_thickness(layout);
        tree.reset_state(layout);
        tree
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Drop every node from the mesh; corners become permanently split.
    pub(crate) fn reset_state(&mut self, layout: &TriangleLayout) {
        self.state.fill(NodeState::Absent);
        self.vis.fill(Visibility::Undefined);
        self.queue.fill(QueueSlot::Idle);
        self.priority.fill(0);
        self.delay.fill(0);
        let n = layout.tri_count() as usize;
        for sentinel in [0, n, n + 1] {
            self.state[sentinel] = NodeState::Split;
        }
    }

    /// World grid sample under a local position.
    #[must_use]
    pub fn world_sample(&self, local: (u16, u16)) -> (usize, usize) {
        let (r, c) = (u32::from(local.0), u32::from(local.1));
        let (r0, c0) = self.origin;
        if self.mirrored {
            ((r0 - r) as usize, (c0 - c) as usize)
        } else {
            ((r0 + r) as usize, (c0 + c) as usize)
        }
    }

    /// Local position of a world sample if it lies on this tile (edges included).
    #[must_use]
    pub fn local_of(&self, row: usize, col: usize, tile_size: u32) -> Option<(u16, u16)> {
        let (r0, c0) = (self.origin.0 as i64, self.origin.1 as i64);
        let (r, c) = if self.mirrored {
            (r0 - row as i64, c0 - col as i64)
        } else {
            (row as i64 - r0, col as i64 - c0)
        };
        (r >= 0 && c >= 0 && r + c <= i64::from(tile_size)).then_some((r as u16, c as u16))
    }

    /// Re-read vertex heights from the grid.
    pub(crate) fn refresh_heights(&mut self, layout: &TriangleLayout, grid: &HeightGrid) {
        let n = layout.tri_count();
        let nodes = (0..layout.leaf_start()).chain([n, n + 1]);
        for i in nodes {
            let (row, col) = self.world_sample(layout.pos(i));
            self.height[i as usize] = grid.height(row, col);
        }
    }

    /// Bottom-up wedge thickness; finest-level nodes stay at zero.
    pub(crate) fn compute_thickness(&mut self, layout: &TriangleLayout) {
        let leaf_start = layout.leaf_start();
        self.thickness.fill(0.0);
        for i in (1..leaf_start).rev() {
            let (l, r) = (2 * i as usize, 2 * i as usize + 1);
            let children = if l < leaf_start as usize {
                self.thickness[l].max(self.thickness[r])
            } else {
                0.0
            };
            let chord = 0.5 * (self.vertex_height(layout.v0(i)) + self.vertex_height(layout.v1(i)));
            self.thickness[i as usize] = children + (self.vertex_height(i) - chord).abs();
        }
    }

    /// Height of the vertex at node `i`'s centre (or a corner).
    #[must_use]
    pub fn vertex_height(&self, i: u32) -> f32 {
        self.height[i as usize]
    }

    /// Wedge half-thickness bounding the surface below node `i`.
    #[must_use]
    pub fn thickness(&self, i: u32) -> f32 {
        self.thickness[i as usize]
    }

    #[must_use]
    pub fn state(&self, i: u32) -> NodeState {
        self.state[i as usize]
    }

    #[must_use]
    pub fn visibility(&self, i: u32) -> Visibility {
        self.vis[i as usize]
    }

    #[must_use]
    pub fn priority(&self, i: u32) -> u16 {
        self.priority[i as usize]
    }

    #[must_use]
    pub fn queue_slot(&self, i: u32) -> QueueSlot {
        self.queue[i as usize]
    }

    /// Hypotenuse partner as `(tile, index)`, or `None` on the grid border.
    #[must_use]
    pub fn partner(&self, layout: &TriangleLayout, i: u32) -> Option<(u32, u32)> {
        let (edge, b) = layout.brother(i);
        let tile = match edge {
            Edge::Inner => Some(self.id),
            Edge::Top => self.neighbours[0],
            Edge::Left => self.neighbours[1],
            Edge::Diagonal => self.neighbours[2],
        };
        tile.map(|t| (t, b))
    }

    /// This tile's axes in camera space.
    #[must_use]
    pub fn basis(&self, frame: &Frame) -> TileBasis {
        frame.tile_basis(self.origin.0, self.origin.1, self.mirrored)
    }

    fn local(layout: &TriangleLayout, i: u32) -> Vec2 {
        let (r, c) = layout.pos(i);
        Vec2::new(f32::from(r), f32::from(c))
    }

    /// Box around node `i`'s wedge classified against the view volume.
    fn classify(&self, layout: &TriangleLayout, basis: &TileBasis, frame: &Frame, i: u32) -> Visibility {
        let corners = layout.corners(i);
        let mut lo = Vec3::splat(f32::MAX);
        let mut hi = Vec3::splat(f32::MIN);
        for v in corners {
            let p = Self::local(layout, v).extend(self.vertex_height(v));
            lo = lo.min(p);
            hi = hi.max(p);
        }
        let t = self.thickness(i);
        let box_corners = basis.box_corners((lo.x, hi.x), (lo.y, hi.y), (lo.z - t, hi.z + t));
        frame.classify(&box_corners)
    }

    /// Top-down visibility over the current mesh.
    ///
    /// Resolved states (`Out`, `FullyIn`) are copied to descendants without
    /// testing, as are finest-level nodes. A changed state zeroes the node's
    /// recompute delay.
    pub(crate) fn update_visibility(&mut self, layout: &TriangleLayout, frame: &Frame) -> VisibilityPass {
        let basis = self.basis(frame);
        let mut pass = VisibilityPass::default();
        let mut stack = vec![(1u32, Visibility::Undefined)];

        while let Some((i, inherited)) = stack.pop() {
            let vis = if inherited.is_resolved() || layout.is_leaf_level(i) {
                inherited
            } else {
                pass.tests += 1;
                self.classify(layout, &basis, frame, i)
            };
            if self.vis[i as usize] != vis {
                self.vis[i as usize] = vis;
                self.delay[i as usize] = 0;
            }
            match self.state[i as usize] {
                NodeState::Leaf if vis != Visibility::Out => pass.visible_leaves += 1,
                NodeState::Split => {
                    stack.push((2 * i + 1, vis));
                    stack.push((2 * i, vis));
                }
                _ => {}
            }
        }
        pass
    }

    /// Visibility for a freshly created child of `parent`.
    pub(crate) fn child_visibility(
        &self,
        layout: &TriangleLayout,
        frame: Option<&Frame>,
        parent: u32,
        child: u32,
    ) -> Visibility {
        let inherited = self.vis[parent as usize];
        match frame {
            Some(frame) if !inherited.is_resolved() && !layout.is_leaf_level(child) => {
                self.classify(layout, &self.basis(frame), frame, child)
            }
            _ => inherited,
        }
    }

    /// Screen-space error of node `i` and the frames until the next recompute.
    #[must_use]
    pub fn compute_priority(
        &self,
        layout: &TriangleLayout,
        frame: Option<&Frame>,
        config: &MeshConfig,
        i: u32,
    ) -> (u16, u8) {
        let Some(frame) = frame else {
            return (0, 0);
        };
        if self.vis[i as usize] == Visibility::Out || layout.is_leaf_level(i) {
            return (0, MAX_DELAY);
        }
        let local = Self::local(layout, i);
        let centre = self.basis(frame).to_camera(local.x, local.y, self.vertex_height(i));
        let depth = frame.depth(centre);
        let error = self.thickness(i) * frame.projection() / depth.max(frame.near());
        let priority = (error * config.priority_scale).clamp(0.0, f32::from(u16::MAX)) as u16;
        let delay = (depth / config.progressive_distance.max(f32::EPSILON)).clamp(1.0, f32::from(MAX_DELAY));
        (priority, delay as u8)
    }

    /// Mesh leaves in depth-first, left-first order.
    pub(crate) fn for_each_leaf(&self, mut f: impl FnMut(u32)) {
        let mut stack = vec![1u32];
        while let Some(i) = stack.pop() {
            match self.state[i as usize] {
                NodeState::Leaf => f(i),
                NodeState::Split => {
                    stack.push(2 * i + 1);
                    stack.push(2 * i);
                }
                NodeState::Absent => debug_assert!(false, "absent node {i} below a split"),
            }
        }
    }

    /// Queued nodes, parents before children.
    pub(crate) fn queued_nodes(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![1u32];
        while let Some(i) = stack.pop() {
            if self.queue[i as usize] != QueueSlot::Idle {
                out.push(i);
            }
            if self.state[i as usize] == NodeState::Split {
                stack.push(2 * i + 1);
                stack.push(2 * i);
            }
        }
        out
    }

    /// Finest-level triangle containing local point `p` (row, col).
    #[must_use]
    pub fn locate(&self, layout: &TriangleLayout, p: Vec2) -> u32 {
        let mut i = 1;
        while !layout.is_leaf_level(i) {
            let apex = Self::local(layout, layout.apex(i));
            let centre = Self::local(layout, i);
            let v0 = Self::local(layout, layout.v0(i));
            let axis = centre - apex;
            let side_p = axis.perp_dot(p - apex);
            let side_v0 = axis.perp_dot(v0 - apex);
            i = if side_p * side_v0 >= 0.0 { 2 * i } else { 2 * i + 1 };
        }
        i
    }

    /// Height at local point `p` interpolated over its finest triangle.
    #[must_use]
    pub fn interpolate(&self, layout: &TriangleLayout, p: Vec2) -> f32 {
        self.plane_height(layout, self.locate(layout, p), p)
    }

    /// Height of triangle `tri`'s plane above local point `p`.
    fn plane_height(&self, layout: &TriangleLayout, tri: u32, p: Vec2) -> f32 {
        let [a, b, c] = layout.corners(tri);
        let (pa, pb, pc) = (Self::local(layout, a), Self::local(layout, b), Self::local(layout, c));
        let area = (pb - pa).perp_dot(pc - pa);
        if area.abs() < f32::EPSILON {
            return self.vertex_height(a);
        }
        let wb = (p - pa).perp_dot(pc - pa) / area;
        let wc = (pb - pa).perp_dot(p - pa) / area;
        let wa = 1.0 - wb - wc;
        wa * self.vertex_height(a) + wb * self.vertex_height(b) + wc * self.vertex_height(c)
    }

    /// Grid-space point `(row, height, col)` projected into local `(row, col)`.
    fn local_point(&self, p: Vec3) -> Vec2 {
        let origin = Vec2::new(self.origin.0 as f32, self.origin.1 as f32);
        let grid = Vec2::new(p.x, p.z);
        if self.mirrored { origin - grid } else { grid - origin }
    }

    /// First parameter in `[0, limit)` where the grid-space segment
    /// `from -> to` is at or below this tile's surface, with the finest
    /// triangle under that point.
    ///
    /// Descends the full triangle tree, skipping any node whose wedge the
    /// segment passes over.
    pub(crate) fn ray_test(&self, layout: &TriangleLayout, from: Vec3, to: Vec3, limit: f32) -> Option<(u32, f32)> {
        let (a, b) = (self.local_point(from), self.local_point(to));
        let height_at = |t: f32| from.y + t * (to.y - from.y);
        let mut limit = limit;
        let mut hit = None;
        let mut stack = vec![1u32];

        while let Some(i) = stack.pop() {
            let corners = layout.corners(i).map(|v| Self::local(layout, v));
            let Some((t0, t1)) = clip_to_triangle(corners, a, b) else {
                continue;
            };
            if t0 >= limit {
                continue;
            }
            let t1 = t1.min(limit);
            let (h0, h1) = (height_at(t0), height_at(t1));

            let found = if layout.is_leaf_level(i) {
                let f0 = h0 - self.plane_height(layout, i, a.lerp(b, t0));
                let f1 = h1 - self.plane_height(layout, i, a.lerp(b, t1));
                if f0 <= 0.0 {
                    Some((i, t0))
                } else if f1 <= 0.0 {
                    Some((i, t0 + (t1 - t0) * f0 / (f0 - f1)))
                } else {
                    None
                }
            } else {
                let heights = layout.corners(i).map(|v| self.vertex_height(v));
                let t = self.thickness(i);
                let lo = heights.into_iter().fold(f32::MAX, f32::min) - t;
                let hi = heights.into_iter().fold(f32::MIN, f32::max) + t;
                if h0.min(h1) > hi {
                    None
                } else if h0 < lo {
                    Some((self.locate(layout, a.lerp(b, t0)), t0))
                } else {
                    stack.push(2 * i + 1);
                    stack.push(2 * i);
                    None
                }
            };
            if let Some((tri, t)) = found {
                limit = t;
                hit = Some((tri, t));
            }
        }
        hit
    }
}

/// Tolerance, in cells, that lets points on a shared edge fall into both
/// triangles.
const EDGE_SLACK: f32 = 1e-4;

/// Parameter range of the 2D segment `a -> b` inside a triangle, if any.
fn clip_to_triangle(corners: [Vec2; 3], a: Vec2, b: Vec2) -> Option<(f32, f32)> {
    let orient = (corners[1] - corners[0]).perp_dot(corners[2] - corners[0]).signum();
    let d = b - a;
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    for k in 0..3 {
        let (u, v) = (corners[k], corners[(k + 1) % 3]);
        let edge = v - u;
        let start = orient * edge.perp_dot(a - u) + EDGE_SLACK * edge.length();
        let slope = orient * edge.perp_dot(d);
        if slope == 0.0 {
            if start < 0.0 {
                return None;
            }
        } else if slope > 0.0 {
            t0 = t0.max(-start / slope);
        } else {
            t1 = t1.min(-start / slope);
        }
    }
    (t0 <= t1).then_some((t0, t1))
}
