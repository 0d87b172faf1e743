//! Shape of one tile's implicit binary triangle tree.
//!
//! Every tile of a mesh shares the same index arithmetic, vertex positions and
//! hypotenuse partners, so the table is built once and borrowed by all tiles.
//!
//! Index 1 is the tile root; node `i` has children `2i` and `2i + 1` and
//! parent `i / 2`. Index 0 and indices `N`, `N + 1` (with `N = 2^max_level`)
//! are the three tile corners. Indices at or above `N / 2` form the finest
//! level: they are rendered but never split.

use crate::error::LodError;

/// Which tile boundary a triangle's hypotenuse lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Hypotenuse inside the tile; the partner is in the same tile.
    Inner,
    /// Row 0; the partner is in the tile above.
    Top,
    /// Column 0; the partner is in the tile to the left.
    Left,
    /// The block diagonal; the partner is in the block's other tile.
    Diagonal,
}

/// Local grid position of a vertex, `(row, col)` with `0 <= row + col <= S`.
pub type LocalPos = (u16, u16);

/// Shared index and neighbour tables for tiles of one size.
#[derive(Debug)]
pub struct TriangleLayout {
    tile_size: u32,
    max_level: u32,
    tri_count: u32,
    /// Centre vertex per splittable node plus the three corners.
    centre: Vec<LocalPos>,
    v0: Vec<u32>,
    v1: Vec<u32>,
    brother: Vec<u32>,
    edge: Vec<Edge>,
    /// Up to two node indices whose centre sits at each grid point.
    lut: Vec<[u32; 2]>,
}

impl TriangleLayout {
    /// Build the tables for tiles of `tile_size` cells.
    pub fn new(tile_size: u32) -> Result<Self, LodError> {
        if tile_size < 2 || !tile_size.is_power_of_two() || tile_size > 1 << 12 {
            return Err(LodError::InvalidTileSize(tile_size));
        }
        let max_level = 2 * tile_size.trailing_zeros() + 1;
        let tri_count = 1u32 << max_level;
        let slots = tri_count as usize + 2;
        let leaf_start = tri_count / 2;
        let s = tile_size as u16;

        let mut centre = vec![(0u16, 0u16); slots];
        let mut v0 = vec![0u32; slots];
        let mut v1 = vec![0u32; slots];

        centre[0] = (0, 0);
        centre[tri_count as usize] = (0, s);
        centre[tri_count as usize + 1] = (s, 0);
        v0[1] = tri_count + 1;
        v1[1] = tri_count;

        for i in 1..leaf_start {
            let (a, b) = (centre[v0[i as usize] as usize], centre[v1[i as usize] as usize]);
            centre[i as usize] = ((a.0 + b.0) / 2, (a.1 + b.1) / 2);

            let apex = i / 2;
            let (left, right) = (2 * i as usize, 2 * i as usize + 1);
            v0[left] = apex;
            v1[left] = v0[i as usize];
            v0[right] = v1[i as usize];
            v1[right] = apex;
        }

        let side = tile_size as usize + 1;
        let mut lut = vec![[0u32; 2]; side * side];
        for i in 1..leaf_start {
            let (r, c) = centre[i as usize];
            let cell = &mut lut[r as usize * side + c as usize];
            if cell[0] == 0 {
                cell[0] = i;
            } else {
                debug_assert_eq!(cell[1], 0, "three triangles share centre ({r}, {c})");
                cell[1] = i;
            }
        }

        let mut layout = Self {
            tile_size,
            max_level,
            tri_count,
            centre,
            v0,
            v1,
            brother: vec![0; slots],
            edge: vec![Edge::Inner; slots],
            lut,
        };
        layout.link_brothers();
        Ok(layout)
    }

    /// One linear pass over the splittable nodes.
    fn link_brothers(&mut self) {
        let s = self.tile_size as u16;
        for i in 1..self.leaf_start() {
            let (r, c) = self.centre[i as usize];
            let (edge, partner) = if r == 0 {
                (Edge::Top, self.lut_first(0, s - c))
            } else if c == 0 {
                (Edge::Left, self.lut_first(s - r, 0))
            } else if r + c == s {
                (Edge::Diagonal, self.lut_first(c, r))
            } else {
                let [a, b] = self.lut_cell(r, c);
                debug_assert!(a != 0 && b != 0, "inner centre ({r}, {c}) has no partner");
                (Edge::Inner, if a == i { b } else { a })
            };
            self.edge[i as usize] = edge;
            self.brother[i as usize] = partner;
        }
    }

    fn lut_cell(&self, row: u16, col: u16) -> [u32; 2] {
        let side = self.tile_size as usize + 1;
        self.lut[row as usize * side + col as usize]
    }

    fn lut_first(&self, row: u16, col: u16) -> u32 {
        self.lut_cell(row, col)[0]
    }

    /// Tile edge length in cells.
    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tree levels, root level included.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// `N = 2^max_level`; node indices run `1..N`.
    #[must_use]
    pub fn tri_count(&self) -> u32 {
        self.tri_count
    }

    /// First index of the finest level.
    #[must_use]
    pub fn leaf_start(&self) -> u32 {
        self.tri_count / 2
    }

    /// Size of per-tile node arrays, corners included.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.tri_count as usize + 2
    }

    /// Whether `i` is on the finest level.
    #[must_use]
    pub fn is_leaf_level(&self, i: u32) -> bool {
        i >= self.leaf_start()
    }

    /// Whether `i` is one of the three corner sentinels.
    #[must_use]
    pub fn is_sentinel(&self, i: u32) -> bool {
        i == 0 || i >= self.tri_count
    }

    /// Apex vertex index (the parent's centre).
    #[must_use]
    pub fn apex(&self, i: u32) -> u32 {
        i / 2
    }

    #[must_use]
    pub fn v0(&self, i: u32) -> u32 {
        self.v0[i as usize]
    }

    #[must_use]
    pub fn v1(&self, i: u32) -> u32 {
        self.v1[i as usize]
    }

    /// Local position of the centre vertex of a splittable node or corner.
    #[must_use]
    pub fn pos(&self, i: u32) -> LocalPos {
        debug_assert!(
            !self.is_leaf_level(i) || self.is_sentinel(i),
            "finest-level node {i} has no grid centre"
        );
        self.centre[i as usize]
    }

    /// The three vertex indices of `i`: apex, v0, v1.
    #[must_use]
    pub fn corners(&self, i: u32) -> [u32; 3] {
        [self.apex(i), self.v0(i), self.v1(i)]
    }

    /// Hypotenuse partner index and the boundary it crosses.
    ///
    /// For non-inner edges the index refers to the neighbouring tile.
    #[must_use]
    pub fn brother(&self, i: u32) -> (Edge, u32) {
        (self.edge[i as usize], self.brother[i as usize])
    }

    /// Node whose centre is at `(row, col)`, preferring the coarser one.
    #[must_use]
    pub fn node_at(&self, row: u16, col: u16) -> Option<u32> {
        let [a, b] = self.lut_cell(row, col);
        match (a, b) {
            (0, _) => None,
            (a, 0) => Some(a),
            (a, b) => Some(a.min(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_tile_sizes() {
        for size in [0, 1, 3, 12] {
            assert!(matches!(
                TriangleLayout::new(size),
                Err(LodError::InvalidTileSize(s)) if s == size
            ));
        }
    }

    /// The root spans the full tile with its centre on the diagonal.
    #[test]
    fn test_root_geometry() {
        let layout = TriangleLayout::new(8).unwrap();
        let n = layout.tri_count();
        assert_eq!(layout.max_level(), 7);
        assert_eq!(n, 128);
        assert_eq!(layout.corners(1), [0, n + 1, n]);
        assert_eq!(layout.pos(0), (0, 0));
        assert_eq!(layout.pos(n + 1), (8, 0));
        assert_eq!(layout.pos(n), (0, 8));
        assert_eq!(layout.pos(1), (4, 4));
        assert_eq!(layout.brother(1).0, Edge::Diagonal);
        assert_eq!(layout.brother(1).1, 1);
    }

    /// First split puts the left child on column 0, the right child on row 0.
    #[test]
    fn test_root_children_lie_on_tile_edges() {
        let layout = TriangleLayout::new(4).unwrap();
        assert_eq!(layout.pos(2), (2, 0));
        assert_eq!(layout.brother(2).0, Edge::Left);
        assert_eq!(layout.pos(3), (0, 2));
        assert_eq!(layout.brother(3).0, Edge::Top);
    }

    /// Inner partners are mutual and share a centre.
    #[test]
    fn test_inner_brothers_are_symmetric() {
        let layout = TriangleLayout::new(16).unwrap();
        for i in 1..layout.leaf_start() {
            let (edge, b) = layout.brother(i);
            if edge == Edge::Inner {
                assert_ne!(b, i);
                assert_eq!(layout.brother(b), (Edge::Inner, i), "partner of {i}");
                assert_eq!(layout.pos(b), layout.pos(i));
            }
        }
    }

    /// Cross-tile partners map back onto the original node, at the same level.
    #[test]
    fn test_edge_brothers_round_trip() {
        let layout = TriangleLayout::new(16).unwrap();
        for i in 1..layout.leaf_start() {
            let (edge, b) = layout.brother(i);
            if edge != Edge::Inner {
                assert_eq!(layout.brother(b), (edge, i), "partner of {i} on {edge:?}");
                assert_eq!(b.ilog2(), i.ilog2(), "levels differ for {i} and {b}");
            }
        }
    }

    /// Every centre is the midpoint of its hypotenuse.
    #[test]
    fn test_centre_is_hypotenuse_midpoint() {
        let layout = TriangleLayout::new(8).unwrap();
        for i in 1..layout.leaf_start() {
            let (a, b) = (layout.pos(layout.v0(i)), layout.pos(layout.v1(i)));
            let (r, c) = layout.pos(i);
            assert_eq!(2 * r, a.0 + b.0);
            assert_eq!(2 * c, a.1 + b.1);
        }
    }

    /// Finest-level vertices all resolve to grid points.
    #[test]
    fn test_leaf_corners_have_positions() {
        let layout = TriangleLayout::new(4).unwrap();
        for i in layout.leaf_start()..layout.tri_count() {
            for v in layout.corners(i) {
                assert!(!layout.is_leaf_level(v) || layout.is_sentinel(v));
            }
        }
    }

    #[test]
    fn test_node_at_prefers_coarser_level() {
        let layout = TriangleLayout::new(8).unwrap();
        assert_eq!(layout.node_at(4, 4), Some(1));
        assert_eq!(layout.node_at(0, 0), None);
    }
}
