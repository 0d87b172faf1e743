//! Error types for the ROAM mesh core.

use crate::arena::ArenaError;

/// Errors surfaced by mesh construction and the per-frame update.
///
/// Every variant is fatal for the operation that produced it: the mesh
/// never retries internally, because a half-applied split or merge would
/// break the crack-free invariant.
#[derive(Debug, thiserror::Error)]
pub enum LodError {
    /// The shared splay-node arena ran out of slots.
    #[error("queue arena exhausted: {0}")]
    Arena(#[from] ArenaError),

    /// Tile edge length must be a power of two of at least 2 cells.
    #[error("tile size {0} is not a power of two >= 2")]
    InvalidTileSize(u32),

    /// The height grid cannot hold a single tile.
    #[error("height grid {rows}x{cols} cannot hold one {tile_size}-cell tile")]
    GridTooSmall {
        /// Sample rows in the grid.
        rows: usize,
        /// Sample columns in the grid.
        cols: usize,
        /// Requested tile edge in cells.
        tile_size: u32,
    },

    /// A sample buffer does not match the declared dimensions.
    #[error("height grid holds {len} samples, expected {rows}x{cols}")]
    GridShape {
        /// Declared rows.
        rows: usize,
        /// Declared columns.
        cols: usize,
        /// Actual number of samples supplied.
        len: usize,
    },

    /// `min_detail` must not exceed `max_detail`, which must not exceed `abs_max_detail`.
    #[error("invalid detail range: min {min}, max {max}, absolute max {abs_max}")]
    InvalidDetailRange {
        /// Lower triangle budget.
        min: usize,
        /// Upper triangle budget.
        max: usize,
        /// Hard ceiling on mesh leaves.
        abs_max: usize,
    },

    /// A scalar setting is out of range (non-positive or not finite).
    #[error("invalid {name}: {value}")]
    InvalidSetting {
        /// Field that was rejected.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// The far clip plane must lie beyond the near one.
    #[error("far clip {far} does not lie beyond near clip {near}")]
    InvalidClipRange {
        near: f32,
        far: f32,
    },

    /// An earlier fatal error left the queues inconsistent; call `rebuild()`.
    #[error("mesh is poisoned by an earlier fatal error, rebuild required")]
    Poisoned,
}
