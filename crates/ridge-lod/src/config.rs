//! Tuning parameters of a [`BinMesh`](crate::BinMesh).

use serde::{Deserialize, Serialize};

use crate::error::LodError;

/// Extra arena slots on top of the derived estimate, for forced-split
/// cascades that overshoot the leaf ceiling.
const ARENA_SLACK: usize = 1024;

/// Mesh budgets, clip distances and scaling factors.
///
/// Missing fields deserialize to their defaults so older config files keep
/// loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Tile edge in grid cells; a power of two.
    pub tile_size: u32,
    /// Visible-triangle count the balancer refines up to.
    pub min_detail: usize,
    /// Visible-triangle count the balancer coarsens down to.
    pub max_detail: usize,
    /// Hard ceiling on mesh leaves; splits are refused beyond it.
    pub abs_max_detail: usize,
    pub near_clip: f32,
    pub far_clip: f32,
    /// Depth per frame of priority-recompute delay.
    pub progressive_distance: f32,
    /// Multiplier from projected error to the u16 priority range.
    pub priority_scale: f32,
    /// World distance between adjacent grid samples.
    pub cell_size: f32,
    /// Upper bound on split/merge steps per frame.
    pub balance_iteration_cap: usize,
    /// Queue-node arena size; derived from the budgets when unset.
    pub arena_capacity: Option<usize>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            tile_size: 32,
            min_detail: 2000,
            max_detail: 4000,
            abs_max_detail: 20_000,
            near_clip: 1.0,
            far_clip: 1000.0,
            progressive_distance: 50.0,
            priority_scale: 4096.0,
            cell_size: 1.0,
            balance_iteration_cap: 20_000,
            arena_capacity: None,
        }
    }
}

impl MeshConfig {
    /// Check budget ordering, the tile size and the scalar settings.
    pub fn validate(&self) -> Result<(), LodError> {
        if self.tile_size < 2 || !self.tile_size.is_power_of_two() {
            return Err(LodError::InvalidTileSize(self.tile_size));
        }
        if self.min_detail > self.max_detail || self.max_detail > self.abs_max_detail {
            return Err(LodError::InvalidDetailRange {
                min: self.min_detail,
                max: self.max_detail,
                abs_max: self.abs_max_detail,
            });
        }
        for (name, value) in [
            ("cell_size", self.cell_size),
            ("near_clip", self.near_clip),
            ("priority_scale", self.priority_scale),
            ("progressive_distance", self.progressive_distance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LodError::InvalidSetting { name, value });
            }
        }
        if !self.far_clip.is_finite() || self.far_clip <= self.near_clip {
            return Err(LodError::InvalidClipRange {
                near: self.near_clip,
                far: self.far_clip,
            });
        }
        Ok(())
    }

    /// Arena slots for a mesh of `tile_count` tiles with `splittable`
    /// queueable nodes per tile.
    ///
    /// Never more than every queueable node at once.
    #[must_use]
    pub fn effective_arena_capacity(&self, tile_count: usize, splittable: usize) -> usize {
        let ceiling = tile_count * splittable;
        self.arena_capacity.unwrap_or_else(|| {
            (2 * self.abs_max_detail + 2 * tile_count + ARENA_SLACK).min(ceiling)
        })
    }
}
