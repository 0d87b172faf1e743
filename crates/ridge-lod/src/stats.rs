//! Counters reported by [`BinMesh::stats`](crate::BinMesh::stats).

/// Running mesh counters. Only `rebuild()` resets them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshStats {
    /// Frames processed by `calculate()`.
    pub frames: u64,
    /// Visible triangles after the last frame.
    pub triangles: usize,
    /// Mesh leaves (visible or not) after the last frame.
    pub active_triangles: usize,
    /// Priorities actually recomputed (delay expired).
    pub priority_recomputes: u64,
    pub queue_inserts: u64,
    pub queue_removes: u64,
    /// Re-keys of a queued node after its priority changed.
    pub queue_moves: u64,
    /// Bounding boxes tested against the view volume.
    pub visibility_tests: u64,
    pub splits: u64,
    pub merges: u64,
    pub balance_iterations_total: u64,
    pub balance_iterations_last: usize,
}
