//! Camera description and the per-frame camera-space basis.
//!
//! The mesh never transforms vertices one by one. Once per frame the world
//! origin and the world row, column and up steps are taken to camera space;
//! any grid vertex is then `origin + row * row_step + col * col_step +
//! height * up_step`, and each tile pre-bakes its own origin and mirroring
//! into a [`TileBasis`].

use glam::{Mat4, Vec3};

use crate::config::MeshConfig;

/// Plane indices into the per-corner distance array.
const NEAR: usize = 0;
const FAR: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;
const BOTTOM: usize = 4;
const TOP: usize = 5;

/// Which camera-space z direction points into the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DepthAxis {
    /// Right-handed view matrices (`look_at_rh`): depth grows along -z.
    #[default]
    NegativeZ,
    /// Left-handed view matrices: depth grows along +z.
    PositiveZ,
}

impl DepthAxis {
    fn sign(self) -> f32 {
        match self {
            Self::NegativeZ => -1.0,
            Self::PositiveZ => 1.0,
        }
    }
}

/// Result of testing a bounding volume against the view volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Not tested yet.
    #[default]
    Undefined,
    /// Entirely outside at least one plane.
    Out,
    /// Straddles at least one plane.
    Partial,
    /// Entirely inside all six planes.
    FullyIn,
}

impl Visibility {
    /// Whether descendants can copy this state without testing.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Out | Self::FullyIn)
    }
}

/// Camera state handed to the mesh each frame.
#[derive(Clone, Copy, Debug)]
pub struct View {
    /// World-to-camera transform.
    pub world_to_camera: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width over height.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub depth_axis: DepthAxis,
}

impl View {
    /// Right-handed camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            world_to_camera: Mat4::look_at_rh(eye, target, Vec3::Y),
            fov_y,
            aspect,
            near,
            far,
            depth_axis: DepthAxis::NegativeZ,
        }
    }
}

/// Camera-space basis and clip data derived from a [`View`].
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    origin: Vec3,
    row_step: Vec3,
    col_step: Vec3,
    up_step: Vec3,
    depth_sign: f32,
    tan_x: f32,
    tan_y: f32,
    near: f32,
    far: f32,
}

impl Frame {
    /// Derive the basis for grid cells of `config.cell_size`.
    ///
    /// Clip planes are the tighter of the view's and the config's.
    #[must_use]
    pub fn new(view: &View, config: &MeshConfig) -> Self {
        let m = view.world_to_camera;
        let tan_y = (view.fov_y * 0.5).tan().max(f32::EPSILON);
        Self {
            origin: m.transform_point3(Vec3::ZERO),
            row_step: m.transform_vector3(Vec3::X * config.cell_size),
            col_step: m.transform_vector3(Vec3::Z * config.cell_size),
            up_step: m.transform_vector3(Vec3::Y),
            depth_sign: view.depth_axis.sign(),
            tan_x: tan_y * view.aspect,
            tan_y,
            near: view.near.max(config.near_clip),
            far: view.far.min(config.far_clip),
        }
    }

    /// Basis for a tile whose local `(0, 0)` sits at world grid
    /// `(row, col)`; mirrored tiles run their local axes backwards.
    #[must_use]
    pub fn tile_basis(&self, row: u32, col: u32, mirrored: bool) -> TileBasis {
        let sign = if mirrored { -1.0 } else { 1.0 };
        TileBasis {
            origin: self.origin + self.row_step * row as f32 + self.col_step * col as f32,
            row: self.row_step * sign,
            col: self.col_step * sign,
            up: self.up_step,
        }
    }

    /// Distance of a camera-space point along the view direction.
    #[must_use]
    pub fn depth(&self, p: Vec3) -> f32 {
        self.depth_sign * p.z
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        self.near
    }

    /// `1 / tan(fov_y / 2)`: screen-space scale at unit depth.
    #[must_use]
    pub fn projection(&self) -> f32 {
        1.0 / self.tan_y
    }

    fn plane_distances(&self, p: Vec3) -> [f32; 6] {
        let d = self.depth(p);
        let mut out = [0.0; 6];
        out[NEAR] = d - self.near;
        out[FAR] = self.far - d;
        out[LEFT] = d * self.tan_x + p.x;
        out[RIGHT] = d * self.tan_x - p.x;
        out[BOTTOM] = d * self.tan_y + p.y;
        out[TOP] = d * self.tan_y - p.y;
        out
    }

    /// Classify a camera-space point set against the six view planes.
    #[must_use]
    pub fn classify(&self, corners: &[Vec3]) -> Visibility {
        let mut fully_in = true;
        for plane in 0..6 {
            let mut inside = 0;
            for &c in corners {
                if self.plane_distances(c)[plane] >= 0.0 {
                    inside += 1;
                }
            }
            if inside == 0 {
                return Visibility::Out;
            }
            if inside < corners.len() {
                fully_in = false;
            }
        }
        if fully_in {
            Visibility::FullyIn
        } else {
            Visibility::Partial
        }
    }
}

/// A tile's local grid axes in camera space.
#[derive(Clone, Copy, Debug)]
pub struct TileBasis {
    origin: Vec3,
    row: Vec3,
    col: Vec3,
    up: Vec3,
}

impl TileBasis {
    /// Camera-space position of local `(row, col)` at `height`.
    #[must_use]
    pub fn to_camera(&self, row: f32, col: f32, height: f32) -> Vec3 {
        self.origin + self.row * row + self.col * col + self.up * height
    }

    /// The eight corners of a local box, in camera space.
    #[must_use]
    pub fn box_corners(&self, rows: (f32, f32), cols: (f32, f32), heights: (f32, f32)) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (k, corner) in out.iter_mut().enumerate() {
            let r = if k & 1 == 0 { rows.0 } else { rows.1 };
            let c = if k & 2 == 0 { cols.0 } else { cols.1 };
            let h = if k & 4 == 0 { heights.0 } else { heights.1 };
            *corner = self.to_camera(r, c, h);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_looking_down_x() -> Frame {
        // Camera at the origin looking along +x (towards increasing rows).
        let view = View::look_at(Vec3::ZERO, Vec3::X, 90f32.to_radians(), 1.0, 0.5, 100.0);
        Frame::new(&view, &MeshConfig::default())
    }

    #[test]
    fn test_depth_follows_view_direction() {
        let frame = frame_looking_down_x();
        let basis = frame.tile_basis(0, 0, false);
        let p = basis.to_camera(10.0, 0.0, 0.0);
        assert!((frame.depth(p) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_point_ahead_is_fully_in() {
        let frame = frame_looking_down_x();
        let basis = frame.tile_basis(0, 0, false);
        let corners = basis.box_corners((9.0, 11.0), (-1.0, 1.0), (-1.0, 1.0));
        assert_eq!(frame.classify(&corners), Visibility::FullyIn);
    }

    #[test]
    fn test_box_behind_camera_is_out() {
        let frame = frame_looking_down_x();
        let basis = frame.tile_basis(0, 0, false);
        let corners = basis.box_corners((-20.0, -10.0), (-1.0, 1.0), (-1.0, 1.0));
        assert_eq!(frame.classify(&corners), Visibility::Out);
    }

    /// Config far clip wins when it is tighter than the view's.
    #[test]
    fn test_beyond_far_clip_is_out() {
        let view = View::look_at(Vec3::ZERO, Vec3::X, 1.0, 1.0, 0.1, 10_000.0);
        let config = MeshConfig {
            far_clip: 50.0,
            ..MeshConfig::default()
        };
        let frame = Frame::new(&view, &config);
        let basis = frame.tile_basis(0, 0, false);
        let corners = basis.box_corners((60.0, 70.0), (-1.0, 1.0), (0.0, 1.0));
        assert_eq!(frame.classify(&corners), Visibility::Out);
    }

    #[test]
    fn test_box_across_near_plane_is_partial() {
        let frame = frame_looking_down_x();
        let basis = frame.tile_basis(0, 0, false);
        let corners = basis.box_corners((0.0, 5.0), (-0.1, 0.1), (-0.1, 0.1));
        assert_eq!(frame.classify(&corners), Visibility::Partial);
    }

    /// Mirrored tiles step backwards from their origin.
    #[test]
    fn test_mirrored_basis_runs_backwards() {
        let frame = frame_looking_down_x();
        let normal = frame.tile_basis(0, 0, false).to_camera(3.0, 2.0, 1.0);
        let mirrored = frame.tile_basis(8, 8, true).to_camera(5.0, 6.0, 1.0);
        assert!((normal - mirrored).length() < 1e-4);
    }

    #[test]
    fn test_positive_z_axis_flips_depth() {
        let view = View {
            world_to_camera: Mat4::IDENTITY,
            fov_y: 1.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
            depth_axis: DepthAxis::PositiveZ,
        };
        let frame = Frame::new(&view, &MeshConfig::default());
        assert!(frame.depth(Vec3::new(0.0, 0.0, 5.0)) > 0.0);
        let corners = [Vec3::new(0.0, 0.0, 5.0)];
        assert_eq!(frame.classify(&corners), Visibility::FullyIn);
    }
}
