//! Headless camera loop: fly an ellipse over the terrain and refine the mesh
//! every frame.

use std::path::Path;

use glam::Vec3;
use ridge_config::{CameraConfig, CliArgs, Config, ConfigError};
use ridge_lod::{BinMesh, LodError, MeshStats, TerrainVertex, View};
use tracing::{info, info_span, warn};

use crate::heightfield::NoiseTerrain;

/// Camera path over a `width` x `depth` world rectangle.
pub struct FlyOver {
    camera: CameraConfig,
    centre: Vec3,
    radii: (f32, f32),
}

impl FlyOver {
    pub fn new(camera: CameraConfig, width: f32, depth: f32) -> Self {
        Self {
            camera,
            centre: Vec3::new(width * 0.5, 0.0, depth * 0.5),
            radii: (width * 0.35, depth * 0.35),
        }
    }

    fn ground_point(&self, distance: f32) -> Vec3 {
        let (rx, rz) = self.radii;
        let angle = distance / rx.max(rz).max(1.0);
        self.centre + Vec3::new(angle.cos() * rx, 0.0, angle.sin() * rz)
    }

    /// Eye and look-at target for `frame`, both held above the surface.
    pub fn pose(&self, mesh: &BinMesh, frame: u32) -> (Vec3, Vec3) {
        let travelled = frame as f32 * self.camera.speed;
        let mut eye = self.ground_point(travelled);
        let mut target = self.ground_point(travelled + self.camera.look_ahead.max(1.0));
        eye.y = mesh.height(eye.x, eye.z) + self.camera.altitude;
        target.y = mesh.height(target.x, target.z) + self.camera.altitude * 0.25;
        (eye, target)
    }

    pub fn view(&self, eye: Vec3, target: Vec3) -> View {
        View::look_at(
            eye,
            target,
            self.camera.fov_y_degrees.to_radians(),
            self.camera.aspect,
            self.camera.near,
            self.camera.far,
        )
    }
}

/// Re-reads `config.ron` between frames, keeping CLI overrides on top.
pub struct ConfigWatch<'a> {
    pub dir: &'a Path,
    pub overrides: &'a CliArgs,
}

impl ConfigWatch<'_> {
    /// The on-disk config if it differs from `current` once overrides apply.
    pub fn poll(&self, current: &Config) -> Result<Option<Config>, ConfigError> {
        let Some(mut fresh) = current.reload(self.dir)? else {
            return Ok(None);
        };
        fresh.apply_cli_overrides(self.overrides);
        Ok((fresh != *current).then_some(fresh))
    }
}

/// What a finished run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames: u32,
    pub last_visible: usize,
    pub peak_visible: usize,
    /// Size of the final vertex buffer handed to a renderer.
    pub vertex_bytes: usize,
    pub stats: MeshStats,
    /// Budget changes picked up from disk mid-run.
    pub reloads: u32,
}

/// Build the terrain and fly `config.demo.frames` frames over it.
///
/// With a `watch`, the config file is polled every report interval and new
/// triangle budgets take effect on the next frame. Other changed settings
/// wait for a restart.
pub fn run(config: &Config, watch: Option<&ConfigWatch<'_>>) -> Result<RunSummary, LodError> {
    let terrain = NoiseTerrain::new(config.terrain.clone());
    let mut mesh = BinMesh::new(&terrain, config.lod.clone())?;

    let cell = config.lod.cell_size;
    let (block_rows, block_cols) = mesh.blocks();
    let span = config.lod.tile_size as f32 * cell;
    let path = FlyOver::new(
        config.camera.clone(),
        block_rows as f32 * span,
        block_cols as f32 * span,
    );

    let mut current = config.clone();
    let mut reloads = 0;
    let mut peak_visible = 0;
    let mut last_visible = 0;
    for frame in 0..config.demo.frames {
        let _span = info_span!("frame", frame).entered();
        let (eye, target) = path.pose(&mesh, frame);

        let edit = config.demo.edit_interval;
        if edit > 0 && frame > 0 && frame % edit == 0 {
            let ground = mesh.height(eye.x, eye.z);
            mesh.set_height(eye.x, eye.z, ground - config.camera.altitude * 0.2)?;
        }

        last_visible = mesh.calculate(&path.view(eye, target))?;
        peak_visible = peak_visible.max(last_visible);

        let report = config.demo.report_interval;
        if report > 0 && (frame + 1) % report == 0 {
            let stats = mesh.stats();
            info!(
                visible = last_visible,
                active = stats.active_triangles,
                splits = stats.splits,
                merges = stats.merges,
                recomputes = stats.priority_recomputes,
                balance = stats.balance_iterations_last,
                "terrain refined"
            );
            if let Some(watch) = watch {
                apply_reload(watch, &mut current, &mut mesh, &mut reloads);
            }
        }
    }

    let mut vertices: Vec<TerrainVertex> = Vec::new();
    mesh.write_vertices(&mut vertices);
    let vertex_bytes = bytemuck::cast_slice::<TerrainVertex, u8>(&vertices).len();

    let summary = RunSummary {
        frames: config.demo.frames,
        last_visible,
        peak_visible,
        vertex_bytes,
        stats: mesh.stats(),
        reloads,
    };
    info!(
        frames = summary.frames,
        peak_visible,
        vertex_bytes,
        "fly-over finished"
    );
    Ok(summary)
}

fn apply_reload(watch: &ConfigWatch<'_>, current: &mut Config, mesh: &mut BinMesh, reloads: &mut u32) {
    let fresh = match watch.poll(current) {
        Ok(Some(fresh)) => fresh,
        Ok(None) => return,
        Err(e) => {
            warn!(%e, "config reload failed, keeping current settings");
            return;
        }
    };
    let lod = &fresh.lod;
    match mesh.set_detail_range(lod.min_detail, lod.max_detail, lod.abs_max_detail) {
        Ok(()) => *reloads += 1,
        Err(e) => warn!(%e, "reloaded detail budgets rejected"),
    }
    *current = fresh;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.terrain.rows = 65;
        config.terrain.cols = 65;
        config.terrain.amplitude = 12.0;
        config.terrain.frequency = 0.05;
        config.lod.tile_size = 16;
        config.lod.min_detail = 100;
        config.lod.max_detail = 300;
        config.lod.abs_max_detail = 2000;
        config.lod.balance_iteration_cap = 5000;
        config.camera.altitude = 10.0;
        config.demo.frames = 20;
        config.demo.report_interval = 5;
        config
    }

    #[test]
    fn test_run_counts_frames() {
        let summary = run(&small_config(), None).unwrap();
        assert_eq!(summary.frames, 20);
        assert_eq!(summary.stats.frames, 20);
        assert!(summary.peak_visible >= summary.last_visible);
        assert!(summary.stats.active_triangles <= 2000);
        assert_eq!(
            summary.vertex_bytes,
            summary.last_visible * 3 * std::mem::size_of::<TerrainVertex>()
        );
    }

    #[test]
    fn test_run_with_edits() {
        let mut config = small_config();
        config.demo.edit_interval = 4;
        let summary = run(&config, None).unwrap();
        assert_eq!(summary.stats.frames, 20);
    }

    #[test]
    fn test_camera_stays_above_ground() {
        let config = small_config();
        let terrain = NoiseTerrain::new(config.terrain.clone());
        let mesh = BinMesh::new(&terrain, config.lod.clone()).unwrap();
        let path = FlyOver::new(config.camera.clone(), 64.0, 64.0);
        for frame in [0, 7, 50, 333] {
            let (eye, target) = path.pose(&mesh, frame);
            assert!(eye.y >= mesh.height(eye.x, eye.z) + config.camera.altitude - 1e-3);
            assert!(eye.distance(target) > 0.5);
        }
    }

    /// Budgets edited on disk mid-run reach the mesh; CLI overrides still win.
    #[test]
    fn test_run_picks_up_edited_budgets() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config();
        let mut edited = config.clone();
        edited.lod.max_detail = 120;
        edited.lod.min_detail = 20;
        edited.save(dir.path()).unwrap();

        let overrides = CliArgs::default();
        let watch = ConfigWatch {
            dir: dir.path(),
            overrides: &overrides,
        };
        let summary = run(&config, Some(&watch)).unwrap();
        assert_eq!(summary.reloads, 1);
        assert_eq!(summary.stats.frames, 20);

        let pinned = CliArgs {
            max_detail: Some(config.lod.max_detail),
            min_detail: Some(config.lod.min_detail),
            ..CliArgs::default()
        };
        let watch = ConfigWatch {
            dir: dir.path(),
            overrides: &pinned,
        };
        assert!(watch.poll(&config).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_config_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = CliArgs::default();
        let watch = ConfigWatch {
            dir: dir.path(),
            overrides: &overrides,
        };
        let summary = run(&small_config(), Some(&watch)).unwrap();
        assert_eq!(summary.reloads, 0);
        assert_eq!(summary.stats.frames, 20);
    }

    #[test]
    fn test_zero_frames_is_empty_run() {
        let mut config = small_config();
        config.demo.frames = 0;
        let summary = run(&config, None).unwrap();
        assert_eq!(summary.stats.frames, 0);
        assert_eq!(summary.peak_visible, 0);
    }
}
