//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use ridge_lod::MeshConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration of the terrain demo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Mesh budgets and clip distances handed straight to the LOD core.
    pub lod: MeshConfig,
    /// Procedural height field.
    pub terrain: TerrainConfig,
    pub camera: CameraConfig,
    pub demo: DemoConfig,
    pub debug: DebugConfig,
}

/// Procedural height field parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Grid samples along the row (x) axis.
    pub rows: usize,
    /// Grid samples along the column (z) axis.
    pub cols: usize,
    /// Noise seed.
    pub seed: u32,
    /// Peak height in world units.
    pub amplitude: f64,
    /// Base noise frequency per grid cell.
    pub frequency: f64,
    /// Number of fBm octaves.
    pub octaves: usize,
    pub persistence: f64,
    pub lacunarity: f64,
}

/// Fly-over camera.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Height kept above the terrain surface.
    pub altitude: f32,
    /// World units travelled per frame.
    pub speed: f32,
    /// How far ahead of the eye the camera looks.
    pub look_ahead: f32,
}

/// Headless run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Frames to run before exiting.
    pub frames: u32,
    /// Log mesh counters every this many frames (0 = never).
    pub report_interval: u32,
    /// Dig a crater under the camera every this many frames (0 = never).
    pub edit_interval: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            rows: 257,
            cols: 257,
            seed: 7,
            amplitude: 60.0,
            frequency: 0.006,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.5,
            far: 2000.0,
            altitude: 25.0,
            speed: 1.5,
            look_ahead: 60.0,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            report_interval: 60,
            edit_interval: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the demo, or the working directory when the
/// platform reports none.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ridge"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject settings the mesh would refuse at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lod.validate()?;
        let tile = self.lod.tile_size as usize;
        if self.terrain.rows <= tile || self.terrain.cols <= tile {
            return Err(ConfigError::TerrainTooSmall {
                rows: self.terrain.rows,
                cols: self.terrain.cols,
                tile_size: self.lod.tile_size,
            });
        }
        Ok(())
    }
}
