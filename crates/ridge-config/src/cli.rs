//! Command-line argument parsing for the terrain demo.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Ridge terrain demo command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "ridge", about = "Headless ROAM terrain fly-over")]
pub struct CliArgs {
    /// Frames to run.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Tile edge in grid cells (power of two).
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Visible-triangle floor.
    #[arg(long)]
    pub min_detail: Option<usize>,

    /// Visible-triangle ceiling.
    #[arg(long)]
    pub max_detail: Option<usize>,

    /// Terrain noise seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(size) = args.tile_size {
            self.lod.tile_size = size;
        }
        if let Some(min) = args.min_detail {
            self.lod.min_detail = min;
        }
        if let Some(max) = args.max_detail {
            self.lod.max_detail = max;
        }
        if let Some(seed) = args.seed {
            self.terrain.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
