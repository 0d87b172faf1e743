//! Headless ROAM terrain fly-over.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p ridge-demo -- --frames 300 --max-detail 8000`.

mod flyover;
mod heightfield;

use std::process::ExitCode;

use clap::Parser;
use ridge_config::{CliArgs, Config, default_config_dir};
use tracing::{error, info};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    ridge_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        rows = config.terrain.rows,
        cols = config.terrain.cols,
        tile_size = config.lod.tile_size,
        frames = config.demo.frames,
        "starting fly-over"
    );

    let watch = flyover::ConfigWatch {
        dir: &config_dir,
        overrides: &args,
    };
    match flyover::run(&config, Some(&watch)) {
        Ok(summary) => {
            info!(
                last_visible = summary.last_visible,
                splits = summary.stats.splits,
                merges = summary.stats.merges,
                reloads = summary.reloads,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Terrain mesh failed: {e}");
            ExitCode::FAILURE
        }
    }
}
