//! Errors raised while loading, saving or validating `config.ron`.

use ridge_lod::LodError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// The config directory or file could not be written.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// The `lod` section parsed but describes an unusable mesh.
    #[error("invalid lod settings: {0}")]
    InvalidLod(#[from] LodError),

    /// The `terrain` section asks for a grid the mesh cannot tile.
    #[error("terrain grid {rows}x{cols} is smaller than one {tile_size}-cell tile")]
    TerrainTooSmall {
        rows: usize,
        cols: usize,
        tile_size: u32,
    },
}
