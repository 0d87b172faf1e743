//! ROAM continuous level-of-detail terrain: binary triangle trees refined and
//! coarsened each frame through splay-tree split and merge queues.

mod arena;
mod binmesh;
mod bintree;
mod config;
mod diamond;
mod error;
mod height_grid;
mod layout;
mod splay;
mod splay_iter;
mod stats;
mod vertex;
mod view;

pub use arena::{ArenaError, NodeArena, NodeHandle};
pub use binmesh::BinMesh;
pub use bintree::{BinTree, MAX_DELAY, NodeState, QueueSlot};
pub use config::MeshConfig;
pub use error::LodError;
pub use height_grid::{HeightGrid, HeightSource};
pub use layout::{Edge, LocalPos, TriangleLayout};
pub use splay::{QueueKey, SplayNode, SplayTree};
pub use splay_iter::SplayIter;
pub use stats::MeshStats;
pub use vertex::{TerrainVertex, VisibleTriangle};
pub use view::{DepthAxis, Frame, TileBasis, View, Visibility};
