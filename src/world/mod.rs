pub mod generation;
pub mod terrain;
pub mod tile;
pub mod topology;

use uuid::Uuid;

pub use tile::{PlayerId, Position, StructureType, Terrain, Tile, TileId, TileShape};
pub use topology::AdjacencyGraph;

/// The immutable world graph produced at startup: tiles plus their adjacency.
#[derive(Debug, Clone)]
pub struct World {
    pub id: Uuid,
    pub seed: u64,
    pub frequency: u32,
    pub tiles: Vec<Tile>,
    pub adjacency: AdjacencyGraph,
}
