use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::config::generation::WorldParams;
use crate::world::terrain::TerrainClassifier;
use crate::world::tile::{Position, Terrain};
use crate::world::topology::generate_geodesic_grid;
use crate::world::World;

/// Build the world graph and classify terrain.
///
/// If `params.seed` is 0, a random seed is chosen. The resolved seed is kept
/// on the returned World for reproducibility.
pub fn generate_world(params: &WorldParams) -> Result<World, String> {
    let seed = if params.seed == 0 {
        rand::thread_rng().r#gen()
    } else {
        params.seed
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let (mut tiles, adjacency) =
        generate_geodesic_grid(params.frequency, params.mesh, params.adjacency)?;

    let positions: Vec<Position> = tiles.iter().map(|t| t.position).collect();
    let classifier = TerrainClassifier::calibrated(noise_seed(seed), params, &positions);
    tiles
        .par_iter_mut()
        .for_each(|tile| tile.terrain = classifier.classify(&tile.position));

    let world = World {
        id: Uuid::from_bytes(rng.r#gen()),
        seed,
        frequency: params.frequency,
        tiles,
        adjacency,
    };

    let counts = terrain_counts(&world);
    info!(
        seed,
        frequency = world.frequency,
        tiles = world.tiles.len(),
        avg_degree = world.adjacency.average_degree(),
        water = counts.get(&Terrain::Water).copied().unwrap_or(0),
        "World generated"
    );
    Ok(world)
}

/// Fold a 64-bit world seed into the 32-bit noise seed so the high half still matters.
fn noise_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

/// Number of tiles of each terrain.
pub fn terrain_counts(world: &World) -> BTreeMap<Terrain, usize> {
    let mut counts = BTreeMap::new();
    for tile in &world.tiles {
        *counts.entry(tile.terrain).or_insert(0) += 1;
    }
    counts
}

/// Print a summary of the generated world.
pub fn print_world_summary(world: &World) {
    println!("=== World Summary ===");
    println!("ID: {}", world.id);
    println!("Seed: {}", world.seed);
    println!("Frequency: {}", world.frequency);
    println!("Tiles: {}", world.tiles.len());
    println!("Average neighbors: {:.3}", world.adjacency.average_degree());

    println!("\nTerrain:");
    for (terrain, count) in terrain_counts(world) {
        let pct = count as f32 / world.tiles.len() as f32 * 100.0;
        println!("  {:<12} {:>6} ({:.1}%)", format!("{:?}", terrain), count, pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::topology::{geodesic_tile_count, AdjacencyStrategy, MeshSource};

    fn default_params() -> WorldParams {
        WorldParams {
            frequency: 8,
            seed: 42,
            ..WorldParams::default()
        }
    }

    #[test]
    fn generate_world_tile_count() {
        let world = generate_world(&default_params()).unwrap();
        assert_eq!(world.tiles.len(), geodesic_tile_count(8) as usize);
        assert_eq!(world.adjacency.len(), world.tiles.len());
    }

    #[test]
    fn generate_world_ocean_ratio() {
        let world = generate_world(&default_params()).unwrap();
        let water = terrain_counts(&world)
            .get(&Terrain::Water)
            .copied()
            .unwrap_or(0);
        let pct = water as f32 / world.tiles.len() as f32;
        assert!(
            (0.6..0.75).contains(&pct),
            "Expected ~67% water, got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let w1 = generate_world(&default_params()).unwrap();
        let w2 = generate_world(&default_params()).unwrap();
        assert_eq!(w1.id, w2.id);
        assert_eq!(w1.tiles, w2.tiles);
        assert_eq!(w1.adjacency, w2.adjacency);
    }

    #[test]
    fn seed_zero_generates_random() {
        let params = WorldParams {
            seed: 0,
            ..default_params()
        };
        let world = generate_world(&params).unwrap();
        assert_ne!(world.seed, 0);
    }

    #[test]
    fn distance_adjacency_world_passes_sanity() {
        let params = WorldParams {
            adjacency: AdjacencyStrategy::Distance,
            mesh: MeshSource::Hexasphere,
            ..default_params()
        };
        let world = generate_world(&params).unwrap();
        let avg = world.adjacency.average_degree();
        assert!((5.0..=7.0).contains(&avg));
    }

    #[test]
    fn high_seed_bits_change_terrain() {
        assert_ne!(noise_seed(1), noise_seed(1 | (1 << 40)));

        let low = generate_world(&WorldParams {
            seed: 1,
            ..default_params()
        })
        .unwrap();
        let high = generate_world(&WorldParams {
            seed: 1 | (1 << 40),
            ..default_params()
        })
        .unwrap();
        let differ = low
            .tiles
            .iter()
            .zip(&high.tiles)
            .any(|(a, b)| a.terrain != b.terrain);
        assert!(differ);
    }

    #[test]
    fn fresh_tiles_are_unowned() {
        let world = generate_world(&default_params()).unwrap();
        assert!(world.tiles.iter().all(|t| t.owner.is_none()
            && t.structure.is_none()
            && t.population == 0.0
            && !t.irradiated));
    }
}
