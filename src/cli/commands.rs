use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::game::GameState;
use crate::server::{self, GameServer, ServerState};
use crate::world::generation::{generate_world, print_world_summary};
use crate::world::World;

/// Generate the world, then run the game loop and the listener until Ctrl-C.
pub async fn run_server(config: &Config) -> Result<(), String> {
    let world = generate_world(&config.world)?;
    let game = GameState::new(world, config.rules.clone());

    let addr: SocketAddr = format!(
        "{}:{}",
        config.server.websocket_bind, config.server.websocket_port
    )
    .parse()
    .map_err(|e| format!("Invalid bind address: {}", e))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = Arc::new(
        ServerState::new(config.server.max_connections, events_tx)
            .with_handshake_timeout(Duration::from_millis(config.server.handshake_timeout_ms)),
    );
    let game_server = GameServer::new(game, config.server.clone(), Arc::clone(&state));

    let listener_state = Arc::clone(&state);
    let mut listener = tokio::spawn(async move {
        if let Err(e) = server::start_server(listener_state, addr).await {
            error!(%addr, "Server error: {}", e);
        }
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        _ = game_server.run(events_rx) => {}
        _ = &mut listener => {
            return Err(format!("Listener on {} stopped", addr));
        }
        _ = &mut shutdown => {
            info!("Shutdown requested");
        }
    }

    listener.abort();
    Ok(())
}

/// Build a world from the `[world]` table and print its terrain summary.
pub fn generate(config: &Config) -> Result<(), String> {
    let world = generate_world(&config.world)?;
    print_world_summary(&world);
    Ok(())
}

/// Print one tile of the world described by the `[world]` table.
pub fn inspect(config: &Config, tile_id: u32) -> Result<(), String> {
    if config.world.seed == 0 {
        return Err("Set world.seed to inspect a reproducible world".to_string());
    }
    let world = generate_world(&config.world)?;
    inspect_tile(&world, tile_id)
}

fn inspect_tile(world: &World, tile_id: u32) -> Result<(), String> {
    let tile = world
        .tiles
        .get(tile_id as usize)
        .ok_or_else(|| format!("Tile {} not found (world has {} tiles)", tile_id, world.tiles.len()))?;

    println!("=== Tile {} ===", tile.id);
    println!("Shape: {:?}", tile.shape);
    println!("Terrain: {:?}", tile.terrain);
    println!(
        "Position: ({:.4}, {:.4}, {:.4})  lat {:.2}°, lon {:.2}°",
        tile.position.x, tile.position.y, tile.position.z, tile.position.lat, tile.position.lon
    );
    println!("Boundary vertices: {}", tile.boundary.len());
    println!("Neighbors: {:?}", world.adjacency.neighbors(tile.id));
    println!("Claim cost factor: {:.2}", tile.terrain.claim_cost_factor());

    Ok(())
}
