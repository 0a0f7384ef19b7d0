use serde::Serialize;

use crate::game::GameState;
use crate::world::PlayerId;

pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: PlayerId,
    pub username: String,
    pub score: f64,
    pub gold: f64,
    pub population: f64,
    pub territory: usize,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub world_id: String,
    pub elapsed_ms: u64,
    pub tile_count: usize,
    pub players: usize,
    pub connections: usize,
    pub alliances: usize,
    pub missiles_in_flight: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl StatusReport {
    pub fn from_game(game: &GameState, connections: usize) -> Self {
        StatusReport {
            world_id: game.world_id().to_string(),
            elapsed_ms: game.elapsed_ms(),
            tile_count: game.tiles().len(),
            players: game.player_count(),
            connections,
            alliances: game.alliances().count(),
            missiles_in_flight: game.pending_impacts(),
            leaderboard: leaderboard(game, LEADERBOARD_SIZE),
        }
    }
}

/// Highest scores first; ties go to the earlier player.
pub fn leaderboard(game: &GameState, limit: usize) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<_> = game.players().map(|p| (p.score(), p)).collect();
    ranked.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then(a.id.cmp(&b.id)));

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (score, p))| LeaderboardEntry {
            rank: i + 1,
            player_id: p.id,
            username: p.username.clone(),
            score,
            gold: p.gold,
            population: p.population,
            territory: p.territory.len(),
        })
        .collect()
}
