use std::collections::BTreeSet;

use rand::Rng;

use crate::game::alliance::AllianceId;
use crate::world::{PlayerId, TileId};

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub color: String,
    pub gold: f64,
    pub population: f64,
    /// Share of the population working for gold; the rest are soldiers.
    pub worker_ratio: f64,
    /// Share of soldiers committed to an attack or claim.
    pub troop_deployment: f64,
    pub alliance_id: Option<AllianceId>,
    pub territory: BTreeSet<TileId>,
    /// Set once the player has held any tile. From then on every claim must
    /// border their territory, even after losing all of it.
    pub has_claimed: bool,
    pub joined_at_ms: u64,
    pub last_active_ms: u64,
    pub conquest_target: Option<TileId>,
}

impl Player {
    pub fn new(id: PlayerId, username: String, color: String, now_ms: u64) -> Self {
        Player {
            id,
            username,
            color,
            gold: 0.0,
            population: 0.0,
            worker_ratio: 0.5,
            troop_deployment: 0.5,
            alliance_id: None,
            territory: BTreeSet::new(),
            has_claimed: false,
            joined_at_ms: now_ms,
            last_active_ms: now_ms,
            conquest_target: None,
        }
    }

    pub fn workers(&self) -> f64 {
        self.population * self.worker_ratio
    }

    pub fn soldiers(&self) -> f64 {
        self.population * (1.0 - self.worker_ratio)
    }

    /// Soldiers sent into an attack or a claim.
    pub fn committed_soldiers(&self) -> f64 {
        self.soldiers() * self.troop_deployment
    }

    /// Leaderboard score: gold + population + territory × 10.
    pub fn score(&self) -> f64 {
        self.gold + self.population + self.territory.len() as f64 * 10.0
    }

    /// Remove population, never going below zero.
    pub fn lose_population(&mut self, amount: f64) {
        self.population = (self.population - amount).max(0.0);
    }

    pub fn is_idle(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_active_ms) > timeout_ms
    }
}

/// A saturated colour with random hue, formatted as `#rrggbb`.
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    let hue = rng.gen_range(0.0..360.0);
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.5);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn player_with(population: f64, worker_ratio: f64) -> Player {
        let mut p = Player::new(1, "p".to_string(), "#000000".to_string(), 0);
        p.population = population;
        p.worker_ratio = worker_ratio;
        p
    }

    #[test]
    fn worker_and_soldier_shares_partition_population() {
        let p = player_with(200.0, 0.25);
        assert_eq!(p.workers(), 50.0);
        assert_eq!(p.soldiers(), 150.0);
        assert_eq!(p.workers() + p.soldiers(), p.population);
    }

    #[test]
    fn zero_worker_ratio_has_no_workers() {
        let p = player_with(80.0, 0.0);
        assert_eq!(p.workers(), 0.0);
        assert_eq!(p.soldiers(), 80.0);
    }

    #[test]
    fn committed_soldiers_follow_deployment() {
        let mut p = player_with(100.0, 0.0);
        p.troop_deployment = 0.3;
        assert!((p.committed_soldiers() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn score_weights_territory() {
        let mut p = player_with(40.0, 0.5);
        p.gold = 100.0;
        p.territory.extend([1, 2, 3]);
        assert_eq!(p.score(), 170.0);
    }

    #[test]
    fn population_never_negative() {
        let mut p = player_with(10.0, 0.5);
        p.lose_population(25.0);
        assert_eq!(p.population, 0.0);
    }

    #[test]
    fn idle_after_timeout() {
        let p = player_with(10.0, 0.5);
        assert!(!p.is_idle(1_000, 1_000));
        assert!(p.is_idle(1_001, 1_000));
    }

    #[test]
    fn colors_are_hex() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let c = random_color(&mut rng);
            assert_eq!(c.len(), 7);
            assert!(c.starts_with('#'));
            assert!(c[1..].chars().all(|ch| ch.is_ascii_hexdigit()), "{}", c);
        }
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), (255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), (0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), (0, 0, 255));
    }
}
