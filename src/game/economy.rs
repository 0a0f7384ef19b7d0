use crate::config::rules::GameRules;
use crate::world::{StructureType, Terrain, Tile};

/// Structure and tile counts that drive a player's economy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holdings {
    pub tiles: usize,
    /// Owned tiles that are not irradiated.
    pub healthy_tiles: usize,
    pub cities: usize,
    pub ports: usize,
    pub base_hqs: usize,
}

impl Holdings {
    pub fn tally<'a>(tiles: impl IntoIterator<Item = &'a Tile>) -> Self {
        let mut h = Holdings::default();
        for tile in tiles {
            h.tiles += 1;
            if tile.irradiated {
                continue;
            }
            h.healthy_tiles += 1;
            match tile.structure {
                Some(StructureType::City) => h.cities += 1,
                Some(StructureType::Port) => h.ports += 1,
                Some(StructureType::BaseHq) => h.base_hqs += 1,
                Some(StructureType::MissileSilo) | None => {}
            }
        }
        h
    }
}

pub fn population_cap(rules: &GameRules, h: &Holdings) -> f64 {
    h.healthy_tiles as f64 * rules.population_cap_per_tile
        + h.cities as f64 * rules.city_capacity_bonus
        + h.base_hqs as f64 * rules.base_hq_capacity_bonus
}

/// Population gained over `dt_secs`, clamped so the total never exceeds the cap.
pub fn population_growth(rules: &GameRules, h: &Holdings, population: f64, dt_secs: f64) -> f64 {
    let rate = h.healthy_tiles as f64 * rules.population_growth_per_tile
        + h.cities as f64 * rules.city_growth_bonus;
    let headroom = (population_cap(rules, h) - population).max(0.0);
    (rate * dt_secs).min(headroom)
}

/// Gold earned over `dt_secs`. Proportional to the worker share; ports raise it.
pub fn gold_growth(rules: &GameRules, h: &Holdings, workers: f64, dt_secs: f64) -> f64 {
    let multiplier = 1.0 + h.ports as f64 * rules.port_gold_bonus;
    workers.max(0.0) * rules.gold_per_worker * multiplier * dt_secs
}

/// Gold needed to claim a tile of `terrain` when already owning `owned_tiles`.
pub fn claim_gold_cost(rules: &GameRules, owned_tiles: usize, terrain: Terrain) -> f64 {
    (rules.claim_base_gold + rules.claim_gold_per_tile * owned_tiles as f64)
        * terrain.claim_cost_factor()
}

pub fn structure_cost(rules: &GameRules, structure: StructureType) -> f64 {
    match structure {
        StructureType::City => rules.city_cost,
        StructureType::Port => rules.port_cost,
        StructureType::MissileSilo => rules.missile_silo_cost,
        StructureType::BaseHq => 0.0,
    }
}
