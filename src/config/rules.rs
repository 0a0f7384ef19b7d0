use serde::{Deserialize, Serialize};

/// Tunable game-balance constants. All rates are per second of game time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Seed for spawn placement, colours and auto-expansion. 0 picks a random seed.
    pub rng_seed: u64,
    pub starting_gold: f64,
    pub starting_population: f64,
    pub starting_worker_ratio: f64,
    pub starting_troop_deployment: f64,
    /// Also claim the unclaimed land around the spawn tile and place a `base_hq`.
    pub spawn_ring: bool,

    pub claim_base_gold: f64,
    pub claim_gold_per_tile: f64,
    /// Soldiers sent to settle a newly claimed tile; they become its population.
    pub claim_soldiers: f64,

    pub population_growth_per_tile: f64,
    pub city_growth_bonus: f64,
    pub population_cap_per_tile: f64,
    pub city_capacity_bonus: f64,
    pub base_hq_capacity_bonus: f64,
    pub gold_per_worker: f64,
    /// Fractional increase of worker income per owned port.
    pub port_gold_bonus: f64,
    /// Cadence at which the tick reports every player's economy to clients.
    pub economy_report_interval_ms: u64,

    pub city_cost: f64,
    pub port_cost: f64,
    pub missile_silo_cost: f64,

    pub missile_cost: f64,
    pub missile_travel_ms: u64,
    pub missile_radius: u32,
    /// Fraction of population left on each tile hit by a missile.
    pub missile_population_retained: f64,
    pub missile_trajectory_steps: usize,
    /// Peak height of the ballistic arc above the sphere surface, in sphere radii.
    pub missile_arc_height: f64,
    /// How long an impacted missile stays visible before its record is removed.
    pub missile_display_grace_ms: u64,

    pub inactivity_timeout_ms: u64,
    pub auto_expand: bool,
    pub auto_expand_interval_ms: u64,
    pub conquest_interval_ms: u64,

    pub max_username_len: usize,
    pub max_alliance_name_len: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        GameRules {
            rng_seed: 0,
            starting_gold: 500.0,
            starting_population: 100.0,
            starting_worker_ratio: 0.5,
            starting_troop_deployment: 0.5,
            spawn_ring: true,
            claim_base_gold: 20.0,
            claim_gold_per_tile: 2.0,
            claim_soldiers: 5.0,
            population_growth_per_tile: 0.5,
            city_growth_bonus: 2.0,
            population_cap_per_tile: 100.0,
            city_capacity_bonus: 250.0,
            base_hq_capacity_bonus: 150.0,
            gold_per_worker: 0.05,
            port_gold_bonus: 0.1,
            economy_report_interval_ms: 1_000,
            city_cost: 300.0,
            port_cost: 200.0,
            missile_silo_cost: 500.0,
            missile_cost: 400.0,
            missile_travel_ms: 5_000,
            missile_radius: 2,
            missile_population_retained: 0.25,
            missile_trajectory_steps: 50,
            missile_arc_height: 0.25,
            missile_display_grace_ms: 2_000,
            inactivity_timeout_ms: 30 * 60 * 1000,
            auto_expand: false,
            auto_expand_interval_ms: 5_000,
            conquest_interval_ms: 1_000,
            max_username_len: 24,
            max_alliance_name_len: 32,
        }
    }
}

impl GameRules {
    pub fn collect_errors(&self, errors: &mut Vec<String>) {
        let non_negative = [
            ("starting_gold", self.starting_gold),
            ("starting_population", self.starting_population),
            ("claim_base_gold", self.claim_base_gold),
            ("claim_gold_per_tile", self.claim_gold_per_tile),
            ("claim_soldiers", self.claim_soldiers),
            ("population_growth_per_tile", self.population_growth_per_tile),
            ("city_growth_bonus", self.city_growth_bonus),
            ("population_cap_per_tile", self.population_cap_per_tile),
            ("gold_per_worker", self.gold_per_worker),
            ("city_cost", self.city_cost),
            ("port_cost", self.port_cost),
            ("missile_silo_cost", self.missile_silo_cost),
            ("missile_cost", self.missile_cost),
            ("missile_arc_height", self.missile_arc_height),
        ];
        for (name, value) in non_negative {
            if value < 0.0 || !value.is_finite() {
                errors.push(format!("rules.{} must be >= 0.0, got {}", name, value));
            }
        }

        for (name, value) in [
            ("starting_worker_ratio", self.starting_worker_ratio),
            ("starting_troop_deployment", self.starting_troop_deployment),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("rules.{} must be 0.0-1.0, got {}", name, value));
            }
        }

        if !(0.0..=1.0).contains(&self.missile_population_retained) {
            errors.push(format!(
                "rules.missile_population_retained must be 0.0-1.0, got {}. Example: missile_population_retained = 0.25",
                self.missile_population_retained
            ));
        }
        if self.missile_trajectory_steps < 2 {
            errors.push(format!(
                "rules.missile_trajectory_steps must be >= 2, got {}. Example: missile_trajectory_steps = 50",
                self.missile_trajectory_steps
            ));
        }
        if self.missile_travel_ms == 0 {
            errors.push("rules.missile_travel_ms must be > 0. Example: missile_travel_ms = 5000".to_string());
        }
        if self.auto_expand_interval_ms == 0
            || self.conquest_interval_ms == 0
            || self.economy_report_interval_ms == 0
        {
            errors.push(
                "rules.auto_expand_interval_ms, conquest_interval_ms and economy_report_interval_ms must be > 0"
                    .to_string(),
            );
        }
        if self.inactivity_timeout_ms == 0 {
            errors.push("rules.inactivity_timeout_ms must be > 0. Example: inactivity_timeout_ms = 1800000".to_string());
        }
        if self.max_username_len == 0 || self.max_alliance_name_len == 0 {
            errors.push("rules.max_username_len and rules.max_alliance_name_len must be > 0".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(rules: &GameRules) -> Vec<String> {
        let mut errors = Vec::new();
        rules.collect_errors(&mut errors);
        errors
    }

    #[test]
    fn defaults_are_valid() {
        assert!(errors_for(&GameRules::default()).is_empty());
    }

    #[test]
    fn default_inactivity_is_thirty_minutes() {
        assert_eq!(GameRules::default().inactivity_timeout_ms, 1_800_000);
    }

    #[test]
    fn negative_costs_rejected() {
        let rules = GameRules {
            city_cost: -1.0,
            missile_cost: -5.0,
            ..GameRules::default()
        };
        let errors = errors_for(&rules);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("city_cost")));
    }

    #[test]
    fn retained_fraction_range_checked() {
        let rules = GameRules {
            missile_population_retained: 1.5,
            ..GameRules::default()
        };
        assert!(errors_for(&rules)[0].contains("missile_population_retained"));
    }
}
