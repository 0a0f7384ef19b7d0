use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    AttackerWins,
    DefenderWins,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatResult {
    pub outcome: CombatOutcome,
    pub attacker_losses: f64,
    pub defender_losses: f64,
    /// Population left on the tile, held by the winner. Zero on a draw.
    pub tile_population: f64,
}

/// Deterministic mutual-attrition combat.
///
/// The larger force wins and both sides lose the smaller force's count. An
/// exact tie wipes out both commitments and leaves the tile empty.
pub fn resolve_combat(attacker: f64, defender: f64) -> CombatResult {
    let attacker = attacker.max(0.0);
    let defender = defender.max(0.0);

    if attacker > defender {
        CombatResult {
            outcome: CombatOutcome::AttackerWins,
            attacker_losses: defender,
            defender_losses: defender,
            tile_population: attacker - defender,
        }
    } else if defender > attacker {
        CombatResult {
            outcome: CombatOutcome::DefenderWins,
            attacker_losses: attacker,
            defender_losses: attacker,
            tile_population: defender - attacker,
        }
    } else {
        CombatResult {
            outcome: CombatOutcome::Draw,
            attacker_losses: attacker,
            defender_losses: defender,
            tile_population: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stronger_attacker_takes_tile() {
        let r = resolve_combat(50.0, 30.0);
        assert_eq!(r.outcome, CombatOutcome::AttackerWins);
        assert_eq!(r.tile_population, 20.0);
        assert_eq!(r.attacker_losses, 30.0);
        assert_eq!(r.defender_losses, 30.0);
    }

    #[test]
    fn stronger_defender_holds() {
        let r = resolve_combat(30.0, 50.0);
        assert_eq!(r.outcome, CombatOutcome::DefenderWins);
        assert_eq!(r.tile_population, 20.0);
        assert_eq!(r.attacker_losses, 30.0);
        assert_eq!(r.defender_losses, 30.0);
    }

    #[test]
    fn tie_empties_tile() {
        let r = resolve_combat(40.0, 40.0);
        assert_eq!(r.outcome, CombatOutcome::Draw);
        assert_eq!(r.tile_population, 0.0);
        assert_eq!(r.attacker_losses, 40.0);
        assert_eq!(r.defender_losses, 40.0);
    }

    #[test]
    fn undefended_tile_falls_without_losses() {
        let r = resolve_combat(10.0, 0.0);
        assert_eq!(r.outcome, CombatOutcome::AttackerWins);
        assert_eq!(r.attacker_losses, 0.0);
        assert_eq!(r.tile_population, 10.0);
    }

    #[test]
    fn resolution_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(resolve_combat(12.5, 7.25), resolve_combat(12.5, 7.25));
        }
    }
}
