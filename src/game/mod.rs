pub mod alliance;
pub mod combat;
pub mod economy;
pub mod error;
pub mod event;
pub mod missile;
pub mod player;

use std::collections::{BTreeMap, BTreeSet};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::rules::GameRules;
use crate::world::{AdjacencyGraph, PlayerId, StructureType, Tile, TileId, World};

pub use alliance::{Alliance, AllianceId, Departure};
pub use combat::{resolve_combat, CombatOutcome, CombatResult};
pub use economy::Holdings;
pub use error::ActionError;
pub use event::GameEvent;
pub use missile::{Missile, MissileId};
pub use player::Player;

pub type ActionResult = Result<Vec<GameEvent>, ActionError>;

/// Authoritative game state: every player, tile, missile and alliance.
///
/// All mutation goes through the action methods and [`GameState::tick`]. Each
/// action checks every precondition before touching state, so a rejected
/// action leaves the game exactly as it was.
pub struct GameState {
    rules: GameRules,
    world_id: Uuid,
    tiles: Vec<Tile>,
    adjacency: AdjacencyGraph,
    players: BTreeMap<PlayerId, Player>,
    missiles: BTreeMap<MissileId, Missile>,
    alliances: BTreeMap<AllianceId, Alliance>,
    impacts: missile::ImpactQueue,
    rng: ChaCha8Rng,
    elapsed_ms: u64,
    next_player_id: PlayerId,
    next_missile_id: MissileId,
    next_alliance_id: AllianceId,
    last_economy_report_ms: u64,
    last_auto_expand_ms: u64,
    last_conquest_ms: u64,
}

impl GameState {
    pub fn new(world: World, rules: GameRules) -> Self {
        let seed = if rules.rng_seed == 0 {
            rand::thread_rng().r#gen()
        } else {
            rules.rng_seed
        };
        GameState {
            rules,
            world_id: world.id,
            tiles: world.tiles,
            adjacency: world.adjacency,
            players: BTreeMap::new(),
            missiles: BTreeMap::new(),
            alliances: BTreeMap::new(),
            impacts: missile::ImpactQueue::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            elapsed_ms: 0,
            next_player_id: 1,
            next_missile_id: 1,
            next_alliance_id: 1,
            last_economy_report_ms: 0,
            last_auto_expand_ms: 0,
            last_conquest_ms: 0,
        }
    }

    // === Read access ===

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn world_id(&self) -> Uuid {
        self.world_id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id as usize)
    }

    pub fn adjacency(&self) -> &AdjacencyGraph {
        &self.adjacency
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn missiles(&self) -> impl Iterator<Item = &Missile> {
        self.missiles.values()
    }

    pub fn missile(&self, id: MissileId) -> Option<&Missile> {
        self.missiles.get(&id)
    }

    pub fn alliances(&self) -> impl Iterator<Item = &Alliance> {
        self.alliances.values()
    }

    pub fn alliance(&self, id: AllianceId) -> Option<&Alliance> {
        self.alliances.get(&id)
    }

    pub fn pending_impacts(&self) -> usize {
        self.impacts.len()
    }

    /// True if any neighbor of the tile is water.
    pub fn is_water_adjacent(&self, tile_id: TileId) -> bool {
        self.adjacency
            .neighbors(tile_id)
            .iter()
            .any(|&n| self.tiles[n as usize].terrain.is_water())
    }

    /// Structures the owner could order on this tile right now, ignoring gold.
    pub fn build_options(&self, tile_id: TileId) -> Vec<StructureType> {
        let Some(tile) = self.tile(tile_id) else {
            return Vec::new();
        };
        if tile.structure.is_some() || tile.irradiated {
            return Vec::new();
        }
        StructureType::buildable()
            .iter()
            .copied()
            .filter(|&s| s != StructureType::Port || self.is_water_adjacent(tile_id))
            .collect()
    }

    pub fn are_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return false;
        }
        match (self.player(a), self.player(b)) {
            (Some(pa), Some(pb)) => pa.alliance_id.is_some() && pa.alliance_id == pb.alliance_id,
            _ => false,
        }
    }

    // === Players ===

    /// Place a new player on a random unclaimed land tile.
    pub fn spawn_player(&mut self, username: &str) -> Result<(PlayerId, Vec<GameEvent>), ActionError> {
        let name = username.trim();
        let max = self.rules.max_username_len;
        if name.is_empty() || name.chars().count() > max {
            return Err(ActionError::InvalidUsername { max });
        }
        let candidates: Vec<TileId> = self
            .tiles
            .iter()
            .filter(|t| t.is_claimable())
            .map(|t| t.id)
            .collect();
        let spawn = *candidates
            .choose(&mut self.rng)
            .ok_or(ActionError::NoSpawnAvailable)?;

        let id = self.next_player_id;
        self.next_player_id += 1;
        let color = player::random_color(&mut self.rng);
        let mut player = Player::new(id, name.to_string(), color, self.elapsed_ms);
        player.gold = self.rules.starting_gold;
        player.population = self.rules.starting_population;
        player.worker_ratio = self.rules.starting_worker_ratio;
        player.troop_deployment = self.rules.starting_troop_deployment;
        self.players.insert(id, player);

        let mut claimed = vec![spawn];
        self.set_owner(spawn, Some(id));
        if self.rules.spawn_ring {
            let ring: Vec<TileId> = self.adjacency.neighbors(spawn).to_vec();
            for n in ring {
                if self.tiles[n as usize].is_claimable() {
                    self.set_owner(n, Some(id));
                    claimed.push(n);
                }
            }
            self.tiles[spawn as usize].structure = Some(StructureType::BaseHq);
        }
        self.redistribute(id);

        info!(player_id = id, username = name, tile_id = spawn, tiles = claimed.len(), "Player spawned");
        Ok((
            id,
            vec![GameEvent::PlayerSpawned {
                player_id: id,
                tiles: claimed,
            }],
        ))
    }

    /// Remove a player, releasing all territory and alliance membership.
    pub fn remove_player(&mut self, player_id: PlayerId) -> ActionResult {
        let player = self.player_ref(player_id)?;
        let released: Vec<TileId> = player.territory.iter().copied().collect();
        let alliance_id = player.alliance_id;

        let mut events = Vec::new();
        if let Some(aid) = alliance_id {
            events.extend(self.detach_from_alliance(player_id, aid));
        }
        for alliance in self.alliances.values_mut() {
            alliance.invites.remove(&player_id);
        }
        for &t in &released {
            self.tiles[t as usize].clear();
        }
        self.players.remove(&player_id);

        info!(player_id, released = released.len(), "Player removed");
        events.insert(
            0,
            GameEvent::PlayerLeft {
                player_id,
                released_tiles: released,
            },
        );
        Ok(events)
    }

    /// Mark the player as active at the current game time.
    pub fn record_activity(&mut self, player_id: PlayerId) {
        let now = self.elapsed_ms;
        if let Some(p) = self.players.get_mut(&player_id) {
            p.last_active_ms = now;
        }
    }

    pub fn adjust_worker_ratio(&mut self, player_id: PlayerId, value: f64) -> ActionResult {
        check_unit_range("workerRatio", value)?;
        self.player_mut(player_id)?.worker_ratio = value;
        Ok(vec![GameEvent::PlayerUpdated { player_id }])
    }

    pub fn adjust_troop_deployment(&mut self, player_id: PlayerId, value: f64) -> ActionResult {
        check_unit_range("troopDeployment", value)?;
        self.player_mut(player_id)?.troop_deployment = value;
        Ok(vec![GameEvent::PlayerUpdated { player_id }])
    }

    // === Territory ===

    /// Own tile: list build options. Enemy tile: attack. Unowned tile: claim.
    pub fn select_tile(&mut self, player_id: PlayerId, tile_id: TileId) -> ActionResult {
        self.player_ref(player_id)?;
        let owner = self.tile_ref(tile_id)?.owner;
        if owner == Some(player_id) {
            return Ok(vec![GameEvent::TileSelected {
                player_id,
                tile_id,
                options: self.build_options(tile_id),
            }]);
        }
        self.acquire(player_id, tile_id)
    }

    /// Claim an unowned tile. Never attacks.
    pub fn expand_territory(&mut self, player_id: PlayerId, tile_id: TileId) -> ActionResult {
        self.player_ref(player_id)?;
        self.tile_ref(tile_id)?;
        self.claim(player_id, tile_id)
    }

    fn acquire(&mut self, player_id: PlayerId, tile_id: TileId) -> ActionResult {
        match self.tile_ref(tile_id)?.owner {
            None => self.claim(player_id, tile_id),
            Some(owner) if owner == player_id => Err(ActionError::OwnTile),
            Some(owner) => self.attack(player_id, tile_id, owner),
        }
    }

    fn claim(&mut self, player_id: PlayerId, tile_id: TileId) -> ActionResult {
        let tile = self.tile_ref(tile_id)?;
        if tile.terrain.is_water() {
            return Err(ActionError::WaterTile);
        }
        if let Some(owner) = tile.owner {
            return Err(if owner == player_id {
                ActionError::OwnTile
            } else {
                ActionError::AlreadyOwned
            });
        }
        let terrain = tile.terrain;

        let player = self.player_ref(player_id)?;
        // Only a player's very first tile may be anywhere.
        if player.has_claimed && !self.borders_territory(player_id, tile_id) {
            return Err(ActionError::NotAdjacent);
        }
        let gold = economy::claim_gold_cost(&self.rules, player.territory.len(), terrain);
        if player.gold < gold {
            return Err(ActionError::InsufficientGold {
                needed: gold,
                available: player.gold,
            });
        }
        let soldiers = self.rules.claim_soldiers;
        let available = player.committed_soldiers();
        if available < soldiers {
            return Err(ActionError::InsufficientSoldiers {
                needed: soldiers,
                available,
            });
        }

        let player = self.player_mut(player_id)?;
        player.gold -= gold;
        player.lose_population(soldiers);
        self.set_owner(tile_id, Some(player_id));
        self.tiles[tile_id as usize].population = soldiers;

        debug!(player_id, tile_id, gold, "Tile claimed");
        Ok(vec![
            GameEvent::TerritoryExpanded {
                player_id,
                tile_id,
                previous_owner: None,
            },
            GameEvent::PlayerUpdated { player_id },
        ])
    }

    fn attack(&mut self, attacker_id: PlayerId, tile_id: TileId, defender_id: PlayerId) -> ActionResult {
        if self.are_allied(attacker_id, defender_id) {
            return Err(ActionError::AlliedTile);
        }
        if !self.borders_territory(attacker_id, tile_id) {
            return Err(ActionError::NotAdjacent);
        }
        let attacking = self.player_ref(attacker_id)?.committed_soldiers();
        if attacking <= 0.0 {
            return Err(ActionError::NoTroops);
        }
        let defender_ratio = self.player_ref(defender_id)?.worker_ratio;
        let defending = self.tile_ref(tile_id)?.population * (1.0 - defender_ratio);

        let result = resolve_combat(attacking, defending);
        self.player_mut(attacker_id)?.lose_population(result.attacker_losses);
        self.player_mut(defender_id)?.lose_population(result.defender_losses);

        let mut events = Vec::new();
        match result.outcome {
            CombatOutcome::AttackerWins => {
                self.set_owner(tile_id, Some(attacker_id));
                let tile = &mut self.tiles[tile_id as usize];
                tile.population = result.tile_population;
                if tile.structure == Some(StructureType::BaseHq) {
                    tile.structure = None;
                }
                events.push(GameEvent::TerritoryExpanded {
                    player_id: attacker_id,
                    tile_id,
                    previous_owner: Some(defender_id),
                });
            }
            CombatOutcome::DefenderWins => {
                self.tiles[tile_id as usize].population = result.tile_population;
            }
            CombatOutcome::Draw => {
                self.set_owner(tile_id, None);
                self.tiles[tile_id as usize].clear();
            }
        }
        if result.outcome != CombatOutcome::AttackerWins {
            events.push(GameEvent::CombatResolved {
                attacker_id,
                defender_id,
                tile_id,
                result,
            });
        }
        events.push(GameEvent::PlayerUpdated { player_id: attacker_id });
        events.push(GameEvent::PlayerUpdated { player_id: defender_id });

        info!(
            attacker_id,
            defender_id,
            tile_id,
            attacking,
            defending,
            outcome = ?result.outcome,
            "Combat resolved"
        );
        Ok(events)
    }

    // === Structures and missiles ===

    pub fn build_structure(
        &mut self,
        player_id: PlayerId,
        tile_id: TileId,
        structure: StructureType,
    ) -> ActionResult {
        let gold = self.player_ref(player_id)?.gold;
        let tile = self.tile_ref(tile_id)?;
        if tile.owner != Some(player_id) {
            return Err(ActionError::NotOwner);
        }
        if !StructureType::buildable().contains(&structure) {
            return Err(ActionError::NotBuildable(structure));
        }
        if tile.structure.is_some() {
            return Err(ActionError::StructureExists);
        }
        if tile.irradiated {
            return Err(ActionError::Irradiated);
        }
        if structure == StructureType::Port && !self.is_water_adjacent(tile_id) {
            return Err(ActionError::PortNeedsWater);
        }
        let cost = economy::structure_cost(&self.rules, structure);
        if gold < cost {
            return Err(ActionError::InsufficientGold {
                needed: cost,
                available: gold,
            });
        }

        self.player_mut(player_id)?.gold -= cost;
        self.tiles[tile_id as usize].structure = Some(structure);

        info!(player_id, tile_id, structure = ?structure, "Structure built");
        Ok(vec![
            GameEvent::StructureBuilt {
                player_id,
                tile_id,
                structure,
            },
            GameEvent::PlayerUpdated { player_id },
        ])
    }

    /// Launch a missile from an owned silo. The impact is queued for
    /// `launch + missile_travel_ms` and applied by the tick.
    pub fn launch_missile(&mut self, player_id: PlayerId, from: TileId, to: TileId) -> ActionResult {
        let gold = self.player_ref(player_id)?.gold;
        let origin = self.tile_ref(from)?;
        let target = self.tile_ref(to)?;
        if origin.owner != Some(player_id) {
            return Err(ActionError::NotOwner);
        }
        if origin.structure != Some(StructureType::MissileSilo) {
            return Err(ActionError::NoSilo);
        }
        if origin.irradiated {
            return Err(ActionError::Irradiated);
        }
        let cost = self.rules.missile_cost;
        if gold < cost {
            return Err(ActionError::InsufficientGold {
                needed: cost,
                available: gold,
            });
        }
        let trajectory = missile::ballistic_trajectory(
            origin.position.vec(),
            target.position.vec(),
            self.rules.missile_trajectory_steps,
            self.rules.missile_arc_height,
        );

        self.player_mut(player_id)?.gold -= cost;
        let id = self.next_missile_id;
        self.next_missile_id += 1;
        let missile = Missile {
            id,
            owner_id: player_id,
            origin_tile_id: from,
            target_tile_id: to,
            launched_at_ms: self.elapsed_ms,
            travel_ms: self.rules.missile_travel_ms,
            trajectory,
            impacted_at_ms: None,
        };
        self.impacts.schedule(missile.impact_at_ms(), id);
        self.missiles.insert(id, missile);

        info!(player_id, missile_id = id, from, to, "Missile launched");
        Ok(vec![
            GameEvent::MissileLaunched { missile_id: id },
            GameEvent::PlayerUpdated { player_id },
        ])
    }

    /// Apply a missile's blast. A missile that already hit is a no-op.
    pub fn impact_missile(&mut self, missile_id: MissileId) -> ActionResult {
        let missile = self
            .missiles
            .get(&missile_id)
            .ok_or(ActionError::UnknownMissile(missile_id))?;
        if missile.impacted_at_ms.is_some() {
            return Ok(Vec::new());
        }
        let target = missile.target_tile_id;
        self.tile_ref(target)?;

        let retained = self.rules.missile_population_retained;
        let hit = self.adjacency.within_radius(target, self.rules.missile_radius);
        let mut losses: BTreeMap<PlayerId, f64> = BTreeMap::new();
        for &(tile_id, _) in &hit {
            let tile = &mut self.tiles[tile_id as usize];
            let lost = tile.population * (1.0 - retained);
            tile.population -= lost;
            tile.structure = None;
            tile.irradiated = true;
            if let Some(owner) = tile.owner {
                *losses.entry(owner).or_default() += lost;
            }
        }
        for (&owner, &lost) in &losses {
            if let Some(p) = self.players.get_mut(&owner) {
                p.lose_population(lost);
            }
        }
        let now = self.elapsed_ms;
        if let Some(m) = self.missiles.get_mut(&missile_id) {
            m.impacted_at_ms = Some(now);
        }

        info!(missile_id, tile_id = target, tiles_hit = hit.len(), "Missile impact");
        let mut events = vec![GameEvent::MissileImpact {
            missile_id,
            affected_tiles: hit.into_iter().map(|(t, _)| t).collect(),
        }];
        events.extend(losses.into_keys().map(|player_id| GameEvent::PlayerUpdated { player_id }));
        Ok(events)
    }

    // === Alliances ===

    pub fn create_alliance(&mut self, player_id: PlayerId, name: &str, is_public: bool) -> ActionResult {
        if self.player_ref(player_id)?.alliance_id.is_some() {
            return Err(ActionError::AlreadyInAlliance);
        }
        let name = name.trim();
        let max = self.rules.max_alliance_name_len;
        if name.is_empty() || name.chars().count() > max {
            return Err(ActionError::InvalidAllianceName { max });
        }

        let id = self.next_alliance_id;
        self.next_alliance_id += 1;
        self.alliances
            .insert(id, Alliance::new(id, name.to_string(), player_id, is_public));
        self.player_mut(player_id)?.alliance_id = Some(id);

        info!(player_id, alliance_id = id, name, "Alliance created");
        Ok(vec![
            GameEvent::AllianceCreated { alliance_id: id },
            GameEvent::PlayerUpdated { player_id },
        ])
    }

    pub fn join_alliance(&mut self, player_id: PlayerId, alliance_id: AllianceId) -> ActionResult {
        if self.player_ref(player_id)?.alliance_id.is_some() {
            return Err(ActionError::AlreadyInAlliance);
        }
        let alliance = self
            .alliances
            .get_mut(&alliance_id)
            .ok_or(ActionError::UnknownAlliance(alliance_id))?;
        if !alliance.can_join(player_id) {
            return Err(ActionError::PrivateAlliance);
        }
        alliance.add_member(player_id);
        self.player_mut(player_id)?.alliance_id = Some(alliance_id);

        Ok(vec![
            GameEvent::AllianceJoined {
                alliance_id,
                player_id,
            },
            GameEvent::PlayerUpdated { player_id },
        ])
    }

    pub fn leave_alliance(&mut self, player_id: PlayerId) -> ActionResult {
        let alliance_id = self
            .player_ref(player_id)?
            .alliance_id
            .ok_or(ActionError::NotInAlliance)?;
        let mut events = self.detach_from_alliance(player_id, alliance_id);
        events.push(GameEvent::PlayerUpdated { player_id });
        Ok(events)
    }

    pub fn kick_from_alliance(&mut self, leader_id: PlayerId, target_id: PlayerId) -> ActionResult {
        let alliance_id = self.led_alliance(leader_id)?;
        if target_id == leader_id {
            return Err(ActionError::CannotKickSelf);
        }
        let alliance = self
            .alliances
            .get_mut(&alliance_id)
            .ok_or(ActionError::UnknownAlliance(alliance_id))?;
        if !alliance.is_member(target_id) {
            return Err(ActionError::NotMember(target_id));
        }
        alliance.remove_member(target_id);
        if let Some(p) = self.players.get_mut(&target_id) {
            p.alliance_id = None;
        }

        info!(leader_id, target_id, alliance_id, "Alliance member kicked");
        Ok(vec![
            GameEvent::AllianceMemberKicked {
                alliance_id,
                player_id: target_id,
            },
            GameEvent::PlayerUpdated { player_id: target_id },
        ])
    }

    /// Allow a player to join the leader's alliance even while it is private.
    pub fn invite_to_alliance(&mut self, leader_id: PlayerId, target_id: PlayerId) -> ActionResult {
        let alliance_id = self.led_alliance(leader_id)?;
        if self.player_ref(target_id)?.alliance_id == Some(alliance_id) {
            return Err(ActionError::AlreadyInAlliance);
        }
        if let Some(alliance) = self.alliances.get_mut(&alliance_id) {
            alliance.invites.insert(target_id);
        }
        Ok(vec![GameEvent::AllianceUpdated { alliance_id }])
    }

    fn led_alliance(&self, leader_id: PlayerId) -> Result<AllianceId, ActionError> {
        let alliance_id = self
            .player_ref(leader_id)?
            .alliance_id
            .ok_or(ActionError::NotInAlliance)?;
        let alliance = self
            .alliances
            .get(&alliance_id)
            .ok_or(ActionError::UnknownAlliance(alliance_id))?;
        if alliance.leader_id != leader_id {
            return Err(ActionError::NotLeader);
        }
        Ok(alliance_id)
    }

    fn detach_from_alliance(&mut self, player_id: PlayerId, alliance_id: AllianceId) -> Vec<GameEvent> {
        if let Some(p) = self.players.get_mut(&player_id) {
            p.alliance_id = None;
        }
        let Some(alliance) = self.alliances.get_mut(&alliance_id) else {
            return Vec::new();
        };
        let departure = alliance.remove_member(player_id);
        let mut events = vec![GameEvent::AllianceLeft {
            alliance_id,
            player_id,
            disbanded: departure == Departure::Disbanded,
        }];
        match departure {
            Departure::Disbanded => {
                self.alliances.remove(&alliance_id);
                info!(alliance_id, "Alliance disbanded");
            }
            Departure::LeaderChanged(leader_id) => {
                info!(alliance_id, leader_id, "Alliance leader reassigned");
                events.push(GameEvent::AllianceUpdated { alliance_id });
            }
            Departure::Left => {}
        }
        events
    }

    // === Conquest ===

    pub fn start_conquest(&mut self, player_id: PlayerId, tile_id: TileId) -> ActionResult {
        self.player_ref(player_id)?;
        let tile = self.tile_ref(tile_id)?;
        if tile.terrain.is_water() {
            return Err(ActionError::WaterTile);
        }
        match tile.owner {
            Some(owner) if owner == player_id => return Err(ActionError::OwnTile),
            Some(owner) if self.are_allied(player_id, owner) => return Err(ActionError::AlliedTile),
            _ => {}
        }
        self.player_mut(player_id)?.conquest_target = Some(tile_id);
        Ok(vec![GameEvent::PlayerUpdated { player_id }])
    }

    pub fn cancel_conquest(&mut self, player_id: PlayerId) -> ActionResult {
        let player = self.player_mut(player_id)?;
        if player.conquest_target.take().is_none() {
            return Err(ActionError::NoConquest);
        }
        Ok(vec![GameEvent::PlayerUpdated { player_id }])
    }

    /// Frontier tile closest to the campaign target, or the target itself for
    /// a player who has never held a tile.
    fn next_conquest_step(&self, player_id: PlayerId, target: TileId) -> Option<TileId> {
        let player = self.player(player_id)?;
        if player.territory.is_empty() {
            return (!player.has_claimed).then_some(target);
        }
        let goal = self.tile(target)?.position;
        self.frontier(player_id)
            .into_iter()
            .filter(|&t| {
                let tile = &self.tiles[t as usize];
                !tile.terrain.is_water()
                    && tile.owner.is_none_or(|owner| !self.are_allied(player_id, owner))
            })
            .map(|t| (self.tiles[t as usize].position.angle_to(&goal), t))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, t)| t)
    }

    fn advance_conquests(&mut self) -> Vec<GameEvent> {
        let campaigns: Vec<(PlayerId, TileId)> = self
            .players
            .values()
            .filter_map(|p| p.conquest_target.map(|t| (p.id, t)))
            .collect();

        let mut events = Vec::new();
        for (player_id, target) in campaigns {
            if !self.players.contains_key(&player_id) {
                continue;
            }
            if self.tiles[target as usize].owner != Some(player_id) {
                let step = self
                    .next_conquest_step(player_id, target)
                    .ok_or(ActionError::NotAdjacent)
                    .and_then(|t| self.acquire(player_id, t));
                match step {
                    Ok(step_events) => events.extend(step_events),
                    Err(err) => {
                        debug!(player_id, target, reason = %err, "Conquest abandoned");
                        if let Some(p) = self.players.get_mut(&player_id) {
                            p.conquest_target = None;
                        }
                        events.push(GameEvent::ConquestFailed {
                            player_id,
                            reason: err.to_string(),
                        });
                        events.push(GameEvent::PlayerUpdated { player_id });
                        continue;
                    }
                }
            }
            if self.tiles[target as usize].owner == Some(player_id) {
                if let Some(p) = self.players.get_mut(&player_id) {
                    p.conquest_target = None;
                }
                info!(player_id, target, "Conquest complete");
                events.push(GameEvent::PlayerUpdated { player_id });
            }
        }
        events
    }

    // === Tick ===

    /// Advance the game clock by `dt_ms`: economy, due missile impacts,
    /// auto-expansion, conquest steps and inactivity pruning.
    pub fn tick(&mut self, dt_ms: u64) -> Vec<GameEvent> {
        self.elapsed_ms += dt_ms;
        let now = self.elapsed_ms;
        let mut events = Vec::new();

        self.update_economy(dt_ms as f64 / 1000.0);
        if now - self.last_economy_report_ms >= self.rules.economy_report_interval_ms {
            self.last_economy_report_ms = now;
            events.extend(
                self.players
                    .keys()
                    .map(|&player_id| GameEvent::PlayerUpdated { player_id }),
            );
        }

        for missile_id in self.impacts.pop_due(now) {
            match self.impact_missile(missile_id) {
                Ok(impact) => events.extend(impact),
                Err(err) => debug!(missile_id, reason = %err, "Skipped missile impact"),
            }
        }
        let grace = self.rules.missile_display_grace_ms;
        self.missiles
            .retain(|_, m| m.impacted_at_ms.is_none_or(|at| now < at + grace));

        if self.rules.auto_expand && now - self.last_auto_expand_ms >= self.rules.auto_expand_interval_ms {
            self.last_auto_expand_ms = now;
            events.extend(self.auto_expand());
        }
        if now - self.last_conquest_ms >= self.rules.conquest_interval_ms {
            self.last_conquest_ms = now;
            events.extend(self.advance_conquests());
        }

        events.extend(self.prune_inactive(now));
        events
    }

    fn update_economy(&mut self, dt_secs: f64) {
        let rules = &self.rules;
        let tiles = &mut self.tiles;
        for player in self.players.values_mut() {
            let holdings = Holdings::tally(player.territory.iter().map(|&t| &tiles[t as usize]));
            let growth = economy::population_growth(rules, &holdings, player.population, dt_secs);
            let gold = economy::gold_growth(rules, &holdings, player.workers(), dt_secs);
            player.population += growth;
            player.gold += gold;
            spread_population(player, tiles);
        }
    }

    fn auto_expand(&mut self) -> Vec<GameEvent> {
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        let mut events = Vec::new();
        for player_id in ids {
            let candidates: Vec<TileId> = self
                .frontier(player_id)
                .into_iter()
                .filter(|&t| self.tiles[t as usize].is_claimable())
                .collect();
            let Some(&tile_id) = candidates.choose(&mut self.rng) else {
                continue;
            };
            match self.claim(player_id, tile_id) {
                Ok(claimed) => events.extend(claimed),
                Err(err) => debug!(player_id, tile_id, reason = %err, "Auto-expand skipped"),
            }
        }
        events
    }

    fn prune_inactive(&mut self, now: u64) -> Vec<GameEvent> {
        let timeout = self.rules.inactivity_timeout_ms;
        let idle: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.is_idle(now, timeout))
            .map(|p| p.id)
            .collect();

        let mut events = Vec::new();
        for player_id in idle {
            info!(player_id, "Pruning inactive player");
            if let Ok(removed) = self.remove_player(player_id) {
                events.extend(removed);
            }
        }
        events
    }

    // === Internals ===

    fn player_ref(&self, id: PlayerId) -> Result<&Player, ActionError> {
        self.players.get(&id).ok_or(ActionError::UnknownPlayer(id))
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, ActionError> {
        self.players.get_mut(&id).ok_or(ActionError::UnknownPlayer(id))
    }

    fn tile_ref(&self, id: TileId) -> Result<&Tile, ActionError> {
        self.tiles.get(id as usize).ok_or(ActionError::UnknownTile(id))
    }

    fn borders_territory(&self, player_id: PlayerId, tile_id: TileId) -> bool {
        self.adjacency
            .neighbors(tile_id)
            .iter()
            .any(|&n| self.tiles[n as usize].owner == Some(player_id))
    }

    /// Tiles adjacent to the player's territory that the player does not own, sorted by id.
    fn frontier(&self, player_id: PlayerId) -> Vec<TileId> {
        let Some(player) = self.player(player_id) else {
            return Vec::new();
        };
        let mut out = BTreeSet::new();
        for &owned in &player.territory {
            for &n in self.adjacency.neighbors(owned) {
                if self.tiles[n as usize].owner != Some(player_id) {
                    out.insert(n);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Change a tile's owner, keeping both players' territory sets in step.
    fn set_owner(&mut self, tile_id: TileId, owner: Option<PlayerId>) {
        let tile = &mut self.tiles[tile_id as usize];
        if let Some(prev) = tile.owner {
            if let Some(p) = self.players.get_mut(&prev) {
                p.territory.remove(&tile_id);
            }
        }
        tile.owner = owner;
        if let Some(next) = owner {
            if let Some(p) = self.players.get_mut(&next) {
                p.territory.insert(tile_id);
                p.has_claimed = true;
            }
        }
    }

    fn redistribute(&mut self, player_id: PlayerId) {
        if let Some(player) = self.players.get(&player_id) {
            spread_population(player, &mut self.tiles);
        }
    }
}

/// Spread a player's population evenly over their tiles.
fn spread_population(player: &Player, tiles: &mut [Tile]) {
    if player.territory.is_empty() {
        return;
    }
    let share = player.population / player.territory.len() as f64;
    for &t in &player.territory {
        tiles[t as usize].population = share;
    }
}

fn check_unit_range(field: &'static str, value: f64) -> Result<(), ActionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ActionError::OutOfRange { field, value })
    }
}
