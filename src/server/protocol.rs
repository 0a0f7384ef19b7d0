use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::{
    economy, Alliance, AllianceId, CombatResult, GameEvent, GameState, Missile, MissileId, Player,
};
use crate::world::{PlayerId, StructureType, Terrain, Tile, TileId, TileShape};

// === Inbound ===

/// Raw `{type, data}` envelope as it arrives on the socket.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpawnPlayer {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileTarget {
    pub tile_id: TileId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerRatio {
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TroopDeployment {
    pub deployment: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStructure {
    pub tile_id: TileId,
    pub structure_type: StructureType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchMissile {
    pub from_tile_id: TileId,
    pub to_tile_id: TileId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlliance {
    pub name: String,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
}

fn default_is_public() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllianceTarget {
    pub alliance_id: AllianceId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTarget {
    pub player_id: PlayerId,
}

/// Every request a client can make, validated at the decode boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SpawnPlayer(SpawnPlayer),
    SelectTile(TileTarget),
    ExpandTerritory(TileTarget),
    AdjustWorkerRatio(WorkerRatio),
    AdjustTroopDeployment(TroopDeployment),
    BuildStructure(BuildStructure),
    LaunchMissile(LaunchMissile),
    CreateAlliance(CreateAlliance),
    JoinAlliance(AllianceTarget),
    LeaveAlliance,
    KickFromAlliance(PlayerTarget),
    InviteToAlliance(PlayerTarget),
    StartConquest(TileTarget),
    CancelConquest,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SpawnPlayer(_) => "spawn_player",
            ClientMessage::SelectTile(_) => "select_tile",
            ClientMessage::ExpandTerritory(_) => "expand_territory",
            ClientMessage::AdjustWorkerRatio(_) => "adjust_worker_ratio",
            ClientMessage::AdjustTroopDeployment(_) => "adjust_troop_deployment",
            ClientMessage::BuildStructure(_) => "build_structure",
            ClientMessage::LaunchMissile(_) => "launch_missile",
            ClientMessage::CreateAlliance(_) => "create_alliance",
            ClientMessage::JoinAlliance(_) => "join_alliance",
            ClientMessage::LeaveAlliance => "leave_alliance",
            ClientMessage::KickFromAlliance(_) => "kick_from_alliance",
            ClientMessage::InviteToAlliance(_) => "invite_to_alliance",
            ClientMessage::StartConquest(_) => "start_conquest",
            ClientMessage::CancelConquest => "cancel_conquest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|e| DecodeError::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Decode one text frame into a typed client message.
pub fn decode(text: &str) -> Result<ClientMessage, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let kind = envelope.kind.as_str();
    let data = match envelope.data {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    let message = match kind {
        "spawn_player" => ClientMessage::SpawnPlayer(payload(kind, data)?),
        "select_tile" => ClientMessage::SelectTile(payload(kind, data)?),
        "expand_territory" => ClientMessage::ExpandTerritory(payload(kind, data)?),
        "adjust_worker_ratio" => ClientMessage::AdjustWorkerRatio(payload(kind, data)?),
        "adjust_troop_deployment" => ClientMessage::AdjustTroopDeployment(payload(kind, data)?),
        "build_structure" => ClientMessage::BuildStructure(payload(kind, data)?),
        "launch_missile" => ClientMessage::LaunchMissile(payload(kind, data)?),
        "create_alliance" => ClientMessage::CreateAlliance(payload(kind, data)?),
        "join_alliance" => ClientMessage::JoinAlliance(payload(kind, data)?),
        "leave_alliance" => ClientMessage::LeaveAlliance,
        "kick_from_alliance" => ClientMessage::KickFromAlliance(payload(kind, data)?),
        "invite_to_alliance" => ClientMessage::InviteToAlliance(payload(kind, data)?),
        "start_conquest" => ClientMessage::StartConquest(payload(kind, data)?),
        "cancel_conquest" => ClientMessage::CancelConquest,
        other => return Err(DecodeError::UnknownType(other.to_string())),
    };
    Ok(message)
}

// === Outbound records ===

/// Mutable per-tile fields, sent in every snapshot and event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileState {
    pub id: TileId,
    pub owner_id: Option<PlayerId>,
    pub structure: Option<StructureType>,
    pub population: f64,
    pub irradiated: bool,
}

impl TileState {
    pub fn from_tile(tile: &Tile) -> Self {
        TileState {
            id: tile.id,
            owner_id: tile.owner,
            structure: tile.structure,
            population: tile.population,
            irradiated: tile.irradiated,
        }
    }
}

/// Fixed tile geometry. Only sent in the connect-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileGeometry {
    pub shape: TileShape,
    pub terrain: Terrain,
    pub center: [f64; 3],
    pub lat: f64,
    pub lon: f64,
    pub boundary: Vec<[f64; 3]>,
    pub neighbors: Vec<TileId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileRecord {
    #[serde(flatten)]
    pub state: TileState,
    #[serde(flatten)]
    pub geometry: Option<TileGeometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub username: String,
    pub color: String,
    pub gold: f64,
    pub population: f64,
    pub workers: f64,
    pub soldiers: f64,
    pub worker_ratio: f64,
    pub troop_deployment: f64,
    pub alliance_id: Option<AllianceId>,
    pub territory: usize,
    pub conquest_target: Option<TileId>,
}

impl PlayerRecord {
    pub fn from_player(p: &Player) -> Self {
        PlayerRecord {
            id: p.id,
            username: p.username.clone(),
            color: p.color.clone(),
            gold: p.gold,
            population: p.population,
            workers: p.workers(),
            soldiers: p.soldiers(),
            worker_ratio: p.worker_ratio,
            troop_deployment: p.troop_deployment,
            alliance_id: p.alliance_id,
            territory: p.territory.len(),
            conquest_target: p.conquest_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissileRecord {
    pub id: MissileId,
    pub owner_id: PlayerId,
    pub origin_tile_id: TileId,
    pub target_tile_id: TileId,
    pub launched_at_ms: u64,
    pub impact_at_ms: u64,
    pub impacted: bool,
    pub trajectory: Vec<[f64; 3]>,
}

impl MissileRecord {
    pub fn from_missile(m: &Missile) -> Self {
        MissileRecord {
            id: m.id,
            owner_id: m.owner_id,
            origin_tile_id: m.origin_tile_id,
            target_tile_id: m.target_tile_id,
            launched_at_ms: m.launched_at_ms,
            impact_at_ms: m.impact_at_ms(),
            impacted: m.impacted_at_ms.is_some(),
            trajectory: m.trajectory.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllianceRecord {
    pub id: AllianceId,
    pub name: String,
    pub leader_id: PlayerId,
    pub members: Vec<PlayerId>,
    pub is_public: bool,
    pub invites: Vec<PlayerId>,
}

impl AllianceRecord {
    pub fn from_alliance(a: &Alliance) -> Self {
        AllianceRecord {
            id: a.id,
            name: a.name.clone(),
            leader_id: a.leader_id,
            members: a.members.clone(),
            is_public: a.is_public,
            invites: a.invites.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOption {
    pub structure: StructureType,
    pub cost: f64,
    pub affordable: bool,
}

/// Full game state. Tile geometry is included only when `with_geometry` was requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub world_id: String,
    pub elapsed_ms: u64,
    pub tile_count: usize,
    pub players: Vec<PlayerRecord>,
    pub tiles: Vec<TileRecord>,
    pub missiles: Vec<MissileRecord>,
    pub alliances: Vec<AllianceRecord>,
}

impl GameSnapshot {
    pub fn build(game: &GameState, with_geometry: bool) -> Self {
        let tiles = game
            .tiles()
            .iter()
            .map(|tile| TileRecord {
                state: TileState::from_tile(tile),
                geometry: with_geometry.then(|| TileGeometry {
                    shape: tile.shape,
                    terrain: tile.terrain,
                    center: [tile.position.x, tile.position.y, tile.position.z],
                    lat: tile.position.lat,
                    lon: tile.position.lon,
                    boundary: tile.boundary.clone(),
                    neighbors: game.adjacency().neighbors(tile.id).to_vec(),
                }),
            })
            .collect();

        GameSnapshot {
            world_id: game.world_id().to_string(),
            elapsed_ms: game.elapsed_ms(),
            tile_count: game.tiles().len(),
            players: game.players().map(PlayerRecord::from_player).collect(),
            tiles,
            missiles: game.missiles().map(MissileRecord::from_missile).collect(),
            alliances: game.alliances().map(AllianceRecord::from_alliance).collect(),
        }
    }
}

// === Outbound messages ===

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    GameState(GameSnapshot),
    PlayerSpawned {
        player_id: PlayerId,
        player: PlayerRecord,
        tiles: Vec<TileState>,
    },
    PlayerJoined {
        player: PlayerRecord,
        tiles: Vec<TileState>,
    },
    PlayerLeft {
        player_id: PlayerId,
        released_tiles: Vec<TileState>,
    },
    PlayerUpdated {
        player: PlayerRecord,
    },
    TerritoryExpanded {
        player_id: PlayerId,
        previous_owner: Option<PlayerId>,
        tile: TileState,
    },
    CombatResolved {
        attacker_id: PlayerId,
        defender_id: PlayerId,
        tile: TileState,
        result: CombatResult,
    },
    TileSelected {
        tile_id: TileId,
        options: Vec<BuildOption>,
    },
    StructureBuilt {
        player_id: PlayerId,
        tile: TileState,
    },
    MissileLaunched {
        missile: MissileRecord,
    },
    MissileImpact {
        missile_id: MissileId,
        target_tile_id: TileId,
        tiles: Vec<TileState>,
    },
    AllianceCreated {
        alliance: AllianceRecord,
    },
    AllianceJoined {
        player_id: PlayerId,
        alliance: AllianceRecord,
    },
    AllianceLeft {
        alliance_id: AllianceId,
        player_id: PlayerId,
        disbanded: bool,
    },
    AllianceUpdated {
        alliance: AllianceRecord,
    },
    AllianceMemberKicked {
        player_id: PlayerId,
        alliance: AllianceRecord,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Who receives an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Player(PlayerId),
    AllExcept(PlayerId),
}

/// Turn an engine event into outbound messages, reading the current records
/// from the game. Events whose records are gone produce nothing.
pub fn messages_for_event(event: &GameEvent, game: &GameState) -> Vec<(Audience, ServerMessage)> {
    let tile_state = |id: TileId| game.tile(id).map(TileState::from_tile);
    let tile_states = |ids: &[TileId]| ids.iter().filter_map(|&id| tile_state(id)).collect::<Vec<_>>();
    let alliance_record = |id: AllianceId| game.alliance(id).map(AllianceRecord::from_alliance);

    match event {
        GameEvent::PlayerSpawned { player_id, tiles } => {
            let Some(player) = game.player(*player_id).map(PlayerRecord::from_player) else {
                return Vec::new();
            };
            let tiles = tile_states(tiles);
            vec![
                (
                    Audience::Player(*player_id),
                    ServerMessage::PlayerSpawned {
                        player_id: *player_id,
                        player: player.clone(),
                        tiles: tiles.clone(),
                    },
                ),
                (
                    Audience::AllExcept(*player_id),
                    ServerMessage::PlayerJoined { player, tiles },
                ),
            ]
        }
        GameEvent::PlayerLeft {
            player_id,
            released_tiles,
        } => vec![(
            Audience::All,
            ServerMessage::PlayerLeft {
                player_id: *player_id,
                released_tiles: tile_states(released_tiles),
            },
        )],
        GameEvent::PlayerUpdated { player_id } => game
            .player(*player_id)
            .map(|p| {
                (
                    Audience::All,
                    ServerMessage::PlayerUpdated {
                        player: PlayerRecord::from_player(p),
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::TerritoryExpanded {
            player_id,
            tile_id,
            previous_owner,
        } => tile_state(*tile_id)
            .map(|tile| {
                (
                    Audience::All,
                    ServerMessage::TerritoryExpanded {
                        player_id: *player_id,
                        previous_owner: *previous_owner,
                        tile,
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::CombatResolved {
            attacker_id,
            defender_id,
            tile_id,
            result,
        } => tile_state(*tile_id)
            .map(|tile| {
                (
                    Audience::All,
                    ServerMessage::CombatResolved {
                        attacker_id: *attacker_id,
                        defender_id: *defender_id,
                        tile,
                        result: *result,
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::TileSelected {
            player_id,
            tile_id,
            options,
        } => {
            let gold = game.player(*player_id).map_or(0.0, |p| p.gold);
            let options = options
                .iter()
                .map(|&structure| {
                    let cost = economy::structure_cost(game.rules(), structure);
                    BuildOption {
                        structure,
                        cost,
                        affordable: gold >= cost,
                    }
                })
                .collect();
            vec![(
                Audience::Player(*player_id),
                ServerMessage::TileSelected {
                    tile_id: *tile_id,
                    options,
                },
            )]
        }
        GameEvent::StructureBuilt {
            player_id, tile_id, ..
        } => tile_state(*tile_id)
            .map(|tile| {
                (
                    Audience::All,
                    ServerMessage::StructureBuilt {
                        player_id: *player_id,
                        tile,
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::MissileLaunched { missile_id } => game
            .missile(*missile_id)
            .map(|m| {
                (
                    Audience::All,
                    ServerMessage::MissileLaunched {
                        missile: MissileRecord::from_missile(m),
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::MissileImpact {
            missile_id,
            affected_tiles,
        } => {
            let target_tile_id = game
                .missile(*missile_id)
                .map_or(affected_tiles.first().copied().unwrap_or_default(), |m| {
                    m.target_tile_id
                });
            vec![(
                Audience::All,
                ServerMessage::MissileImpact {
                    missile_id: *missile_id,
                    target_tile_id,
                    tiles: tile_states(affected_tiles),
                },
            )]
        }
        GameEvent::AllianceCreated { alliance_id } => alliance_record(*alliance_id)
            .map(|alliance| (Audience::All, ServerMessage::AllianceCreated { alliance }))
            .into_iter()
            .collect(),
        GameEvent::AllianceJoined {
            alliance_id,
            player_id,
        } => alliance_record(*alliance_id)
            .map(|alliance| {
                (
                    Audience::All,
                    ServerMessage::AllianceJoined {
                        player_id: *player_id,
                        alliance,
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::AllianceLeft {
            alliance_id,
            player_id,
            disbanded,
        } => vec![(
            Audience::All,
            ServerMessage::AllianceLeft {
                alliance_id: *alliance_id,
                player_id: *player_id,
                disbanded: *disbanded,
            },
        )],
        GameEvent::AllianceUpdated { alliance_id } => alliance_record(*alliance_id)
            .map(|alliance| (Audience::All, ServerMessage::AllianceUpdated { alliance }))
            .into_iter()
            .collect(),
        GameEvent::AllianceMemberKicked {
            alliance_id,
            player_id,
        } => alliance_record(*alliance_id)
            .map(|alliance| {
                (
                    Audience::All,
                    ServerMessage::AllianceMemberKicked {
                        player_id: *player_id,
                        alliance,
                    },
                )
            })
            .into_iter()
            .collect(),
        GameEvent::ConquestFailed { player_id, reason } => vec![(
            Audience::Player(*player_id),
            ServerMessage::error(format!("conquest stopped: {}", reason)),
        )],
    }
}
