use crate::game::alliance::AllianceId;
use crate::game::combat::CombatResult;
use crate::game::missile::MissileId;
use crate::world::{PlayerId, StructureType, TileId};

/// A state change produced by an action or a tick.
///
/// Events carry ids only; the server reads the current records from the
/// engine when it turns an event into an outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PlayerSpawned {
        player_id: PlayerId,
        tiles: Vec<TileId>,
    },
    PlayerLeft {
        player_id: PlayerId,
        released_tiles: Vec<TileId>,
    },
    PlayerUpdated {
        player_id: PlayerId,
    },
    TerritoryExpanded {
        player_id: PlayerId,
        tile_id: TileId,
        previous_owner: Option<PlayerId>,
    },
    /// Combat that did not transfer the tile to the attacker.
    CombatResolved {
        attacker_id: PlayerId,
        defender_id: PlayerId,
        tile_id: TileId,
        result: CombatResult,
    },
    /// Buildable options for an own tile. Only sent to the selecting player.
    TileSelected {
        player_id: PlayerId,
        tile_id: TileId,
        options: Vec<StructureType>,
    },
    StructureBuilt {
        player_id: PlayerId,
        tile_id: TileId,
        structure: StructureType,
    },
    MissileLaunched {
        missile_id: MissileId,
    },
    MissileImpact {
        missile_id: MissileId,
        affected_tiles: Vec<TileId>,
    },
    AllianceCreated {
        alliance_id: AllianceId,
    },
    AllianceJoined {
        alliance_id: AllianceId,
        player_id: PlayerId,
    },
    AllianceLeft {
        alliance_id: AllianceId,
        player_id: PlayerId,
        disbanded: bool,
    },
    AllianceUpdated {
        alliance_id: AllianceId,
    },
    AllianceMemberKicked {
        alliance_id: AllianceId,
        player_id: PlayerId,
    },
    /// A conquest step failed and the campaign was abandoned.
    ConquestFailed {
        player_id: PlayerId,
        reason: String,
    },
}
