use thiserror::Error;

use crate::game::alliance::AllianceId;
use crate::game::missile::MissileId;
use crate::world::{PlayerId, StructureType, TileId};

/// Why an action was rejected. The `Display` text is relayed to the client as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("player {0} not found")]
    UnknownPlayer(PlayerId),
    #[error("tile {0} not found")]
    UnknownTile(TileId),
    #[error("alliance {0} not found")]
    UnknownAlliance(AllianceId),
    #[error("missile {0} not found")]
    UnknownMissile(MissileId),
    #[error("{field} must be between 0 and 1, got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("username must be 1-{max} characters")]
    InvalidUsername { max: usize },
    #[error("alliance name must be 1-{max} characters")]
    InvalidAllianceName { max: usize },
    #[error("no unclaimed land left to spawn on")]
    NoSpawnAvailable,
    #[error("water tiles cannot be claimed")]
    WaterTile,
    #[error("tile is already owned")]
    AlreadyOwned,
    #[error("you already own this tile")]
    OwnTile,
    #[error("tile is not adjacent to your territory")]
    NotAdjacent,
    #[error("not enough gold: need {needed:.0}, have {available:.0}")]
    InsufficientGold { needed: f64, available: f64 },
    #[error("not enough soldiers: need {needed:.0}, have {available:.0}")]
    InsufficientSoldiers { needed: f64, available: f64 },
    #[error("you do not own this tile")]
    NotOwner,
    #[error("tile already has a structure")]
    StructureExists,
    #[error("{0:?} cannot be built by players")]
    NotBuildable(StructureType),
    #[error("ports must be built next to water")]
    PortNeedsWater,
    #[error("tile is irradiated")]
    Irradiated,
    #[error("missiles can only be launched from a missile silo")]
    NoSilo,
    #[error("cannot attack an ally")]
    AlliedTile,
    #[error("no soldiers deployed")]
    NoTroops,
    #[error("already in an alliance")]
    AlreadyInAlliance,
    #[error("not in an alliance")]
    NotInAlliance,
    #[error("alliance is private")]
    PrivateAlliance,
    #[error("only the alliance leader can do that")]
    NotLeader,
    #[error("player {0} is not a member of your alliance")]
    NotMember(PlayerId),
    #[error("the leader cannot kick themselves")]
    CannotKickSelf,
    #[error("no conquest in progress")]
    NoConquest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_human_readable() {
        let err = ActionError::InsufficientGold {
            needed: 300.0,
            available: 12.4,
        };
        assert_eq!(err.to_string(), "not enough gold: need 300, have 12");
        assert_eq!(
            ActionError::OutOfRange {
                field: "workerRatio",
                value: 1.5
            }
            .to_string(),
            "workerRatio must be between 0 and 1, got 1.5"
        );
        assert_eq!(ActionError::UnknownTile(9).to_string(), "tile 9 not found");
    }
}
