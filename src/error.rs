use std::path::PathBuf;

use thiserror::Error;

use crate::world::{
    CorporationId, GarbageId, GarbageKind, HarborId, ShipId, StationKind, TaskId, TileId,
};

/// Broken engine contract. Never recovered from; the run stops.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("unknown {0}")]
    UnknownTile(TileId),
    #[error("unknown {0}")]
    UnknownHarbor(HarborId),
    #[error("unknown {0}")]
    UnknownCorporation(CorporationId),
    #[error("unknown {0}")]
    UnknownShip(ShipId),
    #[error("unknown {0}")]
    UnknownGarbage(GarbageId),
    #[error("unknown {0}")]
    UnknownTask(TaskId),
    #[error("{0} defined more than once")]
    DuplicateTile(TileId),
    #[error("two tiles share coordinate ({x}, {y})")]
    DuplicateCoord { x: i32, y: i32 },
    #[error("{harbor} has no {station:?} station")]
    MissingStation {
        harbor: HarborId,
        station: StationKind,
    },
    #[error("{ship} is not indexed on {tile}")]
    IndexMismatch { ship: ShipId, tile: TileId },
    #[error("tile index holds {indexed} ships but the fleet has {ships}")]
    IndexSize { indexed: usize, ships: usize },
    #[error("{ship} fuel {fuel} outside 0..={max}")]
    FuelOutOfRange { ship: ShipId, fuel: u32, max: u32 },
    #[error("{ship} {kind} hold over capacity")]
    CargoOutOfRange { ship: ShipId, kind: GarbageKind },
    #[error("{corporation} has negative balance {credits}")]
    NegativeCredits {
        corporation: CorporationId,
        credits: i64,
    },
    #[error("{0} is both giving and receiving fuel")]
    DualTransferRole(ShipId),
}

/// Problems found while reading or checking a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML scenario")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON scenario")]
    Json(#[from] serde_json::Error),
    #[error("scenario validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
