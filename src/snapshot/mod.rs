//! Periodic fleet dumps for offline inspection. Written, never read back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::world::{
    Behavior, CorporationId, GarbageId, GarbageKind, ShipId, ShipKind, TileId, World,
};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, interval: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval,
        }
    }

    /// Writes `<dir>/<scenario>/tick_NNNNNN.json` when the world tick is a
    /// multiple of the interval. An interval of zero disables snapshots.
    pub fn maybe_write(
        &self,
        world: &World,
        scenario_name: &str,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        let tick = world.tick();
        if self.interval == 0 || tick % self.interval != 0 {
            return Ok(None);
        }

        let dir = self.output_dir.join(scenario_name);
        fs::create_dir_all(&dir)?;
        let file_path = dir.join(format!("tick_{tick:06}.json"));
        let json = serde_json::to_string_pretty(&FleetSnapshot::capture(world))?;
        fs::write(&file_path, json)?;
        log::debug!("wrote snapshot {}", file_path.display());
        Ok(Some(file_path))
    }
}

#[derive(Debug, Serialize)]
pub struct FleetSnapshot {
    pub tick: u64,
    pub corporations: Vec<CorporationRecord>,
    pub ships: Vec<ShipRecord>,
    pub garbage: Vec<GarbageRecord>,
    pub restricted: Vec<TileId>,
}

#[derive(Debug, Serialize)]
pub struct CorporationRecord {
    pub id: CorporationId,
    pub name: String,
    pub credits: i64,
    pub ships: usize,
    pub known_garbage: usize,
}

#[derive(Debug, Serialize)]
pub struct ShipRecord {
    pub id: ShipId,
    pub owner: CorporationId,
    pub kind: ShipKind,
    pub tile: TileId,
    pub behavior: Behavior,
    pub fuel: u32,
    pub max_fuel: u32,
    pub cargo_held: u32,
    pub damaged: bool,
}

#[derive(Debug, Serialize)]
pub struct GarbageRecord {
    pub id: GarbageId,
    pub kind: GarbageKind,
    pub amount: u32,
    pub tile: TileId,
}

impl FleetSnapshot {
    pub fn capture(world: &World) -> Self {
        Self {
            tick: world.tick(),
            corporations: world
                .corporations()
                .map(|corp| CorporationRecord {
                    id: corp.id,
                    name: corp.name.clone(),
                    credits: corp.credits(),
                    ships: corp.ships.len(),
                    known_garbage: corp.knowledge.garbage.len(),
                })
                .collect(),
            ships: world
                .ships()
                .map(|ship| ShipRecord {
                    id: ship.id,
                    owner: ship.owner,
                    kind: ship.kind,
                    tile: ship.tile(),
                    behavior: ship.behavior,
                    fuel: ship.fuel,
                    max_fuel: ship.max_fuel,
                    cargo_held: ship.cargo.values().map(|hold| hold.held()).sum(),
                    damaged: ship.damaged,
                })
                .collect(),
            garbage: world
                .garbage()
                .map(|item| GarbageRecord {
                    id: item.id,
                    kind: item.kind,
                    amount: item.amount,
                    tile: item.tile(),
                })
                .collect(),
            restricted: world
                .grid()
                .tiles()
                .filter(|tile| tile.restricted)
                .map(|tile| tile.id)
                .collect(),
        }
    }
}
