use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{CorporationId, GarbageKind, HarborId, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Shipyard,
    Refueling,
    Unloading,
}

/// Builds ships and repairs damaged ones.
#[derive(Debug, Clone, Serialize)]
pub struct Shipyard {
    pub repair_cost: i64,
    pub ship_cost: i64,
    pub delivery_time: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefuelingStation {
    pub refuel_cost: i64,
    /// Number of refuels served before the station closes for good.
    pub refuel_limit: u32,
    pub uses: u32,
}

impl RefuelingStation {
    pub fn is_open(&self) -> bool {
        self.uses < self.refuel_limit
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnloadingStation {
    /// Credits paid per unit of garbage handed over.
    pub unload_return: i64,
    pub accepts: BTreeSet<GarbageKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Harbor {
    pub id: HarborId,
    pub tile: TileId,
    pub corporations: BTreeSet<CorporationId>,
    pub shipyard: Option<Shipyard>,
    pub refueling: Option<RefuelingStation>,
    pub unloading: Option<UnloadingStation>,
}

impl Harbor {
    /// Whether `corporation` may buy ships here.
    pub fn builds_for(&self, corporation: CorporationId) -> bool {
        self.shipyard.is_some() && self.corporations.contains(&corporation)
    }

    pub fn refuels(&self) -> bool {
        self.refueling.as_ref().is_some_and(RefuelingStation::is_open)
    }

    pub fn unloads_for(&self, corporation: CorporationId, kind: GarbageKind) -> bool {
        self.corporations.contains(&corporation)
            && self
                .unloading
                .as_ref()
                .is_some_and(|station| station.accepts.contains(&kind))
    }
}
