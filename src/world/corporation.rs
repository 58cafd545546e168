use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{CorporationId, GarbageId, GarbageKind, HarborId, ShipId, TileId};

/// What a corporation currently knows about the ocean.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Knowledge {
    /// Garbage piles and the tile they were last seen on.
    pub garbage: BTreeMap<GarbageId, TileId>,
    /// Foreign ships in sight this tick.
    pub ships: BTreeMap<ShipId, TileId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PurchaseState {
    #[default]
    Idle,
    Nominated {
        buyer: ShipId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingDelivery {
    pub harbor: HarborId,
    pub tile: TileId,
    pub countdown: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Corporation {
    pub id: CorporationId,
    pub name: String,
    pub home_harbors: BTreeSet<HarborId>,
    pub accepts: BTreeSet<GarbageKind>,
    pub(crate) credits: i64,
    pub ships: BTreeSet<ShipId>,
    /// Garbage amount already claimed by collectors this tick, per tile.
    pub assignments: BTreeMap<TileId, u32>,
    pub knowledge: Knowledge,
    /// Garbage tagged by a tracker; always known at its current tile.
    pub tracked: BTreeSet<GarbageId>,
    pub last_partner: Option<CorporationId>,
    pub purchase: PurchaseState,
    pub deliveries: Vec<PendingDelivery>,
    pub collected: BTreeMap<GarbageKind, u64>,
}

impl Corporation {
    pub fn new(id: CorporationId, name: impl Into<String>, credits: i64) -> Self {
        Self {
            id,
            name: name.into(),
            home_harbors: BTreeSet::new(),
            accepts: BTreeSet::new(),
            credits,
            ships: BTreeSet::new(),
            assignments: BTreeMap::new(),
            knowledge: Knowledge::default(),
            tracked: BTreeSet::new(),
            last_partner: None,
            purchase: PurchaseState::Idle,
            deliveries: Vec::new(),
            collected: BTreeMap::new(),
        }
    }

    pub fn credits(&self) -> i64 {
        self.credits
    }

    pub fn can_afford(&self, cost: i64) -> bool {
        cost >= 0 && self.credits >= cost
    }

    /// Deducts `cost` if the balance covers it. Returns whether it was paid.
    pub fn charge(&mut self, cost: i64) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.credits -= cost;
        true
    }

    pub fn earn(&mut self, amount: i64) {
        self.credits += amount.max(0);
    }

    pub fn ship_ids(&self) -> Vec<ShipId> {
        self.ships.iter().copied().collect()
    }

    pub fn committed(&self, tile: TileId) -> u32 {
        self.assignments.get(&tile).copied().unwrap_or(0)
    }

    pub fn commit(&mut self, tile: TileId, amount: u32) {
        *self.assignments.entry(tile).or_insert(0) += amount;
    }

    pub fn total_collected(&self) -> u64 {
        self.collected.values().sum()
    }
}
