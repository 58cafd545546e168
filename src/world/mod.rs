mod corporation;
mod garbage;
mod grid;
mod harbor;
mod ship;
mod task;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub use corporation::{Corporation, Knowledge, PendingDelivery, PurchaseState};
pub use garbage::{Garbage, GarbageKind};
pub use grid::{Coord, Direction, Grid, OceanCurrent, Tile, TileKind};
pub use harbor::{Harbor, RefuelingStation, Shipyard, StationKind, UnloadingStation};
pub use ship::{
    BaseStats, Behavior, CargoHold, FuelTransfer, PendingService, RefuelingRig, ServiceKind, Ship,
    ShipBlueprint, ShipKind, TILE_LENGTH,
};
pub use task::{Reward, Task, TaskKind, TaskState};

use crate::error::InvariantError;

macro_rules! id_type {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }
    };
}

id_type!(TileId, "tile");
id_type!(HarborId, "harbor");
id_type!(CorporationId, "corporation");
id_type!(ShipId, "ship");
id_type!(GarbageId, "garbage");
id_type!(TaskId, "task");

/// Arena holding every simulated entity plus the tile occupancy indexes.
pub struct World {
    tick: u64,
    grid: Grid,
    pub(crate) harbors: BTreeMap<HarborId, Harbor>,
    pub(crate) corporations: BTreeMap<CorporationId, Corporation>,
    pub(crate) ships: BTreeMap<ShipId, Ship>,
    pub(crate) garbage: BTreeMap<GarbageId, Garbage>,
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    ships_by_tile: BTreeMap<TileId, BTreeSet<ShipId>>,
    garbage_by_tile: BTreeMap<TileId, BTreeSet<GarbageId>>,
    next_garbage: u32,
    /// Template for ships bought at a shipyard.
    pub(crate) purchase_blueprint: ShipBlueprint,
}

impl World {
    pub fn new(grid: Grid, purchase_blueprint: ShipBlueprint) -> Self {
        Self {
            tick: 0,
            grid,
            harbors: BTreeMap::new(),
            corporations: BTreeMap::new(),
            ships: BTreeMap::new(),
            garbage: BTreeMap::new(),
            tasks: BTreeMap::new(),
            ships_by_tile: BTreeMap::new(),
            garbage_by_tile: BTreeMap::new(),
            next_garbage: 0,
            purchase_blueprint,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_time(&mut self) {
        self.tick += 1;
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tile(&self, id: TileId) -> Result<&Tile, InvariantError> {
        self.grid.tile(id).ok_or(InvariantError::UnknownTile(id))
    }

    pub fn set_restricted(&mut self, id: TileId, restricted: bool) -> Result<(), InvariantError> {
        let tile = self
            .grid
            .tile_mut(id)
            .ok_or(InvariantError::UnknownTile(id))?;
        tile.restricted = restricted;
        Ok(())
    }

    pub fn add_harbor(&mut self, harbor: Harbor) -> Result<(), InvariantError> {
        let tile = self
            .grid
            .tile_mut(harbor.tile)
            .ok_or(InvariantError::UnknownTile(harbor.tile))?;
        tile.harbor = Some(harbor.id);
        self.harbors.insert(harbor.id, harbor);
        Ok(())
    }

    pub fn set_current(&mut self, id: TileId, current: OceanCurrent) -> Result<(), InvariantError> {
        let tile = self
            .grid
            .tile_mut(id)
            .ok_or(InvariantError::UnknownTile(id))?;
        tile.current = Some(current);
        Ok(())
    }

    pub fn add_corporation(&mut self, corporation: Corporation) {
        self.corporations.insert(corporation.id, corporation);
    }

    /// Places a ship on its tile and registers it with its owner.
    pub fn spawn_ship(&mut self, ship: Ship) -> Result<(), InvariantError> {
        self.tile(ship.tile)?;
        let corporation = self
            .corporations
            .get_mut(&ship.owner)
            .ok_or(InvariantError::UnknownCorporation(ship.owner))?;
        corporation.ships.insert(ship.id);
        self.ships_by_tile
            .entry(ship.tile)
            .or_default()
            .insert(ship.id);
        self.ships.insert(ship.id, ship);
        Ok(())
    }

    pub fn next_ship_id(&self) -> ShipId {
        self.ships
            .keys()
            .next_back()
            .map(|id| ShipId::new(id.raw() + 1))
            .unwrap_or(ShipId::new(0))
    }

    pub fn insert_garbage(&mut self, garbage: Garbage) -> Result<(), InvariantError> {
        self.tile(garbage.tile)?;
        self.next_garbage = self.next_garbage.max(garbage.id.raw() + 1);
        self.garbage_by_tile
            .entry(garbage.tile)
            .or_default()
            .insert(garbage.id);
        self.garbage.insert(garbage.id, garbage);
        Ok(())
    }

    pub fn spawn_garbage(
        &mut self,
        kind: GarbageKind,
        amount: u32,
        tile: TileId,
    ) -> Result<GarbageId, InvariantError> {
        let id = GarbageId::new(self.next_garbage);
        self.insert_garbage(Garbage::new(id, kind, amount, tile))?;
        Ok(id)
    }

    /// Burns the next garbage id without placing a pile.
    pub fn reserve_garbage_id(&mut self) -> GarbageId {
        let id = GarbageId::new(self.next_garbage);
        self.next_garbage += 1;
        id
    }

    pub fn remove_garbage(&mut self, id: GarbageId) -> Option<Garbage> {
        let garbage = self.garbage.remove(&id)?;
        if let Some(on_tile) = self.garbage_by_tile.get_mut(&garbage.tile) {
            on_tile.remove(&id);
            if on_tile.is_empty() {
                self.garbage_by_tile.remove(&garbage.tile);
            }
        }
        Some(garbage)
    }

    pub fn move_garbage(&mut self, id: GarbageId, to: TileId) -> Result<(), InvariantError> {
        self.tile(to)?;
        let garbage = self
            .garbage
            .get_mut(&id)
            .ok_or(InvariantError::UnknownGarbage(id))?;
        let from = garbage.tile;
        garbage.tile = to;
        if let Some(on_tile) = self.garbage_by_tile.get_mut(&from) {
            on_tile.remove(&id);
            if on_tile.is_empty() {
                self.garbage_by_tile.remove(&from);
            }
        }
        self.garbage_by_tile.entry(to).or_default().insert(id);
        Ok(())
    }

    /// Relocates a ship, keeping ship and tile index in step.
    pub(crate) fn move_ship(&mut self, id: ShipId, to: TileId) -> Result<(), InvariantError> {
        self.tile(to)?;
        let ship = self
            .ships
            .get_mut(&id)
            .ok_or(InvariantError::UnknownShip(id))?;
        let from = ship.tile;
        ship.tile = to;
        if let Some(on_tile) = self.ships_by_tile.get_mut(&from) {
            on_tile.remove(&id);
            if on_tile.is_empty() {
                self.ships_by_tile.remove(&from);
            }
        }
        self.ships_by_tile.entry(to).or_default().insert(id);
        Ok(())
    }

    pub fn ship(&self, id: ShipId) -> Result<&Ship, InvariantError> {
        self.ships.get(&id).ok_or(InvariantError::UnknownShip(id))
    }

    pub fn ship_mut(&mut self, id: ShipId) -> Result<&mut Ship, InvariantError> {
        self.ships.get_mut(&id).ok_or(InvariantError::UnknownShip(id))
    }

    pub fn ships(&self) -> impl Iterator<Item = &Ship> {
        self.ships.values()
    }

    pub fn ships_at(&self, tile: TileId) -> impl Iterator<Item = ShipId> + '_ {
        self.ships_by_tile
            .get(&tile)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    pub fn garbage_at(&self, tile: TileId) -> impl Iterator<Item = &Garbage> + '_ {
        self.garbage_by_tile
            .get(&tile)
            .into_iter()
            .flat_map(|ids| ids.iter().filter_map(|id| self.garbage.get(id)))
    }

    pub fn garbage(&self) -> impl Iterator<Item = &Garbage> {
        self.garbage.values()
    }

    pub fn garbage_item(&self, id: GarbageId) -> Option<&Garbage> {
        self.garbage.get(&id)
    }

    pub fn garbage_mut(&mut self, id: GarbageId) -> Result<&mut Garbage, InvariantError> {
        self.garbage
            .get_mut(&id)
            .ok_or(InvariantError::UnknownGarbage(id))
    }

    pub fn corporation(&self, id: CorporationId) -> Result<&Corporation, InvariantError> {
        self.corporations
            .get(&id)
            .ok_or(InvariantError::UnknownCorporation(id))
    }

    pub fn corporation_mut(
        &mut self,
        id: CorporationId,
    ) -> Result<&mut Corporation, InvariantError> {
        self.corporations
            .get_mut(&id)
            .ok_or(InvariantError::UnknownCorporation(id))
    }

    /// Corporation ids in processing order.
    pub fn corporation_ids(&self) -> Vec<CorporationId> {
        self.corporations.keys().copied().collect()
    }

    pub fn corporations(&self) -> impl Iterator<Item = &Corporation> {
        self.corporations.values()
    }

    pub fn harbor(&self, id: HarborId) -> Result<&Harbor, InvariantError> {
        self.harbors.get(&id).ok_or(InvariantError::UnknownHarbor(id))
    }

    pub fn harbor_mut(&mut self, id: HarborId) -> Result<&mut Harbor, InvariantError> {
        self.harbors
            .get_mut(&id)
            .ok_or(InvariantError::UnknownHarbor(id))
    }

    pub fn harbors(&self) -> impl Iterator<Item = &Harbor> {
        self.harbors.values()
    }

    pub fn harbor_at(&self, tile: TileId) -> Option<&Harbor> {
        self.grid
            .tile(tile)
            .and_then(|tile| tile.harbor)
            .and_then(|id| self.harbors.get(&id))
    }

    /// Tiles of harbors whose refueling station is still open.
    pub fn refuel_tiles(&self) -> BTreeSet<TileId> {
        self.harbors
            .values()
            .filter(|harbor| harbor.refuels())
            .map(|harbor| harbor.tile)
            .collect()
    }

    pub fn shipyard_tiles(&self) -> BTreeSet<TileId> {
        self.harbors
            .values()
            .filter(|harbor| harbor.shipyard.is_some())
            .map(|harbor| harbor.tile)
            .collect()
    }

    /// Shipyard tiles at harbors `corporation` belongs to.
    pub fn owned_shipyard_tiles(&self, corporation: CorporationId) -> BTreeSet<TileId> {
        self.harbors
            .values()
            .filter(|harbor| harbor.builds_for(corporation))
            .map(|harbor| harbor.tile)
            .collect()
    }

    /// Home harbor tiles of `corporation` that take garbage of `kind`.
    pub fn unloading_tiles(&self, corporation: CorporationId, kind: GarbageKind) -> BTreeSet<TileId> {
        self.harbors
            .values()
            .filter(|harbor| harbor.unloads_for(corporation, kind))
            .map(|harbor| harbor.tile)
            .collect()
    }

    pub fn task(&self, id: TaskId) -> Result<&Task, InvariantError> {
        self.tasks.get(&id).ok_or(InvariantError::UnknownTask(id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, InvariantError> {
        self.tasks.get_mut(&id).ok_or(InvariantError::UnknownTask(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Cancels a fuel transfer `ship` takes part in, from either side.
    /// Returns `(provider, receiver)` when one was running.
    pub fn abort_transfer(&mut self, ship: ShipId) -> Option<(ShipId, ShipId)> {
        let (provider, receiver) = {
            let current = self.ships.get(&ship)?;
            if let Some(transfer) = current.rig.as_ref().and_then(|rig| rig.transfer) {
                (ship, transfer.target)
            } else if let Some(donor) = current.fuel_donor {
                (donor, ship)
            } else {
                return None;
            }
        };
        if let Some(rig) = self
            .ships
            .get_mut(&provider)
            .and_then(|ship| ship.rig.as_mut())
        {
            rig.transfer = None;
        }
        if let Some(target) = self.ships.get_mut(&receiver) {
            target.fuel_donor = None;
        }
        Some((provider, receiver))
    }

    /// Verifies the structural invariants that every phase must preserve.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        for ship in self.ships.values() {
            let indexed = self
                .ships_by_tile
                .get(&ship.tile)
                .is_some_and(|ids| ids.contains(&ship.id));
            if !indexed {
                return Err(InvariantError::IndexMismatch {
                    ship: ship.id,
                    tile: ship.tile,
                });
            }
            if ship.fuel > ship.max_fuel {
                return Err(InvariantError::FuelOutOfRange {
                    ship: ship.id,
                    fuel: ship.fuel,
                    max: ship.max_fuel,
                });
            }
            for (kind, hold) in &ship.cargo {
                if hold.remaining > hold.max {
                    return Err(InvariantError::CargoOutOfRange {
                        ship: ship.id,
                        kind: *kind,
                    });
                }
            }
            if ship.is_transfer_provider() && ship.fuel_donor.is_some() {
                return Err(InvariantError::DualTransferRole(ship.id));
            }
        }
        let indexed_ships: usize = self.ships_by_tile.values().map(BTreeSet::len).sum();
        if indexed_ships != self.ships.len() {
            return Err(InvariantError::IndexSize {
                indexed: indexed_ships,
                ships: self.ships.len(),
            });
        }
        for corporation in self.corporations.values() {
            if corporation.credits < 0 {
                return Err(InvariantError::NegativeCredits {
                    corporation: corporation.id,
                    credits: corporation.credits,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint() -> ShipBlueprint {
        ShipBlueprint {
            kind: ShipKind::Scouting,
            max_velocity: 20,
            acceleration: 10,
            max_fuel: 500,
            fuel_consumption: 5,
            visibility: 2,
            cargo: BTreeMap::new(),
            refueling_capacity: 0,
            refueling_time: 2,
        }
    }

    fn small_world() -> World {
        let tiles = (0..4)
            .map(|x| Tile::new(TileId::new(x as u32), TileKind::DeepOcean, Coord::new(x, 0)))
            .collect();
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint());
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", 0));
        world
    }

    #[test]
    fn moving_a_ship_updates_both_sides_of_the_index() {
        let mut world = small_world();
        let ship = Ship::from_blueprint(
            ShipId::new(0),
            CorporationId::new(0),
            TileId::new(0),
            &blueprint(),
        );
        world.spawn_ship(ship).unwrap();
        world.move_ship(ShipId::new(0), TileId::new(3)).unwrap();
        assert_eq!(world.ship(ShipId::new(0)).unwrap().tile(), TileId::new(3));
        assert_eq!(world.ships_at(TileId::new(0)).count(), 0);
        assert_eq!(
            world.ships_at(TileId::new(3)).collect::<Vec<_>>(),
            vec![ShipId::new(0)]
        );
        world.check_invariants().unwrap();
    }

    #[test]
    fn spawned_garbage_gets_fresh_ids() {
        let mut world = small_world();
        world
            .insert_garbage(Garbage::new(
                GarbageId::new(7),
                GarbageKind::Oil,
                10,
                TileId::new(1),
            ))
            .unwrap();
        let id = world
            .spawn_garbage(GarbageKind::Oil, 5, TileId::new(1))
            .unwrap();
        assert_eq!(id, GarbageId::new(8));
        assert_eq!(world.garbage_at(TileId::new(1)).count(), 2);
        world.remove_garbage(id);
        assert_eq!(world.garbage_at(TileId::new(1)).count(), 1);
    }

    #[test]
    fn next_ship_id_follows_highest() {
        let mut world = small_world();
        assert_eq!(world.next_ship_id(), ShipId::new(0));
        let ship = Ship::from_blueprint(
            ShipId::new(4),
            CorporationId::new(0),
            TileId::new(0),
            &blueprint(),
        );
        world.spawn_ship(ship).unwrap();
        assert_eq!(world.next_ship_id(), ShipId::new(5));
    }
}
