//! Per-ship decision making.
//!
//! [`plan`] looks at a ship and the world and decides, from scratch every tick,
//! which behavior the ship is in and where it wants to go. It never mutates;
//! the movement phase applies the returned [`Plan`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvariantError;
use crate::pathfinding::Pathfinder;
use crate::rng::{RngManager, Stream};
use crate::visibility;
use crate::world::{
    Behavior, CorporationId, GarbageKind, PurchaseState, Ship, ShipId, ShipKind, TaskId, TileId, World,
    TILE_LENGTH,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Stay on the current tile with zero velocity.
    Hold,
    /// Tiles from the current one to the destination, both included.
    Path(Vec<TileId>),
}

impl Route {
    fn from_path(path: Option<Vec<TileId>>) -> Self {
        path.map(Route::Path).unwrap_or(Route::Hold)
    }

    pub fn into_path(self) -> Vec<TileId> {
        match self {
            Route::Hold => Vec::new(),
            Route::Path(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub behavior: Behavior,
    pub route: Route,
    /// Task given up this tick, either unreachable or preempted.
    pub released_task: Option<TaskId>,
    pub abort_transfer: bool,
    pub drop_service: bool,
    /// Garbage amount this collector claims on its target tile.
    pub commitment: Option<(TileId, u32)>,
}

impl Plan {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            route: Route::Hold,
            released_task: None,
            abort_transfer: false,
            drop_service: false,
            commitment: None,
        }
    }

    fn heading(mut self, behavior: Behavior, route: Route) -> Self {
        self.behavior = behavior;
        self.route = route;
        self
    }
}

/// Decides the behavior and route of `ship_id` for this tick.
pub fn plan(world: &World, ship_id: ShipId, rng: &RngManager) -> Result<Plan, InvariantError> {
    let ship = world.ship(ship_id)?;
    let tile = world.tile(ship.tile())?;
    let finder = Pathfinder::new(world.grid());
    let mut plan = Plan::new(ship.behavior);

    if tile.restricted {
        plan.abort_transfer = ship.is_transfer_provider() || ship.fuel_donor.is_some();
        plan.drop_service = ship.service.is_some();
        let route = Route::from_path(finder.escape_path(ship.tile()));
        return Ok(plan.heading(Behavior::Escaping, route));
    }

    if let Some(service) = ship.service {
        if world.harbor(service.harbor)?.tile == ship.tile() {
            return Ok(plan);
        }
        plan.drop_service = true;
    }

    if holds_for_fuel_transfer(world, ship) {
        let behavior = match ship.behavior {
            Behavior::Refueling => Behavior::Refueling,
            _ => Behavior::Default,
        };
        return Ok(plan.heading(behavior, Route::Hold));
    }

    if ship.behavior == Behavior::Refueling {
        plan.released_task = ship.task;
        let route = Route::from_path(finder.shortest_path(ship.tile(), &world.refuel_tiles()));
        return Ok(plan.heading(Behavior::Refueling, route));
    }

    if ship.damaged {
        plan.released_task = ship.task;
        let route = Route::from_path(finder.shortest_path(ship.tile(), &world.shipyard_tiles()));
        return Ok(plan.heading(Behavior::Repairing, route));
    }

    if let Some(task_id) = ship.task {
        let target = world.task(task_id)?.target;
        match finder.shortest_path(ship.tile(), &BTreeSet::from([target])) {
            Some(path) => return Ok(plan.heading(Behavior::Default, Route::Path(path))),
            None => plan.released_task = Some(task_id),
        }
    }

    for kind in GarbageKind::BY_PRIORITY {
        if !ship.cargo.get(&kind).is_some_and(|hold| hold.is_full()) {
            continue;
        }
        let harbors = world.unloading_tiles(ship.owner, kind);
        if let Some(path) = finder.shortest_path(ship.tile(), &harbors) {
            plan.released_task = plan.released_task.or(ship.task);
            return Ok(plan.heading(Behavior::Unloading, Route::Path(path)));
        }
    }

    match ship.kind {
        ShipKind::Scouting => Ok(scout(world, ship, &finder, rng, plan)),
        ShipKind::Coordinating => coordinate(world, ship, &finder, rng, plan),
        ShipKind::Collecting => collect(world, ship, &finder, plan),
        ShipKind::Refueling => Ok(tend(world, ship, &finder, plan)),
    }
}

/// A receiver or provider in a running transfer stays put, and so does a ship
/// low on fuel that shares its tile with an idle tanker of its own fleet.
fn holds_for_fuel_transfer(world: &World, ship: &Ship) -> bool {
    if ship.fuel_donor.is_some() || ship.is_transfer_provider() {
        return true;
    }
    ship.is_low_on_fuel()
        && world.ships_at(ship.tile()).any(|other_id| {
            other_id != ship.id
                && world.ship(other_id).is_ok_and(|other| {
                    other.owner == ship.owner
                        && !other.damaged
                        && !matches!(other.behavior, Behavior::Escaping | Behavior::Refueling)
                        && other
                            .rig
                            .as_ref()
                            .is_some_and(|rig| !rig.is_busy() && !rig.is_exhausted())
                })
        })
}

fn explore(world: &World, ship: &Ship, finder: &Pathfinder<'_>, rng: &RngManager) -> Route {
    let radius = (ship.max_velocity / TILE_LENGTH).max(1);
    let mut stream = rng.entity_rng(Stream::Exploration, u64::from(ship.id.raw()), world.tick());
    Route::Path(finder.explore(ship.tile(), radius, &mut stream))
}

fn scout(
    world: &World,
    ship: &Ship,
    finder: &Pathfinder<'_>,
    rng: &RngManager,
    plan: Plan,
) -> Plan {
    let mut sighted = visibility::garbage_in_sight(world, ship);
    sighted.remove(&ship.tile());
    if let Some(path) = finder.shortest_path(ship.tile(), &sighted) {
        return plan.heading(Behavior::Default, Route::Path(path));
    }

    let mut known: BTreeSet<TileId> = world
        .corporation(ship.owner)
        .map(|corp| corp.knowledge.garbage.values().copied().collect())
        .unwrap_or_default();
    known.remove(&ship.tile());
    if let Some(path) = finder.shortest_path(ship.tile(), &known) {
        return plan.heading(Behavior::Default, Route::Path(path));
    }

    plan.heading(Behavior::Exploring, explore(world, ship, finder, rng))
}

fn coordinate(
    world: &World,
    ship: &Ship,
    finder: &Pathfinder<'_>,
    rng: &RngManager,
    plan: Plan,
) -> Result<Plan, InvariantError> {
    let corp = world.corporation(ship.owner)?;
    if corp.purchase == (PurchaseState::Nominated { buyer: ship.id }) {
        if let Some(path) = cheapest_shipyard_path(world, finder, ship.tile(), ship.owner) {
            return Ok(plan.heading(Behavior::Default, Route::Path(path)));
        }
    }

    let mut rivals = BTreeSet::new();
    for (other_id, tile) in &corp.knowledge.ships {
        let other = world.ship(*other_id)?;
        if Some(other.owner) != corp.last_partner {
            rivals.insert(*tile);
        }
    }
    if let Some(path) = finder.shortest_path(ship.tile(), &rivals) {
        return Ok(plan.heading(Behavior::Default, Route::Path(path)));
    }

    Ok(plan.heading(Behavior::Exploring, explore(world, ship, finder, rng)))
}

/// Route to the `owner`'s shipyard with the lowest ship price; distance and
/// then harbor id break ties.
pub fn cheapest_shipyard_path(
    world: &World,
    finder: &Pathfinder<'_>,
    start: TileId,
    owner: CorporationId,
) -> Option<Vec<TileId>> {
    world
        .harbors()
        .filter(|harbor| harbor.corporations.contains(&owner))
        .filter_map(|harbor| {
            let shipyard = harbor.shipyard.as_ref()?;
            let path = finder.shortest_path(start, &BTreeSet::from([harbor.tile]))?;
            Some((shipyard.ship_cost, path.len(), harbor.id, path))
        })
        .min_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)))
        .map(|(_, _, _, path)| path)
}

fn collect(
    world: &World,
    ship: &Ship,
    finder: &Pathfinder<'_>,
    plan: Plan,
) -> Result<Plan, InvariantError> {
    let corp = world.corporation(ship.owner)?;

    let mut available: BTreeMap<TileId, u32> = BTreeMap::new();
    for (garbage_id, tile) in &corp.knowledge.garbage {
        let Some(garbage) = world.garbage_item(*garbage_id) else {
            continue;
        };
        if corp.accepts.contains(&garbage.kind) && ship.can_carry(garbage.kind) {
            *available.entry(*tile).or_insert(0) += garbage.amount;
        }
    }
    let open: BTreeSet<TileId> = available
        .iter()
        .filter(|(tile, amount)| **amount > corp.committed(**tile))
        .map(|(tile, _)| *tile)
        .collect();

    let Some(path) = finder.shortest_path(ship.tile(), &open) else {
        return Ok(plan.heading(Behavior::Default, Route::Hold));
    };
    let Some(target) = path.last().copied() else {
        return Ok(plan.heading(Behavior::Default, Route::Hold));
    };
    let uncommitted = available
        .get(&target)
        .copied()
        .unwrap_or(0)
        .saturating_sub(corp.committed(target));
    let capacity: u32 = ship
        .cargo
        .iter()
        .filter(|(kind, _)| corp.accepts.contains(kind))
        .map(|(_, hold)| hold.remaining)
        .sum();
    let mut plan = plan.heading(Behavior::Default, Route::Path(path));
    plan.commitment = Some((target, uncommitted.min(capacity)));
    Ok(plan)
}

/// Refueling-type ships look after their own fleet.
fn tend(world: &World, ship: &Ship, finder: &Pathfinder<'_>, mut plan: Plan) -> Plan {
    let exhausted = ship.rig.as_ref().map_or(true, |rig| rig.is_exhausted());
    if exhausted {
        plan.released_task = plan.released_task.or(ship.task);
        let route = Route::from_path(finder.shortest_path(ship.tile(), &world.refuel_tiles()));
        return plan.heading(Behavior::Refueling, route);
    }

    let thirsty: BTreeSet<TileId> = world
        .ships()
        .filter(|other| {
            other.id != ship.id
                && other.owner == ship.owner
                && other.is_low_on_fuel()
                && other.fuel_donor.is_none()
                && !other.is_transfer_provider()
        })
        .map(|other| other.tile())
        .collect();
    match finder.shortest_path(ship.tile(), &thirsty) {
        Some(path) => plan.heading(Behavior::Default, Route::Path(path)),
        None => plan.heading(Behavior::Default, Route::Hold),
    }
}
