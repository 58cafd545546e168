//! Per-corporation knowledge of the ocean.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvariantError;
use crate::world::{CorporationId, GarbageId, Ship, TileId, World};

/// Tiles holding garbage that `ship` can see with its own sensors.
pub fn garbage_in_sight(world: &World, ship: &Ship) -> BTreeSet<TileId> {
    let grid = world.grid();
    world
        .garbage()
        .filter(|garbage| {
            grid.distance(ship.tile(), garbage.tile())
                .is_some_and(|distance| distance <= ship.sight())
        })
        .map(|garbage| garbage.tile())
        .collect()
}

/// Rebuilds what `corporation` knows from its ships' sensors.
///
/// Garbage stays known until it is gone from the world or a ship looks at
/// its last known tile and does not find it there. Piles carrying a tracker
/// are always known where they are. Foreign ship sightings only last for the
/// current tick.
pub fn refresh(world: &mut World, corporation: CorporationId) -> Result<(), InvariantError> {
    let grid = world.grid();
    let corp = world.corporation(corporation)?;
    let mut seen_tiles: Vec<(TileId, u32)> = Vec::with_capacity(corp.ships.len());
    for ship_id in &corp.ships {
        let ship = world.ship(*ship_id)?;
        seen_tiles.push((ship.tile(), ship.sight()));
    }
    let in_sight = |tile: TileId| {
        seen_tiles.iter().any(|(origin, range)| {
            grid.distance(*origin, tile)
                .is_some_and(|distance| distance <= *range)
        })
    };

    let mut garbage: BTreeMap<GarbageId, TileId> = BTreeMap::new();
    for (id, last_seen) in &corp.knowledge.garbage {
        let Some(actual) = world.garbage_item(*id) else {
            continue;
        };
        if in_sight(*last_seen) && !in_sight(actual.tile()) {
            continue;
        }
        garbage.insert(*id, *last_seen);
    }
    for item in world.garbage() {
        if in_sight(item.tile()) {
            garbage.insert(item.id, item.tile());
        }
    }
    let tracked: BTreeSet<GarbageId> = corp
        .tracked
        .iter()
        .copied()
        .filter(|id| world.garbage_item(*id).is_some())
        .collect();
    for id in &tracked {
        if let Some(item) = world.garbage_item(*id) {
            garbage.insert(*id, item.tile());
        }
    }

    let ships: BTreeMap<_, _> = world
        .ships()
        .filter(|ship| ship.owner != corporation && in_sight(ship.tile()))
        .map(|ship| (ship.id, ship.tile()))
        .collect();

    let corp = world.corporation_mut(corporation)?;
    corp.knowledge.garbage = garbage;
    corp.knowledge.ships = ships;
    corp.tracked = tracked;
    Ok(())
}

/// Merges the garbage knowledge of two corporations in both directions.
pub fn share(world: &mut World, a: CorporationId, b: CorporationId) -> Result<(), InvariantError> {
    let from_a = world.corporation(a)?.knowledge.garbage.clone();
    let from_b = world.corporation(b)?.knowledge.garbage.clone();
    let corp_a = world.corporation_mut(a)?;
    for (id, tile) in from_b {
        corp_a.knowledge.garbage.entry(id).or_insert(tile);
    }
    let corp_b = world.corporation_mut(b)?;
    for (id, tile) in from_a {
        corp_b.knowledge.garbage.entry(id).or_insert(tile);
    }
    Ok(())
}
