use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    trace::{TraceEvent, TraceSink},
    world::{GarbageId, Grid, OceanCurrent, ShipId, Tile, TileId, World},
};

/// Ocean currents carry garbage and ships downstream. Garbage runs first,
/// then ships.
pub struct DriftSystem;

impl DriftSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DriftSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for DriftSystem {
    fn name(&self) -> &str {
        "drift"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        for (garbage, from, to) in plan_garbage_drift(world) {
            world.move_garbage(garbage, to)?;
            trace.record(ctx.tick, TraceEvent::GarbageDrifted { garbage, from, to });
        }
        for (ship, from, to) in plan_ship_drift(world) {
            world.move_ship(ship, to)?;
            trace.record(ctx.tick, TraceEvent::ShipDrifted { ship, from, to });
        }
        Ok(())
    }
}

/// Last tile the current reaches from `start`, stopping before the first
/// tile `accepts` refuses.
fn downstream(
    grid: &Grid,
    start: TileId,
    current: OceanCurrent,
    accepts: impl Fn(&Tile) -> bool,
) -> TileId {
    let mut destination = start;
    for _ in 0..current.speed {
        let next = grid
            .neighbor_in(destination, current.direction)
            .and_then(|id| grid.tile(id))
            .filter(|next| accepts(next));
        match next {
            Some(next) => destination = next.id,
            None => break,
        }
    }
    destination
}

/// Every move is computed from the positions at the start of the step, so a
/// pile never rides two currents in one tick.
fn plan_garbage_drift(world: &World) -> Vec<(GarbageId, TileId, TileId)> {
    let grid = world.grid();
    let mut moves = Vec::new();
    for tile in grid.tiles() {
        let Some(current) = tile.current else {
            continue;
        };
        let destination = downstream(grid, tile.id, current, |next| next.kind.is_ocean());
        if destination == tile.id {
            continue;
        }
        moves.extend(
            world
                .garbage_at(tile.id)
                .take(current.intensity as usize)
                .map(|item| (item.id, tile.id, destination)),
        );
    }
    moves
}

/// Every ship on a current tile drifts, whatever the intensity. Ships stay on
/// open water and never drift into a restricted zone.
fn plan_ship_drift(world: &World) -> Vec<(ShipId, TileId, TileId)> {
    let grid = world.grid();
    let mut moves = Vec::new();
    for tile in grid.tiles() {
        let Some(current) = tile.current else {
            continue;
        };
        if !tile.kind.is_ocean() {
            continue;
        }
        let destination = downstream(grid, tile.id, current, |next| {
            next.kind.is_ocean() && !next.restricted
        });
        if destination == tile.id {
            continue;
        }
        moves.extend(
            world
                .ships_at(tile.id)
                .map(|ship| (ship, tile.id, destination)),
        );
    }
    moves
}
