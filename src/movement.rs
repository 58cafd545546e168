//! Turns a planned route into an actual tile transition.

use crate::error::InvariantError;
use crate::pathfinding::Pathfinder;
use crate::trace::{TraceEvent, TraceSink};
use crate::world::{Behavior, ShipId, TaskState, TileId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOutcome {
    /// Tiles travelled this tick.
    pub distance: u32,
    /// The ship stands on the last tile of the route it ended up following.
    pub arrived: bool,
    /// The fuel check replaced the planned route with one to a refueling harbor.
    pub redirected: bool,
}

/// Moves `ship_id` along `path` as far as velocity and fuel allow.
///
/// Before committing, the executor checks that the ship could still reach an
/// open refueling harbor from the tile it would stop on. If it could not, and
/// the ship is neither already heading to refuel nor escaping, it switches to
/// `Refueling` and follows the route to the nearest harbor instead.
pub fn execute(
    world: &mut World,
    ship_id: ShipId,
    path: &[TileId],
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<MoveOutcome, InvariantError> {
    if path.len() <= 1 {
        world.ship_mut(ship_id)?.velocity = 0;
        return Ok(MoveOutcome {
            arrived: path.len() == 1,
            ..MoveOutcome::default()
        });
    }

    world.ship_mut(ship_id)?.accelerate();
    let steps = reach(world, ship_id, path)?;
    if steps == 0 {
        return Ok(MoveOutcome::default());
    }

    if needs_refuel_redirect(world, ship_id, path[steps as usize], steps)? {
        return redirect_to_refuel(world, ship_id, tick, trace);
    }

    commit(world, ship_id, path, steps, tick, trace)
}

/// Tiles the ship can cover along `path` this tick.
fn reach(world: &World, ship_id: ShipId, path: &[TileId]) -> Result<u32, InvariantError> {
    let ship = world.ship(ship_id)?;
    let along = path.len().saturating_sub(1) as u32;
    Ok(ship.velocity_range().min(ship.fuel_range()).min(along))
}

fn needs_refuel_redirect(
    world: &World,
    ship_id: ShipId,
    stop: TileId,
    steps: u32,
) -> Result<bool, InvariantError> {
    let ship = world.ship(ship_id)?;
    if matches!(ship.behavior, Behavior::Refueling | Behavior::Escaping) {
        return Ok(false);
    }
    if ship.fuel_consumption == 0 {
        return Ok(false);
    }
    let harbors = world.refuel_tiles();
    if harbors.is_empty() {
        return Ok(false);
    }
    let spent = steps.saturating_mul(ship.fuel_consumption);
    let left = ship.fuel.saturating_sub(spent) / ship.fuel_consumption;
    let finder = Pathfinder::new(world.grid());
    Ok(!finder.is_reachable_within_distance(stop, &harbors, left))
}

fn redirect_to_refuel(
    world: &mut World,
    ship_id: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<MoveOutcome, InvariantError> {
    let (tile, previous, task) = {
        let ship = world.ship(ship_id)?;
        (ship.tile(), ship.behavior, ship.task)
    };
    log::debug!("{ship_id} cannot return to a harbor from its next stop, turning back");
    trace.record(tick, TraceEvent::RefuelRedirect { ship: ship_id, tile });

    {
        let ship = world.ship_mut(ship_id)?;
        ship.behavior = Behavior::Refueling;
        ship.task = None;
    }
    trace.record(
        tick,
        TraceEvent::BehaviorChanged {
            ship: ship_id,
            from: previous,
            to: Behavior::Refueling,
        },
    );
    if let Some(task_id) = task {
        world.task_mut(task_id)?.state = TaskState::Failed;
        trace.record(
            tick,
            TraceEvent::TaskFailed {
                task: task_id,
                ship: ship_id,
            },
        );
    }

    let refuel_path = Pathfinder::new(world.grid()).shortest_path(tile, &world.refuel_tiles());
    let Some(refuel_path) = refuel_path else {
        world.ship_mut(ship_id)?.velocity = 0;
        return Ok(MoveOutcome {
            redirected: true,
            ..MoveOutcome::default()
        });
    };
    if refuel_path.len() == 1 {
        world.ship_mut(ship_id)?.velocity = 0;
        return Ok(MoveOutcome {
            arrived: true,
            redirected: true,
            ..MoveOutcome::default()
        });
    }
    let steps = reach(world, ship_id, &refuel_path)?;
    let mut outcome = if steps == 0 {
        MoveOutcome::default()
    } else {
        commit(world, ship_id, &refuel_path, steps, tick, trace)?
    };
    outcome.redirected = true;
    Ok(outcome)
}

fn commit(
    world: &mut World,
    ship_id: ShipId,
    path: &[TileId],
    steps: u32,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<MoveOutcome, InvariantError> {
    let from = path[0];
    let to = path[steps as usize];
    let arrived = steps as usize == path.len() - 1;

    world.move_ship(ship_id, to)?;
    let ship = world.ship_mut(ship_id)?;
    ship.fuel = ship
        .fuel
        .saturating_sub(steps.saturating_mul(ship.fuel_consumption));
    if arrived && ship.behavior != Behavior::Exploring {
        ship.velocity = 0;
    }
    let fuel = ship.fuel;
    trace.record(
        tick,
        TraceEvent::ShipMoved {
            ship: ship_id,
            from,
            to,
            distance: steps,
            fuel,
        },
    );
    Ok(MoveOutcome {
        distance: steps,
        arrived,
        redirected: false,
    })
}
