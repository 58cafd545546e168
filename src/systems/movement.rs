use anyhow::Result;

use super::switch_behavior;
use crate::{
    behavior::{self, Plan},
    engine::{Phase, PhaseContext},
    error::InvariantError,
    movement,
    pathfinding::Pathfinder,
    trace::{TraceEvent, TraceSink},
    visibility,
    world::{
        Behavior, PendingService, PurchaseState, ServiceKind, ShipId, TaskState, TileId, World,
    },
};

/// Decides and moves every ship of the corporation, lowest id first.
pub struct MovementPhase;

impl MovementPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MovementPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for MovementPhase {
    fn name(&self) -> &str {
        "movement"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        visibility::refresh(world, ctx.corporation)?;
        world.corporation_mut(ctx.corporation)?.assignments.clear();

        for ship_id in world.corporation(ctx.corporation)?.ship_ids() {
            let plan = behavior::plan(world, ship_id, ctx.rng)?;
            let path = apply_plan(world, ship_id, plan, ctx.tick, trace)?;
            let outcome = movement::execute(world, ship_id, &path, ctx.tick, trace)?;
            if outcome.arrived {
                register_service(world, ship_id, ctx.tick)?;
            }
        }
        Ok(())
    }
}

/// Carries out the side effects of a plan and hands back the route to follow.
fn apply_plan(
    world: &mut World,
    ship_id: ShipId,
    plan: Plan,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<Vec<TileId>, InvariantError> {
    if plan.abort_transfer {
        if let Some((provider, receiver)) = world.abort_transfer(ship_id) {
            trace.record(tick, TraceEvent::TransferAborted { provider, receiver });
        }
    }
    if plan.drop_service {
        world.ship_mut(ship_id)?.service = None;
    }
    if let Some(task_id) = plan.released_task {
        world.ship_mut(ship_id)?.task = None;
        let task = world.task_mut(task_id)?;
        if task.is_open() {
            task.state = TaskState::Failed;
            trace.record(
                tick,
                TraceEvent::TaskFailed {
                    task: task_id,
                    ship: ship_id,
                },
            );
        }
    }
    switch_behavior(world, ship_id, plan.behavior, tick, trace)?;
    if let Some((tile, amount)) = plan.commitment {
        let owner = world.ship(ship_id)?.owner;
        world.corporation_mut(owner)?.commit(tile, amount);
    }
    Ok(plan.route.into_path())
}

/// Records the station visit a ship is waiting on once it stands on the
/// harbor it was heading for. Completion happens on a later tick.
fn register_service(world: &mut World, ship_id: ShipId, tick: u64) -> Result<(), InvariantError> {
    let ship = world.ship(ship_id)?;
    if ship.service.is_some() {
        return Ok(());
    }
    let Some(harbor) = world.harbor_at(ship.tile()) else {
        return Ok(());
    };
    let kind = match ship.behavior {
        Behavior::Refueling if harbor.refuels() => Some(ServiceKind::Refuel),
        Behavior::Unloading
            if ship
                .full_holds()
                .any(|kind| harbor.unloads_for(ship.owner, kind)) =>
        {
            Some(ServiceKind::Unload)
        }
        Behavior::Repairing if harbor.shipyard.is_some() => Some(ServiceKind::Repair),
        _ => {
            let nominated = world.corporation(ship.owner)?.purchase
                == PurchaseState::Nominated { buyer: ship_id };
            let chosen = nominated
                && behavior::cheapest_shipyard_path(
                    world,
                    &Pathfinder::new(world.grid()),
                    ship.tile(),
                    ship.owner,
                )
                .is_some_and(|path| path.last() == Some(&ship.tile()));
            chosen.then_some(ServiceKind::Purchase)
        }
    };
    let Some(kind) = kind else {
        return Ok(());
    };
    let harbor = harbor.id;
    log::debug!("{ship_id} waits at {harbor} for {kind:?}");
    world.ship_mut(ship_id)?.service = Some(PendingService {
        kind,
        harbor,
        arrived: tick,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use crate::world::{CorporationId, HarborId};

    const TWO_YARDS: &str = r#"
name: two_yards
map:
  rows: ["s~~s"]
harbors:
  - { id: 0, tile: 0, corporations: [0], shipyard: { repair_cost: 10, ship_cost: 500 } }
  - { id: 1, tile: 3, corporations: [0], shipyard: { repair_cost: 10, ship_cost: 300 } }
corporations:
  - id: 0
    name: Blue
    credits: 1000
    ships:
      - { id: 0, tile: 1, kind: coordinating, max_velocity: 20, acceleration: 20, max_fuel: 100, fuel_consumption: 1 }
"#;

    const BUYER: ShipId = ShipId::new(0);

    #[test]
    fn buyer_only_waits_at_the_chosen_shipyard() {
        let mut world = Scenario::from_yaml_str(TWO_YARDS)
            .unwrap()
            .build_world()
            .unwrap();
        world
            .corporation_mut(CorporationId::new(0))
            .unwrap()
            .purchase = PurchaseState::Nominated { buyer: BUYER };

        world.move_ship(BUYER, TileId::new(0)).unwrap();
        register_service(&mut world, BUYER, 2).unwrap();
        assert!(world.ship(BUYER).unwrap().service.is_none());

        world.move_ship(BUYER, TileId::new(3)).unwrap();
        register_service(&mut world, BUYER, 3).unwrap();
        assert_eq!(
            world.ship(BUYER).unwrap().service,
            Some(PendingService {
                kind: ServiceKind::Purchase,
                harbor: HarborId::new(1),
                arrived: 3,
            })
        );
    }

    #[test]
    fn ships_that_are_not_buying_get_no_purchase_service() {
        let mut world = Scenario::from_yaml_str(TWO_YARDS)
            .unwrap()
            .build_world()
            .unwrap();
        world.move_ship(BUYER, TileId::new(3)).unwrap();
        register_service(&mut world, BUYER, 1).unwrap();
        assert!(world.ship(BUYER).unwrap().service.is_none());

        world.ship_mut(BUYER).unwrap().behavior = Behavior::Repairing;
        register_service(&mut world, BUYER, 1).unwrap();
        assert_eq!(
            world.ship(BUYER).unwrap().service.map(|service| service.kind),
            Some(ServiceKind::Repair)
        );
    }
}
