use anyhow::Result;

use super::switch_behavior;
use crate::{
    engine::{Phase, PhaseContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{Behavior, CorporationId, ServiceKind, ShipId, StationKind, World},
};

/// Fixes damaged ships waiting at a shipyard.
pub struct RepairPhase;

impl RepairPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RepairPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for RepairPhase {
    fn name(&self) -> &str {
        "repair"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        for ship_id in world.corporation(ctx.corporation)?.ship_ids() {
            repair(world, ctx.corporation, ship_id, ctx.tick, trace)?;
        }
        Ok(())
    }
}

fn repair(
    world: &mut World,
    corporation: CorporationId,
    ship_id: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let Some(service) = world.ship(ship_id)?.service else {
        return Ok(());
    };
    if service.kind != ServiceKind::Repair || !service.is_ready(tick) {
        return Ok(());
    }
    world.ship_mut(ship_id)?.service = None;

    let harbor = world.harbor(service.harbor)?;
    let cost = harbor
        .shipyard
        .as_ref()
        .ok_or(InvariantError::MissingStation {
            harbor: harbor.id,
            station: StationKind::Shipyard,
        })?
        .repair_cost;

    let corp = world.corporation_mut(corporation)?;
    if !corp.charge(cost) {
        let credits = corp.credits();
        log::debug!("{corporation} cannot pay {cost} to repair {ship_id}");
        trace.record(
            tick,
            TraceEvent::RepairFailed {
                ship: ship_id,
                harbor: service.harbor,
                cost,
                credits,
            },
        );
        return Ok(());
    }

    world.ship_mut(ship_id)?.repair();
    trace.record(
        tick,
        TraceEvent::Repaired {
            ship: ship_id,
            harbor: service.harbor,
            cost,
        },
    );
    switch_behavior(world, ship_id, Behavior::Default, tick, trace)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::world::{
        Coord, Corporation, Grid, Harbor, HarborId, PendingService, Ship, ShipBlueprint, ShipKind,
        Shipyard, Tile, TileId, TileKind,
    };

    fn damaged_ship_at_yard(credits: i64) -> World {
        let tiles = vec![
            Tile::new(TileId::new(0), TileKind::Shore, Coord::new(0, 0)),
            Tile::new(TileId::new(1), TileKind::DeepOcean, Coord::new(1, 0)),
        ];
        let blueprint = ShipBlueprint {
            kind: ShipKind::Scouting,
            max_velocity: 30,
            acceleration: 10,
            max_fuel: 100,
            fuel_consumption: 2,
            visibility: 1,
            cargo: BTreeMap::new(),
            refueling_capacity: 0,
            refueling_time: 1,
        };
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint.clone());
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", credits));
        world
            .add_harbor(Harbor {
                id: HarborId::new(0),
                tile: TileId::new(0),
                corporations: BTreeSet::new(),
                shipyard: Some(Shipyard {
                    repair_cost: 80,
                    ship_cost: 500,
                    delivery_time: 3,
                }),
                refueling: None,
                unloading: None,
            })
            .unwrap();
        let mut ship = Ship::from_blueprint(
            ShipId::new(0),
            CorporationId::new(0),
            TileId::new(0),
            &blueprint,
        );
        ship.damaged = true;
        ship.acceleration = 5;
        ship.fuel_consumption = 4;
        ship.behavior = Behavior::Repairing;
        ship.service = Some(PendingService {
            kind: ServiceKind::Repair,
            harbor: HarborId::new(0),
            arrived: 0,
        });
        world.spawn_ship(ship).unwrap();
        world
    }

    fn run(world: &mut World, tick: u64) -> MemoryTrace {
        let rng = RngManager::new(1);
        let ctx = PhaseContext {
            tick,
            corporation: CorporationId::new(0),
            rng: &rng,
        };
        let mut trace = MemoryTrace::new();
        RepairPhase::new().run(&ctx, world, &mut trace).unwrap();
        trace
    }

    #[test]
    fn repair_restores_base_stats() {
        let mut world = damaged_ship_at_yard(100);
        assert!(run(&mut world, 0).events().is_empty());

        run(&mut world, 1);
        let ship = world.ship(ShipId::new(0)).unwrap();
        assert!(!ship.damaged);
        assert_eq!((ship.acceleration, ship.fuel_consumption), (10, 2));
        assert_eq!(ship.behavior, Behavior::Default);
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 20);
    }

    #[test]
    fn unpaid_repair_leaves_the_ship_damaged() {
        let mut world = damaged_ship_at_yard(79);
        let trace = run(&mut world, 1);
        let ship = world.ship(ShipId::new(0)).unwrap();
        assert!(ship.damaged);
        assert!(ship.service.is_none());
        assert_eq!(ship.behavior, Behavior::Repairing);
        assert_eq!(trace.events().len(), 1);
        assert!(matches!(
            trace.events()[0].1,
            TraceEvent::RepairFailed { cost: 80, credits: 79, .. }
        ));
    }
}
