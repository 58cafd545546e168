use anyhow::Result;

use super::switch_behavior;
use crate::{
    engine::{Phase, PhaseContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{Behavior, CorporationId, ServiceKind, ShipId, StationKind, World},
};

/// Hands full holds over at a home harbor and credits the corporation for
/// them. Partly filled holds stay aboard.
pub struct UnloadingPhase;

impl UnloadingPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnloadingPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for UnloadingPhase {
    fn name(&self) -> &str {
        "unloading"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        for ship_id in world.corporation(ctx.corporation)?.ship_ids() {
            unload(world, ctx.corporation, ship_id, ctx.tick, trace)?;
        }
        Ok(())
    }
}

fn unload(
    world: &mut World,
    corporation: CorporationId,
    ship_id: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let Some(service) = world.ship(ship_id)?.service else {
        return Ok(());
    };
    if service.kind != ServiceKind::Unload || !service.is_ready(tick) {
        return Ok(());
    }

    let harbor = world.harbor(service.harbor)?;
    let station = harbor
        .unloading
        .as_ref()
        .ok_or(InvariantError::MissingStation {
            harbor: harbor.id,
            station: StationKind::Unloading,
        })?;
    let rate = station.unload_return;
    let accepts = station.accepts.clone();
    let home = harbor.corporations.contains(&corporation);

    let ship = world.ship_mut(ship_id)?;
    ship.service = None;
    let mut handed_over = Vec::new();
    if home {
        for (kind, hold) in ship.cargo.iter_mut() {
            if accepts.contains(kind) && hold.is_full() {
                handed_over.push((*kind, hold.unload()));
            }
        }
    }

    for (kind, amount) in handed_over {
        let earned = i64::from(amount) * rate;
        world.corporation_mut(corporation)?.earn(earned);
        trace.record(
            tick,
            TraceEvent::Unloaded {
                ship: ship_id,
                harbor: service.harbor,
                kind,
                amount,
                earned,
            },
        );
    }
    switch_behavior(world, ship_id, Behavior::Default, tick, trace)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::world::{
        CargoHold, Coord, Corporation, GarbageKind, Grid, Harbor, HarborId, PendingService, Ship,
        ShipBlueprint, ShipKind, Tile, TileId, TileKind, UnloadingStation,
    };

    fn setup(owned: bool) -> World {
        let tiles = vec![
            Tile::new(TileId::new(0), TileKind::Shore, Coord::new(0, 0)),
            Tile::new(TileId::new(1), TileKind::DeepOcean, Coord::new(1, 0)),
        ];
        let blueprint = ShipBlueprint {
            kind: ShipKind::Collecting,
            max_velocity: 20,
            acceleration: 10,
            max_fuel: 100,
            fuel_consumption: 1,
            visibility: 1,
            cargo: BTreeMap::from([(GarbageKind::Plastic, 50), (GarbageKind::Oil, 20)]),
            refueling_capacity: 0,
            refueling_time: 2,
        };
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint.clone());
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", 0));
        let corporations = if owned {
            BTreeSet::from([CorporationId::new(0)])
        } else {
            BTreeSet::new()
        };
        world
            .add_harbor(Harbor {
                id: HarborId::new(0),
                tile: TileId::new(0),
                corporations,
                shipyard: None,
                refueling: None,
                unloading: Some(UnloadingStation {
                    unload_return: 3,
                    accepts: BTreeSet::from([GarbageKind::Plastic]),
                }),
            })
            .unwrap();
        let mut ship =
            Ship::from_blueprint(ShipId::new(0), CorporationId::new(0), TileId::new(0), &blueprint);
        ship.cargo.get_mut(&GarbageKind::Plastic).unwrap().load(50);
        ship.cargo.get_mut(&GarbageKind::Oil).unwrap().load(5);
        ship.behavior = Behavior::Unloading;
        ship.service = Some(PendingService {
            kind: ServiceKind::Unload,
            harbor: HarborId::new(0),
            arrived: 0,
        });
        world.spawn_ship(ship).unwrap();
        world
    }

    fn run(world: &mut World) -> MemoryTrace {
        let rng = RngManager::new(1);
        let ctx = PhaseContext {
            tick: 1,
            corporation: CorporationId::new(0),
            rng: &rng,
        };
        let mut trace = MemoryTrace::new();
        UnloadingPhase::new().run(&ctx, world, &mut trace).unwrap();
        trace
    }

    #[test]
    fn accepted_cargo_is_paid_for() {
        let mut world = setup(true);
        run(&mut world);
        let ship = world.ship(ShipId::new(0)).unwrap();
        assert_eq!(ship.cargo[&GarbageKind::Plastic].remaining, 50);
        assert_eq!(ship.cargo[&GarbageKind::Oil].held(), 5);
        assert_eq!(ship.behavior, Behavior::Default);
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 150);
    }

    #[test]
    fn only_full_holds_are_handed_over() {
        let mut world = setup(true);
        world
            .harbor_mut(HarborId::new(0))
            .unwrap()
            .unloading
            .as_mut()
            .unwrap()
            .accepts
            .insert(GarbageKind::Oil);
        {
            let ship = world.ship_mut(ShipId::new(0)).unwrap();
            ship.cargo.insert(GarbageKind::Plastic, CargoHold::empty(10));
            ship.cargo.get_mut(&GarbageKind::Plastic).unwrap().load(10);
            ship.cargo.insert(GarbageKind::Oil, CargoHold::empty(100));
            ship.cargo.get_mut(&GarbageKind::Oil).unwrap().load(40);
        }
        let trace = run(&mut world);

        let ship = world.ship(ShipId::new(0)).unwrap();
        assert_eq!(ship.cargo[&GarbageKind::Plastic].held(), 0);
        assert_eq!(ship.cargo[&GarbageKind::Oil].held(), 40);
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 30);
        let unloaded: Vec<_> = trace
            .matching(|event| matches!(event, TraceEvent::Unloaded { .. }))
            .collect();
        assert_eq!(unloaded.len(), 1);
        assert!(matches!(
            unloaded[0].1,
            TraceEvent::Unloaded {
                kind: GarbageKind::Plastic,
                amount: 10,
                earned: 30,
                ..
            }
        ));
    }

    #[test]
    fn foreign_harbor_takes_nothing() {
        let mut world = setup(false);
        let trace = run(&mut world);
        assert!(trace
            .matching(|event| matches!(event, TraceEvent::Unloaded { .. }))
            .next()
            .is_none());
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 0);
    }
}
