use anyhow::Result;

use crate::{
    engine::{Phase, PhaseContext},
    trace::{TraceEvent, TraceSink},
    world::{Behavior, GarbageId, World},
};

/// Ships carrying a tracker tag every pile on their tile. Tagged piles stay
/// in the corporation's knowledge wherever they drift, until they are gone.
pub struct TrackerPhase;

impl TrackerPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrackerPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for TrackerPhase {
    fn name(&self) -> &str {
        "tracking"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        for ship_id in world.corporation(ctx.corporation)?.ship_ids() {
            let ship = world.ship(ship_id)?;
            if !ship.tracker || ship.behavior == Behavior::Refueling {
                continue;
            }
            let tile = ship.tile();
            let on_tile: Vec<GarbageId> = world.garbage_at(tile).map(|item| item.id).collect();

            let corp = world.corporation_mut(ctx.corporation)?;
            for garbage in on_tile {
                if !corp.tracked.insert(garbage) {
                    continue;
                }
                corp.knowledge.garbage.insert(garbage, tile);
                trace.record(
                    ctx.tick,
                    TraceEvent::TrackerAttached {
                        corporation: ctx.corporation,
                        garbage,
                        ship: ship_id,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::visibility;
    use crate::world::{
        Coord, Corporation, CorporationId, Garbage, GarbageKind, Grid, Ship, ShipBlueprint,
        ShipId, ShipKind, Tile, TileId, TileKind,
    };

    fn harbor_row() -> World {
        let tiles = (0..6)
            .map(|x| Tile::new(TileId::new(x), TileKind::DeepOcean, Coord::new(x as i32, 0)))
            .collect();
        let blueprint = ShipBlueprint {
            kind: ShipKind::Scouting,
            max_velocity: 10,
            acceleration: 10,
            max_fuel: 100,
            fuel_consumption: 1,
            visibility: 0,
            cargo: BTreeMap::new(),
            refueling_capacity: 0,
            refueling_time: 1,
        };
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint.clone());
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", 0));
        let mut ship =
            Ship::from_blueprint(ShipId::new(0), CorporationId::new(0), TileId::new(1), &blueprint);
        ship.tracker = true;
        world.spawn_ship(ship).unwrap();
        for id in [3, 4] {
            world
                .insert_garbage(Garbage::new(
                    GarbageId::new(id),
                    GarbageKind::Plastic,
                    10,
                    TileId::new(1),
                ))
                .unwrap();
        }
        world
    }

    fn run(world: &mut World) -> MemoryTrace {
        let rng = RngManager::new(1);
        let ctx = PhaseContext {
            tick: 0,
            corporation: CorporationId::new(0),
            rng: &rng,
        };
        let mut trace = MemoryTrace::new();
        TrackerPhase::new().run(&ctx, world, &mut trace).unwrap();
        trace
    }

    #[test]
    fn each_pile_is_tagged_once() {
        let mut world = harbor_row();
        assert_eq!(run(&mut world).events().len(), 2);
        assert!(run(&mut world).events().is_empty());
        let corp = world.corporation(CorporationId::new(0)).unwrap();
        assert_eq!(
            corp.tracked.iter().copied().collect::<Vec<_>>(),
            vec![GarbageId::new(3), GarbageId::new(4)]
        );
    }

    #[test]
    fn tagged_piles_are_followed_out_of_sight() {
        let mut world = harbor_row();
        run(&mut world);
        world.move_garbage(GarbageId::new(3), TileId::new(5)).unwrap();
        world.remove_garbage(GarbageId::new(4));
        visibility::refresh(&mut world, CorporationId::new(0)).unwrap();

        let corp = world.corporation(CorporationId::new(0)).unwrap();
        assert_eq!(
            corp.knowledge.garbage.get(&GarbageId::new(3)),
            Some(&TileId::new(5))
        );
        assert!(!corp.knowledge.garbage.contains_key(&GarbageId::new(4)));
        assert!(!corp.tracked.contains(&GarbageId::new(4)));
    }

    #[test]
    fn ships_heading_to_refuel_leave_the_tracker_idle() {
        let mut world = harbor_row();
        world.ship_mut(ShipId::new(0)).unwrap().behavior = Behavior::Refueling;
        assert!(run(&mut world).events().is_empty());
        assert!(world
            .corporation(CorporationId::new(0))
            .unwrap()
            .tracked
            .is_empty());
    }
}
