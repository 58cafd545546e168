use anyhow::Result;

use super::switch_behavior;
use crate::{
    engine::{Phase, PhaseContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{
        Behavior, CorporationId, FuelTransfer, PendingService, ServiceKind, Ship, ShipId,
        StationKind, World,
    },
};

/// Fuel for the fleet: running ship-to-ship transfers first, then new
/// transfers, then harbor refuels that have waited out their arrival tick.
pub struct RefuelingPhase;

impl RefuelingPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RefuelingPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for RefuelingPhase {
    fn name(&self) -> &str {
        "refueling"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        let fleet = world.corporation(ctx.corporation)?.ship_ids();
        for provider in &fleet {
            progress_transfer(world, *provider, ctx.tick, trace)?;
        }
        for provider in &fleet {
            claim_target(world, *provider, ctx.tick, trace)?;
        }
        for ship_id in &fleet {
            complete_harbor_refuel(world, ctx.corporation, *ship_id, ctx.tick, trace)?;
        }
        Ok(())
    }
}

fn progress_transfer(
    world: &mut World,
    provider: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let Some(transfer) = world.ship(provider)?.rig.as_ref().and_then(|rig| rig.transfer) else {
        return Ok(());
    };

    let provider_tile = world.ship(provider)?.tile();
    let together = world
        .ship(transfer.target)
        .is_ok_and(|target| target.tile() == provider_tile);
    if !together {
        if let Some((provider, receiver)) = world.abort_transfer(provider) {
            trace.record(tick, TraceEvent::TransferAborted { provider, receiver });
        }
        return Ok(());
    }

    let countdown = transfer.countdown.saturating_sub(1);
    if countdown > 0 {
        if let Some(rig) = world.ship_mut(provider)?.rig.as_mut() {
            rig.transfer = Some(FuelTransfer {
                countdown,
                ..transfer
            });
        }
        return Ok(());
    }

    let target = world.ship(transfer.target)?;
    let needed = target.max_fuel - target.fuel;
    let mut amount = 0;
    if let Some(rig) = world.ship_mut(provider)?.rig.as_mut() {
        amount = needed.min(rig.payload);
        rig.payload -= amount;
        rig.transfer = None;
    }
    let receiver = world.ship_mut(transfer.target)?;
    receiver.fuel += amount;
    receiver.fuel_donor = None;
    trace.record(
        tick,
        TraceEvent::TransferCompleted {
            provider,
            receiver: transfer.target,
            amount,
        },
    );
    if receiver.behavior == Behavior::Refueling {
        switch_behavior(world, transfer.target, Behavior::Default, tick, trace)?;
    }
    Ok(())
}

fn can_provide(ship: &Ship) -> bool {
    ship.rig
        .as_ref()
        .is_some_and(|rig| !rig.is_exhausted() && !rig.is_busy())
        && !ship.damaged
        && ship.fuel_donor.is_none()
        && !matches!(ship.behavior, Behavior::Escaping | Behavior::Refueling)
}

fn can_receive(ship: &Ship, provider: &Ship) -> bool {
    ship.id != provider.id
        && ship.owner == provider.owner
        && ship.tile() == provider.tile()
        && ship.is_low_on_fuel()
        && ship.fuel_donor.is_none()
        && !ship.is_transfer_provider()
        && ship.service.is_none()
        && ship.behavior != Behavior::Escaping
}

/// An idle tanker claims the lowest-id thirsty fleet-mate on its tile.
fn claim_target(
    world: &mut World,
    provider_id: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let provider = world.ship(provider_id)?;
    if !can_provide(provider) {
        return Ok(());
    }
    let target = world
        .ships_at(provider.tile())
        .find(|id| world.ship(*id).is_ok_and(|ship| can_receive(ship, provider)));
    let Some(target) = target else {
        return Ok(());
    };

    let Some(rig) = world.ship_mut(provider_id)?.rig.as_mut() else {
        return Ok(());
    };
    rig.transfer = Some(FuelTransfer {
        target,
        countdown: rig.transfer_time,
    });
    let ticks = rig.transfer_time;
    world.ship_mut(target)?.fuel_donor = Some(provider_id);
    log::debug!("{provider_id} claims {target} for refueling");
    trace.record(
        tick,
        TraceEvent::TransferStarted {
            provider: provider_id,
            receiver: target,
            ticks,
        },
    );
    Ok(())
}

fn complete_harbor_refuel(
    world: &mut World,
    corporation: CorporationId,
    ship_id: ShipId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let Some(service) = world.ship(ship_id)?.service else {
        return Ok(());
    };
    if service.kind != ServiceKind::Refuel || !service.is_ready(tick) {
        return Ok(());
    }
    world.ship_mut(ship_id)?.service = None;

    let harbor = world.harbor(service.harbor)?;
    let station = harbor
        .refueling
        .as_ref()
        .ok_or(InvariantError::MissingStation {
            harbor: harbor.id,
            station: StationKind::Refueling,
        })?;
    if !station.is_open() {
        log::debug!("{} closed before {ship_id} was served", harbor.id);
        return Ok(());
    }
    let cost = station.refuel_cost;

    let corp = world.corporation_mut(corporation)?;
    if !corp.charge(cost) {
        let credits = corp.credits();
        trace.record(
            tick,
            TraceEvent::RefuelFailed {
                ship: ship_id,
                harbor: service.harbor,
                cost,
                credits,
            },
        );
        return Ok(());
    }

    let closed = {
        let harbor = world.harbor_mut(service.harbor)?;
        let station = harbor
            .refueling
            .as_mut()
            .ok_or(InvariantError::MissingStation {
                harbor: service.harbor,
                station: StationKind::Refueling,
            })?;
        station.uses += 1;
        !station.is_open()
    };
    let ship = world.ship_mut(ship_id)?;
    ship.fuel = ship.max_fuel;
    if let Some(rig) = ship.rig.as_mut() {
        rig.payload = rig.max_payload;
    }
    trace.record(
        tick,
        TraceEvent::Refueled {
            ship: ship_id,
            harbor: service.harbor,
            cost,
        },
    );
    if closed {
        log::info!("{} ran out of fuel to sell", service.harbor);
        trace.record(
            tick,
            TraceEvent::StationClosed {
                harbor: service.harbor,
            },
        );
    }

    let ship = world.ship(ship_id)?;
    let harbor = world.harbor(service.harbor)?;
    let unload_here = ship
        .full_holds()
        .any(|kind| harbor.unloads_for(ship.owner, kind));
    if unload_here {
        switch_behavior(world, ship_id, Behavior::Unloading, tick, trace)?;
        world.ship_mut(ship_id)?.service = Some(PendingService {
            kind: ServiceKind::Unload,
            harbor: service.harbor,
            arrived: tick,
        });
    } else {
        switch_behavior(world, ship_id, Behavior::Default, tick, trace)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::world::{
        Coord, Corporation, Grid, Harbor, HarborId, RefuelingStation, ShipBlueprint, ShipKind,
        Tile, TileId, TileKind,
    };

    fn blueprint(kind: ShipKind) -> ShipBlueprint {
        ShipBlueprint {
            kind,
            max_velocity: 20,
            acceleration: 10,
            max_fuel: 3000,
            fuel_consumption: 10,
            visibility: 1,
            cargo: BTreeMap::new(),
            refueling_capacity: 3000,
            refueling_time: 2,
        }
    }

    fn world(credits: i64, refuel_limit: u32) -> World {
        let tiles = (0..3)
            .map(|x| {
                let kind = if x == 0 { TileKind::Shore } else { TileKind::DeepOcean };
                Tile::new(TileId::new(x as u32), kind, Coord::new(x, 0))
            })
            .collect();
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint(ShipKind::Refueling));
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", credits));
        world
            .add_harbor(Harbor {
                id: HarborId::new(0),
                tile: TileId::new(0),
                corporations: BTreeSet::from([CorporationId::new(0)]),
                shipyard: None,
                refueling: Some(RefuelingStation {
                    refuel_cost: 100,
                    refuel_limit,
                    uses: 0,
                }),
                unloading: None,
            })
            .unwrap();
        world
    }

    fn spawn(world: &mut World, id: u32, kind: ShipKind, tile: u32, fuel: u32) {
        let mut ship = Ship::from_blueprint(
            ShipId::new(id),
            CorporationId::new(0),
            TileId::new(tile),
            &blueprint(kind),
        );
        ship.fuel = fuel;
        world.spawn_ship(ship).unwrap();
    }

    fn run(world: &mut World, tick: u64, trace: &mut MemoryTrace) {
        let rng = RngManager::new(1);
        let ctx = PhaseContext {
            tick,
            corporation: CorporationId::new(0),
            rng: &rng,
        };
        RefuelingPhase::new().run(&ctx, world, trace).unwrap();
    }

    fn wait_for_refuel(world: &mut World, ship: u32, arrived: u64) {
        let ship = world.ship_mut(ShipId::new(ship)).unwrap();
        ship.behavior = Behavior::Refueling;
        ship.service = Some(PendingService {
            kind: ServiceKind::Refuel,
            harbor: HarborId::new(0),
            arrived,
        });
    }

    #[test]
    fn tanker_fills_up_a_fleet_mate_after_countdown() {
        let mut world = world(0, 5);
        spawn(&mut world, 0, ShipKind::Scouting, 2, 200);
        spawn(&mut world, 1, ShipKind::Refueling, 2, 200);
        let mut trace = MemoryTrace::new();

        run(&mut world, 0, &mut trace);
        assert_eq!(
            world.ship(ShipId::new(0)).unwrap().fuel_donor,
            Some(ShipId::new(1))
        );
        run(&mut world, 1, &mut trace);
        assert_eq!(world.ship(ShipId::new(0)).unwrap().fuel, 200);
        run(&mut world, 2, &mut trace);

        let receiver = world.ship(ShipId::new(0)).unwrap();
        assert_eq!(receiver.fuel, 3000);
        assert!(receiver.fuel_donor.is_none());
        let rig = world.ship(ShipId::new(1)).unwrap().rig.clone().unwrap();
        assert_eq!(rig.payload, 200);
        assert!(rig.transfer.is_none());
        world.check_invariants().unwrap();
    }

    #[test]
    fn harbor_refuel_waits_one_tick_and_charges() {
        let mut world = world(250, 5);
        spawn(&mut world, 0, ShipKind::Scouting, 0, 100);
        wait_for_refuel(&mut world, 0, 3);
        let mut trace = MemoryTrace::new();

        run(&mut world, 3, &mut trace);
        assert_eq!(world.ship(ShipId::new(0)).unwrap().fuel, 100);

        run(&mut world, 4, &mut trace);
        let ship = world.ship(ShipId::new(0)).unwrap();
        assert_eq!(ship.fuel, 3000);
        assert_eq!(ship.behavior, Behavior::Default);
        assert!(ship.service.is_none());
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 150);
    }

    #[test]
    fn refuel_fails_without_credits() {
        let mut world = world(50, 5);
        spawn(&mut world, 0, ShipKind::Scouting, 0, 100);
        wait_for_refuel(&mut world, 0, 0);
        let mut trace = MemoryTrace::new();
        run(&mut world, 1, &mut trace);

        let ship = world.ship(ShipId::new(0)).unwrap();
        assert_eq!(ship.fuel, 100);
        assert_eq!(ship.behavior, Behavior::Refueling);
        assert_eq!(world.corporation(CorporationId::new(0)).unwrap().credits(), 50);
        assert!(trace
            .matching(|event| matches!(event, TraceEvent::RefuelFailed { .. }))
            .next()
            .is_some());
    }

    #[test]
    fn station_closes_at_its_limit() {
        let mut world = world(1000, 1);
        spawn(&mut world, 0, ShipKind::Scouting, 0, 100);
        wait_for_refuel(&mut world, 0, 0);
        let mut trace = MemoryTrace::new();
        run(&mut world, 1, &mut trace);

        assert!(world.refuel_tiles().is_empty());
        assert!(trace
            .matching(|event| matches!(event, TraceEvent::StationClosed { .. }))
            .next()
            .is_some());
    }
}
