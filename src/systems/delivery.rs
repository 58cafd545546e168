use anyhow::{Context, Result};

use crate::{
    engine::{Phase, PhaseContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{
        CorporationId, PendingDelivery, PurchaseState, ServiceKind, Ship, StationKind, World,
    },
};

/// Pays for ships ordered by a buyer standing at a shipyard and launches
/// the ones whose delivery countdown ran out.
pub struct DeliveryPhase;

impl DeliveryPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeliveryPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for DeliveryPhase {
    fn name(&self) -> &str {
        "delivery"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        launch_due_ships(world, ctx.corporation, ctx.tick, trace)
            .context("delivering purchased ships")?;
        settle_purchase(world, ctx.corporation, ctx.tick, trace)?;
        Ok(())
    }
}

fn launch_due_ships(
    world: &mut World,
    corporation: CorporationId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let corp = world.corporation_mut(corporation)?;
    let mut due = Vec::new();
    corp.deliveries.retain_mut(|delivery| {
        delivery.countdown = delivery.countdown.saturating_sub(1);
        if delivery.countdown == 0 {
            due.push(delivery.tile);
            false
        } else {
            true
        }
    });

    for tile in due {
        let id = world.next_ship_id();
        let ship = Ship::from_blueprint(id, corporation, tile, &world.purchase_blueprint);
        world.spawn_ship(ship)?;
        log::info!("{corporation} received {id} at {tile}");
        trace.record(
            tick,
            TraceEvent::ShipDelivered {
                corporation,
                ship: id,
                tile,
            },
        );
    }
    Ok(())
}

fn settle_purchase(
    world: &mut World,
    corporation: CorporationId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let PurchaseState::Nominated { buyer } = world.corporation(corporation)?.purchase else {
        return Ok(());
    };
    let Ok(ship) = world.ship(buyer) else {
        return Ok(());
    };
    let Some(service) = ship.service.filter(|service| {
        service.kind == ServiceKind::Purchase && service.is_ready(tick)
    }) else {
        return Ok(());
    };
    world.ship_mut(buyer)?.service = None;

    let harbor = world.harbor(service.harbor)?;
    let shipyard = harbor
        .shipyard
        .as_ref()
        .ok_or(InvariantError::MissingStation {
            harbor: harbor.id,
            station: StationKind::Shipyard,
        })?;
    let cost = shipyard.ship_cost;
    let delivery_in = shipyard.delivery_time.max(1);
    let delivery = PendingDelivery {
        harbor: harbor.id,
        tile: harbor.tile,
        countdown: delivery_in,
    };

    let corp = world.corporation_mut(corporation)?;
    corp.purchase = PurchaseState::Idle;
    if !corp.charge(cost) {
        let credits = corp.credits();
        log::warn!("{corporation} cannot afford a ship at {}", service.harbor);
        trace.record(
            tick,
            TraceEvent::PurchaseFailed {
                corporation,
                buyer,
                harbor: service.harbor,
                cost,
                credits,
            },
        );
        return Ok(());
    }
    corp.deliveries.push(delivery);
    trace.record(
        tick,
        TraceEvent::ShipPurchased {
            corporation,
            buyer,
            harbor: service.harbor,
            cost,
            delivery_in,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::world::{
        Coord, Corporation, Grid, Harbor, HarborId, PendingService, ShipBlueprint, ShipId, ShipKind,
        Shipyard, Tile, TileId, TileKind,
    };

    fn blueprint(kind: ShipKind) -> ShipBlueprint {
        ShipBlueprint {
            kind,
            max_velocity: 30,
            acceleration: 10,
            max_fuel: 200,
            fuel_consumption: 2,
            visibility: 1,
            cargo: BTreeMap::new(),
            refueling_capacity: 400,
            refueling_time: 2,
        }
    }

    fn buyer_at_yard(credits: i64) -> World {
        let tiles = vec![
            Tile::new(TileId::new(0), TileKind::Shore, Coord::new(0, 0)),
            Tile::new(TileId::new(1), TileKind::DeepOcean, Coord::new(1, 0)),
        ];
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint(ShipKind::Refueling));
        let mut corp = Corporation::new(CorporationId::new(0), "Blue", credits);
        corp.purchase = PurchaseState::Nominated {
            buyer: ShipId::new(3),
        };
        world.add_corporation(corp);
        world
            .add_harbor(Harbor {
                id: HarborId::new(0),
                tile: TileId::new(0),
                corporations: BTreeSet::new(),
                shipyard: Some(Shipyard {
                    repair_cost: 10,
                    ship_cost: 300,
                    delivery_time: 2,
                }),
                refueling: None,
                unloading: None,
            })
            .unwrap();
        let mut buyer = Ship::from_blueprint(
            ShipId::new(3),
            CorporationId::new(0),
            TileId::new(0),
            &blueprint(ShipKind::Coordinating),
        );
        buyer.service = Some(PendingService {
            kind: ServiceKind::Purchase,
            harbor: HarborId::new(0),
            arrived: 0,
        });
        world.spawn_ship(buyer).unwrap();
        world
    }

    fn run(world: &mut World, tick: u64, trace: &mut MemoryTrace) {
        let rng = RngManager::new(1);
        let ctx = PhaseContext {
            tick,
            corporation: CorporationId::new(0),
            rng: &rng,
        };
        DeliveryPhase::new().run(&ctx, world, trace).unwrap();
    }

    #[test]
    fn bought_ship_arrives_after_delivery_time() {
        let mut world = buyer_at_yard(500);
        let mut trace = MemoryTrace::new();

        run(&mut world, 1, &mut trace);
        let corp = world.corporation(CorporationId::new(0)).unwrap();
        assert_eq!(corp.credits(), 200);
        assert_eq!(corp.purchase, PurchaseState::Idle);
        assert_eq!(corp.deliveries.len(), 1);

        run(&mut world, 2, &mut trace);
        assert!(world.ship(ShipId::new(4)).is_err());
        run(&mut world, 3, &mut trace);

        let delivered = world.ship(ShipId::new(4)).unwrap();
        assert_eq!(delivered.kind, ShipKind::Refueling);
        assert_eq!(delivered.tile(), TileId::new(0));
        assert_eq!(delivered.rig.as_ref().unwrap().payload, 400);
        assert!(world
            .corporation(CorporationId::new(0))
            .unwrap()
            .deliveries
            .is_empty());
        assert_eq!(
            trace
                .matching(|event| matches!(event, TraceEvent::ShipDelivered { .. }))
                .map(|(tick, _)| *tick)
                .collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn failed_payment_clears_the_nomination() {
        let mut world = buyer_at_yard(299);
        let mut trace = MemoryTrace::new();
        run(&mut world, 1, &mut trace);

        let corp = world.corporation(CorporationId::new(0)).unwrap();
        assert_eq!(corp.credits(), 299);
        assert_eq!(corp.purchase, PurchaseState::Idle);
        assert!(corp.deliveries.is_empty());
        assert!(world.ship(ShipId::new(3)).unwrap().service.is_none());
        assert!(trace
            .matching(|event| matches!(event, TraceEvent::PurchaseFailed { .. }))
            .next()
            .is_some());
    }
}
