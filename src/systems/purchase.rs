use anyhow::Result;

use crate::{
    engine::{Phase, PhaseContext},
    pathfinding::Pathfinder,
    trace::{TraceEvent, TraceSink},
    world::{Behavior, CorporationId, PurchaseState, ShipId, ShipKind, World},
};

/// Picks the coordinating ship that will go and buy the next fleet addition.
///
/// A corporation has at most one purchase in flight: nothing is nominated
/// while a bought ship is still waiting for delivery.
pub struct PurchasePhase;

impl PurchasePhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PurchasePhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for PurchasePhase {
    fn name(&self) -> &str {
        "purchase"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        let corp = world.corporation(ctx.corporation)?;
        match corp.purchase {
            PurchaseState::Nominated { buyer } => {
                if !buyer_still_fit(world, ctx.corporation, buyer) {
                    log::debug!("{} drops {buyer} as buyer", ctx.corporation);
                    world.corporation_mut(ctx.corporation)?.purchase = PurchaseState::Idle;
                }
                Ok(())
            }
            PurchaseState::Idle => {
                if !corp.deliveries.is_empty() {
                    return Ok(());
                }
                let Some(cheapest) = world
                    .harbors()
                    .filter(|harbor| harbor.builds_for(ctx.corporation))
                    .filter_map(|harbor| harbor.shipyard.as_ref())
                    .map(|shipyard| shipyard.ship_cost)
                    .min()
                else {
                    return Ok(());
                };
                if !corp.can_afford(cheapest) {
                    return Ok(());
                }
                let Some(buyer) = pick_buyer(world, ctx.corporation)? else {
                    return Ok(());
                };
                world.corporation_mut(ctx.corporation)?.purchase =
                    PurchaseState::Nominated { buyer };
                trace.record(
                    ctx.tick,
                    TraceEvent::BuyerNominated {
                        corporation: ctx.corporation,
                        ship: buyer,
                    },
                );
                Ok(())
            }
        }
    }
}

/// Lowest-id coordinating ship that is free and can reach one of the
/// corporation's shipyards.
fn pick_buyer(world: &World, corporation: CorporationId) -> Result<Option<ShipId>> {
    let shipyards = world.owned_shipyard_tiles(corporation);
    let finder = Pathfinder::new(world.grid());
    for ship_id in &world.corporation(corporation)?.ships {
        let ship = world.ship(*ship_id)?;
        let free = ship.kind == ShipKind::Coordinating
            && matches!(ship.behavior, Behavior::Default | Behavior::Exploring)
            && !ship.damaged
            && ship.task.is_none()
            && ship.service.is_none();
        if free && finder.is_reachable(ship.tile(), &shipyards) {
            return Ok(Some(*ship_id));
        }
    }
    Ok(None)
}

fn buyer_still_fit(world: &World, corporation: CorporationId, buyer: ShipId) -> bool {
    let Ok(ship) = world.ship(buyer) else {
        return false;
    };
    if ship.owner != corporation || ship.damaged {
        return false;
    }
    ship.service.is_some()
        || Pathfinder::new(world.grid())
            .is_reachable(ship.tile(), &world.owned_shipyard_tiles(corporation))
}
