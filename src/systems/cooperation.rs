use anyhow::Result;

use crate::{
    engine::{Phase, PhaseContext},
    trace::{TraceEvent, TraceSink},
    visibility,
    world::{Behavior, ShipKind, World},
};

/// Coordinating ships, and any ship with a radio, swap garbage sightings with
/// a rival fleet they meet. A corporation never cooperates twice in a row
/// with the same partner, and each ship cooperates at most once per tick.
/// Ships on their way to refuel do not stop to talk.
pub struct CooperationPhase;

impl CooperationPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CooperationPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for CooperationPhase {
    fn name(&self) -> &str {
        "cooperation"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        let corporation = ctx.corporation;
        for ship_id in world.corporation(corporation)?.ship_ids() {
            let ship = world.ship(ship_id)?;
            let can_talk = ship.kind == ShipKind::Coordinating || ship.radio;
            if !can_talk || ship.behavior == Behavior::Refueling {
                continue;
            }
            let last_partner = world.corporation(corporation)?.last_partner;
            let met = world.ships_at(ship.tile()).find_map(|other_id| {
                let other = world.ship(other_id).ok()?;
                let eligible = other.owner != corporation && Some(other.owner) != last_partner;
                eligible.then_some((other_id, other.owner))
            });
            let Some((partner_ship, partner)) = met else {
                continue;
            };

            visibility::share(world, corporation, partner)?;
            world.corporation_mut(corporation)?.last_partner = Some(partner);
            world.corporation_mut(partner)?.last_partner = Some(corporation);
            log::debug!("{corporation} and {partner} share sightings");
            trace.record(
                ctx.tick,
                TraceEvent::Cooperated {
                    corporation,
                    partner,
                    ship: ship_id,
                    partner_ship,
                },
            );
        }
        Ok(())
    }
}
