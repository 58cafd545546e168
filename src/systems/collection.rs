use anyhow::Result;

use crate::{
    engine::{Phase, PhaseContext},
    trace::{TraceEvent, TraceSink},
    world::{GarbageId, ShipKind, World},
};

pub struct CollectionPhase;

impl CollectionPhase {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CollectionPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase for CollectionPhase {
    fn name(&self) -> &str {
        "collection"
    }

    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        let corp = world.corporation(ctx.corporation)?;
        let accepts = corp.accepts.clone();

        for ship_id in corp.ship_ids() {
            let ship = world.ship(ship_id)?;
            if ship.kind != ShipKind::Collecting {
                continue;
            }
            let on_tile: Vec<GarbageId> = world
                .garbage_at(ship.tile())
                .filter(|item| accepts.contains(&item.kind) && ship.can_carry(item.kind))
                .map(|item| item.id)
                .collect();

            for garbage_id in on_tile {
                let (kind, amount) = {
                    let item = world.garbage_mut(garbage_id)?;
                    (item.kind, item.amount)
                };
                let ship = world.ship_mut(ship_id)?;
                let Some(hold) = ship.cargo.get_mut(&kind) else {
                    continue;
                };
                let taken = hold.load(amount);
                if taken == 0 {
                    continue;
                }

                let left = amount - taken;
                world.garbage_mut(garbage_id)?.amount = left;
                *world
                    .corporation_mut(ctx.corporation)?
                    .collected
                    .entry(kind)
                    .or_insert(0) += u64::from(taken);
                trace.record(
                    ctx.tick,
                    TraceEvent::GarbageCollected {
                        ship: ship_id,
                        garbage: garbage_id,
                        kind,
                        amount: taken,
                        left,
                    },
                );
                if left == 0 {
                    world.remove_garbage(garbage_id);
                }
            }
        }
        Ok(())
    }
}
