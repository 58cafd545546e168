mod collection;
mod cooperation;
mod delivery;
mod drift;
mod events;
mod movement;
mod purchase;
mod refueling;
mod repair;
mod tasks;
mod tracking;
mod unloading;

pub use collection::CollectionPhase;
pub use cooperation::CooperationPhase;
pub use delivery::DeliveryPhase;
pub use drift::DriftSystem;
pub use events::{EventKind, EventSystem, ScheduledEvent};
pub use movement::MovementPhase;
pub use purchase::PurchasePhase;
pub use refueling::RefuelingPhase;
pub use repair::RepairPhase;
pub use tasks::TaskSystem;
pub use tracking::TrackerPhase;
pub use unloading::UnloadingPhase;

use crate::error::InvariantError;
use crate::trace::{TraceEvent, TraceSink};
use crate::world::{Behavior, ShipId, World};

/// Sets a ship's behavior, tracing the change when there is one.
pub(crate) fn switch_behavior(
    world: &mut World,
    ship_id: ShipId,
    to: Behavior,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let ship = world.ship_mut(ship_id)?;
    let from = ship.behavior;
    if from == to {
        return Ok(());
    }
    ship.behavior = to;
    trace.record(
        tick,
        TraceEvent::BehaviorChanged {
            ship: ship_id,
            from,
            to,
        },
    );
    Ok(())
}
