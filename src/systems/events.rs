//! Scheduled hazards applied between ticks.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    engine::{System, SystemContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{GarbageKind, ShipId, TileId, TileKind, World},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub tick: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Closes every tile within `radius` for `duration` ticks.
    Restriction {
        tile: TileId,
        radius: u32,
        duration: u64,
    },
    Typhoon {
        tile: TileId,
        radius: u32,
        strength: u32,
    },
    PirateAttack {
        ship: ShipId,
    },
    OilSpill {
        tile: TileId,
        radius: u32,
        amount: u32,
    },
}

#[derive(Debug, Clone)]
struct Release {
    tick: u64,
    tile: TileId,
    radius: u32,
    tiles: Vec<TileId>,
}

/// Applies the scenario's event schedule. Overlapping restrictions are
/// reference counted per tile, so lifting one zone never reopens water that
/// another zone still covers.
pub struct EventSystem {
    schedule: Vec<ScheduledEvent>,
    next: usize,
    holds: BTreeMap<TileId, u32>,
    releases: Vec<Release>,
}

impl EventSystem {
    pub fn new(mut schedule: Vec<ScheduledEvent>) -> Self {
        schedule.sort_by_key(|event| event.tick);
        Self {
            schedule,
            next: 0,
            holds: BTreeMap::new(),
            releases: Vec::new(),
        }
    }

    fn lift_expired(
        &mut self,
        world: &mut World,
        tick: u64,
        trace: &mut dyn TraceSink,
    ) -> Result<(), InvariantError> {
        let (due, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.releases)
            .into_iter()
            .partition(|release| release.tick <= tick);
        self.releases = keep;
        for release in due {
            for tile in &release.tiles {
                let Some(count) = self.holds.get_mut(tile) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.holds.remove(tile);
                    world.set_restricted(*tile, false)?;
                }
            }
            trace.record(
                tick,
                TraceEvent::RestrictionLifted {
                    tile: release.tile,
                    radius: release.radius,
                },
            );
        }
        Ok(())
    }

    fn restrict(
        &mut self,
        world: &mut World,
        tick: u64,
        center: TileId,
        radius: u32,
        duration: u64,
        trace: &mut dyn TraceSink,
    ) -> Result<(), InvariantError> {
        let tiles = world.grid().within(center, radius);
        for tile in &tiles {
            // Water closed before any event ran stays closed for good.
            let already = world.tile(*tile)?.restricted;
            *self
                .holds
                .entry(*tile)
                .or_insert_with(|| u32::from(already)) += 1;
            world.set_restricted(*tile, true)?;
        }
        self.releases.push(Release {
            tick: tick + duration.max(1),
            tile: center,
            radius,
            tiles,
        });
        trace.record(
            tick,
            TraceEvent::RestrictionStarted {
                tile: center,
                radius,
            },
        );
        Ok(())
    }
}

impl System for EventSystem {
    fn name(&self) -> &str {
        "events"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        self.lift_expired(world, ctx.tick, trace)?;
        while let Some(event) = self.schedule.get(self.next) {
            if event.tick > ctx.tick {
                break;
            }
            let event = event.clone();
            self.next += 1;
            log::info!("applying {:?} at tick {}", event.kind, ctx.tick);
            match event.kind {
                EventKind::Restriction {
                    tile,
                    radius,
                    duration,
                } => self.restrict(world, ctx.tick, tile, radius, duration, trace)?,
                EventKind::Typhoon {
                    tile,
                    radius,
                    strength,
                } => typhoon(world, ctx.tick, tile, radius, strength, trace)?,
                EventKind::PirateAttack { ship } => pirates(world, ctx.tick, ship, trace)?,
                EventKind::OilSpill {
                    tile,
                    radius,
                    amount,
                } => oil_spill(world, ctx.tick, tile, radius, amount, trace)?,
            }
        }
        Ok(())
    }
}

const TYPHOON_ACCELERATION_LOSS: u32 = 4;
const TYPHOON_MAX_VELOCITY: u32 = 40;

/// Effects stack with strength: 1 doubles fuel consumption, 2 also wrecks
/// telescopes and radios, 3 also spills the cargo and 4 also damages the hull.
fn typhoon(
    world: &mut World,
    tick: u64,
    center: TileId,
    radius: u32,
    strength: u32,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    if strength == 0 {
        return Ok(());
    }
    let mut hit: Vec<ShipId> = {
        let view: &World = world;
        view.grid()
            .within(center, radius)
            .into_iter()
            .flat_map(|tile| view.ships_at(tile))
            .collect()
    };
    hit.sort();

    for ship_id in hit {
        let ship = world.ship_mut(ship_id)?;
        ship.fuel_consumption = ship.fuel_consumption.saturating_mul(2);
        if strength >= 2 {
            ship.telescope_bonus = 0;
            ship.radio = false;
        }
        let spilled = if strength >= 3 {
            ship.spill_cargo()
        } else {
            Vec::new()
        };
        if strength >= 4 {
            ship.damaged = true;
            ship.acceleration = ship
                .acceleration
                .saturating_sub(TYPHOON_ACCELERATION_LOSS)
                .max(1);
            ship.max_velocity = ship.max_velocity.min(TYPHOON_MAX_VELOCITY);
            ship.velocity = ship.velocity.min(ship.max_velocity);
        }
        let tile = ship.tile();
        trace.record(
            tick,
            TraceEvent::TyphoonHit {
                ship: ship_id,
                strength,
            },
        );

        if strength >= 4 {
            if let Some((provider, receiver)) = world.abort_transfer(ship_id) {
                trace.record(tick, TraceEvent::TransferAborted { provider, receiver });
            }
        }
        for (kind, amount) in spilled {
            // Chemicals sink, and so does anything over deep water.
            let floats = kind != GarbageKind::Chemicals
                && world.tile(tile)?.kind == TileKind::ShallowOcean;
            let garbage = if floats {
                Some(world.spawn_garbage(kind, amount, tile)?)
            } else {
                world.reserve_garbage_id();
                None
            };
            trace.record(
                tick,
                TraceEvent::CargoSpilled {
                    ship: ship_id,
                    kind,
                    amount,
                    garbage,
                },
            );
        }
    }
    Ok(())
}

fn pirates(
    world: &mut World,
    tick: u64,
    ship_id: ShipId,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let Ok(ship) = world.ship_mut(ship_id) else {
        log::warn!("pirates found no {ship_id}");
        return Ok(());
    };
    let lost = ship.lose_cargo();
    trace.record(tick, TraceEvent::PirateAttack { ship: ship_id, lost });
    Ok(())
}

fn oil_spill(
    world: &mut World,
    tick: u64,
    center: TileId,
    radius: u32,
    amount: u32,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    if amount == 0 {
        return Ok(());
    }
    for tile in world.grid().within(center, radius) {
        if !world.tile(tile)?.kind.is_ocean() {
            continue;
        }
        let garbage = world.spawn_garbage(GarbageKind::Oil, amount, tile)?;
        trace.record(
            tick,
            TraceEvent::OilSpilled {
                tile,
                garbage,
                amount,
            },
        );
    }
    Ok(())
}
