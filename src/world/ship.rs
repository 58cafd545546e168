use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CorporationId, GarbageKind, HarborId, ShipId, TaskId, TileId};

/// Velocity units needed to cover one tile in a tick.
pub const TILE_LENGTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipKind {
    Scouting,
    Coordinating,
    Collecting,
    Refueling,
}

/// Operating mode of a ship for the current tick. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    #[default]
    Default,
    Exploring,
    Escaping,
    Refueling,
    Unloading,
    Repairing,
}

impl Behavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Behavior::Default => "default",
            Behavior::Exploring => "exploring",
            Behavior::Escaping => "escaping",
            Behavior::Refueling => "refueling",
            Behavior::Unloading => "unloading",
            Behavior::Repairing => "repairing",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Refuel,
    Unload,
    Repair,
    Purchase,
}

/// A station visit the ship is waiting on. Completes on a later tick than
/// `arrived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingService {
    pub kind: ServiceKind,
    pub harbor: HarborId,
    pub arrived: u64,
}

impl PendingService {
    pub fn is_ready(&self, tick: u64) -> bool {
        self.arrived < tick
    }
}

/// Cargo space for one garbage kind. `remaining == 0` means the slot is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CargoHold {
    pub max: u32,
    pub remaining: u32,
}

impl CargoHold {
    pub fn empty(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn is_full(&self) -> bool {
        self.remaining == 0
    }

    pub fn held(&self) -> u32 {
        self.max - self.remaining
    }

    /// Loads up to `amount`, returning what actually fit.
    pub fn load(&mut self, amount: u32) -> u32 {
        let taken = amount.min(self.remaining);
        self.remaining -= taken;
        taken
    }

    /// Empties the hold, returning the amount that was aboard.
    pub fn unload(&mut self) -> u32 {
        let held = self.held();
        self.remaining = self.max;
        held
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FuelTransfer {
    pub target: ShipId,
    pub countdown: u32,
}

/// Fuel tank and pump carried by refueling-type ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefuelingRig {
    pub payload: u32,
    pub max_payload: u32,
    pub transfer_time: u32,
    pub transfer: Option<FuelTransfer>,
}

impl RefuelingRig {
    pub fn new(max_payload: u32, transfer_time: u32) -> Self {
        Self {
            payload: max_payload,
            max_payload,
            transfer_time: transfer_time.max(1),
            transfer: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.payload == 0
    }

    pub fn is_busy(&self) -> bool {
        self.transfer.is_some()
    }
}

/// Undamaged performance figures, restored by a repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BaseStats {
    pub acceleration: u32,
    pub max_velocity: u32,
    pub fuel_consumption: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ship {
    pub id: ShipId,
    pub kind: ShipKind,
    pub owner: CorporationId,
    pub(crate) tile: TileId,
    pub velocity: u32,
    pub acceleration: u32,
    pub max_velocity: u32,
    pub fuel: u32,
    pub max_fuel: u32,
    pub fuel_consumption: u32,
    pub cargo: BTreeMap<GarbageKind, CargoHold>,
    pub visibility: u32,
    pub telescope_bonus: u32,
    /// Lets any ship kind cooperate with foreign fleets.
    pub radio: bool,
    /// Tags garbage on the ship's tile so the owner can follow it.
    pub tracker: bool,
    pub base: BaseStats,
    pub behavior: Behavior,
    pub service: Option<PendingService>,
    pub damaged: bool,
    pub task: Option<TaskId>,
    pub rig: Option<RefuelingRig>,
    /// Refueling ship currently pumping fuel into this one.
    pub fuel_donor: Option<ShipId>,
}

/// Static description used to create a ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipBlueprint {
    pub kind: ShipKind,
    pub max_velocity: u32,
    pub acceleration: u32,
    pub max_fuel: u32,
    pub fuel_consumption: u32,
    #[serde(default)]
    pub visibility: u32,
    #[serde(default)]
    pub cargo: BTreeMap<GarbageKind, u32>,
    #[serde(default)]
    pub refueling_capacity: u32,
    #[serde(default = "default_refueling_time")]
    pub refueling_time: u32,
}

fn default_refueling_time() -> u32 {
    2
}

impl Ship {
    pub fn from_blueprint(
        id: ShipId,
        owner: CorporationId,
        tile: TileId,
        blueprint: &ShipBlueprint,
    ) -> Self {
        let cargo = blueprint
            .cargo
            .iter()
            .map(|(kind, max)| (*kind, CargoHold::empty(*max)))
            .collect();
        let rig = (blueprint.kind == ShipKind::Refueling).then(|| {
            RefuelingRig::new(blueprint.refueling_capacity, blueprint.refueling_time)
        });
        Self {
            id,
            kind: blueprint.kind,
            owner,
            tile,
            velocity: 0,
            acceleration: blueprint.acceleration,
            max_velocity: blueprint.max_velocity,
            fuel: blueprint.max_fuel,
            max_fuel: blueprint.max_fuel,
            fuel_consumption: blueprint.fuel_consumption,
            cargo,
            visibility: blueprint.visibility,
            telescope_bonus: 0,
            radio: false,
            tracker: false,
            base: BaseStats {
                acceleration: blueprint.acceleration,
                max_velocity: blueprint.max_velocity,
                fuel_consumption: blueprint.fuel_consumption,
            },
            behavior: Behavior::Default,
            service: None,
            damaged: false,
            task: None,
            rig,
            fuel_donor: None,
        }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn sight(&self) -> u32 {
        self.visibility + self.telescope_bonus
    }

    pub fn is_low_on_fuel(&self) -> bool {
        self.fuel.saturating_mul(2) < self.max_fuel
    }

    pub fn full_holds(&self) -> impl Iterator<Item = GarbageKind> + '_ {
        self.cargo
            .iter()
            .filter(|(_, hold)| hold.max > 0 && hold.is_full())
            .map(|(kind, _)| *kind)
    }

    pub fn can_carry(&self, kind: GarbageKind) -> bool {
        self.cargo.get(&kind).is_some_and(|hold| hold.remaining > 0)
    }

    /// Tiles reachable this tick on the current velocity alone.
    pub fn velocity_range(&self) -> u32 {
        self.velocity / TILE_LENGTH
    }

    /// Tiles reachable on the fuel in the tank.
    pub fn fuel_range(&self) -> u32 {
        if self.fuel_consumption == 0 {
            u32::MAX
        } else {
            self.fuel / self.fuel_consumption
        }
    }

    pub fn accelerate(&mut self) {
        self.velocity = (self.velocity + self.acceleration).min(self.max_velocity);
    }

    pub fn is_transfer_provider(&self) -> bool {
        self.rig.as_ref().is_some_and(RefuelingRig::is_busy)
    }

    /// Drops all cargo overboard, returning how much was lost.
    pub fn lose_cargo(&mut self) -> u32 {
        self.cargo.values_mut().map(CargoHold::unload).sum()
    }

    /// Empties every hold, returning what was aboard per kind.
    pub fn spill_cargo(&mut self) -> Vec<(GarbageKind, u32)> {
        self.cargo
            .iter_mut()
            .map(|(kind, hold)| (*kind, hold.unload()))
            .filter(|(_, amount)| *amount > 0)
            .collect()
    }

    /// Restores the undamaged figures. Consumption raised by a storm drops
    /// back to the base value as well.
    pub fn repair(&mut self) {
        self.acceleration = self.base.acceleration;
        self.max_velocity = self.base.max_velocity;
        self.fuel_consumption = self.base.fuel_consumption;
        self.damaged = false;
    }
}
