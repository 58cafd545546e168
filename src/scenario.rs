use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ScenarioError,
    systems::{EventKind, EventSystem, ScheduledEvent},
    world::{
        Coord, Corporation, CorporationId, Direction, Garbage, GarbageId, GarbageKind, Grid,
        Harbor, HarborId, OceanCurrent, RefuelingStation, Reward, Ship, ShipBlueprint, ShipId,
        ShipKind, Shipyard, Task, TaskId, TaskKind, TaskState, Tile, TileId, TileKind,
        UnloadingStation, World,
    },
};

fn default_seed() -> u64 {
    42
}

fn default_snapshot_interval_ticks() -> u64 {
    0
}

fn default_intensity() -> u32 {
    1
}

fn default_delivery_time() -> u32 {
    3
}

fn default_refuel_limit() -> u32 {
    u32::MAX
}

fn default_purchase_blueprint() -> ShipBlueprint {
    ShipBlueprint {
        kind: ShipKind::Refueling,
        max_velocity: 30,
        acceleration: 10,
        max_fuel: 1000,
        fuel_consumption: 5,
        visibility: 1,
        cargo: BTreeMap::new(),
        refueling_capacity: 1000,
        refueling_time: 2,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    pub map: ScenarioMap,
    #[serde(default)]
    pub currents: Vec<ScenarioCurrent>,
    /// Tiles closed from the start. They never reopen.
    #[serde(default)]
    pub restricted: Vec<TileId>,
    #[serde(default)]
    pub harbors: Vec<ScenarioHarbor>,
    pub corporations: Vec<ScenarioCorporation>,
    #[serde(default)]
    pub garbage: Vec<ScenarioGarbage>,
    #[serde(default)]
    pub tasks: Vec<ScenarioTask>,
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
    #[serde(default = "default_purchase_blueprint")]
    pub purchase_blueprint: ShipBlueprint,
}

/// The ocean, either drawn as rows of characters or listed tile by tile.
///
/// In `rows`, `#` is land, `s` shore, `.` shallow and `~` deep water. Tile ids
/// are assigned row-major from zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMap {
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default)]
    pub tiles: Vec<ScenarioTile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTile {
    pub id: TileId,
    pub kind: TileKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCurrent {
    pub tile: TileId,
    pub speed: u32,
    pub direction: Direction,
    #[serde(default = "default_intensity")]
    pub intensity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioHarbor {
    pub id: HarborId,
    pub tile: TileId,
    #[serde(default)]
    pub corporations: BTreeSet<CorporationId>,
    #[serde(default)]
    pub shipyard: Option<ScenarioShipyard>,
    #[serde(default)]
    pub refueling: Option<ScenarioRefueling>,
    #[serde(default)]
    pub unloading: Option<ScenarioUnloading>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioShipyard {
    pub repair_cost: i64,
    pub ship_cost: i64,
    #[serde(default = "default_delivery_time")]
    pub delivery_time: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRefueling {
    pub refuel_cost: i64,
    #[serde(default = "default_refuel_limit")]
    pub refuel_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioUnloading {
    pub unload_return: i64,
    pub accepts: BTreeSet<GarbageKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCorporation {
    pub id: CorporationId,
    pub name: String,
    #[serde(default)]
    pub credits: i64,
    #[serde(default)]
    pub accepts: BTreeSet<GarbageKind>,
    #[serde(default)]
    pub ships: Vec<ScenarioShip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioShip {
    pub id: ShipId,
    pub tile: TileId,
    /// Starting fuel, full tank when absent.
    #[serde(default)]
    pub fuel: Option<u32>,
    #[serde(flatten)]
    pub blueprint: ShipBlueprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioGarbage {
    pub id: GarbageId,
    pub kind: GarbageKind,
    pub amount: u32,
    pub tile: TileId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTask {
    pub id: TaskId,
    pub ship: ShipId,
    pub kind: TaskKind,
    pub target: TileId,
    #[serde(default)]
    pub reward: Option<Reward>,
    /// Tick the task is handed to the ship.
    #[serde(default)]
    pub tick: u64,
    pub deadline: u64,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads and validates a scenario. Files ending in `.json` are parsed as
    /// JSON, everything else as YAML.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path).map_err(|source| ScenarioError::Io {
            path: path.clone(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Scenario::from_json_str(&data)?
        } else {
            Scenario::from_yaml_str(&data)?
        };
        log::info!("loaded scenario '{}' from {}", scenario.name, path.display());
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml_str(data: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(data)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(data)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(120)
    }

    fn tiles(&self) -> Result<Vec<Tile>, ScenarioError> {
        let map = &self.map;
        match (map.rows.is_empty(), map.tiles.is_empty()) {
            (false, false) => Err(invalid("map gives both rows and tiles")),
            (false, true) => {
                let rows = &map.rows;
                let width = rows.first().map_or(0, |row| row.chars().count());
                let mut tiles = Vec::with_capacity(width * rows.len());
                for (y, row) in rows.iter().enumerate() {
                    if row.chars().count() != width {
                        return Err(invalid(format!("map row {y} is not {width} tiles wide")));
                    }
                    for (x, cell) in row.chars().enumerate() {
                        let kind = match cell {
                            '#' => TileKind::Land,
                            's' => TileKind::Shore,
                            '.' => TileKind::ShallowOcean,
                            '~' => TileKind::DeepOcean,
                            other => {
                                return Err(invalid(format!(
                                    "unknown map cell '{other}' at ({x}, {y})"
                                )))
                            }
                        };
                        let id = TileId::new((y * width + x) as u32);
                        tiles.push(Tile::new(id, kind, Coord::new(x as i32, y as i32)));
                    }
                }
                Ok(tiles)
            }
            (true, false) => map
                .tiles
                .iter()
                .map(|tile| {
                    if tile.x < 0 || tile.y < 0 {
                        return Err(invalid(format!(
                            "{} has negative coordinate ({}, {})",
                            tile.id, tile.x, tile.y
                        )));
                    }
                    Ok(Tile::new(tile.id, tile.kind, Coord::new(tile.x, tile.y)))
                })
                .collect(),
            (true, true) => Ok(Vec::new()),
        }
    }

    /// Checks everything the engine takes for granted. Nothing that passes
    /// here can trip an invariant at setup.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let tiles = self.tiles()?;
        if tiles.is_empty() {
            return Err(invalid("map has no tiles"));
        }
        let grid = Grid::new(tiles)?;
        let tile_kind = |id: TileId, what: &str| {
            grid.tile(id)
                .map(|tile| tile.kind)
                .ok_or_else(|| invalid(format!("{what} refers to unknown {id}")))
        };

        for current in &self.currents {
            tile_kind(current.tile, "current")?;
        }
        for tile in &self.restricted {
            tile_kind(*tile, "restriction")?;
        }

        let corporations = unique(self.corporations.iter().map(|corp| corp.id), "corporation")?;
        unique(self.harbors.iter().map(|harbor| harbor.id), "harbor")?;
        unique(self.harbors.iter().map(|harbor| harbor.tile), "harbor tile")?;
        for harbor in &self.harbors {
            if tile_kind(harbor.tile, "harbor")? != TileKind::Shore {
                return Err(invalid(format!("{} is not on a shore tile", harbor.id)));
            }
            let stations = [
                harbor.shipyard.is_some(),
                harbor.refueling.is_some(),
                harbor.unloading.is_some(),
            ]
            .into_iter()
            .filter(|present| *present)
            .count();
            if stations > 2 {
                return Err(invalid(format!(
                    "{} carries {stations} stations, at most two are allowed",
                    harbor.id
                )));
            }
            if let Some(owner) = harbor
                .corporations
                .iter()
                .find(|owner| !corporations.contains(*owner))
            {
                return Err(invalid(format!("{} names unknown {owner}", harbor.id)));
            }
        }

        let ships = unique(
            self.corporations
                .iter()
                .flat_map(|corp| corp.ships.iter().map(|ship| ship.id)),
            "ship",
        )?;
        for ship in self.corporations.iter().flat_map(|corp| &corp.ships) {
            if !tile_kind(ship.tile, "ship")?.is_passable() {
                return Err(invalid(format!("{} starts on land", ship.id)));
            }
            check_blueprint(&ship.blueprint, &ship.id.to_string())?;
            if ship.fuel.is_some_and(|fuel| fuel > ship.blueprint.max_fuel) {
                return Err(invalid(format!("{} starts with more fuel than fits", ship.id)));
            }
        }
        check_blueprint(&self.purchase_blueprint, "purchase blueprint")?;
        if self.purchase_blueprint.kind != ShipKind::Refueling {
            return Err(invalid("purchased ships must be of the refueling kind"));
        }

        unique(self.garbage.iter().map(|item| item.id), "garbage")?;
        for item in &self.garbage {
            if !tile_kind(item.tile, "garbage")?.is_ocean() {
                return Err(invalid(format!("{} is not on open water", item.id)));
            }
        }

        unique(self.tasks.iter().map(|task| task.id), "task")?;
        for task in &self.tasks {
            tile_kind(task.target, "task")?;
            if !ships.contains(&task.ship) {
                return Err(invalid(format!("{} names unknown {}", task.id, task.ship)));
            }
        }

        for event in &self.events {
            match &event.kind {
                EventKind::Typhoon { tile, strength, .. } => {
                    tile_kind(*tile, "event")?;
                    if !(1..=4).contains(strength) {
                        return Err(invalid(format!(
                            "typhoon at tick {} has strength {strength}, expected 1 to 4",
                            event.tick
                        )));
                    }
                }
                EventKind::Restriction { tile, .. } | EventKind::OilSpill { tile, .. } => {
                    tile_kind(*tile, "event")?;
                }
                EventKind::PirateAttack { ship } => {
                    if !ships.contains(ship) {
                        return Err(invalid(format!("pirate attack names unknown {ship}")));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn build_world(&self) -> Result<World, ScenarioError> {
        self.validate()?;
        let mut world = World::new(Grid::new(self.tiles()?)?, self.purchase_blueprint.clone());

        for current in &self.currents {
            world.set_current(
                current.tile,
                OceanCurrent {
                    speed: current.speed,
                    direction: current.direction,
                    intensity: current.intensity,
                },
            )?;
        }
        for tile in &self.restricted {
            world.set_restricted(*tile, true)?;
        }

        for spec in &self.corporations {
            let mut corp = Corporation::new(spec.id, spec.name.clone(), spec.credits);
            corp.accepts = spec.accepts.clone();
            corp.home_harbors = self
                .harbors
                .iter()
                .filter(|harbor| harbor.corporations.contains(&spec.id))
                .map(|harbor| harbor.id)
                .collect();
            world.add_corporation(corp);
        }

        for spec in &self.harbors {
            world.add_harbor(Harbor {
                id: spec.id,
                tile: spec.tile,
                corporations: spec.corporations.clone(),
                shipyard: spec.shipyard.as_ref().map(|yard| Shipyard {
                    repair_cost: yard.repair_cost,
                    ship_cost: yard.ship_cost,
                    delivery_time: yard.delivery_time,
                }),
                refueling: spec.refueling.as_ref().map(|station| RefuelingStation {
                    refuel_cost: station.refuel_cost,
                    refuel_limit: station.refuel_limit,
                    uses: 0,
                }),
                unloading: spec.unloading.as_ref().map(|station| UnloadingStation {
                    unload_return: station.unload_return,
                    accepts: station.accepts.clone(),
                }),
            })?;
        }

        for corp in &self.corporations {
            for spec in &corp.ships {
                let mut ship = Ship::from_blueprint(spec.id, corp.id, spec.tile, &spec.blueprint);
                if let Some(fuel) = spec.fuel {
                    ship.fuel = fuel;
                }
                world.spawn_ship(ship)?;
            }
        }

        for item in &self.garbage {
            world.insert_garbage(Garbage::new(item.id, item.kind, item.amount, item.tile))?;
        }

        for spec in &self.tasks {
            world.add_task(Task {
                id: spec.id,
                ship: spec.ship,
                kind: spec.kind,
                target: spec.target,
                reward: spec.reward,
                start: spec.tick,
                deadline: spec.deadline,
                state: TaskState::Pending,
            });
        }

        world.check_invariants()?;
        Ok(world)
    }

    /// The hazard schedule, ready to plug into the engine.
    pub fn event_system(&self) -> EventSystem {
        EventSystem::new(self.events.clone())
    }
}

fn invalid(message: impl Into<String>) -> ScenarioError {
    ScenarioError::Validation(message.into())
}

fn unique<T: Ord + Copy + std::fmt::Display>(
    ids: impl Iterator<Item = T>,
    what: &str,
) -> Result<BTreeSet<T>, ScenarioError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(invalid(format!("duplicate {what} {id}")));
        }
    }
    Ok(seen)
}

fn check_blueprint(blueprint: &ShipBlueprint, owner: &str) -> Result<(), ScenarioError> {
    if blueprint.max_velocity == 0 || blueprint.acceleration == 0 || blueprint.max_fuel == 0 {
        return Err(invalid(format!(
            "{owner} needs positive max_velocity, acceleration and max_fuel"
        )));
    }
    if let Some((kind, _)) = blueprint.cargo.iter().find(|(_, max)| **max == 0) {
        return Err(invalid(format!("{owner} has an empty {kind} hold")));
    }
    Ok(())
}
