use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    rng::RngManager,
    snapshot::SnapshotWriter,
    systems::{
        CollectionPhase, CooperationPhase, DeliveryPhase, DriftSystem, EventSystem,
        MovementPhase, PurchasePhase, RefuelingPhase, RepairPhase, TaskSystem, TrackerPhase,
        UnloadingPhase,
    },
    trace::TraceSink,
    world::{CorporationId, World},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    phases: Vec<Box<dyn Phase>>,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            phases: Vec::new(),
            systems: Vec::new(),
        }
    }

    /// The fixed fleet-operations order: per-corporation phases, then the
    /// world-wide systems.
    pub fn standard(settings: EngineSettings, schedule: EventSystem) -> Self {
        Self::new(settings)
            .with_phase(PurchasePhase::new())
            .with_phase(MovementPhase::new())
            .with_phase(TrackerPhase::new())
            .with_phase(CollectionPhase::new())
            .with_phase(CooperationPhase::new())
            .with_phase(RefuelingPhase::new())
            .with_phase(UnloadingPhase::new())
            .with_phase(RepairPhase::new())
            .with_phase(DeliveryPhase::new())
            .with_system(DriftSystem::new())
            .with_system(schedule)
            .with_system(TaskSystem::new())
    }

    pub fn with_phase(mut self, phase: impl Phase + 'static) -> Self {
        self.phases.push(Box::new(phase));
        self
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            phases: self.phases,
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            settings: self.settings,
        }
    }
}

pub struct Engine {
    rng: RngManager,
    phases: Vec<Box<dyn Phase>>,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    pub fn run(
        &mut self,
        world: &mut World,
        ticks: u64,
        trace: &mut dyn TraceSink,
    ) -> Result<RunSummary> {
        log::info!(
            "running '{}' for {} ticks",
            self.settings.scenario_name,
            ticks
        );
        for _ in 0..ticks {
            self.step(world, trace)?;
        }
        Ok(RunSummary::from_world(world))
    }

    /// Runs one full tick and advances simulated time.
    pub fn step(&mut self, world: &mut World, trace: &mut dyn TraceSink) -> Result<()> {
        let tick = world.tick();
        for corporation in world.corporation_ids() {
            for phase in &mut self.phases {
                let ctx = PhaseContext {
                    tick,
                    corporation,
                    rng: &self.rng,
                };
                phase.run(&ctx, world, trace).with_context(|| {
                    format!("phase '{}' failed for {corporation} at tick {tick}", phase.name())
                })?;
            }
        }
        for system in &mut self.systems {
            let ctx = SystemContext {
                tick,
                rng: &self.rng,
            };
            system
                .run(&ctx, world, trace)
                .with_context(|| format!("system '{}' failed at tick {tick}", system.name()))?;
        }
        world
            .check_invariants()
            .with_context(|| format!("world inconsistent after tick {tick}"))?;
        world.advance_time();
        self.snapshot_writer
            .maybe_write(world, &self.settings.scenario_name)?;
        Ok(())
    }
}

pub struct PhaseContext<'a> {
    pub tick: u64,
    pub corporation: CorporationId,
    pub rng: &'a RngManager,
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub rng: &'a RngManager,
}

/// One step of a corporation's turn.
pub trait Phase {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &PhaseContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()>;
}

/// World-wide work done once per tick after every corporation has moved.
pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CorporationSummary {
    pub name: String,
    pub credits: i64,
    pub ships: usize,
    pub collected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub corporations: BTreeMap<CorporationId, CorporationSummary>,
    pub garbage_left: u64,
}

impl RunSummary {
    pub fn from_world(world: &World) -> Self {
        let corporations = world
            .corporations()
            .map(|corp| {
                (
                    corp.id,
                    CorporationSummary {
                        name: corp.name.clone(),
                        credits: corp.credits(),
                        ships: corp.ships.len(),
                        collected: corp.total_collected(),
                    },
                )
            })
            .collect();
        Self {
            ticks: world.tick(),
            corporations,
            garbage_left: world.garbage().map(|g| u64::from(g.amount)).sum(),
        }
    }
}
