use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    error::InvariantError,
    trace::{TraceEvent, TraceSink},
    world::{Reward, Ship, TaskId, TaskState, World},
};

/// Activates scheduled tasks, closes the ones that were reached or ran out
/// of time, and hands out rewards.
pub struct TaskSystem;

impl TaskSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TaskSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for TaskSystem {
    fn name(&self) -> &str {
        "tasks"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        trace: &mut dyn TraceSink,
    ) -> Result<()> {
        let open: Vec<TaskId> = world
            .tasks()
            .filter(|task| task.is_open())
            .map(|task| task.id)
            .collect();
        for task_id in open {
            settle(world, task_id, ctx.tick, trace)?;
        }
        Ok(())
    }
}

fn settle(
    world: &mut World,
    task_id: TaskId,
    tick: u64,
    trace: &mut dyn TraceSink,
) -> Result<(), InvariantError> {
    let task = world.task(task_id)?.clone();
    let Ok(ship) = world.ship(task.ship) else {
        log::warn!("{task_id} names missing {}", task.ship);
        world.task_mut(task_id)?.state = TaskState::Failed;
        return Ok(());
    };
    let on_target = ship.tile() == task.target;
    let ship_free = ship.task.is_none();

    match task.state {
        TaskState::Active if on_target => {
            world.task_mut(task_id)?.state = TaskState::Completed;
            let ship = world.ship_mut(task.ship)?;
            ship.task = None;
            if let Some(reward) = task.reward {
                apply_reward(ship, reward);
            }
            trace.record(
                tick,
                TraceEvent::TaskCompleted {
                    task: task_id,
                    ship: task.ship,
                    reward: task.reward,
                },
            );
        }
        TaskState::Active | TaskState::Pending if tick >= task.deadline => {
            world.task_mut(task_id)?.state = TaskState::Failed;
            let ship = world.ship_mut(task.ship)?;
            if ship.task == Some(task_id) {
                ship.task = None;
            }
            trace.record(
                tick,
                TraceEvent::TaskFailed {
                    task: task_id,
                    ship: task.ship,
                },
            );
        }
        TaskState::Pending if task.start <= tick && ship_free => {
            world.task_mut(task_id)?.state = TaskState::Active;
            world.ship_mut(task.ship)?.task = Some(task_id);
            trace.record(
                tick,
                TraceEvent::TaskAssigned {
                    task: task_id,
                    ship: task.ship,
                    target: task.target,
                },
            );
        }
        _ => {}
    }
    Ok(())
}

fn apply_reward(ship: &mut Ship, reward: Reward) {
    match reward {
        Reward::Telescope => ship.telescope_bonus = 1,
        Reward::Radio => ship.radio = true,
        Reward::Tracker => ship.tracker = true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::rng::RngManager;
    use crate::trace::MemoryTrace;
    use crate::world::{
        Coord, Corporation, CorporationId, GarbageKind, Grid, ShipBlueprint, ShipId, ShipKind,
        Task, TaskKind, Tile, TileId, TileKind,
    };

    fn world_with_task(start: u64, deadline: u64, reward: Option<Reward>) -> World {
        let tiles = (0..3)
            .map(|x| Tile::new(TileId::new(x as u32), TileKind::DeepOcean, Coord::new(x, 0)))
            .collect();
        let blueprint = ShipBlueprint {
            kind: ShipKind::Collecting,
            max_velocity: 20,
            acceleration: 10,
            max_fuel: 100,
            fuel_consumption: 1,
            visibility: 2,
            cargo: BTreeMap::from([(GarbageKind::Oil, 40)]),
            refueling_capacity: 0,
            refueling_time: 1,
        };
        let mut world = World::new(Grid::new(tiles).unwrap(), blueprint.clone());
        world.add_corporation(Corporation::new(CorporationId::new(0), "Blue", 0));
        world
            .spawn_ship(Ship::from_blueprint(
                ShipId::new(0),
                CorporationId::new(0),
                TileId::new(0),
                &blueprint,
            ))
            .unwrap();
        world.add_task(Task {
            id: TaskId::new(0),
            ship: ShipId::new(0),
            kind: TaskKind::Explore,
            target: TileId::new(2),
            reward,
            start,
            deadline,
            state: TaskState::Pending,
        });
        world
    }

    fn step(world: &mut World, tick: u64) -> MemoryTrace {
        let rng = RngManager::new(1);
        let mut trace = MemoryTrace::new();
        TaskSystem::new()
            .run(&SystemContext { tick, rng: &rng }, world, &mut trace)
            .unwrap();
        trace
    }

    #[test]
    fn task_activates_at_its_start() {
        let mut world = world_with_task(2, 10, None);
        step(&mut world, 1);
        assert!(world.ship(ShipId::new(0)).unwrap().task.is_none());
        step(&mut world, 2);
        assert_eq!(world.ship(ShipId::new(0)).unwrap().task, Some(TaskId::new(0)));
        assert_eq!(world.task(TaskId::new(0)).unwrap().state, TaskState::Active);
    }

    #[test]
    fn reaching_the_target_pays_the_reward() {
        let mut world = world_with_task(0, 10, Some(Reward::Radio));
        step(&mut world, 0);
        world.move_ship(ShipId::new(0), TileId::new(2)).unwrap();
        step(&mut world, 1);
        let ship = world.ship(ShipId::new(0)).unwrap();
        assert!(ship.task.is_none());
        assert!(ship.radio);
        assert!(!ship.tracker);
        assert_eq!(world.task(TaskId::new(0)).unwrap().state, TaskState::Completed);
    }

    #[test]
    fn a_second_telescope_adds_nothing() {
        let mut world = world_with_task(0, 10, Some(Reward::Telescope));
        world.ship_mut(ShipId::new(0)).unwrap().telescope_bonus = 1;
        step(&mut world, 0);
        world.move_ship(ShipId::new(0), TileId::new(2)).unwrap();
        step(&mut world, 1);
        assert_eq!(world.ship(ShipId::new(0)).unwrap().sight(), 3);
    }

    #[test]
    fn deadline_fails_the_task() {
        let mut world = world_with_task(0, 3, Some(Reward::Tracker));
        step(&mut world, 0);
        let trace = step(&mut world, 3);
        assert_eq!(world.task(TaskId::new(0)).unwrap().state, TaskState::Failed);
        assert!(world.ship(ShipId::new(0)).unwrap().task.is_none());
        assert!(!world.ship(ShipId::new(0)).unwrap().tracker);
        assert_eq!(trace.events().len(), 1);
    }
}
