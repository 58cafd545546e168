use serde::{Deserialize, Serialize};

use super::{ShipId, TaskId, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Explore,
    Find,
    Collect,
    Cooperate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reward {
    /// One more tile of sight.
    Telescope,
    /// Cooperation with foreign fleets from any ship kind.
    Radio,
    /// Tags garbage the ship stands on.
    Tracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub ship: ShipId,
    pub kind: TaskKind,
    pub target: TileId,
    pub reward: Option<Reward>,
    pub start: u64,
    pub deadline: u64,
    pub state: TaskState,
}

impl Task {
    pub fn is_open(&self) -> bool {
        matches!(self.state, TaskState::Pending | TaskState::Active)
    }
}
