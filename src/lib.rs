pub mod behavior;
pub mod engine;
pub mod error;
pub mod movement;
pub mod pathfinding;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod systems;
pub mod trace;
pub mod visibility;
pub mod world;

pub use engine::{Engine, EngineBuilder, EngineSettings, RunSummary};
pub use error::{InvariantError, ScenarioError};
pub use scenario::{Scenario, ScenarioLoader};
pub use trace::{MemoryTrace, TraceEvent, TraceSink};
