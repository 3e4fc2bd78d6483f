pub mod simulation;
pub mod configuration;
pub mod control;
pub mod benchmark;
pub mod error;

pub use simulation::body::{Body, BodyId, BodyParams, BodyState, BodyView, CollisionBehavior, Color, NVec3};
pub use simulation::collection::BodySet;
pub use simulation::engine::{CycleOutcome, Pauses, Runner, RunnerStats};
pub use simulation::params::{PhysicsConstants, Tunables};
pub use simulation::scenario::Scenario;
pub use simulation::snapshot::{DoubleBuffer, RenderRecord, Snapshot};

pub use configuration::config::{BodyConfig, EngineConfig, ScenarioConfig};

pub use control::{Configurables, EngineStatus, ModOutcome};
pub use control::mutation::Mutation;
pub use control::selector::Selector;

pub use error::{ConfigError, ControlError, EngineError, MutationError, ParseError};

pub use benchmark::benchmark::bench_cycles;
