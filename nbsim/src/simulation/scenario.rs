//! Build a ready-to-run engine from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces the runtime bundle:
//! - the live body collection with every configured body at t = 0
//! - the snapshot buffer sized by `queue_capacity`
//! - the shared tunables (threads, smoothing, restitution)
//! - a [`Runner`] over all of the above and a [`Configurables`] facade
//!   sharing the same state

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::configuration::config::ScenarioConfig;
use crate::control::Configurables;
use crate::simulation::body::Body;
use crate::simulation::collection::BodySet;
use crate::simulation::engine::{Pauses, Runner};
use crate::simulation::params::Tunables;
use crate::simulation::snapshot::DoubleBuffer;

/// A fully-initialized engine: the runner plus the control plane over it
pub struct Scenario {
    pub runner: Arc<Runner>,
    pub control: Configurables,
}

impl Scenario {
    pub fn build_scenario(cfg: &ScenarioConfig) -> Self {
        let bodies = Arc::new(BodySet::from_bodies(cfg.bodies.iter().map(|bc| Body::new(bc.to_params()))));

        let e_cfg = &cfg.engine;
        let buffer = Arc::new(DoubleBuffer::new(e_cfg.queue_capacity));
        let tunables = Arc::new(Tunables::new(e_cfg.threads, e_cfg.smoothing, e_cfg.restitution));
        let pauses = Pauses {
            idle: Duration::from_millis(e_cfg.idle_pause_ms),
            backpressure: Duration::from_millis(e_cfg.backpressure_pause_ms),
        };

        let runner = Arc::new(Runner::new(bodies, buffer, tunables, cfg.physics).with_pauses(pauses));
        let control = Configurables::for_runner(&runner);

        info!(
            bodies = cfg.bodies.len(),
            threads = e_cfg.threads,
            queue_capacity = e_cfg.queue_capacity,
            "scenario built"
        );
        Self { runner, control }
    }
}
