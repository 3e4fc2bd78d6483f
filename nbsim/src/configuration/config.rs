//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – runner options (threads, time scaling, restitution, snapshot queue)
//! - [`PhysicsConstants`] – gravity and the hand-tuned collision constants
//! - [`BodyConfig`]       – initial state and behavior of each body
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//! An example scenario YAML matching these types:
//!
//! ```yaml
//! engine:
//!   threads: 4                # force worker pool size
//!   smoothing: 0.01           # time scaling applied by the integrator
//!   restitution: 1.0          # global coefficient of restitution
//!   queue_capacity: 3         # snapshots buffered ahead of the consumer
//!   idle_pause_ms: 5
//!   backpressure_pause_ms: 5
//!
//! physics:
//!   gravitational_constant: 1.0
//!   max_fragments: 2000
//!   fragments_per_cycle: 100
//!
//! bodies:
//!   - x: [ 0.0, 0.0, 0.0 ]
//!     v: [ 0.0, 0.0, 0.0 ]
//!     m: 1000.0
//!     radius: 10.0
//!     behavior: subsume
//!     light_source: true
//!     pinned: true
//!     name: sun
//!   - x: [ 50.0, 0.0, 0.0 ]
//!     v: [ 0.0, 4.5, 0.0 ]
//!     m: 1.0
//!     radius: 1.0
//!     behavior: fragment
//!     color: "#3080ff"
//!     class: planet
//! ```
//!
//! Every field except `x`, `v`, `m` and `radius` has a default, and the
//! `engine:` / `physics:` sections may be left out entirely.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::simulation::body::{BodyParams, CollisionBehavior, Color, NVec3};
use crate::simulation::params::PhysicsConstants;

/// Runner configuration
/// Every value except the pauses can also be changed live through the control plane
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub threads: usize, // Force worker pool size
    pub smoothing: f64, // Time scaling `dt` used by the integrator
    pub restitution: f64, // Coefficient of restitution applied to elastic bounces, expected in [0, 1]
    pub queue_capacity: usize, // How many snapshots may wait for the consumer before the runner backs off
    pub idle_pause_ms: u64, // Sleep when there are no bodies
    pub backpressure_pause_ms: u64, // Sleep when the snapshot queue is full
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            smoothing: 1.0,
            restitution: 1.0,
            queue_capacity: 3,
            idle_pause_ms: 5,
            backpressure_pause_ms: 5,
        }
    }
}

/// Configuration for a single body’s initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub x: [f64; 3], // Initial position `[x, y, z]`
    pub v: [f64; 3], // Initial velocity `[vx, vy, vz]`
    pub m: f64,      // Mass of the body
    pub radius: f64, // Radius, used for collisions and for visualization scaling
    #[serde(default)]
    pub behavior: CollisionBehavior, // none | subsume | elastic | fragment
    #[serde(default)]
    pub color: Color, // "#rrggbb" or "r,g,b"
    #[serde(default = "default_frag_factor")]
    pub frag_factor: f64, // Velocity-change fraction above which a fragment body breaks up
    #[serde(default = "default_frag_step")]
    pub frag_step: f64, // Fragment radius as a fraction of the body radius, in (0, 1]
    #[serde(default)]
    pub light_source: bool,
    #[serde(default)]
    pub pinned: bool, // Survives partial bulk removal
    #[serde(default)]
    pub telemetry: bool, // Log this body's state every cycle
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

fn default_frag_factor() -> f64 {
    BodyParams::default().frag_factor
}

fn default_frag_step() -> f64 {
    BodyParams::default().frag_step
}

impl BodyConfig {
    fn check(&self) -> Result<(), String> {
        for (what, v) in [("x", &self.x), ("v", &self.v)] {
            if v.iter().any(|c| !c.is_finite()) {
                return Err(format!("`{what}` has a non-finite component"));
            }
        }
        for (what, value) in [("m", self.m), ("radius", self.radius)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("`{what}` must be positive, got {value}"));
            }
        }
        if !(self.frag_step > 0.0 && self.frag_step <= 1.0) {
            return Err(format!("`frag_step` must be in (0, 1], got {}", self.frag_step));
        }
        if !(self.frag_factor.is_finite() && self.frag_factor >= 0.0) {
            return Err(format!("`frag_factor` must be non-negative, got {}", self.frag_factor));
        }
        Ok(())
    }

    /// Runtime parameters; only meaningful after [`ScenarioConfig::validate`]
    pub fn to_params(&self) -> BodyParams {
        BodyParams {
            position: NVec3::from(self.x),
            velocity: NVec3::from(self.v),
            mass: self.m,
            radius: self.radius,
            behavior: self.behavior,
            color: self.color,
            frag_factor: self.frag_factor,
            frag_step: self.frag_step,
            light_source: self.light_source,
            pinned: self.pinned,
            telemetry: self.telemetry,
            name: self.name.clone(),
            class: self.class.clone(),
        }
    }
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig, // Runner configuration
    #[serde(default)]
    pub physics: PhysicsConstants, // Gravity and collision constants
    #[serde(default)]
    pub bodies: Vec<BodyConfig>, // Bodies present at start-up
}

impl ScenarioConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: ScenarioConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Reject non-finite vectors and non-positive sizes before anything is built.
    /// Vector length is already enforced by the `[f64; 3]` fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if e.threads == 0 {
            return Err(ConfigError::Engine("`threads` must be at least 1".into()));
        }
        if e.queue_capacity == 0 {
            return Err(ConfigError::Engine("`queue_capacity` must be at least 1".into()));
        }
        if !e.smoothing.is_finite() || !e.restitution.is_finite() {
            return Err(ConfigError::Engine("`smoothing` and `restitution` must be finite".into()));
        }
        for (index, body) in self.bodies.iter().enumerate() {
            body.check().map_err(|message| ConfigError::Body { index, message })?;
        }
        Ok(())
    }
}
