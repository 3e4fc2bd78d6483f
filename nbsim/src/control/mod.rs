//! The control plane ("configurables")
//!
//! A thin facade over the live body collection, the snapshot buffer and
//! the tunables the runner shares. It runs on whatever thread the remote
//! control surface calls from, concurrently with the runner. Tunables
//! apply from the next cycle; body changes are visible to the next
//! dispatch.

pub mod mutation;
pub mod selector;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ControlError;
use crate::simulation::body::{Body, BodyId, BodyParams, BodyView};
use crate::simulation::collection::BodySet;
use crate::simulation::engine::Runner;
use crate::simulation::params::Tunables;
use crate::simulation::snapshot::DoubleBuffer;

use self::mutation::{parse_mutation_list, Mutation};
use self::selector::Selector;

/// Answer to `GetCurrentConfig`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineStatus {
    pub body_count: usize,
    pub queue_capacity: usize,
    pub thread_count: usize,
    pub smoothing: f64,
    pub restitution: f64,
}

/// Answer to `ModBody`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModOutcome {
    /// No existing body matched the selector
    NoMatch,
    AllModified,
    /// Some matches were busy in a collision and left alone
    SomeModified,
    NoneModified,
}

impl ModOutcome {
    fn from_counts(matched: usize, modified: usize) -> Self {
        if matched == 0 {
            ModOutcome::NoMatch
        } else if modified == matched {
            ModOutcome::AllModified
        } else if modified == 0 {
            ModOutcome::NoneModified
        } else {
            ModOutcome::SomeModified
        }
    }
}

#[derive(Debug, Clone)]
pub struct Configurables {
    bodies: Arc<BodySet>,
    buffer: Arc<DoubleBuffer>,
    tunables: Arc<Tunables>,
}

impl Configurables {
    pub fn new(bodies: Arc<BodySet>, buffer: Arc<DoubleBuffer>, tunables: Arc<Tunables>) -> Self {
        Self { bodies, buffer, tunables }
    }

    /// Share the runner's collection, buffer and tunables
    pub fn for_runner(runner: &Runner) -> Self {
        Self::new(
            Arc::clone(runner.bodies()),
            Arc::clone(runner.buffer()),
            Arc::clone(runner.tunables()),
        )
    }

    pub fn computation_threads(&self) -> usize {
        self.tunables.threads()
    }

    pub fn set_computation_threads(&self, count: usize) -> Result<(), ControlError> {
        if count == 0 {
            return Err(ControlError::ZeroThreads);
        }
        self.tunables.set_threads(count);
        info!(threads = count, "computation threads set");
        Ok(())
    }

    pub fn result_queue_size(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn set_result_queue_size(&self, size: usize) -> Result<(), ControlError> {
        if size == 0 {
            return Err(ControlError::ZeroQueueSize);
        }
        self.buffer.set_capacity(size);
        info!(capacity = size, "result queue size set");
        Ok(())
    }

    pub fn smoothing(&self) -> f64 {
        self.tunables.smoothing()
    }

    pub fn set_smoothing(&self, factor: f64) -> Result<(), ControlError> {
        finite("smoothing", factor)?;
        self.tunables.set_smoothing(factor);
        info!(smoothing = factor, "smoothing set");
        Ok(())
    }

    pub fn restitution_coefficient(&self) -> f64 {
        self.tunables.restitution()
    }

    /// Values outside `[0, 1]` are accepted as-is
    pub fn set_restitution_coefficient(&self, value: f64) -> Result<(), ControlError> {
        finite("restitution coefficient", value)?;
        self.tunables.set_restitution(value);
        info!(restitution = value, "restitution coefficient set");
        Ok(())
    }

    /// Bodies that still exist; retired ones awaiting the sweep are not counted
    pub fn body_count(&self) -> usize {
        self.bodies.select(Body::exists).len()
    }

    /// Retire bodies in bulk, returning how many were retired.
    ///
    /// `-1` retires everything including pinned bodies. A positive count
    /// retires up to that many non-pinned bodies, sampled evenly across
    /// the collection
    pub fn remove_bodies(&self, count: i64) -> Result<usize, ControlError> {
        let victims = match count {
            -1 => self.bodies.select(Body::exists),
            0 => Vec::new(),
            n if n > 0 => {
                let candidates = self.bodies.select(|b| b.exists() && !b.read().pinned);
                evenly_sampled(candidates, usize::try_from(n).unwrap_or(usize::MAX))
            }
            n => return Err(ControlError::InvalidRemoveCount(n)),
        };
        for body in &victims {
            body.retire();
        }
        info!(requested = count, removed = victims.len(), "bodies removed");
        Ok(victims.len())
    }

    /// Insert a new body; it joins the simulation at the next dispatch
    pub fn add_body(&self, params: BodyParams) -> Result<BodyId, ControlError> {
        for (what, v) in [("position", params.position), ("velocity", params.velocity)] {
            for c in v.iter() {
                finite(what, *c)?;
            }
        }
        positive("mass", params.mass)?;
        positive("radius", params.radius)?;
        positive("fragStep", params.frag_step)?;
        finite("fragFactor", params.frag_factor)?;

        let body = self.bodies.insert(Body::new(params));
        debug!(body = %body.id(), name = body.name(), class = body.class(), "body added");
        Ok(body.id())
    }

    /// Apply `mutations` to every existing body matching `selector`.
    ///
    /// A body whose advisory lock is held (mid-collision) is skipped and
    /// counted as not modified
    pub fn mod_body(&self, selector: &Selector, mutations: &[Mutation]) -> ModOutcome {
        // selection reads only the immutable labels; state is touched under try_lock alone
        let candidates = self.bodies.select(|b| selector.matches(b));
        let (mut matched, mut modified) = (0, 0);
        for body in &candidates {
            let Some(mut state) = body.try_lock() else {
                debug!(body = %body.id(), "body busy, not modified");
                matched += 1;
                continue;
            };
            if !state.exists {
                continue;
            }
            matched += 1;
            for m in mutations {
                m.apply(&mut state);
            }
            modified += 1;
        }
        let outcome = ModOutcome::from_counts(matched, modified);
        debug!(%selector, matched, modified, ?outcome, "bodies modified");
        outcome
    }

    /// String form of [`Configurables::mod_body`]: `selector` as `id=…`,
    /// `name=…` or `class=…`, `mutations` as a whitespace-separated token list
    pub fn mod_body_str(&self, selector: &str, mutations: &str) -> Result<ModOutcome, ControlError> {
        let selector: Selector = selector.parse()?;
        Ok(self.mod_body(&selector, &parse_mutation_list(mutations)))
    }

    pub fn current_config(&self) -> EngineStatus {
        EngineStatus {
            body_count: self.body_count(),
            queue_capacity: self.result_queue_size(),
            thread_count: self.computation_threads(),
            smoothing: self.smoothing(),
            restitution: self.restitution_coefficient(),
        }
    }

    pub fn body(&self, id: BodyId) -> Option<BodyView> {
        self.bodies.find(id).map(|b| b.view())
    }
}

fn finite(what: &'static str, value: f64) -> Result<f64, ControlError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ControlError::NonFinite { what, value })
    }
}

fn positive(what: &'static str, value: f64) -> Result<f64, ControlError> {
    if finite(what, value)? > 0.0 {
        Ok(value)
    } else {
        Err(ControlError::NonPositive { what, value })
    }
}

/// `n` items spread evenly over `items`, or all of them if there are not
/// more than `n`
fn evenly_sampled<T>(items: Vec<T>, n: usize) -> Vec<T> {
    if n >= items.len() {
        return items;
    }
    let step = items.len() as f64 / n as f64;
    let mut picks: Vec<usize> = (0..n).map(|i| (i as f64 * step) as usize).collect();
    picks.dedup();
    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picks.binary_search(i).is_ok())
        .map(|(_, item)| item)
        .collect()
}
