//! The cycle scheduler ("computation runner")
//!
//! One cycle walks IDLE -> DISPATCH -> BARRIER -> INTEGRATE -> PUBLISH:
//! - DISPATCH: skip the cycle if the snapshot buffer is full (backpressure),
//!   otherwise reserve a buffer slot, copy the live body list and spawn one
//!   force task per body on the worker pool
//! - BARRIER: leave the rayon scope only when every task has finished;
//!   a panicking task is caught, logged and counted, the others carry on
//! - INTEGRATE: single-threaded [`integrate`] over the same list, then drop
//!   the bodies this cycle reported absent from the live collection
//! - PUBLISH: seal the snapshot into the buffer
//!
//! Tunables are read once at the top of a cycle. A fault outside the
//! per-task boundary stops the runner for good.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info};

use super::body::{Body, BodyId};
use super::collection::BodySet;
use super::forces::{compute_forces, ForceContext, NewtonianGravity};
use super::integrator::integrate;
use super::params::{PhysicsConstants, Tunables};
use super::snapshot::DoubleBuffer;
use crate::error::EngineError;

/// How long the runner sleeps when there is nothing to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pauses {
    pub idle: Duration,         // empty body collection
    pub backpressure: Duration, // snapshot buffer full
}

impl Default for Pauses {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(5),
            backpressure: Duration::from_millis(5),
        }
    }
}

/// Result of a single [`Runner::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A snapshot was sealed
    Completed { cycle: u64, records: usize, removed: usize },
    /// The snapshot buffer was full; nothing was computed
    Backpressured,
    /// No bodies; nothing was computed
    Idle,
}

/// Counters for the runner's lifetime
#[derive(Debug, Default)]
pub struct RunnerStats {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    task_faults: AtomicU64,
}

impl RunnerStats {
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Cycles skipped because the snapshot buffer was full
    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    /// Force tasks that panicked
    pub fn task_faults(&self) -> u64 {
        self.task_faults.load(Ordering::Relaxed)
    }
}

pub struct Runner {
    bodies: Arc<BodySet>,
    buffer: Arc<DoubleBuffer>,
    tunables: Arc<Tunables>,
    constants: PhysicsConstants,
    pauses: Pauses,
    pool: Mutex<Option<(usize, ThreadPool)>>, // (thread count, pool)
    running: AtomicBool,
    stats: RunnerStats,
    #[cfg(test)]
    hooks: hooks::FaultHooks,
}

impl Runner {
    pub fn new(
        bodies: Arc<BodySet>,
        buffer: Arc<DoubleBuffer>,
        tunables: Arc<Tunables>,
        constants: PhysicsConstants,
    ) -> Self {
        Self {
            bodies,
            buffer,
            tunables,
            constants,
            pauses: Pauses::default(),
            pool: Mutex::new(None),
            running: AtomicBool::new(false),
            stats: RunnerStats::default(),
            #[cfg(test)]
            hooks: hooks::FaultHooks::default(),
        }
    }

    pub fn with_pauses(mut self, pauses: Pauses) -> Self {
        self.pauses = pauses;
        self
    }

    pub fn bodies(&self) -> &Arc<BodySet> {
        &self.bodies
    }

    pub fn buffer(&self) -> &Arc<DoubleBuffer> {
        &self.buffer
    }

    pub fn tunables(&self) -> &Arc<Tunables> {
        &self.tunables
    }

    pub fn constants(&self) -> &PhysicsConstants {
        &self.constants
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop after the current cycle. In-flight force tasks
    /// are allowed to finish
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<Result<(), EngineError>>, EngineError> {
        self.running.store(true, Ordering::Release);
        let runner = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("nbsim-runner".into())
            .spawn(move || runner.run_loop())
            .inspect_err(|_| self.stop())?;
        Ok(handle)
    }

    /// Run the loop on the calling thread until [`Runner::stop`] or a fatal fault
    pub fn run(&self) -> Result<(), EngineError> {
        self.running.store(true, Ordering::Release);
        self.run_loop()
    }

    fn run_loop(&self) -> Result<(), EngineError> {
        info!(bodies = self.bodies.len(), threads = self.tunables.threads(), "runner started");
        let result = self.cycle_until_stopped();
        self.stop();
        // dropping the pool joins its worker threads
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        match &result {
            Ok(()) => info!(cycles = self.stats.cycles_completed(), "runner stopped"),
            Err(e) => error!(error = %e, "runner halted"),
        }
        result
    }

    fn cycle_until_stopped(&self) -> Result<(), EngineError> {
        while self.is_running() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.step())).map_err(|cause| {
                EngineError::CycleFault {
                    cycle: self.stats.cycles_completed() + 1,
                    message: panic_message(cause.as_ref()),
                }
            })??;
            match outcome {
                CycleOutcome::Completed { .. } => {}
                CycleOutcome::Backpressured => thread::sleep(self.pauses.backpressure),
                CycleOutcome::Idle => thread::sleep(self.pauses.idle),
            }
        }
        Ok(())
    }

    /// Run exactly one cycle on the calling thread
    pub fn step(&self) -> Result<CycleOutcome, EngineError> {
        let params = self.tunables.cycle_params();
        let bodies = self.bodies.snapshot();
        if bodies.is_empty() {
            return Ok(CycleOutcome::Idle);
        }
        let Some(pending) = self.buffer.publish() else {
            self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(CycleOutcome::Backpressured);
        };

        // DISPATCH + BARRIER
        let ctx = ForceContext {
            bodies: &self.bodies,
            gravity: NewtonianGravity { g: self.constants.gravitational_constant },
            constants: &self.constants,
            restitution: params.restitution,
        };
        {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            let pool = worker_pool(&mut pool, params.threads)?;
            let bodies = &bodies;
            let ctx = &ctx;
            pool.scope(|scope| {
                for body in bodies {
                    scope.spawn(move |_| {
                        let task = panic::catch_unwind(AssertUnwindSafe(|| self.force_task(body, bodies, ctx)));
                        if let Err(cause) = task {
                            self.stats.task_faults.fetch_add(1, Ordering::Relaxed);
                            error!(
                                body = %body.id(),
                                cause = %panic_message(cause.as_ref()),
                                "force task faulted, no contribution this cycle"
                            );
                        }
                    });
                }
            });
        }

        // INTEGRATE
        let records: Vec<_> = bodies.iter().map(|b| integrate(b, params.time_scaling)).collect();
        #[cfg(test)]
        self.hooks.after_integrate(&self.bodies);
        let absent: Vec<BodyId> = records.iter().filter(|r| !r.exists).map(|r| r.id).collect();
        let removed = self.bodies.sweep_reported(&absent);

        // PUBLISH
        let snapshot = pending.seal(records);
        self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
        debug!(cycle = snapshot.cycle, records = snapshot.records.len(), removed, "cycle published");

        Ok(CycleOutcome::Completed {
            cycle: snapshot.cycle,
            records: snapshot.records.len(),
            removed,
        })
    }

    fn force_task(&self, body: &Body, bodies: &[Arc<Body>], ctx: &ForceContext<'_>) {
        #[cfg(test)]
        self.hooks.before_task(body);
        compute_forces(body, bodies, ctx);
    }
}

/// The cached pool, rebuilt when the requested thread count changed
fn worker_pool(cached: &mut Option<(usize, ThreadPool)>, threads: usize) -> Result<&ThreadPool, EngineError> {
    let pool = match cached.take() {
        Some((n, pool)) if n == threads => pool,
        _ => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("nbsim-force-{i}"))
                .build()?;
            debug!(threads, "force worker pool built");
            pool
        }
    };
    Ok(&cached.insert((threads, pool)).1)
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::body::{BodyParams, NVec3};

    fn runner(bodies: Vec<Body>, g: f64) -> Runner {
        Runner::new(
            Arc::new(BodySet::from_bodies(bodies)),
            Arc::new(DoubleBuffer::new(8)),
            Arc::new(Tunables::new(1, 1.0, 1.0)),
            PhysicsConstants {
                gravitational_constant: g,
                ..Default::default()
            },
        )
    }

    fn at(x: f64) -> Body {
        Body::new(BodyParams {
            position: NVec3::new(x, 0.0, 0.0),
            ..Default::default()
        })
    }

    #[test]
    fn faulting_task_is_isolated() {
        let (a, b) = (at(-5.0), at(5.0));
        let (ia, ib) = (a.id(), b.id());
        let mut runner = runner(vec![a, b], 1.0);
        runner.hooks.before_task = Some(Box::new(move |body: &Body| {
            if body.id() == ia {
                panic!("injected fault");
            }
        }));

        let outcome = runner.step().unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { records: 2, removed: 0, .. }));
        assert_eq!(runner.stats().task_faults(), 1);

        // the faulted body got no force, its partner was pulled toward it
        let sa = runner.bodies().find(ia).unwrap().state();
        let sb = runner.bodies().find(ib).unwrap().state();
        assert_eq!(sa.velocity, NVec3::zeros());
        assert!(sb.velocity.x < 0.0);
        assert!(runner.buffer().consume_next().is_some());
    }

    #[test]
    fn fault_outside_tasks_halts_and_withdraws_the_slot() {
        let mut runner = runner(vec![at(0.0)], 0.0);
        runner.hooks.after_integrate = Some(Box::new(|_: &BodySet| panic!("injected fault")));

        let err = runner.run().unwrap_err();
        assert!(matches!(err, EngineError::CycleFault { cycle: 1, .. }), "{err}");
        assert!(!runner.is_running());
        assert!(runner.buffer().is_empty());
        assert_eq!(runner.stats().cycles_completed(), 0);
    }

    #[test]
    fn body_retired_after_integration_is_reported_before_removal() {
        let (a, b) = (at(0.0), at(10.0));
        let victim = b.id();
        let mut runner = runner(vec![a, b], 0.0);
        runner.hooks.after_integrate = Some(Box::new(move |bodies: &BodySet| {
            if let Some(body) = bodies.find(victim) {
                body.retire();
            }
        }));

        // integrated while alive, so it stays for one more cycle
        let outcome = runner.step().unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { removed: 0, .. }));
        let snap = runner.buffer().consume_next().unwrap();
        assert!(snap.records.iter().find(|r| r.id == victim).unwrap().exists);
        assert!(runner.bodies().find(victim).is_some());

        // reported absent, then swept
        let outcome = runner.step().unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { records: 2, removed: 1, .. }));
        let snap = runner.buffer().consume_next().unwrap();
        assert!(!snap.records.iter().find(|r| r.id == victim).unwrap().exists);
        assert!(runner.bodies().find(victim).is_none());
        assert_eq!(runner.bodies().len(), 1);
    }
}
