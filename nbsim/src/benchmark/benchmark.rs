use std::sync::Arc;
use std::time::Instant;

use crate::simulation::body::{Body, BodyParams, CollisionBehavior, NVec3};
use crate::simulation::collection::BodySet;
use crate::simulation::engine::{CycleOutcome, Runner};
use crate::simulation::params::{PhysicsConstants, Tunables};
use crate::simulation::snapshot::DoubleBuffer;

/// Time full cycles (fan-out, barrier, integration, publish) for growing
/// body counts and worker pool sizes
pub fn bench_cycles() {
    // Different system sizes to test
    let ns = [200, 400, 800, 1600, 3200];
    let threads = [1, 2, 4, 8];
    let steps = 5; // cycles per measurement

    for n in ns {
        for t in threads {
            let runner = make_runner(n, t);

            // Warm up, also builds the pool
            step_and_drain(&runner);

            let t0 = Instant::now();
            for _ in 0..steps {
                step_and_drain(&runner);
            }
            let per_cycle = t0.elapsed().as_secs_f64() / steps as f64;

            println!("N = {n:5}, threads = {t:2}, cycle = {per_cycle:8.6} s");
        }
    }
}

fn step_and_drain(runner: &Runner) {
    match runner.step() {
        Ok(CycleOutcome::Completed { .. }) => {
            runner.buffer().consume_next();
        }
        Ok(other) => println!("unexpected outcome {other:?}"),
        Err(e) => println!("cycle failed: {e}"),
    }
}

/// Helper to build a runner over `n` spread-out, non-colliding bodies
fn make_runner(n: usize, threads: usize) -> Runner {
    let bodies = (0..n).map(|i| {
        let i_f = i as f64;
        // deterministic positions, no rand needed
        Body::new(BodyParams {
            position: NVec3::new(
                (i_f * 0.37).sin() * 500.0,
                (i_f * 0.13).cos() * 500.0,
                (i_f * 0.07).sin() * 500.0,
            ),
            mass: 1.0,
            radius: 0.01,
            behavior: CollisionBehavior::Elastic,
            ..Default::default()
        })
    });

    let constants = PhysicsConstants {
        gravitational_constant: 0.1,
        ..Default::default()
    };

    Runner::new(
        Arc::new(BodySet::from_bodies(bodies)),
        Arc::new(DoubleBuffer::new(1)),
        Arc::new(Tunables::new(threads, 0.001, 1.0)),
        constants,
    )
}
