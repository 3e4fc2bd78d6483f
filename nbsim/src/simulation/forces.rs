//! The per-body force task
//!
//! Each cycle the scheduler runs [`compute_forces`] once per body, in
//! parallel. A task:
//! - sums Newtonian gravity from every other active body into its own
//!   scratch force (only this task writes it)
//! - resolves at most one collision for its body, under the advisory
//!   locks of both bodies of the pair
//! - for a fragmenting body, emits the next batch of fragments instead

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, trace};

use super::body::{try_lock_pair, Body, BodyParams, BodyState, CollisionBehavior, NVec3};
use super::collection::BodySet;
use super::collision::{elastic_outcome, should_fragment, Kinematics};
use super::params::PhysicsConstants;

/// Newtonian gravity between point masses, no softening
#[derive(Debug, Clone, Copy)]
pub struct NewtonianGravity {
    pub g: f64, // gravitational constant
}

impl NewtonianGravity {
    /// Force on `this` from `other`: `G m1 m2 / d^2` along `separation`
    /// (which points from `this` to `other`)
    pub fn force_between(&self, this: &BodyState, other: &BodyState, separation: NVec3, distance: f64) -> NVec3 {
        if distance <= 0.0 {
            return NVec3::zeros();
        }
        let magnitude = self.g * this.mass * other.mass / (distance * distance);
        separation * (magnitude / distance)
    }
}

/// Everything a force task reads besides the bodies themselves
#[derive(Debug, Clone, Copy)]
pub struct ForceContext<'a> {
    pub bodies: &'a BodySet, // fragments are inserted here
    pub gravity: NewtonianGravity,
    pub constants: &'a PhysicsConstants,
    pub restitution: f64,
}

/// Force task of one body against the dispatch snapshot `others`
pub fn compute_forces(body: &Body, others: &[Arc<Body>], ctx: &ForceContext<'_>) {
    let mut me = {
        let mut state = body.write();
        state.force = NVec3::zeros();
        *state
    };
    if !me.exists {
        return;
    }
    if me.is_fragmenting() {
        // a breakup begun this cycle emits its first batch next cycle
        if !me.collided {
            emit_fragments(body, ctx);
        }
        return;
    }

    let mut force = NVec3::zeros();
    for other in others {
        if other.id() == body.id() {
            continue;
        }
        let them = other.state();
        if them.is_inert() {
            continue;
        }

        let separation = them.position - me.position;
        let distance = separation.norm();
        if distance > me.radius + them.radius || me.collided {
            force += ctx.gravity.force_between(&me, &them, separation, distance);
            continue;
        }
        if them.collided {
            // already resolved against someone else; retried next cycle
            continue;
        }
        if resolve_collision(body, other, &me, &them, ctx) {
            me = body.state();
            if me.is_inert() {
                break;
            }
        }
    }

    body.write().force = force;
}

/// Dispatch on the pair's behaviors. Returns true if anything changed
fn resolve_collision(body: &Body, other: &Body, me: &BodyState, them: &BodyState, ctx: &ForceContext<'_>) -> bool {
    if me.behavior == CollisionBehavior::Subsume || them.behavior == CollisionBehavior::Subsume {
        subsume(body, other, ctx)
    } else if me.behavior.bounces() && them.behavior.bounces() {
        bounce(body, other, ctx)
    } else {
        false
    }
}

/// The larger body absorbs the smaller one's mass; the smaller is retired
fn subsume(body: &Body, other: &Body, ctx: &ForceContext<'_>) -> bool {
    let Some((mut mine, mut theirs)) = try_lock_pair(body, other) else {
        trace!(body = %body.id(), other = %other.id(), "subsume skipped, pair busy");
        return false;
    };
    if mine.is_inert() || theirs.is_inert() || mine.collided || theirs.collided {
        return false;
    }

    let mine_larger = mine.radius >= theirs.radius;
    let (big, small) = if mine_larger {
        (&mut *mine, &mut *theirs)
    } else {
        (&mut *theirs, &mut *mine)
    };

    // a graze is not enough to merge
    let distance = (big.position - small.position).norm();
    if small.radius + distance > ctx.constants.subsume_overlap_factor * big.radius {
        return false;
    }

    big.mass += small.mass;
    big.collided = true;
    small.retire();

    let (winner, loser) = if mine_larger {
        (body.id(), other.id())
    } else {
        (other.id(), body.id())
    };
    debug!(%winner, %loser, mass = big.mass, "subsumed");
    true
}

/// Elastic bounce, or the start of a breakup for a hard-hit fragmenting body.
/// The outcome is computed from the locked state, never from the task's copy
fn bounce(body: &Body, other: &Body, ctx: &ForceContext<'_>) -> bool {
    let Some((mut mine, mut theirs)) = try_lock_pair(body, other) else {
        trace!(body = %body.id(), other = %other.id(), "bounce skipped, pair busy");
        return false;
    };
    if mine.is_inert() || theirs.is_inert() || mine.collided || theirs.collided {
        return false;
    }
    let Some(outcome) = elastic_outcome(&Kinematics::from(&*mine), &Kinematics::from(&*theirs)) else {
        return false;
    };
    let outcome = outcome.with_restitution(ctx.restitution);

    let mine_breaks = should_fragment(&mine, mine.velocity, outcome.v1);
    let theirs_breaks = should_fragment(&theirs, theirs.velocity, outcome.v2);

    for (state, velocity, breaks) in [(&mut *mine, outcome.v1, mine_breaks), (&mut *theirs, outcome.v2, theirs_breaks)] {
        if breaks {
            state.begin_fragmentation(ctx.constants);
        } else {
            state.velocity = velocity;
        }
        state.collided = true;
    }

    debug!(
        body = %body.id(),
        other = %other.id(),
        body_fragments = mine_breaks,
        other_fragments = theirs_breaks,
        "bounced"
    );
    true
}

/// Emit the next batch of fragments; on the last batch the body itself
/// becomes a plain elastic fragment
fn emit_fragments(body: &Body, ctx: &ForceContext<'_>) {
    let (parent, frag, batch) = {
        let mut state = body.write();
        let Some(mut frag) = state.fragmentation else {
            return;
        };
        let batch = frag.remaining.min(ctx.constants.fragments_per_cycle.max(1));
        frag.remaining -= batch;
        frag.spread = (frag.spread * ctx.constants.fragment_shrink_factor).max(frag.fragment_radius);

        let parent = *state;
        if frag.remaining == 0 {
            state.fragmentation = None;
            state.behavior = CollisionBehavior::Elastic;
            state.mass = frag.fragment_mass;
            state.radius = frag.fragment_radius;
        } else {
            state.fragmentation = Some(frag);
            state.mass = (state.mass - f64::from(batch) * frag.fragment_mass).max(frag.fragment_mass);
            state.radius = frag.spread;
        }
        (parent, frag, batch)
    };

    let mut rng = rand::thread_rng();
    let fragments: Vec<Body> = (0..batch)
        .map(|_| {
            Body::new(BodyParams {
                position: frag.origin + random_in_ball(&mut rng, frag.spread),
                velocity: parent.velocity,
                mass: frag.fragment_mass,
                radius: frag.fragment_radius,
                behavior: CollisionBehavior::Elastic,
                color: parent.color,
                frag_factor: parent.frag_factor,
                frag_step: parent.frag_step,
                light_source: false,
                pinned: false,
                telemetry: false,
                name: None,
                class: body.class().map(str::to_owned),
            })
        })
        .collect();
    ctx.bodies.insert_many(fragments);

    debug!(body = %body.id(), emitted = batch, remaining = frag.remaining, "fragments emitted");
    if frag.remaining == 0 {
        debug!(body = %body.id(), "fragmentation finished");
    }
}

/// Uniform point inside a ball of the given radius
fn random_in_ball(rng: &mut impl Rng, radius: f64) -> NVec3 {
    loop {
        let p = NVec3::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
        if p.norm_squared() <= 1.0 {
            return p * radius;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_is_zero_at_zero_distance() {
        let g = NewtonianGravity { g: 1.0 };
        let s = Body::new(BodyParams::default()).state();
        assert_eq!(g.force_between(&s, &s, NVec3::zeros(), 0.0), NVec3::zeros());
    }

    fn colliding_pair(rock_behavior: CollisionBehavior) -> (Arc<Body>, Arc<Body>) {
        let rock = Body::new(BodyParams {
            position: NVec3::new(-0.9, 0.0, 0.0),
            velocity: NVec3::new(1.0, 0.0, 0.0),
            behavior: rock_behavior,
            frag_factor: 0.1,
            frag_step: 0.5,
            ..Default::default()
        });
        let other = Body::new(BodyParams {
            position: NVec3::new(0.9, 0.0, 0.0),
            velocity: NVec3::new(-1.0, 0.0, 0.0),
            behavior: CollisionBehavior::Elastic,
            ..Default::default()
        });
        (Arc::new(rock), Arc::new(other))
    }

    #[test]
    fn bounce_uses_state_changed_after_the_task_copied_it() {
        let (a, b) = colliding_pair(CollisionBehavior::Elastic);
        let (stale_a, stale_b) = (a.state(), b.state());
        // a control-plane edit lands between the copy and the pair lock
        a.write().velocity = NVec3::zeros();

        let set = BodySet::new();
        let constants = PhysicsConstants::default();
        let ctx = ForceContext {
            bodies: &set,
            gravity: NewtonianGravity { g: 0.0 },
            constants: &constants,
            restitution: 1.0,
        };
        assert!(resolve_collision(&a, &b, &stale_a, &stale_b, &ctx));

        // equal masses swap the current velocities
        assert!((a.state().velocity - NVec3::new(-1.0, 0.0, 0.0)).norm() < 1e-9);
        assert!(b.state().velocity.norm() < 1e-9);
    }

    #[test]
    fn breakup_started_by_the_partner_emits_nothing_that_cycle() {
        let (rock, other) = colliding_pair(CollisionBehavior::Fragment);
        let set = BodySet::new();
        let constants = PhysicsConstants::default();
        let ctx = ForceContext {
            bodies: &set,
            gravity: NewtonianGravity { g: 0.0 },
            constants: &constants,
            restitution: 1.0,
        };
        let all = vec![Arc::clone(&rock), Arc::clone(&other)];

        // partner first: it starts the rock's breakup
        compute_forces(&other, &all, &ctx);
        assert!(rock.state().is_fragmenting());
        compute_forces(&rock, &all, &ctx);
        assert!(set.is_empty());
        assert_eq!(rock.state().fragmentation.unwrap().remaining, 7);

        // after integration clears the collision flag the batch goes out
        rock.write().collided = false;
        compute_forces(&rock, &all, &ctx);
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn random_points_stay_inside_the_ball() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            assert!(random_in_ball(&mut rng, 2.5).norm() <= 2.5 + 1e-12);
        }
    }
}
