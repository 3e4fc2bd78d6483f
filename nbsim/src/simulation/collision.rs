//! Pure collision math: elastic kinematics and the fragmentation decision
//!
//! Nothing here touches a lock. The force task feeds copies of two bodies'
//! state in and applies the results under the pair's advisory locks.

use std::f64::consts::FRAC_PI_2;

use super::body::{BodyState, CollisionBehavior, Fragmentation, NVec3};
use super::params::PhysicsConstants;

/// The slice of a body's state the elastic solver needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub mass: f64,
    pub radius: f64,
    pub position: NVec3,
    pub velocity: NVec3,
}

impl From<&BodyState> for Kinematics {
    fn from(s: &BodyState) -> Self {
        Self {
            mass: s.mass,
            radius: s.radius,
            position: s.position,
            velocity: s.velocity,
        }
    }
}

/// Post-collision velocities of both bodies plus the center-of-mass velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticOutcome {
    pub v1: NVec3,
    pub v2: NVec3,
    pub v_cm: NVec3,
}

impl ElasticOutcome {
    /// Scale both velocities against the center of mass:
    /// `v' = (v - v_cm) * R + v_cm`. `R = 1` is perfectly elastic,
    /// `R = 0` leaves both bodies moving with the center of mass
    pub fn with_restitution(self, restitution: f64) -> Self {
        let scale = |v: NVec3| (v - self.v_cm) * restitution + self.v_cm;
        Self {
            v1: scale(self.v1),
            v2: scale(self.v2),
            v_cm: self.v_cm,
        }
    }
}

/// Closed-form 3-D elastic collision of two spheres.
///
/// Works in a frame where body 1 sits at the origin, body 2 is at rest and
/// lies on the z-axis. Returns `None` when there is nothing to resolve:
/// zero relative speed, bodies moving apart, or an impact parameter larger
/// than the sum of radii.
///
/// Overlapping bodies are accepted; the engine only calls this for pairs
/// that already touch.
pub fn elastic_outcome(a: &Kinematics, b: &Kinematics) -> Option<ElasticOutcome> {
    let (m1, m2) = (a.mass, b.mass);
    if m1 <= 0.0 || m2 <= 0.0 {
        return None;
    }
    let r12 = a.radius + b.radius;
    let m21 = m2 / m1;

    let x21 = b.position - a.position;
    let v21 = b.velocity - a.velocity;
    let v_cm = (a.velocity * m1 + b.velocity * m2) / (m1 + m2);

    let d = x21.norm();
    let v = v21.norm();
    if v == 0.0 || d == 0.0 || r12 <= 0.0 {
        return None;
    }

    // boost so body 2 is at rest: body 1 moves with -v21
    let vb = -v21;

    // polar angles of body 2 as seen from body 1
    let theta2 = (x21.z / d).clamp(-1.0, 1.0).acos();
    let phi2 = if x21.x == 0.0 && x21.y == 0.0 { 0.0 } else { x21.y.atan2(x21.x) };
    let (st, ct) = theta2.sin_cos();
    let (sp, cp) = phi2.sin_cos();

    // body 1 velocity in the rotated frame (body 2 on the z-axis)
    let mut vx1r = ct * cp * vb.x + ct * sp * vb.y - st * vb.z;
    let mut vy1r = cp * vb.y - sp * vb.x;
    let mut vz1r = st * cp * vb.x + st * sp * vb.y + ct * vb.z;

    let thetav = (vz1r / v).clamp(-1.0, 1.0).acos();
    let phiv = if vx1r == 0.0 && vy1r == 0.0 { 0.0 } else { vy1r.atan2(vx1r) };

    // normalized impact parameter
    let dr = d * thetav.sin() / r12;
    if thetav > FRAC_PI_2 || dr.abs() > 1.0 {
        return None;
    }

    let alpha = (-dr).asin();
    let (sbeta, cbeta) = phiv.sin_cos();
    let t = (thetav + alpha).tan();

    let dvz2 = 2.0 * (vz1r + t * (cbeta * vx1r + sbeta * vy1r)) / ((1.0 + t * t) * (1.0 + m21));
    let vz2r = dvz2;
    let vx2r = t * cbeta * dvz2;
    let vy2r = t * sbeta * dvz2;
    vz1r -= m21 * vz2r;
    vx1r -= m21 * vx2r;
    vy1r -= m21 * vy2r;

    // rotate back and undo the boost
    let unrotate = |x: f64, y: f64, z: f64| {
        NVec3::new(
            ct * cp * x - sp * y + st * cp * z,
            ct * sp * x + cp * y + st * sp * z,
            -st * x + ct * z,
        ) + b.velocity
    };

    Some(ElasticOutcome {
        v1: unrotate(vx1r, vy1r, vz1r),
        v2: unrotate(vx2r, vy2r, vz2r),
        v_cm,
    })
}

/// Sum of per-axis velocity changes relative to the original speed.
///
/// A body at rest has no meaningful ratio: any change counts as infinite
pub fn velocity_change_fraction(before: NVec3, after: NVec3) -> f64 {
    let change = (after - before).abs().sum();
    let speed = before.norm();
    if speed > 0.0 {
        change / speed
    } else if change > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Whether a body breaks up instead of taking the bounce `before -> after`
pub fn should_fragment(state: &BodyState, before: NVec3, after: NVec3) -> bool {
    state.behavior == CollisionBehavior::Fragment
        && velocity_change_fraction(before, after) > state.frag_factor
}

/// How a fragmenting body is divided up.
///
/// `count` fragments are emitted over several cycles, then the body itself
/// shrinks into one more, so `count + 1` equal pieces share mass and volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentPlan {
    pub count: u32,
    pub fragment_mass: f64,
    pub fragment_radius: f64,
}

impl FragmentPlan {
    pub fn new(mass: f64, radius: f64, frag_step: f64, constants: &PhysicsConstants) -> Self {
        let max = constants.max_fragments.max(1);
        // pieces of radius frag_step * R that fit the volume, minus the body itself
        let raw = (frag_step.powi(3).recip()).ceil() - 1.0;
        let count = if !raw.is_finite() {
            max
        } else if raw < 1.0 {
            1
        } else {
            raw.min(f64::from(max)) as u32
        };
        let pieces = f64::from(count + 1);
        Self {
            count,
            fragment_mass: mass / pieces,
            fragment_radius: radius / pieces.cbrt(),
        }
    }
}

impl BodyState {
    /// Enter the fragmenting state at the current position
    pub fn begin_fragmentation(&mut self, constants: &PhysicsConstants) {
        let plan = FragmentPlan::new(self.mass, self.radius, self.frag_step, constants);
        self.fragmentation = Some(Fragmentation {
            remaining: plan.count,
            fragment_mass: plan.fragment_mass,
            fragment_radius: plan.fragment_radius,
            origin: self.position,
            spread: self.radius,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(mass: f64, x: [f64; 3], v: [f64; 3]) -> Kinematics {
        Kinematics {
            mass,
            radius: 1.0,
            position: x.into(),
            velocity: v.into(),
        }
    }

    #[test]
    fn head_on_equal_masses_swap_velocities() {
        let a = ball(1.0, [-0.9, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let b = ball(1.0, [0.9, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let out = elastic_outcome(&a, &b).unwrap();
        assert!((out.v1 - NVec3::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((out.v2 - NVec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!(out.v_cm.norm() < 1e-12);
    }

    #[test]
    fn oblique_collision_conserves_momentum_and_energy() {
        let a = ball(2.0, [0.0, 0.0, 0.0], [1.0, 0.0, 0.2]);
        let b = ball(3.0, [1.5, 0.5, 0.1], [0.0, -0.1, 0.0]);
        let out = elastic_outcome(&a, &b).unwrap();

        let p0 = a.velocity * a.mass + b.velocity * b.mass;
        let p1 = out.v1 * a.mass + out.v2 * b.mass;
        assert!((p0 - p1).norm() < 1e-9, "momentum drift {:?}", p0 - p1);

        let ke = |m: f64, v: NVec3| 0.5 * m * v.norm_squared();
        let e0 = ke(a.mass, a.velocity) + ke(b.mass, b.velocity);
        let e1 = ke(a.mass, out.v1) + ke(b.mass, out.v2);
        assert!((e0 - e1).abs() < 1e-9, "energy drift {}", e0 - e1);
    }

    #[test]
    fn receding_or_resting_pairs_do_not_collide() {
        let a = ball(1.0, [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let b = ball(1.0, [1.5, 0.0, 0.0], [0.0, 0.0, 0.0]);
        assert!(elastic_outcome(&a, &b).is_none());

        let c = ball(1.0, [0.0, 0.0, 0.0], [0.3, 0.3, 0.3]);
        let d = ball(1.0, [1.0, 0.0, 0.0], [0.3, 0.3, 0.3]);
        assert!(elastic_outcome(&c, &d).is_none());
    }

    #[test]
    fn zero_restitution_moves_both_with_center_of_mass() {
        let a = ball(1.0, [-0.9, 0.0, 0.0], [2.0, 0.0, 0.0]);
        let b = ball(1.0, [0.9, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let out = elastic_outcome(&a, &b).unwrap().with_restitution(0.0);
        assert!((out.v1 - out.v_cm).norm() < 1e-12);
        assert!((out.v2 - out.v_cm).norm() < 1e-12);
        assert!((out.v_cm - NVec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn velocity_change_fraction_handles_rest() {
        let v = NVec3::new(2.0, 0.0, 0.0);
        assert!((velocity_change_fraction(v, -v) - 2.0).abs() < 1e-12);
        assert_eq!(velocity_change_fraction(NVec3::zeros(), NVec3::zeros()), 0.0);
        assert!(velocity_change_fraction(NVec3::zeros(), v).is_infinite());
    }

    #[test]
    fn fragment_plan_conserves_mass_and_volume() {
        let c = PhysicsConstants::default();
        let plan = FragmentPlan::new(250.0, 10.0, 0.2, &c);
        assert_eq!(plan.count, 124);
        let pieces = f64::from(plan.count + 1);
        assert!((plan.fragment_mass * pieces - 250.0).abs() < 1e-9);
        assert!((plan.fragment_radius.powi(3) * pieces - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn fragment_plan_is_capped() {
        let c = PhysicsConstants::default();
        assert_eq!(FragmentPlan::new(1.0, 1.0, 0.01, &c).count, c.max_fragments);
        assert_eq!(FragmentPlan::new(1.0, 1.0, 0.0, &c).count, c.max_fragments);
        assert_eq!(FragmentPlan::new(1.0, 1.0, 1.0, &c).count, 1);
    }
}
