//! Explicit Euler step run once per body after the force barrier
//!
//! Runs single-threaded over the dispatch snapshot, so it is the only
//! writer of position and velocity at that point.

use tracing::{info, warn};

use super::body::{Body, NVec3};
use super::snapshot::RenderRecord;

/// Advance one body by `time_scaling` and produce its render record.
///
/// - a retired body yields an absent record without moving
/// - a body that resolved a collision this cycle keeps its post-collision
///   velocity; otherwise `v += time_scaling * f / m`
/// - `x += time_scaling * v` for every live body
/// - a non-finite result retires the body instead of spreading NaNs
pub fn integrate(body: &Body, time_scaling: f64) -> RenderRecord {
    let mut state = body.write();
    let force = std::mem::replace(&mut state.force, NVec3::zeros());
    let collided = std::mem::replace(&mut state.collided, false);

    if !state.exists {
        return RenderRecord::from_state(body.id(), &state);
    }

    let mass = state.mass;
    if !collided && mass > 0.0 {
        state.velocity += time_scaling * force / mass;
    }
    let velocity = state.velocity;
    state.position += time_scaling * velocity;

    if !(state.position.iter().all(|c| c.is_finite()) && state.velocity.iter().all(|c| c.is_finite())) {
        warn!(
            body = %body.id(),
            position = ?state.position,
            velocity = ?state.velocity,
            "non-finite state, retiring body"
        );
        state.retire();
        return RenderRecord::from_state(body.id(), &state);
    }

    if state.telemetry {
        info!(
            target: "telemetry",
            body = %body.id(),
            name = body.name().unwrap_or(""),
            x = state.position.x,
            y = state.position.y,
            z = state.position.z,
            vx = state.velocity.x,
            vy = state.velocity.y,
            vz = state.velocity.z,
            mass = state.mass,
            radius = state.radius,
            "telemetry"
        );
    }

    RenderRecord::from_state(body.id(), &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::body::BodyParams;

    #[test]
    fn free_body_drifts_by_scaled_velocity() {
        let body = Body::new(BodyParams {
            velocity: NVec3::new(1.0, -2.0, 0.5),
            ..Default::default()
        });
        let rec = integrate(&body, 0.5);
        assert!(rec.exists);
        assert_eq!((rec.x, rec.y, rec.z), (0.5, -1.0, 0.25));
    }

    #[test]
    fn force_is_consumed_once() {
        let body = Body::new(BodyParams { mass: 2.0, ..Default::default() });
        body.write().force = NVec3::new(4.0, 0.0, 0.0);
        integrate(&body, 1.0);
        assert_eq!(body.state().velocity, NVec3::new(2.0, 0.0, 0.0));
        assert_eq!(body.state().force, NVec3::zeros());
        integrate(&body, 1.0);
        assert_eq!(body.state().velocity, NVec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn collided_body_ignores_force_and_clears_flag() {
        let body = Body::new(BodyParams::default());
        {
            let mut s = body.write();
            s.force = NVec3::new(10.0, 0.0, 0.0);
            s.collided = true;
        }
        integrate(&body, 1.0);
        let s = body.state();
        assert_eq!(s.velocity, NVec3::zeros());
        assert!(!s.collided);
    }

    #[test]
    fn nan_position_retires_body() {
        let body = Body::new(BodyParams {
            velocity: NVec3::new(f64::NAN, 0.0, 0.0),
            ..Default::default()
        });
        let rec = integrate(&body, 1.0);
        assert!(!rec.exists);
        assert!(!body.exists());
        assert_eq!(body.state().mass, 0.0);
    }
}
