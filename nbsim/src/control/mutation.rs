//! The `key=value` field-mutation language of `ModBody`
//!
//! ```text
//! x=1.5 vy=-2 mass=10 color=#ff8000 collisionBehavior=elastic
//! position=0,0,1 velocity=1,0,0 exists=false
//! ```
//!
//! Keys are case-insensitive. A token with an unknown key or a value that
//! does not parse is dropped on its own; the rest of the list still applies.

use std::str::FromStr;

use tracing::debug;

use crate::error::MutationError;
use crate::simulation::body::{BodyState, CollisionBehavior, Color, NVec3};

/// One field change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    X(f64),
    Y(f64),
    Z(f64),
    Vx(f64),
    Vy(f64),
    Vz(f64),
    Position(NVec3),
    Velocity(NVec3),
    Mass(f64),
    Radius(f64),
    LightSource(bool),
    Behavior(CollisionBehavior),
    Color(Color),
    FragFactor(f64),
    FragStep(f64),
    Telemetry(bool),
    /// Only `false` has an effect: it retires the body
    Exists(bool),
}

impl Mutation {
    pub fn apply(&self, state: &mut BodyState) {
        match *self {
            Mutation::X(v) => state.position.x = v,
            Mutation::Y(v) => state.position.y = v,
            Mutation::Z(v) => state.position.z = v,
            Mutation::Vx(v) => state.velocity.x = v,
            Mutation::Vy(v) => state.velocity.y = v,
            Mutation::Vz(v) => state.velocity.z = v,
            Mutation::Position(p) => state.position = p,
            Mutation::Velocity(v) => state.velocity = v,
            Mutation::Mass(m) => {
                if state.exists {
                    state.mass = m;
                }
            }
            Mutation::Radius(r) => state.radius = r,
            Mutation::LightSource(b) => state.light_source = b,
            Mutation::Behavior(b) => state.behavior = b,
            Mutation::Color(c) => state.color = c,
            Mutation::FragFactor(f) => state.frag_factor = f,
            Mutation::FragStep(f) => state.frag_step = f,
            Mutation::Telemetry(b) => state.telemetry = b,
            Mutation::Exists(true) => {}
            Mutation::Exists(false) => state.retire(),
        }
    }
}

impl FromStr for Mutation {
    type Err = MutationError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| MutationError::Malformed(token.to_string()))?;
        let (key, value) = (key.trim(), value.trim());
        let bad = || MutationError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        let finite = || value.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(bad);
        let positive = || finite().and_then(|v| if v > 0.0 { Ok(v) } else { Err(bad()) });
        let flag = || parse_flag(value).ok_or_else(bad);
        let vector = || parse_vector(value).ok_or_else(bad);

        let mutation = match key.to_ascii_lowercase().as_str() {
            "x" => Mutation::X(finite()?),
            "y" => Mutation::Y(finite()?),
            "z" => Mutation::Z(finite()?),
            "vx" => Mutation::Vx(finite()?),
            "vy" => Mutation::Vy(finite()?),
            "vz" => Mutation::Vz(finite()?),
            "position" => Mutation::Position(vector()?),
            "velocity" => Mutation::Velocity(vector()?),
            "mass" => Mutation::Mass(positive()?),
            "radius" => Mutation::Radius(positive()?),
            "islightsource" => Mutation::LightSource(flag()?),
            "collisionbehavior" => Mutation::Behavior(value.parse().map_err(|_| bad())?),
            "color" => Mutation::Color(value.parse().map_err(|_| bad())?),
            "fragfactor" => {
                let f = finite()?;
                if f < 0.0 {
                    return Err(bad());
                }
                Mutation::FragFactor(f)
            }
            "fragstep" => {
                let f = positive()?;
                if f > 1.0 {
                    return Err(bad());
                }
                Mutation::FragStep(f)
            }
            "telemetry" => Mutation::Telemetry(flag()?),
            "exists" => Mutation::Exists(flag()?),
            _ => return Err(MutationError::UnknownKey(key.to_string())),
        };
        Ok(mutation)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_vector(value: &str) -> Option<NVec3> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [x, y, z] => Some(NVec3::new(*x, *y, *z)),
        _ => None,
    }
}

/// Parse every token, dropping (and logging) the ones that are rejected
pub fn parse_mutations<I, S>(tokens: I) -> Vec<Mutation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .filter_map(|token| {
            let token = token.as_ref();
            match token.parse::<Mutation>() {
                Ok(m) => Some(m),
                Err(e) => {
                    debug!(token, error = %e, "mutation token dropped");
                    None
                }
            }
        })
        .collect()
}

/// Split a whitespace- or `;`-separated list and parse it
pub fn parse_mutation_list(list: &str) -> Vec<Mutation> {
    parse_mutations(list.split(|c: char| c.is_whitespace() || c == ';').filter(|t| !t.is_empty()))
}
