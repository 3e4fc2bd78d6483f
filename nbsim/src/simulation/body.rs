//! Core state types for the live N-body engine.
//!
//! A [`Body`] is shared by reference (`Arc<Body>`) between the live
//! collection, the force tasks of a cycle and the control plane. Its
//! mutable part is a single [`BodyState`] behind an `RwLock`:
//! - force tasks copy other bodies' state out under a short read guard
//! - a body's own force task and the integrator write its state
//! - collision resolution takes the write guard of *two* bodies with
//!   [`Body::try_lock`] / [`try_lock_pair`], never blocking, so two tasks
//!   racing for the same pair cannot deadlock; the loser just skips the
//!   pair for this cycle
//!
//! Name and class are fixed at creation and live outside the lock.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

pub type NVec3 = Vector3<f64>;

static NEXT_BODY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique body identifier, handed out by a monotonic counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u64);

impl BodyId {
    /// Take the next id; ids are never reused within a process
    pub fn next() -> Self {
        BodyId(NEXT_BODY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happens when this body touches another one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionBehavior {
    /// Pass through everything
    #[default]
    None,
    /// The larger body absorbs the smaller one
    Subsume,
    /// Bounce off other elastic/fragmenting bodies
    Elastic,
    /// Bounce, or break apart when the hit is hard enough
    Fragment,
}

impl CollisionBehavior {
    /// Elastic and fragmenting bodies bounce off each other
    pub fn bounces(self) -> bool {
        matches!(self, CollisionBehavior::Elastic | CollisionBehavior::Fragment)
    }
}

impl FromStr for CollisionBehavior {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CollisionBehavior::None),
            "subsume" => Ok(CollisionBehavior::Subsume),
            "elastic" => Ok(CollisionBehavior::Elastic),
            "fragment" => Ok(CollisionBehavior::Fragment),
            _ => Err(ParseError::Behavior(s.to_string())),
        }
    }
}

/// 8-bit RGB color, written as `#rrggbb` in configs and snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ParseError;

    /// Accepts `#rrggbb`, `rrggbb`, `r,g,b` and `r:g:b`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || ParseError::Color(s.to_string());

        if s.contains(',') || s.contains(':') {
            let parts: Vec<u8> = s
                .split(|c| c == ',' || c == ':')
                .map(|p| p.trim().parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|_| bad())?;
            return match parts.as_slice() {
                [r, g, b] => Ok(Color::new(*r, *g, *b)),
                _ => Err(bad()),
            };
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(bad());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Multi-cycle breakup progress of a fragmenting body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragmentation {
    pub remaining: u32,       // fragments still to emit
    pub fragment_mass: f64,   // mass of every fragment, including the final one
    pub fragment_radius: f64, // radius of every fragment, including the final one
    pub origin: NVec3,        // where the breakup happened
    pub spread: f64,          // current emission radius around `origin`
}

/// Everything needed to create a body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyParams {
    pub position: NVec3,
    pub velocity: NVec3,
    pub mass: f64,
    pub radius: f64,
    pub behavior: CollisionBehavior,
    pub color: Color,
    pub frag_factor: f64, // velocity-change fraction above which the body breaks up
    pub frag_step: f64,   // fragment radius as a fraction of the body radius
    pub light_source: bool,
    pub pinned: bool, // exempt from partial bulk removal
    pub telemetry: bool,
    pub name: Option<String>,
    pub class: Option<String>,
}

impl Default for BodyParams {
    fn default() -> Self {
        Self {
            position: NVec3::zeros(),
            velocity: NVec3::zeros(),
            mass: 1.0,
            radius: 1.0,
            behavior: CollisionBehavior::None,
            color: Color::WHITE,
            frag_factor: 0.5,
            frag_step: 0.2,
            light_source: false,
            pinned: false,
            telemetry: false,
            name: None,
            class: None,
        }
    }
}

/// Mutable part of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: NVec3,
    pub velocity: NVec3,
    pub force: NVec3, // scratch, written only by this body's own force task
    pub mass: f64,
    pub radius: f64,
    pub behavior: CollisionBehavior,
    pub color: Color,
    pub frag_factor: f64,
    pub frag_step: f64,
    pub light_source: bool,
    pub pinned: bool,
    pub telemetry: bool,
    pub exists: bool,
    pub collided: bool, // resolved a collision this cycle
    pub fragmentation: Option<Fragmentation>,
}

impl BodyState {
    fn from_params(p: &BodyParams) -> Self {
        Self {
            position: p.position,
            velocity: p.velocity,
            force: NVec3::zeros(),
            mass: p.mass,
            radius: p.radius,
            behavior: p.behavior,
            color: p.color,
            frag_factor: p.frag_factor,
            frag_step: p.frag_step,
            light_source: p.light_source,
            pinned: p.pinned,
            telemetry: p.telemetry,
            exists: true,
            collided: false,
            fragmentation: None,
        }
    }

    pub fn is_fragmenting(&self) -> bool {
        self.fragmentation.is_some()
    }

    /// Take part in neither gravity nor collisions
    pub fn is_inert(&self) -> bool {
        !self.exists || self.is_fragmenting()
    }

    /// Mark for removal; a retired body always has zero mass
    pub fn retire(&mut self) {
        self.exists = false;
        self.mass = 0.0;
        self.fragmentation = None;
    }
}

/// A simulated point mass
#[derive(Debug)]
pub struct Body {
    id: BodyId,
    name: Option<String>,
    class: Option<String>,
    state: RwLock<BodyState>,
}

impl Body {
    pub fn new(params: BodyParams) -> Self {
        let state = BodyState::from_params(&params);
        Self {
            id: BodyId::next(),
            name: params.name,
            class: params.class,
            state: RwLock::new(state),
        }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Copy of the current state
    pub fn state(&self) -> BodyState {
        *self.read()
    }

    pub fn exists(&self) -> bool {
        self.read().exists
    }

    pub fn retire(&self) {
        self.write().retire();
    }

    /// Shared access. A poisoned lock still holds consistent `Copy` data,
    /// so the poison is dropped
    pub fn read(&self) -> RwLockReadGuard<'_, BodyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocking exclusive access. Callers must not hold any other body's
    /// guard while waiting here
    pub fn write(&self) -> RwLockWriteGuard<'_, BodyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advisory lock: exclusive access if nobody else holds the body right now
    pub fn try_lock(&self) -> Option<RwLockWriteGuard<'_, BodyState>> {
        match self.state.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Id, labels and a copy of the state, for lookups from the control plane
    pub fn view(&self) -> BodyView {
        BodyView {
            id: self.id,
            name: self.name.clone(),
            class: self.class.clone(),
            state: self.state(),
        }
    }
}

/// Advisory-lock two bodies: `first`, then `second`, both non-blocking.
///
/// If the second acquisition fails the first guard is released and `None`
/// is returned; the caller gives up on the pair for this cycle
pub fn try_lock_pair<'a>(
    first: &'a Body,
    second: &'a Body,
) -> Option<(RwLockWriteGuard<'a, BodyState>, RwLockWriteGuard<'a, BodyState>)> {
    if first.id == second.id {
        return None;
    }
    let a = first.try_lock()?;
    let b = second.try_lock()?;
    Some((a, b))
}

/// Detached copy of one body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyView {
    pub id: BodyId,
    pub name: Option<String>,
    pub class: Option<String>,
    pub state: BodyState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = Body::new(BodyParams::default());
        let b = Body::new(BodyParams::default());
        assert!(b.id() > a.id());
    }

    #[test]
    fn behavior_parses_case_insensitively() {
        assert_eq!("Elastic".parse::<CollisionBehavior>().unwrap(), CollisionBehavior::Elastic);
        assert_eq!(" SUBSUME ".parse::<CollisionBehavior>().unwrap(), CollisionBehavior::Subsume);
        assert!("bouncy".parse::<CollisionBehavior>().is_err());
    }

    #[test]
    fn color_accepts_hex_and_triples() {
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::new(255, 128, 0));
        assert_eq!("00ff10".parse::<Color>().unwrap(), Color::new(0, 255, 16));
        assert_eq!("1, 2, 3".parse::<Color>().unwrap(), Color::new(1, 2, 3));
        assert_eq!("4:5:6".parse::<Color>().unwrap(), Color::new(4, 5, 6));
        assert!("#ff80".parse::<Color>().is_err());
        assert!("300,0,0".parse::<Color>().is_err());
        assert_eq!(Color::new(255, 128, 0).to_string(), "#ff8000");
    }

    #[test]
    fn retire_zeroes_mass() {
        let body = Body::new(BodyParams { mass: 42.0, ..Default::default() });
        body.retire();
        let s = body.state();
        assert!(!s.exists);
        assert_eq!(s.mass, 0.0);
    }

    #[test]
    fn advisory_lock_fails_while_held() {
        let a = Body::new(BodyParams::default());
        let b = Body::new(BodyParams::default());
        let held = b.try_lock().unwrap();
        assert!(try_lock_pair(&a, &b).is_none());
        // the first guard was released again
        assert!(a.try_lock().is_some());
        drop(held);
        assert!(try_lock_pair(&a, &b).is_some());
        assert!(try_lock_pair(&a, &a).is_none());
    }
}
