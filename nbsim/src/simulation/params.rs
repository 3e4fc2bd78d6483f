//! Numerical and physical parameters for the simulation
//!
//! Two kinds of settings live here:
//! - [`PhysicsConstants`]: fixed for the lifetime of a runner (gravity, the
//!   empirically tuned collision thresholds, fragmentation caps)
//! - [`Tunables`]: engine-wide knobs the control plane may change while the
//!   runner is live (worker count, time scaling, restitution). The runner
//!   reads them once per cycle into a [`CycleParams`], so a change takes
//!   effect at the next cycle boundary

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Deserialize;

/// Constants used by the force and collision code
///
/// The overlap/shrink factors and the fragment caps are tuned by hand;
/// they are kept configurable rather than derived
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PhysicsConstants {
    pub gravitational_constant: f64, // G in F = G m1 m2 / d^2
    pub subsume_overlap_factor: f64, // subsume only if r_small + d <= factor * r_large
    pub fragment_shrink_factor: f64, // emission radius multiplier per fragmenting cycle
    pub max_fragments: u32,          // hard cap on fragments per breakup
    pub fragments_per_cycle: u32,    // fragments emitted per body per cycle
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            gravitational_constant: 6.674e-11,
            subsume_overlap_factor: 1.2,
            fragment_shrink_factor: 0.9,
            max_fragments: 2000,
            fragments_per_cycle: 100,
        }
    }
}

/// An `f64` stored as its bit pattern so it can be shared without a lock
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Live engine settings shared between the runner and the control plane
#[derive(Debug)]
pub struct Tunables {
    threads: AtomicUsize,
    smoothing: AtomicF64,   // time scaling applied in integration
    restitution: AtomicF64, // coefficient of restitution, expected in [0, 1]
}

impl Tunables {
    pub fn new(threads: usize, smoothing: f64, restitution: f64) -> Self {
        Self {
            threads: AtomicUsize::new(threads.max(1)),
            smoothing: AtomicF64::new(smoothing),
            restitution: AtomicF64::new(restitution),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::Acquire)
    }

    pub fn set_threads(&self, threads: usize) {
        self.threads.store(threads.max(1), Ordering::Release);
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing.load()
    }

    pub fn set_smoothing(&self, smoothing: f64) {
        self.smoothing.store(smoothing);
    }

    pub fn restitution(&self) -> f64 {
        self.restitution.load()
    }

    pub fn set_restitution(&self, restitution: f64) {
        self.restitution.store(restitution);
    }

    /// Read every tunable once for the cycle about to start
    pub fn cycle_params(&self) -> CycleParams {
        CycleParams {
            threads: self.threads(),
            time_scaling: self.smoothing(),
            restitution: self.restitution(),
        }
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self::new(4, 1.0, 1.0)
    }
}

/// Per-cycle copy of [`Tunables`]; nothing changes mid-cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleParams {
    pub threads: usize,
    pub time_scaling: f64,
    pub restitution: f64,
}
