//! Error types for the engine, the control plane and scenario loading.
//!
//! Lock contention is deliberately absent: a failed advisory lock is not an
//! error, the work is retried on the next cycle.

use std::path::PathBuf;

use thiserror::Error;

/// Value parsing failures shared by configs and the field-mutation language
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown collision behavior `{0}`")]
    Behavior(String),
    #[error("invalid color `{0}`, expected #rrggbb or r,g,b")]
    Color(String),
}

/// A rejected `key=value` token of the field-mutation language
#[derive(Debug, Error, PartialEq)]
pub enum MutationError {
    #[error("expected key=value, got `{0}`")]
    Malformed(String),
    #[error("unknown field `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`")]
    BadValue { key: String, value: String },
}

/// Faults that halt the cycle scheduler
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build the force worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn the runner thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("cycle {cycle} faulted outside a force task: {message}")]
    CycleFault { cycle: u64, message: String },
}

/// Requests rejected by the control plane; engine state is left untouched
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("computation thread count must be at least 1")]
    ZeroThreads,
    #[error("result queue size must be at least 1")]
    ZeroQueueSize,
    #[error("invalid body removal count {0}, expected -1 or a non-negative count")]
    InvalidRemoveCount(i64),
    #[error("invalid body selector `{0}`, expected id=<n>, name=<s> or class=<s>")]
    BadSelector(String),
    #[error("{what} must be finite, got {value}")]
    NonFinite { what: &'static str, value: f64 },
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: f64 },
}

/// Scenario file problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("body {index}: {message}")]
    Body { index: usize, message: String },
    #[error("engine: {0}")]
    Engine(String),
}
