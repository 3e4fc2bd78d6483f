pub mod body;
pub mod collection;
pub mod collision;
pub mod engine;
pub mod forces;
pub mod integrator;
pub mod params;
pub mod scenario;
pub mod snapshot;
