//! Access point locator
//!
//! Estimates the position of wireless access points from crowd-sourced
//! signal observations. Observations are filtered, clustered by density and
//! recency, and fed to a robust log-distance trilateration solver with a
//! signal-weighted centroid as fallback.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;

// Re-export commonly used types
pub use core::{AccessPoint, Estimate, Observation};
pub use processing::{
    Batch, BatchProcessor, EstimationMethod, EstimationOutcome, PositioningEngine, ScannedObservation, UsageChanges,
};
pub use utils::{ConfigError, EngineConfig};
pub use validation::{LocatorError, LocatorResult, SolverError};
