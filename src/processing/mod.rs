//! Estimation pipeline: observation selection, engine, batch fan-out

pub mod batch;
pub mod bookkeeping;
pub mod engine;
pub mod selection;

pub use batch::{dedup_observations, Batch, BatchProcessor, ScannedObservation};
pub use bookkeeping::UsageChanges;
pub use engine::{EstimationMethod, EstimationOutcome, PositioningEngine};
