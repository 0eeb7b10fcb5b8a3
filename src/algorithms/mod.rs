//! Core positioning algorithms

pub mod centroid;
pub mod clustering;
pub mod dop;
pub mod geodesy;
pub mod trilateration;
pub mod uncertainty;

pub use centroid::CentroidFit;
pub use clustering::{dbscan, Clusters, NOISE};
pub use dop::horizontal_dop;
pub use geodesy::TangentPlane;
pub use trilateration::{LogDistanceSolver, SolverFit, StepOutcome};
pub use uncertainty::{signal_to_distance, uncertainty_radius};
