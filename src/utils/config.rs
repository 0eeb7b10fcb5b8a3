use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::constants::*;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
}

/// Inclusive numeric interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// False for NaN
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp into the interval. NaN passes through, and an inverted
    /// interval yields `min` or `max` instead of panicking.
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Which observations are trusted at all
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Observations with a worse receiver accuracy are dropped (m)
    pub max_accuracy_m: f64,
    /// Observations with a weaker signal are dropped (dBm)
    pub min_signal_dbm: f64,
}

/// Cluster selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// DBSCAN neighbour radius (m)
    pub epsilon_m: f64,
    /// DBSCAN minimum neighbourhood size
    pub min_points: usize,
    /// Recency decay time constant (days)
    pub recency_time_constant_days: f64,
    /// New observations further than this from the estimate force re-clustering (m)
    pub recluster_distance_m: f64,
    /// Measure the re-clustering distance against (estimate latitude,
    /// estimate latitude) instead of (latitude, longitude), reproducing the
    /// behaviour of the system this engine replaces
    #[serde(default)]
    pub compare_latitude_twice: bool,
}

/// Iterative log-distance solver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Points closer than this are merged before solving (m)
    pub merge_radius_m: f64,
    /// Huber threshold on signal residuals (dB)
    pub huber_delta_db: f64,
    pub initial_exponent: f64,
    pub initial_attenuation_db: f64,
    /// Stop when the step norm is below this...
    pub step_tolerance: f64,
    /// ...and the residual norm is below this (dB)
    pub residual_tolerance_db: f64,
    /// Abort iterating when the exponent leaves this range
    pub runaway_exponent: Bounds,
    /// Abort iterating when the attenuation leaves this range (dB)
    pub runaway_attenuation_db: Bounds,
    /// Final exponent must fall here
    pub accepted_exponent: Bounds,
    /// Final attenuation must fall here (dB)
    pub accepted_attenuation_db: Bounds,
    pub max_hdop: f64,
}

/// Weighted-centroid fallback parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub exponent: Bounds,
    /// Reference signal clamp (dBm)
    pub reference_signal_dbm: Bounds,
    /// Used when the regression is undetermined
    pub default_exponent: f64,
    pub default_reference_signal_dbm: f64,
}

/// Uncertainty radius parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyConfig {
    /// Clamp of signal-implied distances (m)
    pub signal_distance_m: Bounds,
    /// Smallest reported radius (m)
    pub min_radius_m: f64,
}

/// Complete positioning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub clustering: ClusteringConfig,
    pub solver: SolverConfig,
    pub fallback: FallbackConfig,
    pub uncertainty: UncertaintyConfig,
    /// Fewer usable observations than this never produce an estimate
    pub min_observations: usize,
    /// An estimate moving at least this far invalidates the address (m)
    pub address_shift_threshold_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: MAX_OBSERVATION_ACCURACY_M,
            min_signal_dbm: MIN_OBSERVATION_SIGNAL_DBM,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            epsilon_m: CLUSTER_EPSILON_M,
            min_points: CLUSTER_MIN_POINTS,
            recency_time_constant_days: RECENCY_TIME_CONSTANT_DAYS,
            recluster_distance_m: RECLUSTER_DISTANCE_M,
            compare_latitude_twice: false,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_SOLVER_ITERATIONS,
            merge_radius_m: MERGE_RADIUS_M,
            huber_delta_db: HUBER_DELTA_DB,
            initial_exponent: INITIAL_PATH_LOSS_EXPONENT,
            initial_attenuation_db: INITIAL_ATTENUATION_DB,
            step_tolerance: 1e-6,
            residual_tolerance_db: 1.0,
            runaway_exponent: Bounds::new(0.1, 10.0),
            runaway_attenuation_db: Bounds::new(0.0, 150.0),
            accepted_exponent: Bounds::new(2.0, 6.0),
            accepted_attenuation_db: Bounds::new(0.0, 100.0),
            max_hdop: MAX_ACCEPTED_HDOP,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            exponent: Bounds::new(1.0, 6.0),
            reference_signal_dbm: Bounds::new(-70.0, -30.0),
            default_exponent: INITIAL_PATH_LOSS_EXPONENT,
            default_reference_signal_dbm: -INITIAL_ATTENUATION_DB,
        }
    }
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            signal_distance_m: Bounds::new(0.5, 100.0),
            min_radius_m: 1.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            clustering: ClusteringConfig::default(),
            solver: SolverConfig::default(),
            fallback: FallbackConfig::default(),
            uncertainty: UncertaintyConfig::default(),
            min_observations: MIN_OBSERVATIONS,
            address_shift_threshold_m: ADDRESS_SHIFT_THRESHOLD_M,
        }
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_positive(parameter: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(parameter, value, "must be a positive finite number"))
    }
}

fn require_bounds(parameter: &str, bounds: &Bounds) -> Result<(), ConfigError> {
    if bounds.is_valid() {
        Ok(())
    } else {
        Err(invalid(parameter, format!("[{}, {}]", bounds.min, bounds.max), "min must not exceed max"))
    }
}

impl EngineConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        if let Err(err) = config.validate() {
            log::warn!("rejecting configuration from {}: {}", path.as_ref().display(), err);
            return Err(err);
        }
        log::debug!("loaded engine configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Check parameter sanity; returns the first violation found
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("filter.max_accuracy_m", self.filter.max_accuracy_m)?;
        if !self.filter.min_signal_dbm.is_finite() {
            return Err(invalid("filter.min_signal_dbm", self.filter.min_signal_dbm, "must be finite"));
        }

        require_positive("clustering.epsilon_m", self.clustering.epsilon_m)?;
        require_positive("clustering.recency_time_constant_days", self.clustering.recency_time_constant_days)?;
        require_positive("clustering.recluster_distance_m", self.clustering.recluster_distance_m)?;

        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(invalid("solver.max_iterations", solver.max_iterations, "must be at least 1"));
        }
        require_positive("solver.merge_radius_m", solver.merge_radius_m)?;
        require_positive("solver.huber_delta_db", solver.huber_delta_db)?;
        require_positive("solver.step_tolerance", solver.step_tolerance)?;
        require_positive("solver.residual_tolerance_db", solver.residual_tolerance_db)?;
        require_positive("solver.max_hdop", solver.max_hdop)?;
        require_bounds("solver.runaway_exponent", &solver.runaway_exponent)?;
        require_bounds("solver.runaway_attenuation_db", &solver.runaway_attenuation_db)?;
        require_bounds("solver.accepted_exponent", &solver.accepted_exponent)?;
        require_bounds("solver.accepted_attenuation_db", &solver.accepted_attenuation_db)?;
        if !solver.runaway_exponent.contains(solver.initial_exponent) {
            return Err(invalid("solver.initial_exponent", solver.initial_exponent, "outside the runaway bounds"));
        }
        if !solver.runaway_attenuation_db.contains(solver.initial_attenuation_db) {
            return Err(invalid(
                "solver.initial_attenuation_db",
                solver.initial_attenuation_db,
                "outside the runaway bounds",
            ));
        }

        require_bounds("fallback.exponent", &self.fallback.exponent)?;
        require_bounds("fallback.reference_signal_dbm", &self.fallback.reference_signal_dbm)?;
        if self.fallback.exponent.min <= 0.0 {
            return Err(invalid("fallback.exponent", self.fallback.exponent.min, "must stay positive"));
        }
        require_positive("fallback.default_exponent", self.fallback.default_exponent)?;

        require_bounds("uncertainty.signal_distance_m", &self.uncertainty.signal_distance_m)?;
        require_positive("uncertainty.signal_distance_m.min", self.uncertainty.signal_distance_m.min)?;
        require_positive("uncertainty.min_radius_m", self.uncertainty.min_radius_m)?;

        if self.min_observations < MIN_OBSERVATIONS {
            return Err(invalid("min_observations", self.min_observations, "at least 3 points are required"));
        }
        require_positive("address_shift_threshold_m", self.address_shift_threshold_m)?;

        Ok(())
    }
}
