//! Physical constants and default engine parameters

/// WGS84 equatorial radius (m); also the sphere radius used by haversine
pub const WGS84_EQUATORIAL_RADIUS: f64 = 6378137.0;

/// WGS84 first eccentricity
pub const WGS84_ECCENTRICITY: f64 = 8.1819190842622e-2;

/// Observations less accurate than this are ignored (m)
pub const MAX_OBSERVATION_ACCURACY_M: f64 = 60.0;

/// Observations weaker than this are ignored (dBm)
pub const MIN_OBSERVATION_SIGNAL_DBM: f64 = -85.0;

/// Minimum number of observations for any estimate
pub const MIN_OBSERVATIONS: usize = 3;

/// DBSCAN neighbourhood radius (m)
pub const CLUSTER_EPSILON_M: f64 = 70.0;

/// DBSCAN minimum neighbourhood size
pub const CLUSTER_MIN_POINTS: usize = 2;

/// Time constant of the cluster recency decay (days)
pub const RECENCY_TIME_CONSTANT_DAYS: f64 = 100.0;

/// A new observation further than this from the estimate forces re-clustering (m)
pub const RECLUSTER_DISTANCE_M: f64 = 30.0;

/// An estimate shift of at least this much invalidates the address (m)
pub const ADDRESS_SHIFT_THRESHOLD_M: f64 = 30.0;

/// Tangent-plane points closer than this are merged before solving (m)
pub const MERGE_RADIUS_M: f64 = 3.0;

/// Gauss-Newton iteration cap
pub const MAX_SOLVER_ITERATIONS: usize = 30;

/// Huber threshold on signal residuals (dB)
pub const HUBER_DELTA_DB: f64 = 5.0;

/// Initial path-loss exponent
pub const INITIAL_PATH_LOSS_EXPONENT: f64 = 3.0;

/// Initial reference attenuation (dB)
pub const INITIAL_ATTENUATION_DB: f64 = 35.0;

/// Largest HDOP accepted from the iterative solver
pub const MAX_ACCEPTED_HDOP: f64 = 6.0;

/// Lower bound of distances fed to log10 in the propagation model (m)
pub const MIN_MODEL_DISTANCE_M: f64 = 1e-6;

/// Accuracy floor used when weighting by 1/accuracy² (m)
pub const MIN_WEIGHTING_ACCURACY_M: f64 = 0.1;
