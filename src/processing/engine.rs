//! Per-access-point positioning engine
//!
//! Turns an access point and its observation history into a position
//! estimate with an uncertainty radius. Each call is pure: the input is
//! not modified and the updated access point is returned together with the
//! usage-flag changes the caller has to persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithms::centroid;
use crate::algorithms::geodesy::{haversine, TangentPlane};
use crate::algorithms::trilateration::LogDistanceSolver;
use crate::algorithms::uncertainty::uncertainty_radius;
use crate::core::{AccessPoint, Estimate, LocalPoint, Observation};
use crate::processing::bookkeeping::{reconcile, unestimated, UsageChanges};
use crate::processing::selection::{cluster_selection, filter_and_sort, incremental_selection, needs_reclustering};
use crate::utils::config::{ConfigError, EngineConfig};
use crate::validation::SolverError;

/// Which path produced the estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    Trilateration,
    WeightedCentroid,
    /// No estimate could be formed
    None,
}

/// Result of one estimation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationOutcome {
    /// Updated access point; `observations` holds the set to persist
    pub access_point: AccessPoint,
    pub usage: UsageChanges,
    pub method: EstimationMethod,
}

/// Positioning engine
#[derive(Debug, Clone)]
pub struct PositioningEngine {
    config: EngineConfig,
    solver: LogDistanceSolver,
}

impl Default for PositioningEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PositioningEngine {
    /// Build an engine without validating `config`.
    ///
    /// Invalid values never panic but can make every estimate fail; use
    /// [`PositioningEngine::try_new`] for configurations built at runtime.
    pub fn new(config: EngineConfig) -> Self {
        let solver = LogDistanceSolver::new(config.solver.clone());
        Self { config, solver }
    }

    /// Validate `config` and build an engine from it
    pub fn try_new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Estimate using the current time as the recency reference
    pub fn estimate(&self, access_point: AccessPoint) -> EstimationOutcome {
        self.estimate_at(access_point, Utc::now())
    }

    /// Estimate with cluster recency measured relative to `now`
    pub fn estimate_at(&self, access_point: AccessPoint, now: DateTime<Utc>) -> EstimationOutcome {
        let previous = access_point.estimate;
        let mut access_point = access_point;

        if access_point.observations.is_empty() {
            access_point.estimate = None;
            return EstimationOutcome {
                access_point,
                usage: UsageChanges::default(),
                method: EstimationMethod::None,
            };
        }

        let filtered = filter_and_sort(&access_point.observations, &self.config.filter);
        if filtered.len() < self.config.min_observations {
            log::debug!(
                "{}: {} usable observations, no estimate",
                access_point.bssid,
                filtered.len()
            );
            let new: Vec<Observation> = filtered.into_iter().filter(|o| o.is_new()).collect();
            return self.finish(access_point, previous, None, new, UsageChanges::default());
        }

        let previously_used: Vec<Observation> = access_point
            .observations
            .iter()
            .filter(|o| o.used_for_approximation)
            .cloned()
            .collect();

        let selection = if needs_reclustering(previous.as_ref(), &filtered, &self.config.clustering) {
            cluster_selection(&filtered, &self.config.clustering, now)
        } else {
            log::debug!("{}: extending the current active set", access_point.bssid);
            incremental_selection(&filtered)
        };

        if selection.active.len() < self.config.min_observations {
            let returned = unestimated(&selection.active, &selection.to_save);
            return self.finish(access_point, previous, None, returned, UsageChanges::default());
        }

        match self.locate(&selection.active) {
            Some((estimate, method)) => {
                let (returned, usage) = reconcile(&selection.active, &previously_used, &selection.to_save);
                self.finish(access_point, previous, Some((estimate, method)), returned, usage)
            }
            None => {
                let returned = unestimated(&selection.active, &selection.to_save);
                self.finish(access_point, previous, None, returned, UsageChanges::default())
            }
        }
    }

    /// Position an active set: iterative solver first, weighted centroid if
    /// the solver rejects its result
    pub fn locate(&self, active: &[Observation]) -> Option<(Estimate, EstimationMethod)> {
        match self.trilaterate(active) {
            Ok(estimate) => Some((estimate, EstimationMethod::Trilateration)),
            Err(err) => {
                log::debug!("iterative solver rejected ({}), using weighted centroid", err);
                self.weighted_centroid(active)
                    .map(|estimate| (estimate, EstimationMethod::WeightedCentroid))
            }
        }
    }

    fn trilaterate(&self, active: &[Observation]) -> Result<Estimate, SolverError> {
        let count = active.len() as f64;
        let origin_latitude = active.iter().map(|o| o.latitude).sum::<f64>() / count;
        let origin_longitude = active.iter().map(|o| o.longitude).sum::<f64>() / count;
        let plane = TangentPlane::new(origin_latitude, origin_longitude);

        let points: Vec<LocalPoint> = active
            .iter()
            .map(|o| {
                let (east, north) = plane.project(o.latitude, o.longitude);
                LocalPoint::new(east, north, o.signal_dbm)
            })
            .collect();

        let fit = self.solver.solve(&points)?;
        let (latitude, longitude) = plane.unproject(fit.east, fit.north);
        log::debug!(
            "solver accepted after {} iterations: n={:.2}, A={:.1}, HDOP={:.2}",
            fit.iterations,
            fit.path_loss_exponent,
            fit.attenuation_db,
            fit.hdop
        );

        let uncertainty_radius = uncertainty_radius(
            active,
            latitude,
            longitude,
            fit.reference_signal_dbm(),
            fit.path_loss_exponent,
            fit.hdop,
            &self.config.uncertainty,
        )
        .filter(|_| latitude.is_finite() && longitude.is_finite())
        .ok_or(SolverError::NonFiniteEstimate)?;

        Ok(Estimate {
            latitude,
            longitude,
            uncertainty_radius,
        })
    }

    fn weighted_centroid(&self, active: &[Observation]) -> Option<Estimate> {
        let fit = centroid::locate(active, &self.config.fallback)?;
        let radius = uncertainty_radius(
            active,
            fit.latitude,
            fit.longitude,
            fit.reference_signal_dbm,
            fit.path_loss_exponent,
            fit.hdop,
            &self.config.uncertainty,
        );

        match radius {
            Some(uncertainty_radius) => Some(Estimate {
                latitude: fit.latitude,
                longitude: fit.longitude,
                uncertainty_radius,
            }),
            None => {
                log::warn!("weighted centroid produced no finite estimate");
                None
            }
        }
    }

    /// Apply the estimate, address invalidation and encryption refresh
    fn finish(
        &self,
        mut access_point: AccessPoint,
        previous: Option<Estimate>,
        located: Option<(Estimate, EstimationMethod)>,
        observations: Vec<Observation>,
        usage: UsageChanges,
    ) -> EstimationOutcome {
        let (estimate, method) = match located {
            Some((estimate, method)) => (Some(estimate), method),
            None => (None, EstimationMethod::None),
        };

        if estimate_moved(previous.as_ref(), estimate.as_ref(), self.config.address_shift_threshold_m) {
            log::debug!("{}: estimate moved, address needs resolving", access_point.bssid);
            access_point.address_id = None;
        }

        access_point.estimate = estimate;
        access_point.observations = observations;
        refresh_encryption(&mut access_point);

        EstimationOutcome {
            access_point,
            usage,
            method,
        }
    }
}

/// True when both estimates exist and lie at least `threshold` meters apart
pub fn estimate_moved(previous: Option<&Estimate>, next: Option<&Estimate>, threshold: f64) -> bool {
    match (previous, next) {
        (Some(a), Some(b)) => haversine(a.latitude, a.longitude, b.latitude, b.longitude) >= threshold,
        _ => false,
    }
}

/// Take the encryption of the most recently seen observation, empty tags
/// included; the first of equally recent observations wins
fn refresh_encryption(access_point: &mut AccessPoint) {
    let latest = access_point
        .observations
        .iter()
        .reduce(|best, o| if o.seen > best.seen { o } else { best });

    if let Some(observation) = latest {
        if observation.encryption != access_point.encryption {
            access_point.encryption = observation.encryption.clone();
        }
    }
}
