//! Signal-weighted centroid fallback
//!
//! Used when the iterative solver rejects its own result. The position is the
//! mean of observation positions weighted by linear received power, and the
//! propagation parameters come from an ordinary least-squares fit of signal
//! against `log10(distance)` to that mean.

use crate::algorithms::dop::horizontal_dop;
use crate::algorithms::geodesy::{haversine, TangentPlane};
use crate::core::{LocalPoint, Observation};
use crate::utils::config::FallbackConfig;

/// Weighted-centroid estimate with the parameters fitted around it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidFit {
    pub latitude: f64,
    pub longitude: f64,
    pub path_loss_exponent: f64,
    pub reference_signal_dbm: f64,
    /// HDOP of the observations around the centroid; may be infinite
    pub hdop: f64,
}

/// Linear power weight `10^((signal + 100) / 10)`
pub fn signal_weight(signal_dbm: f64) -> f64 {
    10f64.powf((signal_dbm + 100.0) / 10.0)
}

/// Power-weighted mean position; `None` for an empty or non-finite result
pub fn weighted_centroid(observations: &[Observation]) -> Option<(f64, f64)> {
    let (latitude_sum, longitude_sum, total) =
        observations
            .iter()
            .fold((0.0, 0.0, 0.0), |(lat, lon, total), observation| {
                let weight = signal_weight(observation.signal_dbm);
                (
                    lat + observation.latitude * weight,
                    lon + observation.longitude * weight,
                    total + weight,
                )
            });

    let latitude = latitude_sum / total;
    let longitude = longitude_sum / total;
    (latitude.is_finite() && longitude.is_finite()).then_some((latitude, longitude))
}

/// Least-squares fit of `signal = p0 - 10·n·log10(d)` around `(latitude, longitude)`.
///
/// Observations at zero distance are left out. Returns the configured
/// defaults when the fit is undetermined, otherwise `(n, p0)` clamped to the
/// configured ranges.
pub fn fit_path_loss(observations: &[Observation], latitude: f64, longitude: f64, config: &FallbackConfig) -> (f64, f64) {
    let samples: Vec<(f64, f64)> = observations
        .iter()
        .filter_map(|o| {
            let distance = haversine(latitude, longitude, o.latitude, o.longitude);
            (distance > 0.0).then(|| (distance.log10(), o.signal_dbm))
        })
        .collect();

    let defaults = (config.default_exponent, config.default_reference_signal_dbm);
    if samples.len() < 2 {
        return defaults;
    }

    let count = samples.len() as f64;
    let mean_log = samples.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_signal = samples.iter().map(|(_, y)| y).sum::<f64>() / count;

    let (numerator, denominator) = samples.iter().fold((0.0, 0.0), |(num, den), (x, y)| {
        let dx = x - mean_log;
        (num + dx * (y - mean_signal), den + dx * dx)
    });

    let slope = numerator / denominator;
    let intercept = mean_signal - slope * mean_log;
    if denominator <= f64::EPSILON || !slope.is_finite() || !intercept.is_finite() {
        log::debug!("path-loss regression undetermined, using defaults");
        return defaults;
    }

    (
        config.exponent.clamp(-slope / 10.0),
        config.reference_signal_dbm.clamp(intercept),
    )
}

/// Full fallback: centroid, regression, and HDOP at the centroid
pub fn locate(observations: &[Observation], config: &FallbackConfig) -> Option<CentroidFit> {
    let (latitude, longitude) = weighted_centroid(observations)?;

    let plane = TangentPlane::new(latitude, longitude);
    let points: Vec<LocalPoint> = observations
        .iter()
        .map(|o| {
            let (east, north) = plane.project(o.latitude, o.longitude);
            LocalPoint::new(east, north, o.signal_dbm)
        })
        .collect();
    let hdop = horizontal_dop(&points, 0.0, 0.0);

    let (path_loss_exponent, reference_signal_dbm) = fit_path_loss(observations, latitude, longitude, config);

    Some(CentroidFit {
        latitude,
        longitude,
        path_loss_exponent,
        reference_signal_dbm,
        hdop,
    })
}
