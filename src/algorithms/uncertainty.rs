//! Uncertainty radius of a position estimate

use crate::algorithms::geodesy::haversine;
use crate::core::{Observation, MIN_WEIGHTING_ACCURACY_M};
use crate::utils::config::{Bounds, UncertaintyConfig};

/// Distance implied by a received signal under the log-distance model,
/// clamped to the plausible range
pub fn signal_to_distance(signal_dbm: f64, reference_signal_dbm: f64, exponent: f64, config: &UncertaintyConfig) -> f64 {
    let distance = 10f64.powf((reference_signal_dbm - signal_dbm) / (10.0 * exponent));
    config.signal_distance_m.clamp(distance)
}

/// Radius around `(latitude, longitude)` within which the access point is
/// expected to lie.
///
/// Each observation contributes `|spatial - signal-implied distance| + accuracy`,
/// weighted by `1 / accuracy²`. The weighted mean is scaled by `hdop / 2` and
/// clamped between the minimum radius and the signal-implied distance of the
/// weakest observation. Returns `None` for an empty set or a non-finite result.
pub fn uncertainty_radius(
    observations: &[Observation],
    latitude: f64,
    longitude: f64,
    reference_signal_dbm: f64,
    exponent: f64,
    hdop: f64,
    config: &UncertaintyConfig,
) -> Option<f64> {
    let weakest = observations
        .iter()
        .map(|o| o.signal_dbm)
        .min_by(|a, b| a.total_cmp(b))?;

    let (weighted_sum, total_weight) = observations.iter().fold((0.0, 0.0), |(sum, total), observation| {
        let spatial = haversine(latitude, longitude, observation.latitude, observation.longitude);
        let implied = signal_to_distance(observation.signal_dbm, reference_signal_dbm, exponent, config);
        let local = (spatial - implied).abs() + observation.accuracy;

        let accuracy = observation.accuracy.max(MIN_WEIGHTING_ACCURACY_M);
        let weight = 1.0 / (accuracy * accuracy);
        (sum + local * weight, total + weight)
    });

    let max_radius = config
        .min_radius_m
        .max(signal_to_distance(weakest, reference_signal_dbm, exponent, config));

    // Unbounded HDOP saturates at the plausible maximum
    let scaled = if hdop.is_infinite() {
        max_radius
    } else {
        weighted_sum / total_weight * hdop / 2.0
    };

    let radius = Bounds::new(config.min_radius_m, max_radius).clamp(scaled);
    if radius.is_finite() {
        Some(radius)
    } else {
        log::warn!("discarding non-finite uncertainty radius");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const METER: f64 = 1.0 / 111_320.0;

    fn observation(latitude: f64, longitude: f64, signal_dbm: f64, accuracy: f64) -> Observation {
        Observation {
            id: None,
            latitude,
            longitude,
            altitude: 0,
            accuracy,
            signal_dbm,
            frequency_mhz: 2437,
            encryption: String::new(),
            seen: Utc::now(),
            used_for_approximation: false,
        }
    }

    #[test]
    fn test_signal_to_distance() {
        let config = UncertaintyConfig::default();
        // 30 dB below reference with n = 3 is 10 m
        assert!((signal_to_distance(-70.0, -40.0, 3.0, &config) - 10.0).abs() < 1e-9);
        assert_eq!(signal_to_distance(-30.0, -40.0, 3.0, &config), 0.5);
        assert_eq!(signal_to_distance(-95.0, -30.0, 2.0, &config), 100.0);
    }

    #[test]
    fn test_radius_matches_hand_computation() {
        let config = UncertaintyConfig::default();
        // Both observations sit exactly at their signal-implied distance
        let observations = vec![
            observation(10.0 * METER, 0.0, -70.0, 4.0),
            observation(-10.0 * METER, 0.0, -70.0, 4.0),
        ];
        let radius = uncertainty_radius(&observations, 0.0, 0.0, -40.0, 3.0, 2.0, &config).unwrap();

        // mean local uncertainty ~4 m, times HDOP / 2
        assert!((radius - 4.0).abs() < 0.05, "radius {}", radius);
    }

    #[test]
    fn test_radius_is_clamped() {
        let config = UncertaintyConfig::default();
        let observations = vec![observation(0.0, 0.0, -60.0, 50.0), observation(0.0, 0.0, -70.0, 50.0)];

        let high = uncertainty_radius(&observations, 0.0, 0.0, -40.0, 3.0, 5.0, &config).unwrap();
        assert!((high - 10.0).abs() < 1e-9);

        let low = uncertainty_radius(&observations, 0.0, 0.0, -40.0, 3.0, 0.0, &config).unwrap();
        assert_eq!(low, 1.0);
    }

    #[test]
    fn test_infinite_hdop_saturates() {
        let config = UncertaintyConfig::default();
        let observations = vec![observation(0.0, 0.0, -70.0, 0.0)];
        let radius = uncertainty_radius(&observations, 0.0, 0.0, -40.0, 3.0, f64::INFINITY, &config).unwrap();
        assert!((radius - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_set_has_no_radius() {
        let config = UncertaintyConfig::default();
        assert_eq!(uncertainty_radius(&[], 0.0, 0.0, -40.0, 3.0, 1.0, &config), None);
    }
}
