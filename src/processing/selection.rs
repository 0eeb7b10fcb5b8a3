//! Choosing which observations take part in an estimate

use chrono::{DateTime, Utc};

use crate::algorithms::clustering::{dbscan, NOISE};
use crate::algorithms::geodesy::haversine;
use crate::core::{Estimate, Observation};
use crate::utils::config::{ClusteringConfig, FilterConfig};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Active set and the brand-new observations to hand back for persistence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub active: Vec<Observation>,
    pub to_save: Vec<Observation>,
}

/// Drop inaccurate or weak observations and order the rest newest first.
///
/// The sort is stable, so observations seen at the same instant keep their
/// input order.
pub fn filter_and_sort(observations: &[Observation], config: &FilterConfig) -> Vec<Observation> {
    let mut filtered: Vec<Observation> = observations
        .iter()
        .filter(|o| o.accuracy <= config.max_accuracy_m && o.signal_dbm >= config.min_signal_dbm)
        .cloned()
        .collect();
    filtered.sort_by(|a, b| b.seen.cmp(&a.seen));
    filtered
}

/// Whether the current estimate has to be rebuilt from clusters
pub fn needs_reclustering(estimate: Option<&Estimate>, observations: &[Observation], config: &ClusteringConfig) -> bool {
    let Some(estimate) = estimate else {
        return true;
    };

    let reference_longitude = if config.compare_latitude_twice {
        estimate.latitude
    } else {
        estimate.longitude
    };

    observations.iter().filter(|o| o.is_new()).any(|o| {
        haversine(o.latitude, o.longitude, estimate.latitude, reference_longitude) > config.recluster_distance_m
    })
}

/// `exp(-age / tau)` with the age measured in days
pub fn recency_weight(seen: DateTime<Utc>, now: DateTime<Utc>, time_constant_days: f64) -> f64 {
    let age_days = (now - seen).num_milliseconds() as f64 / MILLIS_PER_DAY;
    (-age_days / time_constant_days).exp()
}

/// Keep the previous active set and add everything new
pub fn incremental_selection(observations: &[Observation]) -> Selection {
    let to_save: Vec<Observation> = observations.iter().filter(|o| o.is_new()).cloned().collect();
    let mut active: Vec<Observation> = observations
        .iter()
        .filter(|o| o.used_for_approximation)
        .cloned()
        .collect();
    active.extend(to_save.iter().cloned());

    Selection { active, to_save }
}

/// Cluster the observations and take the most recent dense group as the
/// active set.
///
/// Clusters are scored by the summed recency weight of their members. A
/// winning cluster smaller than three leaves the active set empty. New
/// observations are queued for saving whichever cluster they landed in,
/// noise included.
pub fn cluster_selection(observations: &[Observation], config: &ClusteringConfig, now: DateTime<Utc>) -> Selection {
    let clusters = dbscan(observations, config.epsilon_m, config.min_points);

    let mut best: Option<(i32, f64)> = None;
    for (&id, members) in clusters.iter().filter(|(id, _)| **id != NOISE) {
        let score: f64 = members
            .iter()
            .map(|&i| recency_weight(observations[i].seen, now, config.recency_time_constant_days))
            .sum();
        if score > 0.0 && best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((id, score));
        }
    }

    let active = match best.and_then(|(id, _)| clusters.get(&id)) {
        Some(members) if members.len() >= 3 => members.iter().map(|&i| observations[i].clone()).collect(),
        Some(members) => {
            log::debug!("best cluster has only {} members", members.len());
            Vec::new()
        }
        None => Vec::new(),
    };
    if let Some((id, score)) = best {
        log::debug!(
            "selected cluster {} of {} (score {:.3}, {} active)",
            id,
            clusters.len(),
            score,
            active.len()
        );
    }

    let to_save = clusters
        .values()
        .flatten()
        .map(|&i| &observations[i])
        .filter(|o| o.is_new())
        .cloned()
        .collect();

    Selection { active, to_save }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    const METER: f64 = 1.0 / 111_320.0;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn observation(north_m: f64, east_m: f64, age_days: i64) -> Observation {
        Observation {
            id: Some(Uuid::new_v4()),
            latitude: 49.0 + north_m * METER,
            longitude: 16.0 + east_m * METER / 49f64.to_radians().cos(),
            altitude: 0,
            accuracy: 10.0,
            signal_dbm: -60.0,
            frequency_mhz: 2437,
            encryption: "WPA2".to_string(),
            seen: now() - Duration::days(age_days),
            used_for_approximation: false,
        }
    }

    fn fresh(mut observation: Observation) -> Observation {
        observation.id = None;
        observation
    }

    #[test]
    fn test_filter_and_sort() {
        let mut weak = observation(0.0, 0.0, 1);
        weak.signal_dbm = -86.0;
        let mut vague = observation(0.0, 0.0, 1);
        vague.accuracy = 61.0;
        let mut edge = observation(0.0, 0.0, 3);
        edge.signal_dbm = -85.0;
        edge.accuracy = 60.0;
        let old = observation(0.0, 0.0, 10);
        let recent = observation(0.0, 0.0, 0);

        let filtered = filter_and_sort(&[old.clone(), weak, edge.clone(), vague, recent.clone()], &FilterConfig::default());
        assert_eq!(filtered, vec![recent, edge, old]);
    }

    #[test]
    fn test_sort_is_stable() {
        let a = observation(1.0, 0.0, 2);
        let b = observation(2.0, 0.0, 2);
        let filtered = filter_and_sort(&[a.clone(), b.clone()], &FilterConfig::default());
        assert_eq!(filtered, vec![a, b]);
    }

    #[test]
    fn test_needs_reclustering() {
        let config = ClusteringConfig::default();
        let estimate = Estimate {
            latitude: 49.0,
            longitude: 16.0,
            uncertainty_radius: 5.0,
        };

        assert!(needs_reclustering(None, &[], &config));
        assert!(!needs_reclustering(Some(&estimate), &[observation(100.0, 0.0, 0)], &config));
        assert!(!needs_reclustering(Some(&estimate), &[fresh(observation(20.0, 0.0, 0))], &config));
        assert!(needs_reclustering(Some(&estimate), &[fresh(observation(0.0, 40.0, 0))], &config));
    }

    #[test]
    fn test_latitude_twice_comparison() {
        let config = ClusteringConfig {
            compare_latitude_twice: true,
            ..ClusteringConfig::default()
        };
        let estimate = Estimate {
            latitude: 49.0,
            longitude: 16.0,
            uncertainty_radius: 5.0,
        };

        // Next to the estimate, but far from (49, 49)
        assert!(needs_reclustering(Some(&estimate), &[fresh(observation(0.0, 0.0, 0))], &config));
    }

    #[test]
    fn test_recency_weight() {
        assert!((recency_weight(now(), now(), 100.0) - 1.0).abs() < 1e-12);
        let weight = recency_weight(now() - Duration::days(100), now(), 100.0);
        assert!((weight - (-1f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_incremental_selection() {
        let mut used = observation(0.0, 0.0, 5);
        used.used_for_approximation = true;
        let unused = observation(5.0, 0.0, 5);
        let new = fresh(observation(10.0, 0.0, 0));

        let selection = incremental_selection(&[used.clone(), unused, new.clone()]);
        assert_eq!(selection.active, vec![used, new.clone()]);
        assert_eq!(selection.to_save, vec![new]);
    }

    #[test]
    fn test_cluster_selection_prefers_recent_cluster() {
        let config = ClusteringConfig::default();
        let mut observations: Vec<Observation> = (0..4).map(|k| observation(k as f64 * 5.0, 0.0, 400)).collect();
        observations.extend((0..3).map(|k| observation(500.0 + k as f64 * 5.0, 0.0, 1)));
        observations.push(fresh(observation(2000.0, 0.0, 0)));

        let selection = cluster_selection(&observations, &config, now());
        assert_eq!(selection.active, observations[4..7].to_vec());
        // the isolated new observation is noise but still saved
        assert_eq!(selection.to_save, vec![observations[7].clone()]);
    }

    #[test]
    fn test_small_winning_cluster_leaves_nothing_active() {
        let config = ClusteringConfig::default();
        // The point at 0 m is visited first and stays noise; {60 m, 120 m}
        // forms a recent two-member cluster that outscores the old triple.
        let observations = vec![
            fresh(observation(0.0, 0.0, 0)),
            fresh(observation(60.0, 0.0, 0)),
            fresh(observation(120.0, 0.0, 0)),
            observation(1000.0, 0.0, 300),
            observation(1005.0, 0.0, 300),
            observation(1010.0, 0.0, 300),
        ];

        let clusters = dbscan(&observations, config.epsilon_m, config.min_points);
        assert_eq!(clusters.get(&NOISE), Some(&vec![0]));
        assert_eq!(clusters.get(&1), Some(&vec![1, 2]));

        let selection = cluster_selection(&observations, &config, now());
        assert!(selection.active.is_empty());
        assert_eq!(selection.to_save.len(), 3);
        assert_eq!(selection.to_save, observations[..3].to_vec());
    }

    #[test]
    fn test_all_noise() {
        let config = ClusteringConfig::default();
        let observations: Vec<Observation> = (0..3).map(|k| fresh(observation(k as f64 * 500.0, 0.0, 0))).collect();

        let selection = cluster_selection(&observations, &config, now());
        assert!(selection.active.is_empty());
        assert_eq!(selection.to_save.len(), 3);
    }
}
