//! Batch estimation across many access points
//!
//! Scanned observations are grouped by BSSID, deduplicated against what is
//! already known, and every access point that gained at least one
//! observation is estimated independently. With the `parallel` feature the
//! estimates run on the rayon thread pool.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{AccessPoint, Observation, ObservationKey};
use crate::processing::engine::{EstimationOutcome, PositioningEngine};
use crate::validation::LocatorResult;

/// One observation as delivered by a scanner, tagged with its network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedObservation {
    pub bssid: String,
    pub ssid: String,
    #[serde(default)]
    pub encryption: String,
    pub observation: Observation,
}

/// Known access points plus a batch of new scans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    pub scans: Vec<ScannedObservation>,
}

impl Batch {
    pub fn from_file<P: AsRef<Path>>(path: P) -> LocatorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Drop incoming observations already known or repeated within the batch
pub fn dedup_observations(known: &[Observation], incoming: Vec<Observation>) -> Vec<Observation> {
    let mut seen: HashSet<ObservationKey> = known.iter().map(Observation::key).collect();
    incoming.into_iter().filter(|o| seen.insert(o.key())).collect()
}

/// Runs the positioning engine over batches
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    engine: PositioningEngine,
}

impl BatchProcessor {
    pub fn new(engine: PositioningEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &PositioningEngine {
        &self.engine
    }

    pub fn process(&self, batch: Batch) -> Vec<EstimationOutcome> {
        self.process_at(batch, Utc::now())
    }

    /// Merge scans into their access points and estimate every touched one.
    ///
    /// Outcomes are ordered by BSSID.
    pub fn process_at(&self, batch: Batch, now: DateTime<Utc>) -> Vec<EstimationOutcome> {
        let mut known: BTreeMap<String, AccessPoint> = batch
            .access_points
            .into_iter()
            .map(|ap| (ap.bssid.clone(), ap))
            .collect();

        let mut grouped: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        // SSID and encryption of the last scan per BSSID
        let mut latest_identity: BTreeMap<String, (String, String)> = BTreeMap::new();
        for scan in batch.scans {
            latest_identity.insert(scan.bssid.clone(), (scan.ssid, scan.encryption));
            grouped.entry(scan.bssid).or_default().push(scan.observation);
        }

        for (bssid, (ssid, encryption)) in latest_identity {
            if !known.contains_key(&bssid) {
                let access_point = AccessPoint {
                    encryption,
                    ..AccessPoint::new(bssid.clone(), ssid)
                };
                known.insert(bssid, access_point);
            }
        }

        let work: Vec<AccessPoint> = grouped
            .into_iter()
            .filter_map(|(bssid, incoming)| {
                let mut access_point = known.remove(&bssid)?;
                let fresh = dedup_observations(&access_point.observations, incoming);
                if fresh.is_empty() {
                    log::debug!("{}: nothing new in batch", bssid);
                    return None;
                }
                access_point.observations.extend(fresh);
                Some(access_point)
            })
            .collect();

        log::debug!("estimating {} access points", work.len());
        self.estimate_all(work, now)
    }

    #[cfg(feature = "parallel")]
    fn estimate_all(&self, work: Vec<AccessPoint>, now: DateTime<Utc>) -> Vec<EstimationOutcome> {
        work.into_par_iter()
            .map(|access_point| self.engine.estimate_at(access_point, now))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn estimate_all(&self, work: Vec<AccessPoint>, now: DateTime<Utc>) -> Vec<EstimationOutcome> {
        work.into_iter()
            .map(|access_point| self.engine.estimate_at(access_point, now))
            .collect()
    }
}
