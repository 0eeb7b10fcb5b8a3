//! Core data types for the positioning engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single crowd-sourced sighting of an access point.
///
/// `id` is `None` until the surrounding system has persisted the
/// observation; the engine uses that to tell new sightings from known ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters; carried but never used for estimation
    #[serde(default)]
    pub altitude: i32,
    /// Horizontal accuracy of the receiver fix (m)
    pub accuracy: f64,
    /// Received signal strength (dBm)
    pub signal_dbm: f64,
    #[serde(default)]
    pub frequency_mhz: u32,
    #[serde(default)]
    pub encryption: String,
    pub seen: DateTime<Utc>,
    #[serde(default)]
    pub used_for_approximation: bool,
}

impl Observation {
    /// True when the observation has never been persisted
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Content key used to recognise repeated reports of the same sighting
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            latitude_micro: (self.latitude * 1e6).round() as i64,
            longitude_micro: (self.longitude * 1e6).round() as i64,
            altitude: self.altitude,
            accuracy_bits: self.accuracy.to_bits(),
            signal_bits: self.signal_dbm.to_bits(),
        }
    }

    /// Persisted observations compare by id, new ones by content
    pub fn same_sighting(&self, other: &Observation) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.key() == other.key() && self.seen == other.seen,
            _ => false,
        }
    }
}

/// Position rounded to 1e-6 degrees plus altitude, accuracy and signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationKey {
    latitude_micro: i64,
    longitude_micro: i64,
    altitude: i32,
    accuracy_bits: u64,
    signal_bits: u64,
}

/// Estimated access point position with its uncertainty radius.
///
/// Kept as one value so the three fields are either all present or all absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub latitude: f64,
    pub longitude: f64,
    /// Uncertainty radius (m)
    pub uncertainty_radius: f64,
}

/// The wireless access point being positioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub ssid: String,
    /// Unique join key across batches
    pub bssid: String,
    #[serde(default)]
    pub encryption: String,
    #[serde(default)]
    pub estimate: Option<Estimate>,
    /// Reverse-geocoded address; `None` means it has to be (re)resolved
    #[serde(default)]
    pub address_id: Option<Uuid>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl AccessPoint {
    pub fn new(bssid: impl Into<String>, ssid: impl Into<String>) -> Self {
        Self {
            id: None,
            ssid: ssid.into(),
            bssid: bssid.into(),
            encryption: String::new(),
            estimate: None,
            address_id: None,
            observations: Vec::new(),
        }
    }
}

/// Point projected into the local East-North tangent plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPoint {
    /// East offset from the plane origin (m)
    pub x: f64,
    /// North offset from the plane origin (m)
    pub y: f64,
    /// Received signal strength (dBm)
    pub signal_dbm: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64, signal_dbm: f64) -> Self {
        Self { x, y, signal_dbm }
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Anything with a geodetic position in degrees
pub trait GeoPoint {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
}

impl GeoPoint for Observation {
    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl GeoPoint for (f64, f64) {
    fn latitude(&self) -> f64 {
        self.0
    }

    fn longitude(&self) -> f64 {
        self.1
    }
}
