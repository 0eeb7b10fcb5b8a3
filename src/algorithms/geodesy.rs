//! Geodetic coordinate transformations on the WGS84 ellipsoid
//!
//! Provides the conversions the positioning engine needs:
//! - geodetic (degrees) to ECEF and back (Bowring, single step)
//! - ECEF to the local East-North tangent plane and back
//! - great-circle distance on a sphere of equatorial radius
//!
//! All angles passed in or returned are degrees; trigonometry runs in radians.

use nalgebra::Vector3;

use crate::core::{GeoPoint, WGS84_ECCENTRICITY, WGS84_EQUATORIAL_RADIUS};

/// Eccentricity squared (WGS84)
const ECCENTRICITY_SQUARED: f64 = WGS84_ECCENTRICITY * WGS84_ECCENTRICITY;

#[inline]
fn polar_radius() -> f64 {
    (WGS84_EQUATORIAL_RADIUS * WGS84_EQUATORIAL_RADIUS * (1.0 - ECCENTRICITY_SQUARED)).sqrt()
}

/// Radius of curvature in the prime vertical at a latitude given in radians
#[inline]
fn prime_vertical_radius(latitude_rad: f64) -> f64 {
    let sin_lat = latitude_rad.sin();
    WGS84_EQUATORIAL_RADIUS / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt()
}

/// Convert geodetic latitude/longitude (degrees) and altitude (m) to ECEF (m)
pub fn to_ecef(latitude: f64, longitude: f64, altitude: f64) -> Vector3<f64> {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();
    let n = prime_vertical_radius(lat);

    Vector3::new(
        (n + altitude) * lat.cos() * lon.cos(),
        (n + altitude) * lat.cos() * lon.sin(),
        ((1.0 - ECCENTRICITY_SQUARED) * n + altitude) * lat.sin(),
    )
}

/// Convert ECEF (m) to geodetic latitude/longitude (degrees).
///
/// Bowring's closed-form approximation without iteration; altitude is not
/// recovered.
pub fn to_geodetic(ecef: &Vector3<f64>) -> (f64, f64) {
    let a = WGS84_EQUATORIAL_RADIUS;
    let b = polar_radius();
    let second_ecc_squared = (a * a - b * b) / (b * b);

    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let theta = (a * ecef.z).atan2(b * p);

    let latitude = (ecef.z + second_ecc_squared * b * theta.sin().powi(3))
        .atan2(p - ECCENTRICITY_SQUARED * a * theta.cos().powi(3));
    let longitude = ecef.y.atan2(ecef.x);

    (latitude.to_degrees(), longitude.to_degrees())
}

/// Rotate the ECEF offset `point - origin` into the tangent plane at the
/// origin, returning (east, north) in meters.
pub fn ecef_to_enu(
    point: &Vector3<f64>,
    origin: &Vector3<f64>,
    origin_latitude: f64,
    origin_longitude: f64,
) -> (f64, f64) {
    let lat = origin_latitude.to_radians();
    let lon = origin_longitude.to_radians();
    let d = point - origin;

    let east = -lon.sin() * d.x + lon.cos() * d.y;
    let north = -lat.sin() * lon.cos() * d.x - lat.sin() * lon.sin() * d.y + lat.cos() * d.z;

    (east, north)
}

/// ECEF unit vector pointing east at the given longitude
pub fn east_unit_vector(longitude: f64) -> Vector3<f64> {
    let lon = longitude.to_radians();
    Vector3::new(-lon.sin(), lon.cos(), 0.0)
}

/// ECEF unit vector pointing north at the given latitude/longitude
pub fn north_unit_vector(latitude: f64, longitude: f64) -> Vector3<f64> {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();
    Vector3::new(-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos())
}

/// Great-circle distance in meters between two points given in degrees.
///
/// Uses the equatorial radius as sphere radius everywhere in the crate so
/// distances stay mutually consistent.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    WGS84_EQUATORIAL_RADIUS * c
}

/// Haversine distance between any two geodetic points
pub fn distance_between<A: GeoPoint + ?Sized, B: GeoPoint + ?Sized>(a: &A, b: &B) -> f64 {
    haversine(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

/// Local East-North tangent plane anchored at a geodetic origin
#[derive(Debug, Clone)]
pub struct TangentPlane {
    origin_latitude: f64,
    origin_longitude: f64,
    origin_ecef: Vector3<f64>,
}

impl TangentPlane {
    pub fn new(origin_latitude: f64, origin_longitude: f64) -> Self {
        Self {
            origin_latitude,
            origin_longitude,
            origin_ecef: to_ecef(origin_latitude, origin_longitude, 0.0),
        }
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_latitude, self.origin_longitude)
    }

    /// Project a geodetic point (at zero altitude) onto the plane
    pub fn project(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let ecef = to_ecef(latitude, longitude, 0.0);
        ecef_to_enu(&ecef, &self.origin_ecef, self.origin_latitude, self.origin_longitude)
    }

    /// Lift a plane offset back to geodetic coordinates through ECEF
    pub fn unproject(&self, east: f64, north: f64) -> (f64, f64) {
        let ecef = self.origin_ecef
            + east_unit_vector(self.origin_longitude) * east
            + north_unit_vector(self.origin_latitude, self.origin_longitude) * north;
        to_geodetic(&ecef)
    }
}
