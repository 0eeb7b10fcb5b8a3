//! Horizontal dilution of precision for tangent-plane point sets

use nalgebra::DMatrix;

use crate::core::LocalPoint;

/// Singular values of GᵀG below this mark the geometry as degenerate
const SINGULAR_VALUE_EPSILON: f64 = 1e-10;

/// HDOP of `points` seen from the reference position `(x, y)`.
///
/// Each row of the geometry matrix G is the unit vector from the reference
/// to a point plus a constant 1; HDOP is the trace of (GᵀG)⁻¹. Points that
/// coincide with the reference contribute a zero direction. Degenerate
/// geometry (collinear or coincident points, fewer than three points)
/// yields `f64::INFINITY`.
pub fn horizontal_dop(points: &[LocalPoint], x: f64, y: f64) -> f64 {
    if points.len() < 3 {
        return f64::INFINITY;
    }

    let mut geometry = DMatrix::zeros(points.len(), 3);
    for (i, point) in points.iter().enumerate() {
        let distance = point.distance_to(x, y);
        if distance > 1e-10 {
            geometry[(i, 0)] = (point.x - x) / distance;
            geometry[(i, 1)] = (point.y - y) / distance;
        }
        geometry[(i, 2)] = 1.0;
    }

    let gtg = geometry.transpose() * &geometry;

    let singular_values = gtg.clone().svd(false, false).singular_values;
    if singular_values.iter().any(|s| *s < SINGULAR_VALUE_EPSILON || !s.is_finite()) {
        return f64::INFINITY;
    }

    match gtg.try_inverse() {
        Some(covariance) => {
            let trace = covariance.trace();
            if trace.is_finite() && trace > 0.0 {
                trace
            } else {
                f64::INFINITY
            }
        }
        None => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(count: usize, radius: f64) -> Vec<LocalPoint> {
        (0..count)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / count as f64;
                LocalPoint::new(radius * angle.cos(), radius * angle.sin(), -60.0)
            })
            .collect()
    }

    #[test]
    fn test_symmetric_ring_hdop() {
        // GᵀG = diag(N/2, N/2, N) for evenly spread directions
        let hdop = horizontal_dop(&ring(8, 20.0), 0.0, 0.0);
        assert!((hdop - 5.0 / 8.0).abs() < 1e-9);

        let hdop = horizontal_dop(&ring(3, 10.0), 0.0, 0.0);
        assert!((hdop - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let points = vec![
            LocalPoint::new(-20.0, -10.0, -60.0),
            LocalPoint::new(-10.0, -5.0, -60.0),
            LocalPoint::new(10.0, 5.0, -60.0),
            LocalPoint::new(20.0, 10.0, -60.0),
        ];
        assert!(horizontal_dop(&points, 0.0, 0.0) > 6.0);
    }

    #[test]
    fn test_too_few_points() {
        let points = ring(2, 10.0);
        assert_eq!(horizontal_dop(&points, 0.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_one_sided_geometry_is_worse_than_surrounding() {
        let surrounding = ring(6, 15.0);
        let one_sided: Vec<LocalPoint> = (0..6)
            .map(|k| {
                let angle = 0.2 * k as f64;
                LocalPoint::new(15.0 * angle.cos(), 15.0 * angle.sin(), -60.0)
            })
            .collect();

        let good = horizontal_dop(&surrounding, 0.0, 0.0);
        let bad = horizontal_dop(&one_sided, 0.0, 0.0);
        assert!(bad > good);
    }
}
