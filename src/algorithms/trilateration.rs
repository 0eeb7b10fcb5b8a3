//! Robust log-distance trilateration on tangent-plane points
//!
//! Fits `[x0, y0, n, A]` (position, path-loss exponent, reference
//! attenuation) to observed signal strengths with a Huber-weighted
//! Gauss-Newton iteration. The propagation model is
//! `rss = -A - 10·n·log10(d)`.

use std::f64::consts::LN_10;
use std::ops::ControlFlow;

use nalgebra::{DMatrix, DVector, Matrix4, Vector4};

use crate::algorithms::dop::horizontal_dop;
use crate::core::{LocalPoint, MIN_MODEL_DISTANCE_M, MIN_OBSERVATIONS};
use crate::utils::config::SolverConfig;
use crate::validation::SolverError;

/// Relative singular value below which the normal equations count as singular
const RANK_TOLERANCE: f64 = 1e-12;

/// Parameter vector layout
const X0: usize = 0;
const Y0: usize = 1;
const EXPONENT: usize = 2;
const ATTENUATION: usize = 3;

/// Accepted solver result in tangent-plane coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct SolverFit {
    /// East offset of the access point from the plane origin (m)
    pub east: f64,
    /// North offset of the access point from the plane origin (m)
    pub north: f64,
    pub path_loss_exponent: f64,
    /// Reference attenuation A (dB); the reference signal is `-A`
    pub attenuation_db: f64,
    pub hdop: f64,
    pub iterations: usize,
}

impl SolverFit {
    pub fn reference_signal_dbm(&self) -> f64 {
        -self.attenuation_db
    }
}

/// Result of a single Gauss-Newton iteration
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Keep iterating from these parameters
    Continue(Vector4<f64>),
    /// Step and residual are both below tolerance
    Converged(Vector4<f64>),
    /// Normal equations could not be solved; previous parameters stand
    Singular,
    NonFinite(Vector4<f64>),
    /// Exponent or attenuation left the runaway bounds
    Runaway(Vector4<f64>),
}

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Converged,
    Singular,
    Exhausted,
}

/// Huber weight: 1 inside `delta`, `delta / |r|` outside
pub fn huber_weight(residual: f64, delta: f64) -> f64 {
    let abs_r = residual.abs();
    if abs_r <= delta {
        1.0
    } else {
        delta / abs_r
    }
}

/// Merge points closer than `radius` to a leading point into a single
/// representative whose coordinates and signal are |signal|-weighted means.
pub fn merge_nearby_points(points: &[LocalPoint], radius: f64) -> Vec<LocalPoint> {
    let mut merged = Vec::with_capacity(points.len());
    let mut taken = vec![false; points.len()];

    for i in 0..points.len() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        let mut group = vec![points[i]];

        for j in (i + 1)..points.len() {
            if !taken[j] && points[i].distance_to(points[j].x, points[j].y) < radius {
                group.push(points[j]);
                taken[j] = true;
            }
        }

        let total: f64 = group.iter().map(|p| p.signal_dbm.abs()).sum();
        let representative = if total > 0.0 {
            LocalPoint::new(
                group.iter().map(|p| p.x * p.signal_dbm.abs()).sum::<f64>() / total,
                group.iter().map(|p| p.y * p.signal_dbm.abs()).sum::<f64>() / total,
                group.iter().map(|p| p.signal_dbm * p.signal_dbm.abs()).sum::<f64>() / total,
            )
        } else {
            let count = group.len() as f64;
            LocalPoint::new(
                group.iter().map(|p| p.x).sum::<f64>() / count,
                group.iter().map(|p| p.y).sum::<f64>() / count,
                0.0,
            )
        };
        merged.push(representative);
    }

    merged
}

/// Predicted signal at `point` for the parameters `[x0, y0, n, A]`
pub fn predicted_signal(parameters: &Vector4<f64>, point: &LocalPoint) -> f64 {
    let d = point
        .distance_to(parameters[X0], parameters[Y0])
        .max(MIN_MODEL_DISTANCE_M);
    -parameters[ATTENUATION] - 10.0 * parameters[EXPONENT] * d.log10()
}

/// Closed-form Jacobian of the model, one row per point
pub fn jacobian(parameters: &Vector4<f64>, points: &[LocalPoint]) -> DMatrix<f64> {
    let mut jacobian = DMatrix::zeros(points.len(), 4);
    let n = parameters[EXPONENT];

    for (i, point) in points.iter().enumerate() {
        let dx = parameters[X0] - point.x;
        let dy = parameters[Y0] - point.y;
        let d = (dx * dx + dy * dy).sqrt().max(MIN_MODEL_DISTANCE_M);

        jacobian[(i, X0)] = -10.0 * n * dx / (d * d * LN_10);
        jacobian[(i, Y0)] = -10.0 * n * dy / (d * d * LN_10);
        jacobian[(i, EXPONENT)] = -10.0 * d.log10();
        jacobian[(i, ATTENUATION)] = -1.0;
    }

    jacobian
}

/// Gauss-Newton solver for the log-distance model
#[derive(Debug, Clone)]
pub struct LogDistanceSolver {
    config: SolverConfig,
}

impl Default for LogDistanceSolver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl LogDistanceSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Starting parameters: mean point position, configured n and A
    pub fn initial_parameters(&self, points: &[LocalPoint]) -> Vector4<f64> {
        let count = points.len().max(1) as f64;
        Vector4::new(
            points.iter().map(|p| p.x).sum::<f64>() / count,
            points.iter().map(|p| p.y).sum::<f64>() / count,
            self.config.initial_exponent,
            self.config.initial_attenuation_db,
        )
    }

    /// One weighted Gauss-Newton iteration from `parameters`.
    ///
    /// Rows of the residual vector and Jacobian are scaled by
    /// `|signal| / Σ|signal| · huber(r)` before forming the normal equations.
    pub fn step(&self, parameters: &Vector4<f64>, points: &[LocalPoint]) -> StepOutcome {
        let total_signal: f64 = points.iter().map(|p| p.signal_dbm.abs()).sum();
        if total_signal <= 0.0 {
            return StepOutcome::Singular;
        }

        let residuals = DVector::from_iterator(
            points.len(),
            points.iter().map(|p| p.signal_dbm - predicted_signal(parameters, p)),
        );
        let mut weighted_jacobian = jacobian(parameters, points);
        let mut weighted_residuals = residuals.clone();

        for (i, point) in points.iter().enumerate() {
            let weight = point.signal_dbm.abs() / total_signal
                * huber_weight(residuals[i], self.config.huber_delta_db);
            weighted_residuals[i] *= weight;
            weighted_jacobian.row_mut(i).scale_mut(weight);
        }

        let jt = weighted_jacobian.transpose();
        let jtj: Matrix4<f64> = (&jt * &weighted_jacobian).fixed_view::<4, 4>(0, 0).into_owned();
        let jtr: Vector4<f64> = (&jt * &weighted_residuals).fixed_rows::<4>(0).into_owned();

        let delta = match solve_normal_equations(&jtj, &jtr) {
            Some(delta) => delta,
            None => return StepOutcome::Singular,
        };

        let next = parameters + delta;

        if delta.norm() < self.config.step_tolerance && residuals.norm() < self.config.residual_tolerance_db {
            return StepOutcome::Converged(next);
        }
        if next.iter().any(|v| !v.is_finite()) {
            return StepOutcome::NonFinite(next);
        }
        if !self.config.runaway_exponent.contains(next[EXPONENT])
            || !self.config.runaway_attenuation_db.contains(next[ATTENUATION])
        {
            return StepOutcome::Runaway(next);
        }

        StepOutcome::Continue(next)
    }

    /// Merge nearby points, iterate, and apply the acceptance gates.
    pub fn solve(&self, points: &[LocalPoint]) -> Result<SolverFit, SolverError> {
        let merged = merge_nearby_points(points, self.config.merge_radius_m);
        if merged.len() < MIN_OBSERVATIONS {
            return Err(SolverError::InsufficientPoints {
                available: merged.len(),
                required: MIN_OBSERVATIONS,
            });
        }

        let initial = self.initial_parameters(&merged);
        let (parameters, iterations, termination) = self.iterate(initial, &merged)?;
        log::trace!(
            "solver stopped after {} iterations ({:?}): {:?}",
            iterations,
            termination,
            parameters.as_slice()
        );

        let exponent = parameters[EXPONENT];
        if !self.config.accepted_exponent.contains(exponent) {
            return Err(SolverError::ExponentOutOfRange(exponent));
        }
        let attenuation = parameters[ATTENUATION];
        if !self.config.accepted_attenuation_db.contains(attenuation) {
            return Err(SolverError::AttenuationOutOfRange(attenuation));
        }

        let hdop = horizontal_dop(&merged, parameters[X0], parameters[Y0]);
        if !hdop.is_finite() || hdop > self.config.max_hdop {
            return Err(SolverError::PoorGeometry { hdop });
        }

        Ok(SolverFit {
            east: parameters[X0],
            north: parameters[Y0],
            path_loss_exponent: exponent,
            attenuation_db: attenuation,
            hdop,
            iterations,
        })
    }

    /// Fold `step` over the iteration budget; the parameter vector is the only state.
    fn iterate(
        &self,
        initial: Vector4<f64>,
        points: &[LocalPoint],
    ) -> Result<(Vector4<f64>, usize, Termination), SolverError> {
        let flow: ControlFlow<Result<(Vector4<f64>, usize, Termination), SolverError>, Vector4<f64>> =
            (0..self.config.max_iterations).try_fold(initial, |parameters, iteration| {
            match self.step(&parameters, points) {
                StepOutcome::Continue(next) => ControlFlow::Continue(next),
                StepOutcome::Converged(next) => ControlFlow::Break(Ok((next, iteration + 1, Termination::Converged))),
                StepOutcome::Singular => ControlFlow::Break(Ok((parameters, iteration, Termination::Singular))),
                StepOutcome::NonFinite(_) => {
                    ControlFlow::Break(Err(SolverError::NonFiniteParameters { iteration: iteration + 1 }))
                }
                StepOutcome::Runaway(next) => ControlFlow::Break(Err(SolverError::ParameterRunaway {
                    iteration: iteration + 1,
                    exponent: next[EXPONENT],
                    attenuation: next[ATTENUATION],
                })),
            }
        });

        match flow {
            ControlFlow::Continue(parameters) => Ok((parameters, self.config.max_iterations, Termination::Exhausted)),
            ControlFlow::Break(result) => result,
        }
    }
}

/// Solve `(JᵀWJ)·Δ = JᵀW·r`; `None` when the system is rank deficient
fn solve_normal_equations(jtj: &Matrix4<f64>, jtr: &Vector4<f64>) -> Option<Vector4<f64>> {
    if jtj.iter().any(|v| !v.is_finite()) || jtr.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = jtj.svd(true, true);
    let largest = svd.singular_values.max();
    let smallest = svd.singular_values.min();
    if largest <= 0.0 || smallest <= largest * RANK_TOLERANCE {
        return None;
    }

    svd.solve(jtr, 0.0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Noise-free signal at `point` from an emitter at `(x, y)`
    fn synthetic_signal(x: f64, y: f64, point_x: f64, point_y: f64, n: f64, a: f64) -> f64 {
        let d = ((point_x - x).powi(2) + (point_y - y).powi(2)).sqrt();
        -a - 10.0 * n * d.log10()
    }

    /// Eight points around the origin at alternating 8 m / 20 m radii
    fn surrounding_points(emitter: (f64, f64), n: f64, a: f64) -> Vec<LocalPoint> {
        (0..8)
            .map(|k| {
                let angle = std::f64::consts::FRAC_PI_4 * k as f64;
                let radius = if k % 2 == 0 { 8.0 } else { 20.0 };
                let (px, py) = (radius * angle.cos(), radius * angle.sin());
                LocalPoint::new(px, py, synthetic_signal(emitter.0, emitter.1, px, py, n, a))
            })
            .collect()
    }

    #[test]
    fn test_huber_weight() {
        assert_eq!(huber_weight(3.0, 5.0), 1.0);
        assert_eq!(huber_weight(-5.0, 5.0), 1.0);
        assert_eq!(huber_weight(10.0, 5.0), 0.5);
        assert_eq!(huber_weight(-20.0, 5.0), 0.25);
    }

    #[test]
    fn test_merge_nearby_points_weights_by_signal() {
        let points = vec![
            LocalPoint::new(0.0, 0.0, -40.0),
            LocalPoint::new(2.0, 0.0, -60.0),
            LocalPoint::new(50.0, 0.0, -70.0),
        ];
        let merged = merge_nearby_points(&points, 3.0);
        assert_eq!(merged.len(), 2);

        // weights 40 and 60
        assert!((merged[0].x - 1.2).abs() < 1e-12);
        assert!((merged[0].signal_dbm - (-52.0)).abs() < 1e-12);
        assert_eq!(merged[1], points[2]);
    }

    #[test]
    fn test_merge_is_not_transitive() {
        let points = vec![
            LocalPoint::new(0.0, 0.0, -50.0),
            LocalPoint::new(2.5, 0.0, -50.0),
            LocalPoint::new(5.0, 0.0, -50.0),
        ];
        let merged = merge_nearby_points(&points, 3.0);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].x - 1.25).abs() < 1e-12);
        assert_eq!(merged[1].x, 5.0);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let points = surrounding_points((3.0, -2.0), 3.0, 40.0);
        let parameters = Vector4::new(1.0, 1.5, 2.7, 38.0);
        let analytic = jacobian(&parameters, &points);

        let h = 1e-6;
        for column in 0..4 {
            let mut plus = parameters;
            let mut minus = parameters;
            plus[column] += h;
            minus[column] -= h;
            for (i, point) in points.iter().enumerate() {
                let numeric = (predicted_signal(&plus, point) - predicted_signal(&minus, point)) / (2.0 * h);
                assert!(
                    (numeric - analytic[(i, column)]).abs() < 1e-5,
                    "row {} column {}: {} vs {}",
                    i,
                    column,
                    numeric,
                    analytic[(i, column)]
                );
            }
        }
    }

    #[test]
    fn test_single_step_recovers_linear_parameters() {
        // Emitter at the point centroid: only n and A need to move
        let points = surrounding_points((0.0, 0.0), 3.0, 40.0);
        let solver = LogDistanceSolver::default();
        let initial = solver.initial_parameters(&points);
        assert!(initial[X0].abs() < 1e-9 && initial[Y0].abs() < 1e-9);

        match solver.step(&initial, &points) {
            StepOutcome::Continue(next) => {
                assert!((next[EXPONENT] - 3.0).abs() < 1e-6);
                assert!((next[ATTENUATION] - 40.0).abs() < 1e-6);
                assert!(next[X0].abs() < 1e-6 && next[Y0].abs() < 1e-6);
            }
            other => panic!("unexpected step outcome {:?}", other),
        }
    }

    #[test]
    fn test_converges_to_off_centre_emitter() {
        let emitter = (4.0, 3.0);
        let points = surrounding_points(emitter, 3.0, 40.0);
        let fit = LogDistanceSolver::default().solve(&points).unwrap();

        let error = ((fit.east - emitter.0).powi(2) + (fit.north - emitter.1).powi(2)).sqrt();
        assert!(error < 2.0, "position error {}", error);
        assert!((fit.path_loss_exponent - 3.0).abs() < 0.3);
        assert!((fit.attenuation_db - 40.0).abs() < 5.0);
        assert!(fit.hdop <= 6.0);
        assert!(fit.iterations <= 30);
    }

    /// Three points cannot determine four parameters; the singular normal
    /// equations stop the iteration at the initial guess, which for points
    /// placed symmetrically around the emitter is already on target.
    #[test]
    fn test_three_symmetric_points() {
        let emitter = (0.0, 0.0);
        let points: Vec<LocalPoint> = (0..3)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / 3.0;
                let (px, py) = (12.0 * angle.cos(), 12.0 * angle.sin());
                LocalPoint::new(px, py, synthetic_signal(emitter.0, emitter.1, px, py, 3.0, 40.0))
            })
            .collect();

        let fit = LogDistanceSolver::default().solve(&points).unwrap();
        let error = (fit.east.powi(2) + fit.north.powi(2)).sqrt();
        assert!(error < 2.0);
        assert!((fit.path_loss_exponent - 3.0).abs() < 0.3);
        // The fit stays at the initial A = 35, exactly on the 5 dB tolerance
        // edge for the A = 40 emitter.
        assert!((fit.attenuation_db - 40.0).abs() <= 5.0 + 1e-9);
    }

    #[test]
    fn test_three_points_keep_initial_guess() {
        // A = 37 puts the initial A = 35 well inside the tolerance
        let points: Vec<LocalPoint> = (0..3)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / 3.0;
                let (px, py) = (12.0 * angle.cos(), 12.0 * angle.sin());
                LocalPoint::new(px, py, synthetic_signal(0.0, 0.0, px, py, 3.0, 37.0))
            })
            .collect();

        let fit = LogDistanceSolver::default().solve(&points).unwrap();
        assert_eq!(fit.iterations, 0);
        assert!((fit.east.powi(2) + fit.north.powi(2)).sqrt() < 1e-9);
        assert!((fit.attenuation_db - 37.0).abs() < 5.0);
        assert_eq!(fit.path_loss_exponent, 3.0);
    }

    #[test]
    fn test_collinear_points_are_rejected() {
        let points: Vec<LocalPoint> = (0..6)
            .map(|k| {
                let x = -25.0 + 10.0 * k as f64;
                LocalPoint::new(x, 0.5 * x, synthetic_signal(1.0, 0.5, x, 0.5 * x, 3.0, 40.0))
            })
            .collect();

        assert!(LogDistanceSolver::default().solve(&points).is_err());
    }

    #[test]
    fn test_too_few_distinct_points() {
        let points = vec![
            LocalPoint::new(0.0, 0.0, -50.0),
            LocalPoint::new(1.0, 0.0, -52.0),
            LocalPoint::new(30.0, 0.0, -70.0),
        ];
        let result = LogDistanceSolver::default().solve(&points);
        assert_eq!(result, Err(SolverError::InsufficientPoints { available: 2, required: 3 }));
    }

    #[test]
    fn test_flat_signal_runs_away() {
        // Equal signals at unequal distances fit only with n = 0
        let points: Vec<LocalPoint> = surrounding_points((0.0, 0.0), 3.0, 40.0)
            .into_iter()
            .map(|p| LocalPoint::new(p.x, p.y, -60.0))
            .collect();

        match LogDistanceSolver::default().solve(&points) {
            Err(SolverError::ParameterRunaway { exponent, .. }) => assert!(exponent < 0.1),
            other => panic!("expected runaway, got {:?}", other),
        }
    }
}
