use nalgebra::{Matrix2, Vector2};
use crate::core::{
    LocalPoint, SolverDiagnostics, DEFAULT_FALLBACK_STEP, DEFAULT_MAX_ITERATIONS,
    DEFAULT_RESIDUAL_TOLERANCE,
};

/// Determinant below which the normal equations are treated as singular
const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Damped Newton-Raphson solver for TDOA hyperbola equations
///
/// Finds the point P with ‖P−Sᵢ‖ − ‖P−S₁‖ = rᵢ₁ for every non-reference
/// sensor Sᵢ. With three sensors the 2×2 Jacobian is square and each step is
/// a plain Newton step; with more, the same update solves the normal
/// equations (Gauss-Newton).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultilaterationSolver {
    /// Hard cap on iterations
    pub max_iterations: usize,
    /// Absolute tolerance every residual must meet, in layout units
    pub tolerance: f64,
    /// Residual scale of the gradient step taken when the Jacobian is unusable
    pub fallback_step: f64,
    /// Times a Newton step is halved while it fails to reduce the residual
    pub max_step_halvings: usize,
}

impl Default for MultilaterationSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_RESIDUAL_TOLERANCE,
            fallback_step: DEFAULT_FALLBACK_STEP,
            max_step_halvings: 4,
        }
    }
}

/// Solver estimate plus termination status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOutcome {
    pub position: LocalPoint,
    pub diagnostics: SolverDiagnostics,
}

impl MultilaterationSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve for the source position
    ///
    /// `others` pairs each non-reference sensor with its range difference
    /// relative to `reference`, in the same units as the positions. Never
    /// fails: the best estimate after the iteration budget is returned and
    /// `diagnostics.converged` says whether the tolerance was met.
    pub fn solve(&self, reference: LocalPoint, others: &[(LocalPoint, f64)]) -> SolverOutcome {
        let s0 = reference.to_vector();
        let sensors: Vec<(Vector2<f64>, f64)> =
            others.iter().map(|(p, r)| (p.to_vector(), *r)).collect();

        // Centroid start: unbiased for a symmetric layout
        let count = (sensors.len() + 1) as f64;
        let mut estimate = sensors.iter().fold(s0, |acc, (s, _)| acc + s) / count;
        let mut residuals = Self::residuals(&estimate, &s0, &sensors);

        let mut iterations = 0;
        let mut fallback_steps = 0;

        while iterations < self.max_iterations && !self.within_tolerance(&residuals) {
            iterations += 1;

            match Self::newton_step(&estimate, &s0, &sensors, &residuals) {
                Some(step) => {
                    let start_norm = norm(&residuals);
                    let mut lambda = 1.0;
                    let mut candidate = estimate - step;
                    let mut candidate_residuals = Self::residuals(&candidate, &s0, &sensors);

                    for _ in 0..self.max_step_halvings {
                        if norm(&candidate_residuals) < start_norm {
                            break;
                        }
                        lambda *= 0.5;
                        candidate = estimate - step * lambda;
                        candidate_residuals = Self::residuals(&candidate, &s0, &sensors);
                    }

                    estimate = candidate;
                    residuals = candidate_residuals;
                }
                None => {
                    // Singular Jacobian or estimate sitting on a sensor
                    fallback_steps += 1;
                    let first = residuals.first().copied().unwrap_or(0.0);
                    let last = residuals.last().copied().unwrap_or(0.0);
                    estimate -= Vector2::new(first, last) * self.fallback_step;
                    residuals = Self::residuals(&estimate, &s0, &sensors);
                    tracing::trace!(iteration = iterations, "multilateration fallback step");
                }
            }
        }

        SolverOutcome {
            position: LocalPoint::from_vector(estimate),
            diagnostics: SolverDiagnostics {
                converged: self.within_tolerance(&residuals),
                iterations,
                final_residual: norm(&residuals),
                fallback_steps,
            },
        }
    }

    fn within_tolerance(&self, residuals: &[f64]) -> bool {
        residuals.iter().all(|f| f.abs() < self.tolerance)
    }

    /// fᵢ = ‖P−Sᵢ‖ − ‖P−S₁‖ − rᵢ₁
    fn residuals(p: &Vector2<f64>, s0: &Vector2<f64>, sensors: &[(Vector2<f64>, f64)]) -> Vec<f64> {
        let d0 = (p - s0).norm();
        sensors
            .iter()
            .map(|(s, r)| (p - s).norm() - d0 - r)
            .collect()
    }

    /// Correction to subtract from the estimate, `None` when the Jacobian is unusable
    fn newton_step(
        p: &Vector2<f64>,
        s0: &Vector2<f64>,
        sensors: &[(Vector2<f64>, f64)],
        residuals: &[f64],
    ) -> Option<Vector2<f64>> {
        let d0 = (p - s0).norm();
        if d0 <= 0.0 {
            return None;
        }
        let u0 = (p - s0) / d0;

        let mut jtj = Matrix2::zeros();
        let mut jtf = Vector2::zeros();
        for ((s, _), f) in sensors.iter().zip(residuals) {
            let di = (p - s).norm();
            if di <= 0.0 {
                return None;
            }
            // ∂fᵢ/∂P = unit(P−Sᵢ) − unit(P−S₁)
            let row = (p - s) / di - u0;
            jtj += row * row.transpose();
            jtf += row * *f;
        }

        if jtj.determinant().abs() < SINGULAR_DETERMINANT {
            return None;
        }
        jtj.try_inverse().map(|inverse| inverse * jtf)
    }
}

/// Three-sensor convenience entry point with the default solver
///
/// `layout[0]` is the reference sensor; `r21` and `r31` are the range
/// differences of `layout[1]` and `layout[2]` relative to it.
pub fn solve_position(r21: f64, r31: f64, layout: &[LocalPoint; 3]) -> LocalPoint {
    MultilaterationSolver::default()
        .solve(layout[0], &[(layout[1], r21), (layout[2], r31)])
        .position
}

fn norm(residuals: &[f64]) -> f64 {
    residuals.iter().map(|f| f * f).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_layout() -> [LocalPoint; 3] {
        [
            LocalPoint::new(0.0, 0.0),
            LocalPoint::new(1.5, 0.0),
            LocalPoint::new(0.75, 0.75),
        ]
    }

    fn range_differences(p: LocalPoint, layout: &[LocalPoint; 3]) -> (f64, f64) {
        let d: Vec<f64> = layout.iter().map(|s| p.distance_to(s)).collect();
        (d[1] - d[0], d[2] - d[0])
    }

    #[test]
    fn test_converges_to_known_points() {
        let layout = reference_layout();
        let solver = MultilaterationSolver::new();

        for target in [
            LocalPoint::new(0.25, 0.2),
            LocalPoint::new(0.75, 0.55),
            LocalPoint::new(1.25, 0.2),
            LocalPoint::new(1.0, 0.4),
        ] {
            let (r21, r31) = range_differences(target, &layout);
            let outcome = solver.solve(layout[0], &[(layout[1], r21), (layout[2], r31)]);
            println!("target {:?} -> {:?}", target, outcome);

            assert!(outcome.diagnostics.converged);
            assert!(outcome.diagnostics.iterations <= 10);
            assert!(outcome.diagnostics.final_residual < 0.001 * 2f64.sqrt());
            assert!(outcome.position.distance_to(&target) < 0.001);
        }
    }

    #[test]
    fn test_source_at_reference_sensor() {
        let layout = reference_layout();
        let position = solve_position(1.5, 1.06, &layout);
        println!("source near mic1: {:?}", position);
        assert!(position.distance_to(&layout[0]) < 0.01);
    }

    #[test]
    fn test_equal_delays_symmetric_layout_gives_centroid() {
        let layout = [
            LocalPoint::new(0.0, 0.0),
            LocalPoint::new(1.0, 0.0),
            LocalPoint::new(0.5, 3f64.sqrt() / 2.0),
        ];
        let outcome = MultilaterationSolver::new().solve(layout[0], &[(layout[1], 0.0), (layout[2], 0.0)]);

        assert_eq!(outcome.diagnostics.iterations, 0);
        assert!(outcome.diagnostics.converged);
        assert!((outcome.position.x - 0.5).abs() < 1e-12);
        assert!((outcome.position.y - 3f64.sqrt() / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_impossible_ranges_stop_at_iteration_cap() {
        // |r21| larger than the mic1-mic2 baseline has no solution
        let layout = reference_layout();
        let outcome = MultilaterationSolver::new().solve(layout[0], &[(layout[1], 5.0), (layout[2], 1.0)]);

        assert!(!outcome.diagnostics.converged);
        assert_eq!(outcome.diagnostics.iterations, 10);
        assert!(outcome.position.x.is_finite() && outcome.position.y.is_finite());
    }

    #[test]
    fn test_fallback_when_estimate_hits_sensor() {
        // Collinear layout: the centroid is mic2 itself
        let layout = [
            LocalPoint::new(0.0, 0.0),
            LocalPoint::new(1.0, 0.0),
            LocalPoint::new(2.0, 0.0),
        ];
        let outcome = MultilaterationSolver::new().solve(layout[0], &[(layout[1], 0.3), (layout[2], 0.6)]);

        assert!(outcome.diagnostics.fallback_steps >= 1);
        assert!(outcome.diagnostics.iterations <= 10);
        assert!(outcome.diagnostics.final_residual.is_finite());
    }

    #[test]
    fn test_more_than_three_sensors() {
        let reference = LocalPoint::new(0.0, 0.0);
        let sensors = [
            LocalPoint::new(2.0, 0.0),
            LocalPoint::new(2.0, 2.0),
            LocalPoint::new(0.0, 2.0),
        ];
        let target = LocalPoint::new(0.6, 1.3);
        let d0 = target.distance_to(&reference);
        let others: Vec<(LocalPoint, f64)> = sensors
            .iter()
            .map(|s| (*s, target.distance_to(s) - d0))
            .collect();

        let outcome = MultilaterationSolver::new().solve(reference, &others);
        assert!(outcome.diagnostics.converged);
        assert!(outcome.position.distance_to(&target) < 0.001);
    }
}
