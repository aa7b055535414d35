//! Curvature-constrained smoothing of noisy vertex data.
//!
//! Given data `fᵢ` with weights `wᵢ = 1/σᵢ²`, [`smooth`] finds the field
//! `(h, g)` of least curvature `C(h, g)` (see
//! [`curvature`](crate::interpolation::curvature)) whose residual statistic
//!
//! ```text
//! Q2 = Σ wᵢ (hᵢ − fᵢ)²
//! ```
//!
//! equals the target `sm`. The constrained problem is solved through the
//! penalised one, `min Q2 + p·C`, by block Gauss–Seidel sweeps for a fixed
//! `p` and a bracketed Illinois iteration on `ln p` for `Q2(p) = sm`.
//!
//! When the zero-curvature trend of the data already has `Q2 ≤ sm`, the trend
//! is returned and the report says [`SmoothingStatus::ConstraintInactive`].
//! Running out of iterations is reported through
//! [`SmoothingStatus::NotConverged`]; the field is still usable.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::delaunay_triangulation::DelaunayTriangulation;
use crate::core::triangulation_data_structure::TdsError;
use crate::geometry::matrix::{MatrixError, solve3};
use crate::geometry::surface::{Surface, Vector3};
use crate::interpolation::curvature::{EdgeNetwork, TensionCoefficients};
use crate::interpolation::gradient::{Gradient, GradientError, local_gradients, relative_change};

/// Factor between successive smoothing parameters while bracketing.
const BRACKET_FACTOR: f64 = 10.0;

/// Errors raised before smoothing starts.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum SmoothingError {
    /// An input array does not match the vertex count.
    #[error("Expected {expected} {name}, got {found}")]
    LengthMismatch {
        /// Which array.
        name: &'static str,
        /// Number of vertices.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
    /// A weight is not strictly positive and finite.
    #[error("Weight {weight} at index {index} must be positive and finite")]
    InvalidWeight {
        /// Vertex index.
        index: usize,
        /// Offending weight.
        weight: f64,
    },
    /// A data value is NaN or infinite.
    #[error("Data value at index {index} is not finite")]
    NonFiniteValue {
        /// Vertex index.
        index: usize,
    },
    /// Option values out of range.
    #[error("Invalid smoothing options: {message}")]
    InvalidOptions {
        /// What is wrong.
        message: String,
    },
    /// The triangulation has fewer than three vertices.
    #[error("Triangulation has no triangles yet ({vertices} vertices)")]
    IncompleteTriangulation {
        /// Vertices inserted so far.
        vertices: usize,
    },
    /// The zero-curvature trend is not determined by the data.
    #[error("Trend fit failed: {source}")]
    TrendFit {
        /// Solver error.
        #[source]
        source: MatrixError,
    },
    /// Gradient estimation failed.
    #[error(transparent)]
    Gradient(#[from] GradientError),
    /// Structural error while reading the mesh.
    #[error("Triangulation data structure error: {0}")]
    Tds(#[from] TdsError),
}

/// Parameters of [`smooth`].
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::smoothing::SmoothingOptionsBuilder;
///
/// let options = SmoothingOptionsBuilder::default()
///     .target(100.0)
///     .q2_tolerance(0.05)
///     .build()
///     .unwrap();
/// assert_eq!(options.target(), 100.0);
/// assert!(SmoothingOptionsBuilder::default().target(-1.0).build().is_err());
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SmoothingOptions {
    /// Target value `sm` of `Q2`; about `N` when the weights are inverse
    /// variances.
    target: f64,
    /// Relative tolerance on `|Q2 − sm|`.
    #[builder(default = "0.01")]
    q2_tolerance: f64,
    /// Relative change of a Gauss–Seidel sweep below which the penalised
    /// problem counts as solved.
    #[builder(default = "1e-5")]
    gradient_tolerance: f64,
    /// Tension of the curvature functional.
    #[builder(default = "0.0")]
    tension: f64,
    /// Upper bound on evaluations of `Q2(p)`.
    #[builder(default = "50")]
    max_iterations: usize,
    /// Upper bound on Gauss–Seidel sweeps per evaluation.
    #[builder(default = "1000")]
    max_sweeps: usize,
}

fn check_options(
    target: Option<f64>,
    q2_tolerance: Option<f64>,
    gradient_tolerance: Option<f64>,
    tension: Option<f64>,
) -> Result<(), String> {
    if let Some(target) = target
        && !(target > 0.0 && target.is_finite())
    {
        return Err(format!("target must be positive and finite, got {target}"));
    }
    if let Some(tol) = q2_tolerance
        && !(tol > 0.0 && tol < 1.0)
    {
        return Err(format!("q2_tolerance must lie in (0, 1), got {tol}"));
    }
    if let Some(tol) = gradient_tolerance
        && !(tol > 0.0 && tol.is_finite())
    {
        return Err(format!("gradient_tolerance must be positive, got {tol}"));
    }
    if let Some(tension) = tension
        && !(tension >= 0.0 && tension.is_finite())
    {
        return Err(format!("tension must be non-negative and finite, got {tension}"));
    }
    Ok(())
}

impl SmoothingOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        check_options(self.target, self.q2_tolerance, self.gradient_tolerance, self.tension)
    }
}

impl SmoothingOptions {
    /// Target `sm`.
    #[must_use]
    pub const fn target(&self) -> f64 {
        self.target
    }

    /// Relative `Q2` tolerance.
    #[must_use]
    pub const fn q2_tolerance(&self) -> f64 {
        self.q2_tolerance
    }

    /// Relative sweep tolerance.
    #[must_use]
    pub const fn gradient_tolerance(&self) -> f64 {
        self.gradient_tolerance
    }

    /// Tension.
    #[must_use]
    pub const fn tension(&self) -> f64 {
        self.tension
    }

    /// Maximum `Q2` evaluations.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Maximum sweeps per evaluation.
    #[must_use]
    pub const fn max_sweeps(&self) -> usize {
        self.max_sweeps
    }

    fn validate(&self) -> Result<(), SmoothingError> {
        check_options(
            Some(self.target),
            Some(self.q2_tolerance),
            Some(self.gradient_tolerance),
            Some(self.tension),
        )
        .map_err(|message| SmoothingError::InvalidOptions { message })
    }
}

/// Outcome of a smoothing run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmoothingStatus {
    /// `|Q2 − sm| ≤ smTol·sm` with a converged inner solve.
    Converged,
    /// The zero-curvature trend already satisfies `Q2 ≤ sm`.
    ConstraintInactive,
    /// Iteration limits reached first.
    NotConverged,
}

impl SmoothingStatus {
    /// Numeric indicator: 0 converged, 1 constraint inactive, 2 not converged.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Converged => 0,
            Self::ConstraintInactive => 1,
            Self::NotConverged => 2,
        }
    }
}

/// Diagnostics of a smoothing run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmoothingReport {
    /// Outcome.
    pub status: SmoothingStatus,
    /// Final `Q2`.
    pub q2: f64,
    /// Final curvature `C(h, g)`.
    pub curvature: f64,
    /// Final smoothing parameter `p` (zero when the constraint is inactive).
    pub smoothing_parameter: f64,
    /// Evaluations of `Q2(p)`.
    pub iterations: usize,
    /// Gauss–Seidel sweeps over all evaluations.
    pub sweeps: usize,
    /// Relative change of the last sweep.
    pub max_change: f64,
}

/// Smoothed values, their gradients and the run diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothedField<const D: usize> {
    /// Smoothed vertex values.
    pub values: Vec<f64>,
    /// Gradients consistent with `values`.
    pub gradients: Vec<Gradient<D>>,
    /// Diagnostics.
    pub report: SmoothingReport,
}

/// Working state of the penalised problem.
struct Solver<'a> {
    network: &'a EdgeNetwork,
    data: &'a [f64],
    weights: &'a [f64],
    tension: f64,
    coefficients: TensionCoefficients,
    max_sweeps: usize,
    tolerance: f64,
    values: Vec<f64>,
    gradients: Vec<Vector3>,
    sweeps: usize,
}

impl Solver<'_> {
    fn q2(&self) -> f64 {
        q2(&self.values, self.data, self.weights)
    }

    fn curvature(&self) -> f64 {
        self.network.curvature(&self.values, &self.gradients, self.tension)
    }

    /// One sweep over all nodes for `min Q2 + p·C`; returns the relative
    /// change of values and gradients.
    fn sweep(&mut self, p: f64) -> f64 {
        let mut value_change: f64 = 0.0;
        let mut gradient_change: f64 = 0.0;
        for i in 0..self.network.len() {
            if self.network.star(i).is_empty() {
                continue;
            }
            let (hessian, rhs) =
                self.network
                    .local_system(i, &self.values, &self.gradients, &self.coefficients);
            let mut hessian = hessian * p;
            let mut rhs = rhs * p;
            hessian[(0, 0)] += 2.0 * self.weights[i];
            rhs[0] += 2.0 * self.weights[i] * self.data[i];
            let Ok(x) = solve3(&hessian, &rhs) else {
                tracing::trace!(node = i, "singular node system skipped");
                continue;
            };
            let (e1, e2) = self.network.frame(i);
            let gradient = e1 * x[1] + e2 * x[2];
            value_change = value_change.max((x[0] - self.values[i]).abs());
            gradient_change = gradient_change.max((gradient - self.gradients[i]).norm());
            self.values[i] = x[0];
            self.gradients[i] = gradient;
        }
        let value_scale = self.values.iter().map(|h| h.abs()).fold(0.0, f64::max);
        let value_change = if value_scale > 0.0 {
            value_change / value_scale
        } else {
            value_change
        };
        value_change.max(relative_change(gradient_change, &self.gradients))
    }

    /// Solves the penalised problem for `p`, warm-started from the current
    /// state. Returns the last relative change.
    fn solve(&mut self, p: f64) -> f64 {
        let mut change = f64::INFINITY;
        for _ in 0..self.max_sweeps {
            change = self.sweep(p);
            self.sweeps += 1;
            if change <= self.tolerance {
                break;
            }
        }
        change
    }
}

fn q2(values: &[f64], data: &[f64], weights: &[f64]) -> f64 {
    values
        .iter()
        .zip(data)
        .zip(weights)
        .map(|((h, f), w)| w * (h - f) * (h - f))
        .sum()
}

fn check_inputs<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
    weights: &[f64],
) -> Result<(), SmoothingError>
where
    K: Surface<D>,
{
    let expected = dt.number_of_vertices();
    for (name, array) in [("values", values), ("weights", weights)] {
        if array.len() != expected {
            return Err(SmoothingError::LengthMismatch {
                name,
                expected,
                found: array.len(),
            });
        }
    }
    if dt.number_of_triangles() == 0 {
        return Err(SmoothingError::IncompleteTriangulation { vertices: expected });
    }
    if let Some(index) = values.iter().position(|f| !f.is_finite()) {
        return Err(SmoothingError::NonFiniteValue { index });
    }
    if let Some((index, &weight)) = weights
        .iter()
        .enumerate()
        .find(|&(_, w)| !(*w > 0.0 && w.is_finite()))
    {
        return Err(SmoothingError::InvalidWeight { index, weight });
    }
    Ok(())
}

/// Smooths `values` with confidence `weights` to the deviation target of
/// `options`.
///
/// # Errors
///
/// Returns [`SmoothingError`] for malformed input. Non-convergence is not an
/// error; see [`SmoothingReport::status`].
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::smoothing::{SmoothingOptionsBuilder, SmoothingStatus, smooth};
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.0, 1.0]),
///     Point::new([1.0, 1.0]),
///     Point::new([0.5, 0.5]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// // Planar data is its own trend.
/// let values: Vec<f64> = points.iter().map(|p| p[0] + 2.0 * p[1]).collect();
/// let options = SmoothingOptionsBuilder::default().target(5.0).build().unwrap();
/// let field = smooth(&dt, &values, &[1.0; 5], &options).unwrap();
/// assert_eq!(field.report.status, SmoothingStatus::ConstraintInactive);
/// assert_eq!(field.report.status.code(), 1);
/// ```
pub fn smooth<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
    weights: &[f64],
    options: &SmoothingOptions,
) -> Result<SmoothedField<D>, SmoothingError>
where
    K: Surface<D>,
{
    options.validate()?;
    check_inputs(dt, values, weights)?;
    let kernel = dt.kernel();
    let n = values.len();
    let sm = options.target;

    #[allow(clippy::cast_precision_loss)]
    let expected = n as f64;
    let spread = (2.0 * expected).sqrt();
    if sm < expected - spread || sm > expected + spread {
        tracing::warn!(
            target_q2 = sm,
            low = expected - spread,
            high = expected + spread,
            "smoothing target outside N ± sqrt(2N); check the weights"
        );
    }

    let network = EdgeNetwork::new(dt)?;
    let points = network.points();
    let trend = kernel
        .fit_trend(points, values, weights)
        .map_err(|source| SmoothingError::TrendFit { source })?;
    let trend_values: Vec<f64> = points.iter().map(|q| trend.value_at(q)).collect();
    let trend_gradients: Vec<Vector3> = points
        .iter()
        .map(|q| kernel.project_tangent(q, &trend.slope))
        .collect();
    let trend_q2 = q2(&trend_values, values, weights);
    if trend_q2 <= sm {
        tracing::debug!(q2 = trend_q2, target_q2 = sm, "trend satisfies the constraint");
        return Ok(SmoothedField {
            gradients: trend_gradients.iter().map(|g| kernel.components(g)).collect(),
            report: SmoothingReport {
                status: SmoothingStatus::ConstraintInactive,
                q2: trend_q2,
                curvature: network.curvature(&trend_values, &trend_gradients, options.tension),
                smoothing_parameter: 0.0,
                iterations: 0,
                sweeps: 0,
                max_change: 0.0,
            },
            values: trend_values,
        });
    }

    let start_gradients = match local_gradients(dt, values, false) {
        Ok(gradients) => gradients,
        Err(GradientError::InsufficientNeighbors { .. } | GradientError::SingularFit { .. }) => {
            tracing::debug!("local gradients unavailable; starting from the trend");
            trend_gradients
        }
        Err(err) => return Err(err.into()),
    };
    let mut solver = Solver {
        network: &network,
        data: values,
        weights,
        tension: options.tension,
        coefficients: TensionCoefficients::new(options.tension),
        max_sweeps: options.max_sweeps,
        tolerance: options.gradient_tolerance,
        values: values.to_vec(),
        gradients: start_gradients,
        sweeps: 0,
    };

    // Balance the two extremes: Q2 of the trend against C of the data.
    let data_curvature = solver.curvature();
    let p0 = if data_curvature > 0.0 && data_curvature.is_finite() {
        trend_q2 / data_curvature
    } else {
        1.0
    };
    let tolerance = options.q2_tolerance * sm;
    let mut t = p0.ln();
    let mut iterations = 0;
    let mut change = f64::INFINITY;
    let mut residual = f64::INFINITY;
    let mut lower: Option<(f64, f64)> = None;
    let mut upper: Option<(f64, f64)> = None;
    let mut last_replaced: Option<bool> = None;

    while iterations < options.max_iterations {
        change = solver.solve(t.exp());
        iterations += 1;
        residual = solver.q2() - sm;
        tracing::trace!(
            iteration = iterations,
            p = t.exp(),
            q2 = residual + sm,
            change,
            "smoothing iteration"
        );
        if residual.abs() <= tolerance && change <= options.gradient_tolerance {
            break;
        }
        // Q2 grows with p.
        let is_upper = residual > 0.0;
        if is_upper {
            upper = Some((t, residual));
        } else {
            lower = Some((t, residual));
        }
        t = match (lower, upper) {
            (Some((t_lo, r_lo)), Some((t_hi, r_hi))) => {
                // Illinois: halve the stale end's residual when the same end
                // is replaced twice in a row.
                let (mut r_lo, mut r_hi) = (r_lo, r_hi);
                if last_replaced == Some(is_upper) {
                    if is_upper {
                        r_lo *= 0.5;
                        lower = Some((t_lo, r_lo));
                    } else {
                        r_hi *= 0.5;
                        upper = Some((t_hi, r_hi));
                    }
                }
                last_replaced = Some(is_upper);
                t_hi - r_hi * (t_hi - t_lo) / (r_hi - r_lo)
            }
            (None, Some(_)) => t - BRACKET_FACTOR.ln(),
            (Some(_), None) => t + BRACKET_FACTOR.ln(),
            (None, None) => t,
        };
    }

    let converged = residual.abs() <= tolerance && change <= options.gradient_tolerance;
    let status = if converged {
        SmoothingStatus::Converged
    } else {
        SmoothingStatus::NotConverged
    };
    let report = SmoothingReport {
        status,
        q2: solver.q2(),
        curvature: solver.curvature(),
        smoothing_parameter: t.exp(),
        iterations,
        sweeps: solver.sweeps,
        max_change: change,
    };
    if converged {
        tracing::debug!(?report, "smoothing converged");
    } else {
        tracing::warn!(?report, "smoothing did not converge; relax the tolerances or raise the limits");
    }
    Ok(SmoothedField {
        values: solver.values,
        gradients: solver.gradients.iter().map(|g| kernel.components(g)).collect(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delaunay_triangulation::{PlanarTriangulation, SphericalTriangulation};
    use crate::geometry::point::Point;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_planar(n: usize, seed: u64) -> (PlanarTriangulation, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let points: Vec<Point<2>> = (0..n)
            .map(|_| Point::new([rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)]))
            .collect();
        let dt = PlanarTriangulation::new(&points).unwrap();
        let values = points
            .iter()
            .map(|p| (3.0 * p[0]).sin() * (2.0 * p[1]).cos() + rng.random_range(-0.05..0.05))
            .collect();
        (dt, values)
    }

    fn options(target: f64) -> SmoothingOptions {
        SmoothingOptionsBuilder::default()
            .target(target)
            .q2_tolerance(0.02)
            .gradient_tolerance(1e-6)
            .max_sweeps(5000)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_validates() {
        assert!(SmoothingOptionsBuilder::default().build().is_err());
        assert!(
            SmoothingOptionsBuilder::default()
                .target(1.0)
                .q2_tolerance(1.5)
                .build()
                .is_err()
        );
        assert!(
            SmoothingOptionsBuilder::default()
                .target(1.0)
                .tension(-1.0)
                .build()
                .is_err()
        );
        let o = options(3.0);
        assert_eq!(o.max_iterations(), 50);
        assert_relative_eq!(o.tension(), 0.0);
    }

    #[test]
    fn status_codes() {
        assert_eq!(SmoothingStatus::Converged.code(), 0);
        assert_eq!(SmoothingStatus::ConstraintInactive.code(), 1);
        assert_eq!(SmoothingStatus::NotConverged.code(), 2);
    }

    #[test]
    fn rejects_bad_weights() {
        let (dt, values) = noisy_planar(12, 1);
        let mut weights = vec![1.0; 12];
        weights[4] = 0.0;
        assert_eq!(
            smooth(&dt, &values, &weights, &options(12.0)).unwrap_err(),
            SmoothingError::InvalidWeight { index: 4, weight: 0.0 }
        );
        assert!(matches!(
            smooth(&dt, &values, &[1.0; 3], &options(12.0)),
            Err(SmoothingError::LengthMismatch { name: "weights", .. })
        ));
    }

    #[test]
    fn hits_the_target() {
        let (dt, values) = noisy_planar(40, 21);
        let weights = vec![400.0; 40];
        let field = smooth(&dt, &values, &weights, &options(40.0)).unwrap();
        assert_eq!(field.report.status, SmoothingStatus::Converged);
        assert!((field.report.q2 - 40.0).abs() <= 0.02 * 40.0);
        assert_relative_eq!(field.report.q2, q2(&field.values, &values, &weights));
        assert!(field.report.smoothing_parameter > 0.0);
    }

    #[test]
    fn larger_target_is_smoother() {
        let (dt, values) = noisy_planar(40, 22);
        let weights = vec![400.0; 40];
        let tight = smooth(&dt, &values, &weights, &options(20.0)).unwrap();
        let loose = smooth(&dt, &values, &weights, &options(160.0)).unwrap();
        assert_eq!(tight.report.status, SmoothingStatus::Converged);
        assert_eq!(loose.report.status, SmoothingStatus::Converged);
        assert!(loose.report.curvature < tight.report.curvature);
        assert!(loose.report.smoothing_parameter > tight.report.smoothing_parameter);
    }

    #[test]
    fn spherical_constant_is_inactive() {
        let s = 1.0 / 3.0_f64.sqrt();
        let points = [
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
            Point::new([-s, -s, -s]),
        ];
        let dt = SphericalTriangulation::new(&points).unwrap();
        let field = smooth(&dt, &[2.0, 2.1, 1.9, 2.0], &[1.0; 4], &options(4.0)).unwrap();
        assert_eq!(field.report.status, SmoothingStatus::ConstraintInactive);
        for h in &field.values {
            assert_relative_eq!(*h, 2.0, epsilon = 1e-12);
        }
        for g in &field.gradients {
            assert_eq!(*g, [0.0; 3]);
        }
    }

    #[test]
    fn iteration_limit_is_reported() {
        let (dt, values) = noisy_planar(30, 5);
        let options = SmoothingOptionsBuilder::default()
            .target(30.0)
            .max_iterations(1)
            .max_sweeps(1)
            .build()
            .unwrap();
        let field = smooth(&dt, &values, &vec![400.0; 30], &options).unwrap();
        assert_eq!(field.report.status, SmoothingStatus::NotConverged);
        assert_eq!(field.report.iterations, 1);
        assert_eq!(field.values.len(), 30);
    }
}
