//! Per-vertex gradient estimation.
//!
//! [`estimate_gradients`] fits a local weighted least-squares model at every
//! vertex (see [`Surface::fit_local_gradient`]). The fits are independent and
//! run in parallel with `rayon` unless disabled through [`GradientOptions`].
//!
//! [`estimate_gradients_global`] refines the local estimates into the
//! gradients that minimise the curvature functional of
//! [`curvature`](crate::interpolation::curvature) with the values held fixed.
//!
//! Spherical gradients are tangent vectors in Cartesian components;
//! [`lon_lat_partials`] converts them to angular derivatives.

use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::delaunay_triangulation::DelaunayTriangulation;
use crate::core::triangulation_data_structure::TdsError;
use crate::core::vertex::VertexId;
use crate::geometry::matrix::{MatrixError, solve2};
use crate::geometry::point::Point;
use crate::geometry::surface::{QUADRATIC_MIN_SAMPLES, Surface, Vector3};
use crate::interpolation::curvature::{EdgeNetwork, TensionCoefficients};

/// Gradient of a scalar field at a vertex, in the coordinates of the space.
pub type Gradient<const D: usize> = [f64; D];

/// Smallest number of samples a local fit accepts.
pub const MIN_GRADIENT_SAMPLES: usize = 3;

/// Errors raised by the derivative estimators.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum GradientError {
    /// Too few samples around a vertex.
    #[error("Vertex {vertex} has {found} usable neighbours; at least {MIN_GRADIENT_SAMPLES} are required")]
    InsufficientNeighbors {
        /// The vertex.
        vertex: VertexId,
        /// Samples found.
        found: usize,
    },
    /// The local fit is not determined by the samples.
    #[error("Local fit at vertex {vertex} is singular: {source}")]
    SingularFit {
        /// The vertex.
        vertex: VertexId,
        /// Solver error.
        #[source]
        source: MatrixError,
    },
    /// A per-vertex array does not match the vertex count.
    #[error("Expected {expected} per-vertex entries, got {found}")]
    LengthMismatch {
        /// Number of vertices.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
    /// A field value is NaN or infinite.
    #[error("Field value at vertex {vertex} is not finite")]
    NonFiniteValue {
        /// The vertex.
        vertex: VertexId,
    },
    /// The triangulation has fewer than three vertices.
    #[error("Triangulation has no triangles yet ({vertices} vertices)")]
    IncompleteTriangulation {
        /// Vertices inserted so far.
        vertices: usize,
    },
    /// Longitude derivatives are unbounded at the poles.
    #[error("Point is {rho:e} from the polar axis, below the tolerance {tolerance:e}")]
    PoleSingularity {
        /// Distance from the polar axis (`cos φ`).
        rho: f64,
        /// Tolerance it violated.
        tolerance: f64,
    },
    /// Structural error while reading the mesh.
    #[error("Triangulation data structure error: {0}")]
    Tds(#[from] TdsError),
}

/// Options of [`estimate_gradients`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientOptions {
    /// Estimate vertices in parallel.
    pub parallel: bool,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl GradientOptions {
    /// Default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { parallel: true }
    }

    /// Enables or disables parallel estimation.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Options of [`estimate_gradients_global`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalGradientOptions {
    /// Tension of the curvature functional.
    pub tension: f64,
    /// Stop when the largest gradient change of a sweep, relative to the
    /// largest gradient, is at most this.
    pub tolerance: f64,
    /// Upper bound on Gauss–Seidel sweeps.
    pub max_sweeps: usize,
    /// Compute the starting estimates in parallel.
    pub parallel: bool,
}

impl Default for GlobalGradientOptions {
    fn default() -> Self {
        Self {
            tension: 0.0,
            tolerance: 1e-6,
            max_sweeps: 100,
            parallel: true,
        }
    }
}

/// Convergence summary of an iterative gradient solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Sweeps performed.
    pub sweeps: usize,
    /// Relative gradient change of the last sweep.
    pub max_change: f64,
    /// Whether the tolerance was met.
    pub converged: bool,
}

/// Angular derivatives of a field on the unit sphere.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LonLatPartials {
    /// `∂f/∂λ`.
    pub d_lon: f64,
    /// `∂f/∂φ`.
    pub d_lat: f64,
    /// Eastward component of the tangent gradient, `(∂f/∂λ)/cos φ`.
    pub east: f64,
    /// Northward component of the tangent gradient, `∂f/∂φ`.
    pub north: f64,
}

pub(crate) fn check_field<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
) -> Result<(), GradientError>
where
    K: Surface<D>,
{
    let expected = dt.number_of_vertices();
    if values.len() != expected {
        return Err(GradientError::LengthMismatch {
            expected,
            found: values.len(),
        });
    }
    if dt.number_of_triangles() == 0 {
        return Err(GradientError::IncompleteTriangulation { vertices: expected });
    }
    if let Some(index) = values.iter().position(|f| !f.is_finite()) {
        return Err(GradientError::NonFiniteValue {
            vertex: VertexId::new(index),
        });
    }
    Ok(())
}

/// Converts gradient components to an embedded vector.
pub(crate) fn lift<const D: usize>(gradient: &Gradient<D>) -> Vector3 {
    Vector3::from_fn(|i, _| gradient.get(i).copied().unwrap_or(0.0))
}

/// Neighbours of `vertex`, extended by the second ring when the first has
/// fewer than [`QUADRATIC_MIN_SAMPLES`] members.
fn sample_ring<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    vertex: VertexId,
) -> Result<Vec<VertexId>, TdsError>
where
    K: Surface<D>,
{
    let mut ring: Vec<VertexId> = dt.neighbors(vertex)?.into_iter().collect();
    if ring.len() < QUADRATIC_MIN_SAMPLES {
        for i in 0..ring.len() {
            for second in dt.neighbors(ring[i])? {
                if second != vertex && !ring.contains(&second) {
                    ring.push(second);
                }
            }
        }
    }
    Ok(ring)
}

fn local_gradient<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    vertex: VertexId,
    values: &[f64],
) -> Result<Vector3, GradientError>
where
    K: Surface<D>,
{
    let kernel = dt.kernel();
    let tds = dt.tds();
    let center = kernel.embed(tds.point_or_err(vertex)?);
    let ring = sample_ring(dt, vertex)?;
    if ring.len() < MIN_GRADIENT_SAMPLES {
        return Err(GradientError::InsufficientNeighbors {
            vertex,
            found: ring.len(),
        });
    }
    let samples = ring
        .iter()
        .map(|&v| Ok((kernel.embed(tds.point_or_err(v)?), values[v.index()])))
        .collect::<Result<Vec<_>, TdsError>>()?;
    kernel
        .fit_local_gradient(&center, values[vertex.index()], &samples)
        .map_err(|source| GradientError::SingularFit { vertex, source })
}

/// Estimates the gradient at one vertex.
///
/// # Errors
///
/// - [`GradientError::LengthMismatch`] if `values` does not have one entry per
///   vertex.
/// - [`GradientError::InsufficientNeighbors`] if fewer than three samples
///   surround the vertex.
/// - [`GradientError::SingularFit`] if the samples do not determine the fit.
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::gradient::estimate_gradient;
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.0, 1.0]),
///     Point::new([1.0, 1.0]),
///     Point::new([0.4, 0.6]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// let values: Vec<f64> = points.iter().map(|p| 2.0 * p[0] - p[1]).collect();
/// let g = estimate_gradient(&dt, VertexId::new(4), &values).unwrap();
/// assert!((g[0] - 2.0).abs() < 1e-10 && (g[1] + 1.0).abs() < 1e-10);
/// ```
pub fn estimate_gradient<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    vertex: VertexId,
    values: &[f64],
) -> Result<Gradient<D>, GradientError>
where
    K: Surface<D>,
{
    check_field(dt, values)?;
    let g = local_gradient(dt, vertex, values)?;
    Ok(dt.kernel().components(&g))
}

pub(crate) fn local_gradients<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
    parallel: bool,
) -> Result<Vec<Vector3>, GradientError>
where
    K: Surface<D>,
{
    let n = dt.number_of_vertices();
    if parallel {
        (0..n)
            .into_par_iter()
            .map(|i| local_gradient(dt, VertexId::new(i), values))
            .collect()
    } else {
        (0..n)
            .map(|i| local_gradient(dt, VertexId::new(i), values))
            .collect()
    }
}

/// Estimates the gradient at every vertex from local fits.
///
/// # Errors
///
/// See [`estimate_gradient`]; the first failing vertex is reported.
pub fn estimate_gradients<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
    options: &GradientOptions,
) -> Result<Vec<Gradient<D>>, GradientError>
where
    K: Surface<D>,
{
    check_field(dt, values)?;
    let kernel = dt.kernel();
    let gradients = local_gradients(dt, values, options.parallel)?;
    tracing::debug!(
        vertices = gradients.len(),
        parallel = options.parallel,
        "estimated local gradients"
    );
    Ok(gradients.iter().map(|g| kernel.components(g)).collect())
}

/// One Gauss–Seidel sweep over the gradients with the values fixed.
///
/// Returns the largest change of a gradient.
pub(crate) fn gradient_sweep(
    network: &EdgeNetwork,
    values: &[f64],
    gradients: &mut [Vector3],
    coefficients: &TensionCoefficients,
) -> f64 {
    let mut max_change: f64 = 0.0;
    for i in 0..network.len() {
        if network.star(i).is_empty() {
            continue;
        }
        let (hessian, rhs) = network.local_system(i, values, gradients, coefficients);
        // Eliminate the fixed value from the gradient rows.
        let h = na::Matrix2::new(hessian[(1, 1)], hessian[(1, 2)], hessian[(2, 1)], hessian[(2, 2)]);
        let r = na::Vector2::new(
            rhs[1] - hessian[(1, 0)] * values[i],
            rhs[2] - hessian[(2, 0)] * values[i],
        );
        let Ok(uv) = solve2(&h, &r) else {
            continue;
        };
        let (e1, e2) = network.frame(i);
        let updated = e1 * uv[0] + e2 * uv[1];
        max_change = max_change.max((updated - gradients[i]).norm());
        gradients[i] = updated;
    }
    max_change
}

/// Relative change used by the sweep stopping rules.
pub(crate) fn relative_change(change: f64, gradients: &[Vector3]) -> f64 {
    let scale = gradients.iter().map(Vector3::norm).fold(0.0, f64::max);
    if scale > 0.0 { change / scale } else { change }
}

/// Estimates gradients that minimise the curvature functional for fixed
/// values, starting from the local estimates.
///
/// # Errors
///
/// See [`estimate_gradient`].
pub fn estimate_gradients_global<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    values: &[f64],
    options: &GlobalGradientOptions,
) -> Result<(Vec<Gradient<D>>, SweepReport), GradientError>
where
    K: Surface<D>,
{
    check_field(dt, values)?;
    let kernel = dt.kernel();
    let network = EdgeNetwork::new(dt)?;
    let mut gradients = local_gradients(dt, values, options.parallel)?;
    let coefficients = TensionCoefficients::new(options.tension);

    let mut report = SweepReport::default();
    while report.sweeps < options.max_sweeps {
        let change = gradient_sweep(&network, values, &mut gradients, &coefficients);
        report.sweeps += 1;
        report.max_change = relative_change(change, &gradients);
        tracing::trace!(sweep = report.sweeps, change = report.max_change, "gradient sweep");
        if report.max_change <= options.tolerance {
            report.converged = true;
            break;
        }
    }
    if !report.converged {
        tracing::warn!(
            sweeps = report.sweeps,
            max_change = report.max_change,
            "global gradient estimation did not converge"
        );
    }
    Ok((gradients.iter().map(|g| kernel.components(g)).collect(), report))
}

/// Converts a tangent gradient on the unit sphere to longitude/latitude
/// derivatives.
///
/// With `ρ = √(x² + y²) = cos φ`:
///
/// ```text
/// ∂f/∂λ = −y·gₓ + x·g_y
/// ∂f/∂φ = g · (−z·x/ρ, −z·y/ρ, ρ)
/// east  = (∂f/∂λ)/ρ,  north = ∂f/∂φ
/// ```
///
/// # Errors
///
/// Returns [`GradientError::PoleSingularity`] when `ρ ≤ pole_tolerance`:
/// longitude is undefined at the poles and `east` is unbounded near them.
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::gradient::lon_lat_partials;
/// use trisurf::prelude::*;
///
/// // f = z has ∂f/∂φ = cos φ and no longitude dependence.
/// let p = Point::from_lon_lat(0.3, 0.5);
/// let [x, y, z] = p.to_array();
/// let g = [-z * x, -z * y, 1.0 - z * z];
/// let partials = lon_lat_partials(&p, &g, 1e-9).unwrap();
/// assert!(partials.d_lon.abs() < 1e-12);
/// assert!((partials.d_lat - 0.5_f64.cos()).abs() < 1e-12);
/// assert!(lon_lat_partials(&Point::new([0.0, 0.0, 1.0]), &g, 1e-9).is_err());
/// ```
pub fn lon_lat_partials(
    point: &Point<3>,
    gradient: &Gradient<3>,
    pole_tolerance: f64,
) -> Result<LonLatPartials, GradientError> {
    let [x, y, z] = point.to_array();
    let [gx, gy, gz] = *gradient;
    let rho = x.hypot(y);
    if rho <= pole_tolerance {
        return Err(GradientError::PoleSingularity {
            rho,
            tolerance: pole_tolerance,
        });
    }
    let d_lon = -y * gx + x * gy;
    let d_lat = gx * (-z * x / rho) + gy * (-z * y / rho) + gz * rho;
    Ok(LonLatPartials {
        d_lon,
        d_lat,
        east: d_lon / rho,
        north: d_lat,
    })
}
