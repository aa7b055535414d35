//! Evaluation of the Hermite-type interpolant at arbitrary points.
//!
//! Inside a triangle the interpolant is the cubic Bézier triangle determined by
//! the vertex values and gradients:
//!
//! ```text
//! c₃₀₀ = fᵢ
//! c₂₁₀ = fᵢ + gᵢ·(vⱼ − vᵢ)/3
//! c₁₁₁ = (Σ edge controls)/4 − (Σ fᵢ)/6
//! ```
//!
//! evaluated at planar barycentric coordinates, or on the sphere at the
//! normalised barycentric coordinates of the radial projection onto the
//! triangle's plane. Tension blends it with the linear interpolant `L`:
//! `F = L + φ(σ)(C − L)` with `φ(σ) = 2·tanh(σ/2)/σ`.
//!
//! Outside the planar hull, and in spherical triangles wider than a
//! hemisphere, the value is extrapolated linearly from the closest point `q`
//! of the hull: `F(q) + ∇F(q)·(p − q)`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::locate::{LocateError, LocateResult, is_big_triangle};
use crate::core::delaunay_triangulation::DelaunayTriangulation;
use crate::core::triangulation_data_structure::{TdsError, TriangleKey};
use crate::geometry::point::Point;
use crate::geometry::surface::{Surface, Vector3};
use crate::interpolation::gradient::{Gradient, lift};
use crate::topology::traits::topological_space::TopologyError;

/// Errors raised by [`Interpolator`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum InterpolationError {
    /// The query point could not be located.
    #[error("Point could not be located: {source}")]
    OutOfDomain {
        /// Location failure.
        #[source]
        source: LocateError,
    },
    /// A per-vertex array does not match the vertex count.
    #[error("Expected {expected} {name}, got {found}")]
    LengthMismatch {
        /// Which array.
        name: &'static str,
        /// Number of vertices.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
    /// Tension must be non-negative and finite.
    #[error("Tension must be non-negative and finite, got {tension}")]
    InvalidTension {
        /// Rejected value.
        tension: f64,
    },
    /// The query point is not a valid point of the surface.
    #[error("Invalid query point: {source}")]
    InvalidPoint {
        /// Why the point was rejected.
        #[source]
        source: TopologyError,
    },
    /// The triangulation has fewer than three vertices.
    #[error("Triangulation has no triangles yet ({vertices} vertices)")]
    IncompleteTriangulation {
        /// Vertices inserted so far.
        vertices: usize,
    },
    /// Barycentric coordinates are undefined in a triangle.
    #[error("Triangle {key:?} is degenerate")]
    DegenerateTriangle {
        /// The triangle.
        key: TriangleKey,
    },
    /// Structural error while reading the mesh.
    #[error("Triangulation data structure error: {0}")]
    Tds(#[from] TdsError),
}

/// Evaluation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolationOptions {
    /// Tension `σ ≥ 0`; zero gives the pure cubic.
    pub tension: f64,
    /// Evaluate batches in parallel.
    pub parallel: bool,
    /// Queries per parallel chunk; each chunk walks with its own hint.
    pub chunk_size: usize,
}

impl Default for InterpolationOptions {
    fn default() -> Self {
        Self {
            tension: 0.0,
            parallel: true,
            chunk_size: 256,
        }
    }
}

/// Weight `φ(σ) = 2·tanh(σ/2)/σ` of the cubic part.
#[must_use]
pub fn tension_factor(tension: f64) -> f64 {
    if tension <= f64::EPSILON {
        1.0
    } else {
        2.0 * (0.5 * tension).tanh() / tension
    }
}

/// Interpolant over a triangulation with per-vertex values and gradients.
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::evaluate::Interpolator;
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.0, 1.0]),
///     Point::new([1.0, 1.0]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// let values: Vec<f64> = points.iter().map(|p| 1.0 + p[0] - 2.0 * p[1]).collect();
/// let gradients = vec![[1.0, -2.0]; 4];
/// let interpolator = Interpolator::new(&dt, &values, &gradients)
///     .unwrap()
///     .tension(1.5)
///     .unwrap();
///
/// let mut hint = None;
/// let f = interpolator.evaluate(&Point::new([0.25, 0.5]), &mut hint).unwrap();
/// assert!((f - 0.25).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct Interpolator<'a, K, const D: usize>
where
    K: Surface<D>,
{
    dt: &'a DelaunayTriangulation<K, D>,
    values: &'a [f64],
    gradients: Vec<Vector3>,
    hull: Vec<HullSegment>,
    options: InterpolationOptions,
}

/// Hull edge with its embedded end points, collected once per interpolant.
#[derive(Clone, Copy, Debug)]
struct HullSegment {
    /// Small triangle on the inner side.
    owner: TriangleKey,
    start: Vector3,
    end: Vector3,
}

impl<'a, K, const D: usize> Interpolator<'a, K, D>
where
    K: Surface<D>,
{
    /// Creates an interpolant with default options.
    ///
    /// # Errors
    ///
    /// Returns [`InterpolationError::LengthMismatch`] if `values` or
    /// `gradients` do not have one entry per vertex, and
    /// [`InterpolationError::IncompleteTriangulation`] before the first
    /// triangle exists.
    pub fn new(
        dt: &'a DelaunayTriangulation<K, D>,
        values: &'a [f64],
        gradients: &[Gradient<D>],
    ) -> Result<Self, InterpolationError> {
        let expected = dt.number_of_vertices();
        if values.len() != expected {
            return Err(InterpolationError::LengthMismatch {
                name: "values",
                expected,
                found: values.len(),
            });
        }
        if gradients.len() != expected {
            return Err(InterpolationError::LengthMismatch {
                name: "gradients",
                expected,
                found: gradients.len(),
            });
        }
        if dt.number_of_triangles() == 0 {
            return Err(InterpolationError::IncompleteTriangulation { vertices: expected });
        }
        let kernel = dt.kernel();
        let tds = dt.tds();
        let hull = dt
            .hull_edges()?
            .into_iter()
            .map(|(owner, corner)| {
                let (u, w) = tds.triangle_or_err(owner)?.edge(corner);
                Ok(HullSegment {
                    owner,
                    start: kernel.embed(tds.point_or_err(u)?),
                    end: kernel.embed(tds.point_or_err(w)?),
                })
            })
            .collect::<Result<Vec<_>, TdsError>>()?;
        tracing::debug!(hull_edges = hull.len(), "interpolant ready");
        Ok(Self {
            dt,
            values,
            gradients: gradients.iter().map(lift).collect(),
            hull,
            options: InterpolationOptions::default(),
        })
    }

    /// Sets the tension.
    ///
    /// # Errors
    ///
    /// Returns [`InterpolationError::InvalidTension`] for negative or
    /// non-finite values.
    pub fn tension(mut self, tension: f64) -> Result<Self, InterpolationError> {
        if !(tension >= 0.0 && tension.is_finite()) {
            return Err(InterpolationError::InvalidTension { tension });
        }
        self.options.tension = tension;
        Ok(self)
    }

    /// Enables or disables parallel batch evaluation.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.options.parallel = parallel;
        self
    }

    /// Replaces all options.
    ///
    /// # Errors
    ///
    /// See [`tension`](Self::tension).
    pub fn with_options(mut self, options: InterpolationOptions) -> Result<Self, InterpolationError> {
        self = self.tension(options.tension)?;
        self.options = InterpolationOptions {
            chunk_size: options.chunk_size.max(1),
            ..options
        };
        Ok(self)
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> &InterpolationOptions {
        &self.options
    }

    /// Value at `point`. `hint` carries the last triangle between calls and
    /// is updated.
    ///
    /// # Errors
    ///
    /// Returns [`InterpolationError::OutOfDomain`] if the point cannot be
    /// located and [`InterpolationError::InvalidPoint`] for points off the
    /// surface.
    pub fn evaluate(
        &self,
        point: &Point<D>,
        hint: &mut Option<TriangleKey>,
    ) -> Result<f64, InterpolationError> {
        self.value_and_gradient(point, hint).map(|(f, _)| f)
    }

    /// Value and tangent gradient at `point`.
    ///
    /// # Errors
    ///
    /// See [`evaluate`](Self::evaluate).
    pub fn evaluate_with_gradient(
        &self,
        point: &Point<D>,
        hint: &mut Option<TriangleKey>,
    ) -> Result<(f64, Gradient<D>), InterpolationError> {
        let (f, g) = self.value_and_gradient(point, hint)?;
        Ok((f, self.dt.kernel().components(&g)))
    }

    /// Values at many points, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn evaluate_many(&self, points: &[Point<D>]) -> Result<Vec<f64>, InterpolationError> {
        self.batch(points, |point, hint| self.evaluate(point, hint))
    }

    /// Values and gradients at many points, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn evaluate_many_with_gradients(
        &self,
        points: &[Point<D>],
    ) -> Result<Vec<(f64, Gradient<D>)>, InterpolationError> {
        self.batch(points, |point, hint| self.evaluate_with_gradient(point, hint))
    }

    fn batch<T, F>(&self, points: &[Point<D>], eval: F) -> Result<Vec<T>, InterpolationError>
    where
        T: Send,
        F: Fn(&Point<D>, &mut Option<TriangleKey>) -> Result<T, InterpolationError> + Sync,
    {
        let run_chunk = |chunk: &[Point<D>]| -> Result<Vec<T>, InterpolationError> {
            let mut hint = None;
            chunk.iter().map(|p| eval(p, &mut hint)).collect()
        };
        if !self.options.parallel {
            return run_chunk(points);
        }
        let chunks = points
            .par_chunks(self.options.chunk_size.max(1))
            .map(run_chunk)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(points = points.len(), chunks = chunks.len(), "parallel evaluation");
        Ok(chunks.into_iter().flatten().collect())
    }

    fn value_and_gradient(
        &self,
        point: &Point<D>,
        hint: &mut Option<TriangleKey>,
    ) -> Result<(f64, Vector3), InterpolationError> {
        let dt = self.dt;
        let kernel = dt.kernel();
        let point = kernel
            .canonicalize(point, dt.options().norm_tolerance())
            .map_err(|source| InterpolationError::InvalidPoint { source })?;
        let location = dt
            .locate(&point, *hint)
            .map_err(|source| InterpolationError::OutOfDomain { source })?;
        let p = kernel.embed(&point);
        match location {
            LocateResult::OnVertex(v) => {
                if let Some(key) = dt.tds().vertex(v).and_then(|record| record.incident_triangle()) {
                    *hint = Some(key);
                }
                Ok((self.values[v.index()], self.gradients[v.index()]))
            }
            LocateResult::InsideTriangle(key) | LocateResult::OnEdge(key, _) => {
                *hint = Some(key);
                if is_big_triangle(dt.tds(), kernel, key)? {
                    self.extrapolate(key, &p)
                } else {
                    self.in_triangle(key, &p)
                }
            }
            LocateResult::Outside(key, _) => {
                *hint = Some(key);
                self.extrapolate(key, &p)
            }
        }
    }

    /// Cubic Bézier value and tangent gradient at `p` inside `key`.
    fn in_triangle(&self, key: TriangleKey, p: &Vector3) -> Result<(f64, Vector3), InterpolationError> {
        let kernel = self.dt.kernel();
        let tds = self.dt.tds();
        let triangle = tds.triangle_or_err(key)?;
        let corners = tds.triangle_points(key)?;
        let v: [Vector3; 3] = std::array::from_fn(|i| kernel.embed(&corners[i]));
        let ids = triangle.vertices();
        let f: [f64; 3] = std::array::from_fn(|i| self.values[ids[i].index()]);
        let g: [Vector3; 3] = std::array::from_fn(|i| self.gradients[ids[i].index()]);
        let bary = kernel
            .barycentric(&v, p)
            .ok_or(InterpolationError::DegenerateTriangle { key })?;
        let b = bary.weights;

        // control[i][j] = c with weight bᵢ²bⱼ for i ≠ j.
        let mut control = [[0.0; 3]; 3];
        let mut edge_sum = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    control[i][j] = f[i] + g[i].dot(&(v[j] - v[i])) / 3.0;
                    edge_sum += control[i][j];
                }
            }
        }
        let centre = edge_sum / 4.0 - (f[0] + f[1] + f[2]) / 6.0;

        let mut cubic = 6.0 * centre * b[0] * b[1] * b[2];
        let mut d_cubic = [0.0; 3];
        for i in 0..3 {
            let (j, k) = ((i + 1) % 3, (i + 2) % 3);
            cubic += f[i] * b[i].powi(3);
            d_cubic[i] += 3.0 * f[i] * b[i] * b[i] + 6.0 * centre * b[j] * b[k];
            for other in [j, k] {
                cubic += 3.0 * control[i][other] * b[i] * b[i] * b[other];
                d_cubic[i] += 6.0 * control[i][other] * b[i] * b[other]
                    + 3.0 * control[other][i] * b[other] * b[other];
            }
        }
        let linear: f64 = (0..3).map(|i| f[i] * b[i]).sum();

        let phi = tension_factor(self.options.tension);
        let value = linear + phi * (cubic - linear);
        let gradient: Vector3 = (0..3)
            .map(|i| bary.gradients[i] * (f[i] + phi * (d_cubic[i] - f[i])))
            .sum();
        Ok((value, kernel.project_tangent(p, &gradient)))
    }

    /// Linear extrapolation from the closest hull point.
    fn extrapolate(&self, key: TriangleKey, p: &Vector3) -> Result<(f64, Vector3), InterpolationError> {
        let kernel = self.dt.kernel();
        let mut best: Option<(f64, TriangleKey, Vector3)> = None;
        for segment in &self.hull {
            let q = kernel.closest_point_on_edge(&segment.start, &segment.end, p);
            let distance = (q - p).norm_squared();
            if best.is_none_or(|(d, _, _)| distance < d) {
                best = Some((distance, segment.owner, q));
            }
        }
        let Some((_, owner, q)) = best else {
            return self.in_triangle(key, p);
        };
        let (value, gradient) = self.in_triangle(owner, &q)?;
        let step = kernel.displacement(&q, p);
        Ok((value + gradient.dot(&step), kernel.project_tangent(p, &gradient)))
    }
}
