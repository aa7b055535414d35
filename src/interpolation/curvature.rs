//! Curvature functional shared by global gradient estimation and smoothing.
//!
//! Along an edge of length `L` the field is modelled by the Hermite cubic
//! matching the end values `hᵢ`, `hⱼ` and the end slopes `sᵢ = gᵢ·tᵢ`,
//! `sⱼ = gⱼ·tⱼ`. With the chord slope `Δ = (hⱼ − hᵢ)/L` and the slope
//! deviations `a = sᵢ − Δ`, `b = sⱼ − Δ` the edge energy is
//!
//! ```text
//! E = (1/L)·[c₁(a² + b²) + c₂·a·b],   c₁ = 4 + 2σ²/15,   c₂ = 4 − σ²/15
//! ```
//!
//! which is `∫ y''²` for `σ = 0` plus `(σ/L)² ∫ (y' − Δ)²` for tension `σ`.
//! The form is positive semi-definite in `(a, b)` for every `σ`.

use nalgebra as na;

use crate::core::algorithms::locate::is_big_triangle;
use crate::core::collections::{FastHashSet, SmallBuffer, fast_hash_set_with_capacity};
use crate::core::delaunay_triangulation::DelaunayTriangulation;
use crate::core::triangulation_data_structure::TdsError;
use crate::geometry::surface::{EdgeFrame, Surface, Vector3};

/// Number of incident edges stored inline per vertex.
const STAR_BUFFER_SIZE: usize = 8;

/// Edge energy coefficients for a tension value.
///
/// # Examples
///
/// ```rust
/// use trisurf::interpolation::curvature::TensionCoefficients;
///
/// let cubic = TensionCoefficients::new(0.0);
/// // ∫ y''² of the cubic with slope deviations (1, −1) over a unit edge.
/// assert_eq!(cubic.edge_energy(1.0, 1.0, -1.0), 4.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TensionCoefficients {
    /// Weight of `a² + b²`.
    pub c1: f64,
    /// Weight of `a·b`.
    pub c2: f64,
}

impl TensionCoefficients {
    /// Coefficients for tension `σ ≥ 0`.
    #[must_use]
    pub fn new(tension: f64) -> Self {
        let s2 = tension * tension;
        Self {
            c1: 4.0 + 2.0 * s2 / 15.0,
            c2: 4.0 - s2 / 15.0,
        }
    }

    /// Energy of an edge of `length` with slope deviations `a` and `b`.
    #[must_use]
    pub fn edge_energy(&self, length: f64, a: f64, b: f64) -> f64 {
        (self.c1 * (a * a + b * b) + self.c2 * a * b) / length
    }

    /// Adds the edge energy, written as an affine function of the local
    /// unknowns `x` through `a = α·x + a₀` and `b = β·x + b₀`, to the normal
    /// equations `H x = r` of its minimiser.
    pub(crate) fn accumulate(
        &self,
        length: f64,
        (alpha, a0): (na::Vector3<f64>, f64),
        (beta, b0): (na::Vector3<f64>, f64),
        hessian: &mut na::Matrix3<f64>,
        rhs: &mut na::Vector3<f64>,
    ) {
        let scale = 1.0 / length;
        let (c1, c2) = (self.c1, self.c2);
        *hessian += (alpha * alpha.transpose() + beta * beta.transpose()) * (2.0 * c1 * scale)
            + (alpha * beta.transpose() + beta * alpha.transpose()) * (c2 * scale);
        *rhs -= (alpha * a0 + beta * b0) * (2.0 * c1 * scale) + (beta * a0 + alpha * b0) * (c2 * scale);
    }
}

/// One undirected mesh edge with its geodesic frame from `from` to `to`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkEdge {
    /// Index of the first endpoint.
    pub from: usize,
    /// Index of the second endpoint.
    pub to: usize,
    /// Length and end directions from `from` towards `to`.
    pub frame: EdgeFrame,
}

/// Edges of the positively oriented triangles with the per-vertex data the
/// curvature solvers need.
#[derive(Clone, Debug)]
pub struct EdgeNetwork {
    points: Vec<Vector3>,
    frames: Vec<(Vector3, Vector3)>,
    edges: Vec<NetworkEdge>,
    stars: Vec<SmallBuffer<usize, STAR_BUFFER_SIZE>>,
}

impl EdgeNetwork {
    /// Collects the edges of `dt`.
    ///
    /// On the sphere the triangles wider than a hemisphere are left out, so
    /// the network covers the region spanned by the nodes.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError`] on an inconsistent structure.
    pub fn new<K, const D: usize>(dt: &DelaunayTriangulation<K, D>) -> Result<Self, TdsError>
    where
        K: Surface<D>,
    {
        let tds = dt.tds();
        let kernel = dt.kernel();
        let points: Vec<Vector3> = dt.vertices().map(|(_, v)| kernel.embed(v.point())).collect();
        let frames = points.iter().map(|p| kernel.tangent_frame(p)).collect();

        let mut seen: FastHashSet<(usize, usize)> = fast_hash_set_with_capacity(3 * points.len());
        let mut edges = Vec::with_capacity(3 * points.len());
        let mut stars = vec![SmallBuffer::new(); points.len()];
        for key in tds.triangle_keys() {
            if is_big_triangle(tds, kernel, key)? {
                continue;
            }
            let triangle = tds.triangle_or_err(key)?;
            for i in 0..3 {
                let (u, v) = triangle.edge(i);
                let (from, to) = if u.index() < v.index() {
                    (u.index(), v.index())
                } else {
                    (v.index(), u.index())
                };
                if !seen.insert((from, to)) {
                    continue;
                }
                let frame = kernel.edge_frame(&points[from], &points[to]);
                if frame.length <= 0.0 {
                    continue;
                }
                stars[from].push(edges.len());
                stars[to].push(edges.len());
                edges.push(NetworkEdge { from, to, frame });
            }
        }
        Ok(Self {
            points,
            frames,
            edges,
            stars,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` without nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Embedded node positions.
    #[must_use]
    pub fn points(&self) -> &[Vector3] {
        &self.points
    }

    /// All edges.
    #[must_use]
    pub fn edges(&self) -> &[NetworkEdge] {
        &self.edges
    }

    /// Tangent frame at node `i`.
    #[must_use]
    pub fn frame(&self, i: usize) -> (Vector3, Vector3) {
        self.frames[i]
    }

    /// Indices of the edges incident to node `i`.
    #[must_use]
    pub fn star(&self, i: usize) -> &[usize] {
        &self.stars[i]
    }

    /// Slope deviations `(a, b)` of one edge.
    #[must_use]
    pub fn slope_deviations(&self, edge: &NetworkEdge, values: &[f64], gradients: &[Vector3]) -> (f64, f64) {
        let chord = (values[edge.to] - values[edge.from]) / edge.frame.length;
        (
            gradients[edge.from].dot(&edge.frame.start_tangent) - chord,
            gradients[edge.to].dot(&edge.frame.end_tangent) - chord,
        )
    }

    /// Total curvature `Σ E` of the field `(values, gradients)`.
    #[must_use]
    pub fn curvature(&self, values: &[f64], gradients: &[Vector3], tension: f64) -> f64 {
        let coefficients = TensionCoefficients::new(tension);
        self.edges
            .iter()
            .map(|edge| {
                let (a, b) = self.slope_deviations(edge, values, gradients);
                coefficients.edge_energy(edge.frame.length, a, b)
            })
            .sum()
    }

    /// Normal equations of the curvature energy around node `i` in the local
    /// unknowns `x = (hᵢ, u, v)` with `gᵢ = u·e₁ + v·e₂`, every other node
    /// held fixed.
    pub(crate) fn local_system(
        &self,
        i: usize,
        values: &[f64],
        gradients: &[Vector3],
        coefficients: &TensionCoefficients,
    ) -> (na::Matrix3<f64>, na::Vector3<f64>) {
        let (e1, e2) = self.frames[i];
        let mut hessian = na::Matrix3::zeros();
        let mut rhs = na::Vector3::zeros();
        for &index in &self.stars[i] {
            let edge = &self.edges[index];
            let length = edge.frame.length;
            // Orient the edge away from node i.
            let (other, near, far) = if edge.from == i {
                (edge.to, edge.frame.start_tangent, edge.frame.end_tangent)
            } else {
                (edge.from, -edge.frame.end_tangent, -edge.frame.start_tangent)
            };
            let h_other = values[other];
            let alpha = na::Vector3::new(1.0 / length, e1.dot(&near), e2.dot(&near));
            let beta = na::Vector3::new(1.0 / length, 0.0, 0.0);
            let a0 = -h_other / length;
            let b0 = gradients[other].dot(&far) - h_other / length;
            coefficients.accumulate(length, (alpha, a0), (beta, b0), &mut hessian, &mut rhs);
        }
        (hessian, rhs)
    }
}
