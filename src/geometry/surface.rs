//! Metric structure of the triangulated surface.
//!
//! The numerical operators (gradient estimation, smoothing, interpolation)
//! need more than the predicates: an embedding in R³, tangent frames, the
//! length and end directions of an edge, barycentric coordinates and local fit
//! models. [`Surface`] provides these for both kernels so that the operators
//! are written once.
//!
//! Everything is expressed with `nalgebra::Vector3<f64>`. Planar points embed
//! as `(x, y, 0)`; planar gradients have a zero third component.

use nalgebra as na;

use crate::geometry::kernel::{Kernel, PlanarKernel, SphericalKernel};
use crate::geometry::matrix::{MatrixError, weighted_least_squares};
use crate::geometry::point::Point;

/// Three-dimensional vector used for embedded points and gradients.
pub type Vector3 = na::Vector3<f64>;

/// Minimum sample count for the quadratic local models.
pub const QUADRATIC_MIN_SAMPLES: usize = 5;

/// Samples must satisfy `z > GNOMONIC_MIN_HEIGHT` in the local spherical frame
/// for the gnomonic model to be used.
pub const GNOMONIC_MIN_HEIGHT: f64 = 0.25;

/// Factor applied to the largest sample distance to obtain the radius of
/// influence of the local fits.
pub const RADIUS_FACTOR: f64 = 1.1;

/// Length of an edge and the unit tangent directions at both ends, both
/// pointing from the first endpoint towards the second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeFrame {
    /// Intrinsic edge length.
    pub length: f64,
    /// Direction of travel at the first endpoint.
    pub start_tangent: Vector3,
    /// Direction of travel at the second endpoint.
    pub end_tangent: Vector3,
}

/// Barycentric coordinates of a point with respect to a triangle, together
/// with their gradients with respect to the embedded query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Barycentric {
    /// Coordinates summing to one.
    pub weights: [f64; 3],
    /// `∇βᵢ` in R³. Callers project onto the tangent plane.
    pub gradients: [Vector3; 3],
}

/// Minimiser of the weighted data misfit over the fields with zero curvature:
/// `h(q) = offset + slope · q`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearTrend {
    /// Constant part.
    pub offset: f64,
    /// Linear part (zero on the sphere).
    pub slope: Vector3,
}

impl LinearTrend {
    /// Trend value at an embedded point.
    #[must_use]
    pub fn value_at(&self, q: &Vector3) -> f64 {
        self.offset + self.slope.dot(q)
    }
}

/// Inverse-distance weight `(R − d)/(R d)` of the local fits; zero at and
/// beyond the radius of influence.
#[must_use]
pub fn inverse_distance_weight(distance: f64, radius: f64) -> f64 {
    if distance <= 0.0 || distance >= radius {
        0.0
    } else {
        (radius - distance) / (radius * distance)
    }
}

/// Surface metric used by the numerical operators.
pub trait Surface<const D: usize>: Kernel<D> {
    /// Embeds a point in R³.
    fn embed(&self, point: &Point<D>) -> Vector3;

    /// The `D` components of an embedded vector (the inverse of the
    /// embedding for gradients).
    fn components(&self, v: &Vector3) -> [f64; D];

    /// Unit normal of the surface at an embedded point.
    fn normal(&self, at: &Vector3) -> Vector3;

    /// Removes the normal component of `v` at `at`.
    fn project_tangent(&self, at: &Vector3, v: &Vector3) -> Vector3 {
        let n = self.normal(at);
        v - n * n.dot(v)
    }

    /// Orthonormal tangent basis `(e₁, e₂)` at `at`, with `e₁ × e₂` equal to
    /// the normal.
    fn tangent_frame(&self, at: &Vector3) -> (Vector3, Vector3);

    /// Length and end directions of the geodesic from `a` to `b`.
    fn edge_frame(&self, a: &Vector3, b: &Vector3) -> EdgeFrame;

    /// Barycentric coordinates of `p` in `triangle`, or `None` when the
    /// triangle is degenerate for this surface.
    fn barycentric(&self, triangle: &[Vector3; 3], p: &Vector3) -> Option<Barycentric>;

    /// Point of the edge `a → b` closest to `p`.
    fn closest_point_on_edge(&self, a: &Vector3, b: &Vector3, p: &Vector3) -> Vector3;

    /// Tangent vector at `from` pointing to `to` with the length of the
    /// geodesic between them.
    fn displacement(&self, from: &Vector3, to: &Vector3) -> Vector3;

    /// Fits the tangent gradient at `center` from neighbouring samples.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError`] when neither the quadratic nor the linear model
    /// is determined by the samples.
    fn fit_local_gradient(
        &self,
        center: &Vector3,
        value: f64,
        samples: &[(Vector3, f64)],
    ) -> Result<Vector3, MatrixError>;

    /// Fits the zero-curvature trend minimising `Σ wᵢ (h(qᵢ) − fᵢ)²`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError`] when the trend is not determined.
    fn fit_trend(
        &self,
        points: &[Vector3],
        values: &[f64],
        weights: &[f64],
    ) -> Result<LinearTrend, MatrixError>;
}

/// Solves the scaled quadratic model `[u, v, u², uv, v²]` and, failing that,
/// the linear model `[u, v]` for the first-order coefficients.
fn quadratic_or_linear(
    coords: &[(f64, f64)],
    rhs: &[f64],
    weights: &[f64],
    scale: f64,
) -> Result<(f64, f64), MatrixError> {
    let n = coords.len();
    let target = na::DVector::from_column_slice(rhs);
    if n >= QUADRATIC_MIN_SAMPLES {
        let design = na::DMatrix::from_fn(n, 5, |i, j| {
            let (u, v) = (coords[i].0 / scale, coords[i].1 / scale);
            match j {
                0 => u,
                1 => v,
                2 => u * u,
                3 => u * v,
                _ => v * v,
            }
        });
        if let Ok(c) = weighted_least_squares(&design, &target, weights) {
            return Ok((c[0] / scale, c[1] / scale));
        }
    }
    let design = na::DMatrix::from_fn(n, 2, |i, j| {
        if j == 0 {
            coords[i].0 / scale
        } else {
            coords[i].1 / scale
        }
    });
    let c = weighted_least_squares(&design, &target, weights)?;
    Ok((c[0] / scale, c[1] / scale))
}

fn radius_of(distances: impl Iterator<Item = f64>) -> Result<f64, MatrixError> {
    let radius = RADIUS_FACTOR * distances.fold(0.0, f64::max);
    if radius > 0.0 && radius.is_finite() {
        Ok(radius)
    } else {
        Err(MatrixError::SingularMatrix)
    }
}

// =============================================================================
// PLANE
// =============================================================================

impl Surface<2> for PlanarKernel {
    fn embed(&self, point: &Point<2>) -> Vector3 {
        Vector3::new(point[0], point[1], 0.0)
    }

    fn components(&self, v: &Vector3) -> [f64; 2] {
        [v.x, v.y]
    }

    fn normal(&self, _at: &Vector3) -> Vector3 {
        Vector3::z()
    }

    fn tangent_frame(&self, _at: &Vector3) -> (Vector3, Vector3) {
        (Vector3::x(), Vector3::y())
    }

    fn edge_frame(&self, a: &Vector3, b: &Vector3) -> EdgeFrame {
        let d = b - a;
        let length = d.norm();
        let direction = if length > 0.0 { d / length } else { Vector3::zeros() };
        EdgeFrame {
            length,
            start_tangent: direction,
            end_tangent: direction,
        }
    }

    fn barycentric(&self, triangle: &[Vector3; 3], p: &Vector3) -> Option<Barycentric> {
        let [a, b, c] = triangle;
        let det = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let mut weights = [0.0; 3];
        let mut gradients = [Vector3::zeros(); 3];
        for i in 0..3 {
            let vj = triangle[(i + 1) % 3];
            let vk = triangle[(i + 2) % 3];
            weights[i] = ((vj.x - p.x) * (vk.y - p.y) - (vj.y - p.y) * (vk.x - p.x)) / det;
            gradients[i] = Vector3::new(vj.y - vk.y, vk.x - vj.x, 0.0) / det;
        }
        Some(Barycentric { weights, gradients })
    }

    fn closest_point_on_edge(&self, a: &Vector3, b: &Vector3, p: &Vector3) -> Vector3 {
        let d = b - a;
        let len2 = d.norm_squared();
        if len2 == 0.0 {
            return *a;
        }
        let t = ((p - a).dot(&d) / len2).clamp(0.0, 1.0);
        a + d * t
    }

    fn displacement(&self, from: &Vector3, to: &Vector3) -> Vector3 {
        to - from
    }

    fn fit_local_gradient(
        &self,
        center: &Vector3,
        value: f64,
        samples: &[(Vector3, f64)],
    ) -> Result<Vector3, MatrixError> {
        let coords: Vec<(f64, f64)> = samples
            .iter()
            .map(|(q, _)| (q.x - center.x, q.y - center.y))
            .collect();
        let radius = radius_of(coords.iter().map(|&(dx, dy)| dx.hypot(dy)))?;
        let weights: Vec<f64> = coords
            .iter()
            .map(|&(dx, dy)| inverse_distance_weight(dx.hypot(dy), radius))
            .collect();
        let rhs: Vec<f64> = samples.iter().map(|(_, f)| f - value).collect();
        let (gx, gy) = quadratic_or_linear(&coords, &rhs, &weights, radius)?;
        Ok(Vector3::new(gx, gy, 0.0))
    }

    fn fit_trend(
        &self,
        points: &[Vector3],
        values: &[f64],
        weights: &[f64],
    ) -> Result<LinearTrend, MatrixError> {
        let design = na::DMatrix::from_fn(points.len(), 3, |i, j| match j {
            0 => 1.0,
            1 => points[i].x,
            _ => points[i].y,
        });
        let target = na::DVector::from_column_slice(values);
        let row_weights: Vec<f64> = weights.iter().map(|w| w.sqrt()).collect();
        let c = weighted_least_squares(&design, &target, &row_weights)?;
        Ok(LinearTrend {
            offset: c[0],
            slope: Vector3::new(c[1], c[2], 0.0),
        })
    }
}

// =============================================================================
// SPHERE
// =============================================================================

impl Surface<3> for SphericalKernel {
    fn embed(&self, point: &Point<3>) -> Vector3 {
        point.to_vector()
    }

    fn components(&self, v: &Vector3) -> [f64; 3] {
        [v.x, v.y, v.z]
    }

    fn normal(&self, at: &Vector3) -> Vector3 {
        at.normalize()
    }

    fn tangent_frame(&self, at: &Vector3) -> (Vector3, Vector3) {
        let n = at.normalize();
        // East-pointing first axis away from the poles.
        let axis = if n.z.abs() < 0.9 { Vector3::z() } else { Vector3::x() };
        let e1 = axis.cross(&n).normalize();
        let e2 = n.cross(&e1);
        (e1, e2)
    }

    fn edge_frame(&self, a: &Vector3, b: &Vector3) -> EdgeFrame {
        let cos = a.dot(b);
        let length = a.cross(b).norm().atan2(cos);
        let start = b - a * cos;
        let end = b * cos - a;
        let unit = |v: Vector3| {
            let n = v.norm();
            if n > 0.0 { v / n } else { Vector3::zeros() }
        };
        EdgeFrame {
            length,
            start_tangent: unit(start),
            end_tangent: unit(end),
        }
    }

    fn barycentric(&self, triangle: &[Vector3; 3], p: &Vector3) -> Option<Barycentric> {
        let [a, b, c] = triangle;
        let det = a.dot(&b.cross(c));
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let duals: [Vector3; 3] =
            std::array::from_fn(|i| triangle[(i + 1) % 3].cross(&triangle[(i + 2) % 3]) / det);
        let raw: [f64; 3] = std::array::from_fn(|i| p.dot(&duals[i]));
        let sum: f64 = raw.iter().sum();
        if sum.abs() <= f64::EPSILON || !sum.is_finite() {
            return None;
        }
        let total: Vector3 = duals.iter().sum();
        let weights: [f64; 3] = std::array::from_fn(|i| raw[i] / sum);
        let gradients: [Vector3; 3] =
            std::array::from_fn(|i| (duals[i] - total * weights[i]) / sum);
        Some(Barycentric { weights, gradients })
    }

    fn closest_point_on_edge(&self, a: &Vector3, b: &Vector3, p: &Vector3) -> Vector3 {
        let n = a.cross(b);
        let n_norm = n.norm();
        if n_norm <= f64::EPSILON {
            return *a;
        }
        let n_hat = n / n_norm;
        let in_plane = p - n_hat * n_hat.dot(p);
        let len = in_plane.norm();
        if len > f64::EPSILON {
            let q = in_plane / len;
            if a.cross(&q).dot(&n) >= 0.0 && q.cross(b).dot(&n) >= 0.0 {
                return q;
            }
        }
        if a.dot(p) >= b.dot(p) { *a } else { *b }
    }

    fn displacement(&self, from: &Vector3, to: &Vector3) -> Vector3 {
        let cos = from.dot(to);
        let tangent = to - from * cos;
        let norm = tangent.norm();
        if norm <= f64::EPSILON {
            return Vector3::zeros();
        }
        tangent * (norm.atan2(cos) / norm)
    }

    fn fit_local_gradient(
        &self,
        center: &Vector3,
        value: f64,
        samples: &[(Vector3, f64)],
    ) -> Result<Vector3, MatrixError> {
        let (e1, e2) = self.tangent_frame(center);
        let local: Vec<(f64, f64, f64, f64)> = samples
            .iter()
            .map(|(q, f)| (q.dot(&e1), q.dot(&e2), q.dot(center), *f))
            .collect();

        if local.len() >= QUADRATIC_MIN_SAMPLES
            && local.iter().all(|&(_, _, z, _)| z > GNOMONIC_MIN_HEIGHT)
        {
            // f/z is affine in gnomonic coordinates for linear fields.
            let coords: Vec<(f64, f64)> = local.iter().map(|&(x, y, z, _)| (x / z, y / z)).collect();
            let rhs: Vec<f64> = local.iter().map(|&(_, _, z, f)| f / z - value).collect();
            let radius = radius_of(coords.iter().map(|&(u, v)| u.hypot(v)))?;
            let weights: Vec<f64> = coords
                .iter()
                .map(|&(u, v)| inverse_distance_weight(u.hypot(v), radius))
                .collect();
            if let Ok((a, b)) = quadratic_or_linear(&coords, &rhs, &weights, radius) {
                return Ok(e1 * a + e2 * b);
            }
        }

        let arcs: Vec<f64> = local.iter().map(|&(x, y, z, _)| x.hypot(y).atan2(z)).collect();
        let radius = radius_of(arcs.iter().copied())?;
        let weights: Vec<f64> = arcs.iter().map(|&d| inverse_distance_weight(d, radius)).collect();
        let design = na::DMatrix::from_fn(local.len(), 3, |i, j| match j {
            0 => local[i].0,
            1 => local[i].1,
            _ => local[i].2 - 1.0,
        });
        let rhs = na::DVector::from_iterator(local.len(), local.iter().map(|&(_, _, _, f)| f - value));
        let c = weighted_least_squares(&design, &rhs, &weights)?;
        Ok(e1 * c[0] + e2 * c[1])
    }

    fn fit_trend(
        &self,
        _points: &[Vector3],
        values: &[f64],
        weights: &[f64],
    ) -> Result<LinearTrend, MatrixError> {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(MatrixError::SingularMatrix);
        }
        let mean = values.iter().zip(weights).map(|(f, w)| f * w).sum::<f64>() / total;
        Ok(LinearTrend {
            offset: mean,
            slope: Vector3::zeros(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3::new(x, y, z).normalize()
    }

    #[test]
    fn inverse_distance_weight_vanishes_at_radius() {
        assert_relative_eq!(inverse_distance_weight(1.0, 2.0), 0.5);
        assert_eq!(inverse_distance_weight(2.0, 2.0), 0.0);
        assert_eq!(inverse_distance_weight(0.0, 2.0), 0.0);
    }

    #[test]
    fn planar_barycentric_reproduces_point() {
        let k = PlanarKernel::new();
        let tri = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
        ];
        let p = Vector3::new(0.5, 0.25, 0.0);
        let bary = k.barycentric(&tri, &p).unwrap();
        let rebuilt: Vector3 = (0..3).map(|i| tri[i] * bary.weights[i]).sum();
        assert_relative_eq!(rebuilt, p, epsilon = 1e-15);
        let grad_sum: Vector3 = bary.gradients.iter().sum();
        assert_relative_eq!(grad_sum.norm(), 0.0, epsilon = 1e-15);
        assert_relative_eq!(bary.gradients[1], Vector3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn spherical_barycentric_sums_to_one() {
        let k = SphericalKernel::new();
        let tri = [Vector3::x(), Vector3::y(), Vector3::z()];
        let p = unit(1.0, 2.0, 3.0);
        let bary = k.barycentric(&tri, &p).unwrap();
        assert_relative_eq!(bary.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-15);
        assert_relative_eq!(bary.weights[0], 1.0 / 6.0, epsilon = 1e-15);
        assert_relative_eq!(bary.weights[2], 0.5, epsilon = 1e-15);
        // Gradients of a partition of unity sum to zero.
        let grad_sum: Vector3 = bary.gradients.iter().sum();
        assert_relative_eq!(grad_sum.norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn big_spherical_triangle_has_positive_weights_inside() {
        let k = SphericalKernel::new();
        // Clockwise seen from outside the small triangle: the region left of
        // all edges is the large complement.
        let tri = [Vector3::x(), Vector3::z(), Vector3::y()];
        let p = -unit(1.0, 1.0, 1.0);
        let bary = k.barycentric(&tri, &p).unwrap();
        for w in bary.weights {
            assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn spherical_edge_frame_quarter_circle() {
        let k = SphericalKernel::new();
        let frame = k.edge_frame(&Vector3::x(), &Vector3::y());
        assert_relative_eq!(frame.length, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(frame.start_tangent, Vector3::y(), epsilon = 1e-15);
        assert_relative_eq!(frame.end_tangent, -Vector3::x(), epsilon = 1e-15);
    }

    #[test]
    fn spherical_tangent_frame_is_right_handed() {
        let k = SphericalKernel::new();
        for at in [unit(1.0, 2.0, 0.5), unit(0.0, 0.1, 1.0), unit(0.0, 0.0, -1.0)] {
            let (e1, e2) = k.tangent_frame(&at);
            assert_relative_eq!(e1.dot(&at), 0.0, epsilon = 1e-15);
            assert_relative_eq!(e2.dot(&at), 0.0, epsilon = 1e-15);
            assert_relative_eq!(e1.cross(&e2), at, epsilon = 1e-14);
        }
    }

    #[test]
    fn closest_point_on_arc() {
        let k = SphericalKernel::new();
        let (a, b) = (Vector3::x(), Vector3::y());
        let q = k.closest_point_on_edge(&a, &b, &unit(1.0, 1.0, 1.0));
        assert_relative_eq!(q, unit(1.0, 1.0, 0.0), epsilon = 1e-15);
        let q = k.closest_point_on_edge(&a, &b, &unit(1.0, -1.0, 0.2));
        assert_relative_eq!(q, a);

        let plane = PlanarKernel::new();
        let q = plane.closest_point_on_edge(
            &Vector3::zeros(),
            &Vector3::new(2.0, 0.0, 0.0),
            &Vector3::new(3.0, 1.0, 0.0),
        );
        assert_relative_eq!(q, Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn spherical_displacement_has_arc_length() {
        let k = SphericalKernel::new();
        let d = k.displacement(&Vector3::x(), &Vector3::y());
        assert_relative_eq!(d, Vector3::y() * std::f64::consts::FRAC_PI_2, epsilon = 1e-15);
        assert_relative_eq!(k.displacement(&Vector3::x(), &Vector3::x()).norm(), 0.0);
    }

    #[test]
    fn local_fits_reproduce_linear_fields() {
        let plane = PlanarKernel::new();
        let f2 = |q: &Vector3| 1.0 + 2.0 * q.x - 3.0 * q.y;
        let center = Vector3::new(0.1, 0.2, 0.0);
        let ring: Vec<(Vector3, f64)> = (0..6)
            .map(|i| {
                let t = f64::from(i) * std::f64::consts::TAU / 6.0 + 0.3;
                let q = center + Vector3::new(t.cos(), t.sin(), 0.0) * (0.5 + 0.1 * f64::from(i));
                (q, f2(&q))
            })
            .collect();
        let g = plane.fit_local_gradient(&center, f2(&center), &ring).unwrap();
        assert_relative_eq!(g, Vector3::new(2.0, -3.0, 0.0), epsilon = 1e-10);
        // Three samples exercise the linear model.
        let g = plane.fit_local_gradient(&center, f2(&center), &ring[..3]).unwrap();
        assert_relative_eq!(g, Vector3::new(2.0, -3.0, 0.0), epsilon = 1e-10);

        let sphere = SphericalKernel::new();
        let coef = Vector3::new(0.3, -1.2, 0.7);
        let f3 = |q: &Vector3| coef.dot(q);
        let center = unit(0.2, -0.4, 0.9);
        let expected = coef - center * coef.dot(&center);
        let (e1, e2) = sphere.tangent_frame(&center);
        let near: Vec<(Vector3, f64)> = (0..6)
            .map(|i| {
                let t = f64::from(i) * std::f64::consts::TAU / 6.0;
                let q = (center + (e1 * t.cos() + e2 * t.sin()) * 0.2).normalize();
                (q, f3(&q))
            })
            .collect();
        let g = sphere.fit_local_gradient(&center, f3(&center), &near).unwrap();
        assert_relative_eq!(g, expected, epsilon = 1e-10);
        // Samples far from the centre force the Cartesian linear model.
        let far: Vec<(Vector3, f64)> = (0..4)
            .map(|i| {
                let t = f64::from(i) * std::f64::consts::TAU / 4.0 + 0.1;
                let q = (center * -0.2 + (e1 * t.cos() + e2 * t.sin())).normalize();
                (q, f3(&q))
            })
            .collect();
        let g = sphere.fit_local_gradient(&center, f3(&center), &far).unwrap();
        assert_relative_eq!(g, expected, epsilon = 1e-10);
    }

    #[test]
    fn trends() {
        let plane = PlanarKernel::new();
        let points = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        let values: Vec<f64> = points.iter().map(|q| 2.0 + q.x - q.y).collect();
        let trend = plane.fit_trend(&points, &values, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(trend.value_at(&points[3]), 2.0, epsilon = 1e-12);
        assert_relative_eq!(trend.slope, Vector3::new(1.0, -1.0, 0.0), epsilon = 1e-12);

        let sphere = SphericalKernel::new();
        let trend = sphere
            .fit_trend(&[Vector3::x(), Vector3::y()], &[1.0, 4.0], &[2.0, 1.0])
            .unwrap();
        assert_relative_eq!(trend.offset, 2.0);
        assert!(sphere.fit_trend(&[], &[], &[]).is_err());
    }
}
