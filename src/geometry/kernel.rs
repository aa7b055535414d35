//! Geometric kernel abstraction.
//!
//! The [`Kernel`] trait bundles the predicates that the triangulation
//! algorithms need for one surface. The triangulation data structure itself is
//! purely combinatorial; everything that looks at coordinates goes through a
//! kernel. [`PlanarKernel`] works on `Point<2>` in the Euclidean plane and
//! [`SphericalKernel`] on unit vectors `Point<3>`.

use core::fmt::Debug;

use crate::geometry::point::Point;
use crate::geometry::predicates::{InSphere, Orientation, in_cap, incircle, orient2d, sphere_orientation};
use crate::topology::spaces::{EuclideanSpace, SphericalSpace};
use crate::topology::traits::topological_space::{TopologicalSpace, TopologyError};

/// Geometric kernel trait defining predicates for triangulation algorithms.
///
/// Both predicates are exact in sign: they never report a wrong orientation
/// because of floating-point rounding.
///
/// # Examples
///
/// ```
/// use trisurf::geometry::kernel::{Kernel, PlanarKernel};
/// use trisurf::geometry::point::Point;
/// use trisurf::geometry::predicates::{InSphere, Orientation};
///
/// let kernel = PlanarKernel::new();
/// let a = Point::new([0.0, 0.0]);
/// let b = Point::new([1.0, 0.0]);
/// let c = Point::new([0.5, 1.0]);
/// assert_eq!(kernel.orientation(&a, &b, &c), Orientation::POSITIVE);
/// assert_eq!(
///     kernel.in_circle(&a, &b, &c, &Point::new([0.5, 0.3])),
///     InSphere::INSIDE
/// );
/// ```
pub trait Kernel<const D: usize>: Clone + Copy + Debug + Default + Send + Sync {
    /// The topological space this kernel triangulates.
    type Space: TopologicalSpace + Default;

    /// Returns the topological space.
    fn space(&self) -> Self::Space {
        Self::Space::default()
    }

    /// Whether triangulations built with this kernel have a boundary.
    fn allows_boundary(&self) -> bool {
        self.space().allows_boundary()
    }

    /// Validates `point` and moves it onto the surface.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError`] when the point is not finite or lies too far
    /// from the surface.
    fn canonicalize(&self, point: &Point<D>, tolerance: f64) -> Result<Point<D>, TopologyError> {
        let mut coords = point.to_array();
        self.space().canonicalize_point(&mut coords, tolerance)?;
        Ok(Point::new(coords))
    }

    /// Orientation of the triangle `a, b, c`.
    ///
    /// `POSITIVE` means `c` lies to the left of the directed edge `a → b`
    /// (counter-clockwise turn seen from outside the surface).
    fn orientation(&self, a: &Point<D>, b: &Point<D>, c: &Point<D>) -> Orientation;

    /// Position of `p` relative to the circumcircle of the counter-clockwise
    /// triangle `a, b, c`.
    fn in_circle(&self, a: &Point<D>, b: &Point<D>, c: &Point<D>, p: &Point<D>) -> InSphere;

    /// Intrinsic distance between two points of the surface.
    fn distance(&self, a: &Point<D>, b: &Point<D>) -> f64;
}

/// Kernel for the Euclidean plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanarKernel;

impl PlanarKernel {
    /// Creates a new planar kernel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Kernel<2> for PlanarKernel {
    type Space = EuclideanSpace;

    fn orientation(&self, a: &Point<2>, b: &Point<2>, c: &Point<2>) -> Orientation {
        orient2d(a.coords(), b.coords(), c.coords())
    }

    fn in_circle(&self, a: &Point<2>, b: &Point<2>, c: &Point<2>, p: &Point<2>) -> InSphere {
        incircle(a.coords(), b.coords(), c.coords(), p.coords())
    }

    fn distance(&self, a: &Point<2>, b: &Point<2>) -> f64 {
        a.euclidean_distance(b)
    }
}

/// Kernel for the unit sphere.
///
/// Orientation is the sign of `det[a, b, c]` and the circumcircle test is a
/// test against the plane through the three points, so both reduce to the
/// exact 3D orientation predicate.
///
/// ```
/// use trisurf::geometry::kernel::{Kernel, SphericalKernel};
/// use trisurf::geometry::point::Point;
///
/// let kernel = SphericalKernel::new();
/// let a = Point::new([1.0, 0.0, 0.0]);
/// let b = Point::new([0.0, 1.0, 0.0]);
/// assert!((kernel.distance(&a, &b) - std::f64::consts::FRAC_PI_2).abs() < 1e-15);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SphericalKernel;

impl SphericalKernel {
    /// Creates a new spherical kernel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Kernel<3> for SphericalKernel {
    type Space = SphericalSpace;

    fn orientation(&self, a: &Point<3>, b: &Point<3>, c: &Point<3>) -> Orientation {
        sphere_orientation(a.coords(), b.coords(), c.coords())
    }

    fn in_circle(&self, a: &Point<3>, b: &Point<3>, c: &Point<3>, p: &Point<3>) -> InSphere {
        in_cap(a.coords(), b.coords(), c.coords(), p.coords())
    }

    fn distance(&self, a: &Point<3>, b: &Point<3>) -> f64 {
        let (u, v) = (a.to_vector(), b.to_vector());
        u.cross(&v).norm().atan2(u.dot(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn planar_kernel_canonicalize_rejects_non_finite() {
        let kernel = PlanarKernel::new();
        assert!(kernel.canonicalize(&Point::new([f64::INFINITY, 0.0]), 0.0).is_err());
        assert_eq!(
            kernel.canonicalize(&Point::new([1.0, 2.0]), 0.0).unwrap(),
            Point::new([1.0, 2.0])
        );
        assert!(kernel.allows_boundary());
    }

    #[test]
    fn spherical_kernel_projects_and_measures() {
        let kernel = SphericalKernel::new();
        assert!(!kernel.allows_boundary());
        let p = kernel
            .canonicalize(&Point::new([0.0, 0.0, 1.0 + 1e-9]), 1e-6)
            .unwrap();
        assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-15);

        let a = Point::new([1.0, 0.0, 0.0]);
        let antipode = Point::new([-1.0, 0.0, 0.0]);
        assert_relative_eq!(kernel.distance(&a, &antipode), std::f64::consts::PI);
        assert_relative_eq!(kernel.distance(&a, &a), 0.0);
    }

    #[test]
    fn spherical_circumcircle_of_octant() {
        let kernel = SphericalKernel::new();
        let a = Point::new([1.0, 0.0, 0.0]);
        let b = Point::new([0.0, 1.0, 0.0]);
        let c = Point::new([0.0, 0.0, 1.0]);
        assert_eq!(kernel.orientation(&a, &b, &c), Orientation::POSITIVE);
        let s = 1.0 / 3.0_f64.sqrt();
        assert_eq!(kernel.in_circle(&a, &b, &c, &Point::new([s, s, s])), InSphere::INSIDE);
        assert_eq!(kernel.in_circle(&a, &b, &c, &a), InSphere::BOUNDARY);
        assert_eq!(
            kernel.in_circle(&a, &b, &c, &Point::new([0.0, -1.0, 0.0])),
            InSphere::OUTSIDE
        );
    }
}
