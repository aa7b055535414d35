//! Filtered geometric predicates.
//!
//! Every predicate first evaluates its determinant in plain floating point and
//! compares it against a static forward error bound. Only when the sign cannot
//! be certified does it fall back to exact expansion arithmetic from
//! [`robust_predicates`](crate::geometry::robust_predicates). The results are
//! therefore exact for all finite inputs; no tolerance is involved.
//!
//! Two families are provided:
//!
//! - planar: [`orient2d`] and [`incircle`];
//! - spherical (unit vectors): [`sphere_orientation`], the sign of the triple
//!   product, and [`in_cap`], the circumscribing-cap test.

use super::robust_predicates::{
    INCIRCLE_BOUND, ORIENT2D_BOUND, ORIENT3D_BOUND, incircle_exact, orient2d_exact,
    orient3d_exact,
};

/// Represents the position of a point relative to a circumcircle or a
/// circumscribing spherical cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSphere {
    /// The point is strictly outside
    OUTSIDE,
    /// The point lies exactly on the circle (cocircular)
    BOUNDARY,
    /// The point is strictly inside
    INSIDE,
}

impl std::fmt::Display for InSphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Represents the orientation of a point triple.
///
/// In the plane `POSITIVE` means counter-clockwise (the third point lies to the
/// left of the directed segment through the first two). On the sphere it means
/// the third point lies to the left of the great-circle arc through the first
/// two, as seen from outside the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Clockwise / right of the directed edge
    NEGATIVE,
    /// Collinear, or on the great circle
    DEGENERATE,
    /// Counter-clockwise / left of the directed edge
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

impl Orientation {
    fn from_f64(det: f64) -> Self {
        if det > 0.0 {
            Self::POSITIVE
        } else if det < 0.0 {
            Self::NEGATIVE
        } else {
            Self::DEGENERATE
        }
    }

    /// The opposite orientation.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::NEGATIVE => Self::POSITIVE,
            Self::DEGENERATE => Self::DEGENERATE,
            Self::POSITIVE => Self::NEGATIVE,
        }
    }
}

impl From<Orientation> for InSphere {
    fn from(sign: Orientation) -> Self {
        match sign {
            Orientation::NEGATIVE => Self::OUTSIDE,
            Orientation::DEGENERATE => Self::BOUNDARY,
            Orientation::POSITIVE => Self::INSIDE,
        }
    }
}

// =============================================================================
// PLANAR PREDICATES
// =============================================================================

/// Orientation of the planar triangle `a, b, c`.
///
/// # Examples
///
/// ```
/// use trisurf::geometry::predicates::{Orientation, orient2d};
///
/// assert_eq!(orient2d(&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]), Orientation::POSITIVE);
/// assert_eq!(orient2d(&[0.0, 0.0], &[1.0, 1.0], &[2.0, 2.0]), Orientation::DEGENERATE);
/// ```
#[must_use]
pub fn orient2d(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> Orientation {
    let det_left = (a[0] - c[0]) * (b[1] - c[1]);
    let det_right = (a[1] - c[1]) * (b[0] - c[0]);
    let det = det_left - det_right;

    let det_sum = if det_left > 0.0 {
        if det_right <= 0.0 {
            return Orientation::from_f64(det);
        }
        det_left + det_right
    } else if det_left < 0.0 {
        if det_right >= 0.0 {
            return Orientation::from_f64(det);
        }
        -det_left - det_right
    } else {
        return Orientation::from_f64(det);
    };

    let bound = ORIENT2D_BOUND * det_sum;
    if det >= bound || -det >= bound {
        return Orientation::from_f64(det);
    }
    orient2d_exact(a, b, c)
}

/// Position of `d` relative to the circumcircle of the counter-clockwise
/// triangle `a, b, c`.
///
/// ```
/// use trisurf::geometry::predicates::{InSphere, incircle};
///
/// let (a, b, c) = ([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]);
/// assert_eq!(incircle(&a, &b, &c, &[0.5, 0.5]), InSphere::INSIDE);
/// assert_eq!(incircle(&a, &b, &c, &[1.0, 1.0]), InSphere::BOUNDARY);
/// assert_eq!(incircle(&a, &b, &c, &[2.0, 2.0]), InSphere::OUTSIDE);
/// ```
#[must_use]
pub fn incircle(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2], d: &[f64; 2]) -> InSphere {
    let adx = a[0] - d[0];
    let ady = a[1] - d[1];
    let bdx = b[0] - d[0];
    let bdy = b[1] - d[1];
    let cdx = c[0] - d[0];
    let cdy = c[1] - d[1];

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let alift = adx * adx + ady * ady;

    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let blift = bdx * bdx + bdy * bdy;

    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdxcdy - cdxbdy) + blift * (cdxady - adxcdy) + clift * (adxbdy - bdxady);
    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * alift
        + (cdxady.abs() + adxcdy.abs()) * blift
        + (adxbdy.abs() + bdxady.abs()) * clift;

    let bound = INCIRCLE_BOUND * permanent;
    if det > bound || -det > bound {
        return Orientation::from_f64(det).into();
    }
    incircle_exact(a, b, c, d).into()
}

// =============================================================================
// SPATIAL / SPHERICAL PREDICATES
// =============================================================================

/// Sign of `det[a - d, b - d, c - d]`.
#[must_use]
pub fn orient3d(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3], d: &[f64; 3]) -> Orientation {
    let adx = a[0] - d[0];
    let bdx = b[0] - d[0];
    let cdx = c[0] - d[0];
    let ady = a[1] - d[1];
    let bdy = b[1] - d[1];
    let cdy = c[1] - d[1];
    let adz = a[2] - d[2];
    let bdz = b[2] - d[2];
    let cdz = c[2] - d[2];

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;

    let det = adz * (bdxcdy - cdxbdy) + bdz * (cdxady - adxcdy) + cdz * (adxbdy - bdxady);
    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * adz.abs()
        + (cdxady.abs() + adxcdy.abs()) * bdz.abs()
        + (adxbdy.abs() + bdxady.abs()) * cdz.abs();

    let bound = ORIENT3D_BOUND * permanent;
    if det > bound || -det > bound {
        return Orientation::from_f64(det);
    }
    orient3d_exact(a, b, c, d)
}

/// Which side of the great circle through `a` and `b` the unit vector `c`
/// lies on: the sign of the triple product `a · (b × c)`.
///
/// ```
/// use trisurf::geometry::predicates::{Orientation, sphere_orientation};
///
/// let (x, y, z) = ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
/// assert_eq!(sphere_orientation(&x, &y, &z), Orientation::POSITIVE);
/// assert_eq!(sphere_orientation(&y, &x, &z), Orientation::NEGATIVE);
/// ```
#[must_use]
pub fn sphere_orientation(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]) -> Orientation {
    orient3d(a, b, c, &[0.0; 3])
}

/// Position of `p` relative to the circumscribing cap of the spherical
/// triangle `a, b, c` (counter-clockwise seen from outside).
///
/// The cap is the part of the sphere on the far side of the plane through
/// `a, b, c` from the triangle's opposite side; `p` is inside when
/// `det[b - a, c - a, p - a] > 0`. The same formula holds for triangles larger
/// than a hemisphere, whose cap contains the centre of the sphere's far side.
///
/// ```
/// use trisurf::geometry::predicates::{InSphere, in_cap};
///
/// let (a, b, c) = ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
/// let s = 1.0 / 3.0_f64.sqrt();
/// assert_eq!(in_cap(&a, &b, &c, &[s, s, s]), InSphere::INSIDE);
/// assert_eq!(in_cap(&a, &b, &c, &[-s, -s, -s]), InSphere::OUTSIDE);
/// ```
#[must_use]
pub fn in_cap(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3], p: &[f64; 3]) -> InSphere {
    orient3d(b, c, p, a).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(Orientation::POSITIVE.to_string(), "POSITIVE");
        assert_eq!(InSphere::BOUNDARY.to_string(), "BOUNDARY");
        assert_eq!(Orientation::NEGATIVE.reversed(), Orientation::POSITIVE);
    }

    #[test]
    fn orient2d_uses_exact_fallback_near_degeneracy() {
        // Classic failure case for naive evaluation: points almost on the line y = x.
        let b = [12.0, 12.0];
        let c = [24.0, 24.0];
        for i in 0..64 {
            let offset = f64::from(i) * f64::EPSILON;
            let a = [0.5 + offset, 0.5];
            let expected = orient2d_exact(&a, &b, &c);
            assert_eq!(orient2d(&a, &b, &c), expected, "offset index {i}");
        }
    }

    #[test]
    fn orient2d_is_antisymmetric() {
        let a = [0.1, 0.7];
        let b = [3.3, -1.2];
        let c = [-0.5, 2.25];
        assert_eq!(orient2d(&a, &b, &c), orient2d(&b, &a, &c).reversed());
        assert_eq!(orient2d(&a, &b, &c), orient2d(&b, &c, &a));
    }

    #[test]
    fn incircle_cocircular_grid_points() {
        let a = [0.0, 0.0];
        let b = [2.0, 0.0];
        let c = [2.0, 2.0];
        assert_eq!(incircle(&a, &b, &c, &[0.0, 2.0]), InSphere::BOUNDARY);
        assert_eq!(incircle(&a, &b, &c, &[1.0, 1.0]), InSphere::INSIDE);
    }

    #[test]
    fn sphere_predicates_agree_with_geometry() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        let c = [0.0, 0.0, 1.0];
        // On the equator arc from a to b, the north pole is on the left.
        assert_eq!(sphere_orientation(&a, &b, &c), Orientation::POSITIVE);
        assert_eq!(sphere_orientation(&a, &b, &[0.0, 0.0, -1.0]), Orientation::NEGATIVE);
        assert_eq!(
            sphere_orientation(&a, &b, &[-1.0, 0.0, 0.0]),
            Orientation::DEGENERATE
        );
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert_eq!(in_cap(&a, &b, &c, &[s, s, 0.0]), InSphere::INSIDE);
        assert_eq!(in_cap(&a, &b, &c, &[0.0, -1.0, 0.0]), InSphere::OUTSIDE);
    }
}
