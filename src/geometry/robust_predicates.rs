//! Exact determinant evaluation with floating-point expansions.
//!
//! The filtered predicates in [`predicates`](crate::geometry::predicates) fall
//! back to the routines in this module when the floating-point determinant is
//! too close to zero for its sign to be certified. An expansion is a sequence of
//! non-overlapping `f64` components stored in order of increasing magnitude
//! whose exact sum is the represented value; its sign is the sign of the last
//! (largest) component.
//!
//! # References
//!
//! - J. R. Shewchuk, "Adaptive Precision Floating-Point Arithmetic and Fast
//!   Robust Geometric Predicates", Discrete & Computational Geometry 18, 1997.

use super::predicates::Orientation;

/// Half an ulp of 1.0, the unit roundoff of `f64`.
pub(crate) const UNIT_ROUNDOFF: f64 = f64::EPSILON / 2.0;

/// Error bound coefficient for the 2-D orientation filter.
pub(crate) const ORIENT2D_BOUND: f64 = (3.0 + 16.0 * UNIT_ROUNDOFF) * UNIT_ROUNDOFF;
/// Error bound coefficient for the 3-D orientation filter.
pub(crate) const ORIENT3D_BOUND: f64 = (7.0 + 56.0 * UNIT_ROUNDOFF) * UNIT_ROUNDOFF;
/// Error bound coefficient for the in-circle filter.
pub(crate) const INCIRCLE_BOUND: f64 = (10.0 + 96.0 * UNIT_ROUNDOFF) * UNIT_ROUNDOFF;

// =============================================================================
// ERROR-FREE TRANSFORMATIONS
// =============================================================================

/// Returns `(s, e)` with `s = fl(a + b)` and `s + e = a + b` exactly.
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let b_virtual = s - a;
    let a_virtual = s - b_virtual;
    let b_round = b - b_virtual;
    let a_round = a - a_virtual;
    (s, a_round + b_round)
}

/// Returns `(p, e)` with `p = fl(a * b)` and `p + e = a * b` exactly.
#[inline]
fn two_product(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    (p, a.mul_add(b, -p))
}

// =============================================================================
// EXPANSION ARITHMETIC
// =============================================================================

/// Exact difference `a - b` as an expansion.
fn difference(a: f64, b: f64) -> Vec<f64> {
    let (s, e) = two_sum(a, -b);
    compress(vec![e, s])
}

fn compress(mut components: Vec<f64>) -> Vec<f64> {
    components.retain(|c| *c != 0.0);
    if components.is_empty() {
        components.push(0.0);
    }
    components
}

/// Adds a single component to an expansion, eliminating zeros.
fn grow(e: &[f64], b: f64) -> Vec<f64> {
    let mut h = Vec::with_capacity(e.len() + 1);
    let mut q = b;
    for &component in e {
        let (sum, err) = two_sum(q, component);
        if err != 0.0 {
            h.push(err);
        }
        q = sum;
    }
    if q != 0.0 || h.is_empty() {
        h.push(q);
    }
    h
}

fn add(e: &[f64], f: &[f64]) -> Vec<f64> {
    f.iter().fold(e.to_vec(), |acc, &component| grow(&acc, component))
}

fn negate(e: &[f64]) -> Vec<f64> {
    e.iter().map(|c| -c).collect()
}

fn sub(e: &[f64], f: &[f64]) -> Vec<f64> {
    add(e, &negate(f))
}

/// Multiplies an expansion by a single `f64`.
fn scale(e: &[f64], b: f64) -> Vec<f64> {
    let mut h = Vec::with_capacity(2 * e.len());
    let Some((&first, rest)) = e.split_first() else {
        return vec![0.0];
    };
    let (mut q, err) = two_product(first, b);
    if err != 0.0 {
        h.push(err);
    }
    for &component in rest {
        let (product_hi, product_lo) = two_product(component, b);
        let (sum, err) = two_sum(q, product_lo);
        if err != 0.0 {
            h.push(err);
        }
        let (new_q, err) = two_sum(product_hi, sum);
        if err != 0.0 {
            h.push(err);
        }
        q = new_q;
    }
    if q != 0.0 || h.is_empty() {
        h.push(q);
    }
    h
}

fn mul(e: &[f64], f: &[f64]) -> Vec<f64> {
    f.iter()
        .fold(vec![0.0], |acc, &component| add(&acc, &scale(e, component)))
}

/// Sign of an expansion.
fn sign(e: &[f64]) -> Orientation {
    match e.last() {
        Some(value) if *value > 0.0 => Orientation::POSITIVE,
        Some(value) if *value < 0.0 => Orientation::NEGATIVE,
        _ => Orientation::DEGENERATE,
    }
}

// =============================================================================
// EXACT DETERMINANTS
// =============================================================================

/// Exact sign of `(a - c) × (b - c)`.
#[must_use]
pub fn orient2d_exact(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> Orientation {
    let acx = difference(a[0], c[0]);
    let acy = difference(a[1], c[1]);
    let bcx = difference(b[0], c[0]);
    let bcy = difference(b[1], c[1]);
    sign(&sub(&mul(&acx, &bcy), &mul(&acy, &bcx)))
}

/// Exact sign of `det[a - d, b - d, c - d]`.
#[must_use]
pub fn orient3d_exact(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3], d: &[f64; 3]) -> Orientation {
    let [adx, ady, adz] = [0, 1, 2].map(|i| difference(a[i], d[i]));
    let [bdx, bdy, bdz] = [0, 1, 2].map(|i| difference(b[i], d[i]));
    let [cdx, cdy, cdz] = [0, 1, 2].map(|i| difference(c[i], d[i]));

    let bc = sub(&mul(&bdx, &cdy), &mul(&cdx, &bdy));
    let ca = sub(&mul(&cdx, &ady), &mul(&adx, &cdy));
    let ab = sub(&mul(&adx, &bdy), &mul(&bdx, &ady));

    let det = add(&add(&mul(&adz, &bc), &mul(&bdz, &ca)), &mul(&cdz, &ab));
    sign(&det)
}

/// Exact sign of the in-circle determinant; positive when `d` lies inside the
/// circle through the counter-clockwise triangle `a, b, c`.
#[must_use]
pub fn incircle_exact(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2], d: &[f64; 2]) -> Orientation {
    let adx = difference(a[0], d[0]);
    let ady = difference(a[1], d[1]);
    let bdx = difference(b[0], d[0]);
    let bdy = difference(b[1], d[1]);
    let cdx = difference(c[0], d[0]);
    let cdy = difference(c[1], d[1]);

    let alift = add(&mul(&adx, &adx), &mul(&ady, &ady));
    let blift = add(&mul(&bdx, &bdx), &mul(&bdy, &bdy));
    let clift = add(&mul(&cdx, &cdx), &mul(&cdy, &cdy));

    let bc = sub(&mul(&bdx, &cdy), &mul(&cdx, &bdy));
    let ca = sub(&mul(&cdx, &ady), &mul(&adx, &cdy));
    let ab = sub(&mul(&adx, &bdy), &mul(&bdx, &ady));

    let det = add(
        &add(&mul(&alift, &bc), &mul(&blift, &ca)),
        &mul(&clift, &ab),
    );
    sign(&det)
}
