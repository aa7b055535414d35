//! Planar and spherical point coordinates.
//!
//! A [`Point<2>`] is an `(x, y)` pair in the plane and a [`Point<3>`] is a
//! Cartesian vector that is expected to lie on the unit sphere. Points are plain
//! `Copy` values; the triangulation validates (and, for the sphere,
//! renormalises) them on insertion.

use serde::de::{Error, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use nalgebra as na;

// =============================================================================
// POINT STRUCT DEFINITION
// =============================================================================

/// A point with `D` `f64` coordinates.
///
/// # Examples
///
/// ```
/// use trisurf::geometry::point::Point;
///
/// let p = Point::new([0.5, 0.25]);
/// assert_eq!(p.coords(), &[0.5, 0.25]);
/// assert_eq!(p[1], 0.25);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point<const D: usize> {
    coords: [f64; D],
}

impl<const D: usize> Point<D> {
    /// Creates a point from its coordinates.
    #[must_use]
    pub const fn new(coords: [f64; D]) -> Self {
        Self { coords }
    }

    /// Coordinates as an array reference.
    #[must_use]
    pub const fn coords(&self) -> &[f64; D] {
        &self.coords
    }

    /// Coordinates by value.
    #[must_use]
    pub const fn to_array(&self) -> [f64; D] {
        self.coords
    }

    /// Returns `true` when every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.coords.iter().all(|c| c.is_finite())
    }

    /// Euclidean norm of the coordinate vector.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.coords.iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Straight-line (chord) distance to `other`.
    #[must_use]
    pub fn euclidean_distance(&self, other: &Self) -> f64 {
        self.coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

impl Point<3> {
    /// Builds a unit vector from longitude and latitude given in radians.
    ///
    /// ```
    /// use trisurf::geometry::point::Point;
    ///
    /// let north = Point::from_lon_lat(0.0, std::f64::consts::FRAC_PI_2);
    /// assert!((north[2] - 1.0).abs() < 1e-15);
    /// ```
    #[must_use]
    pub fn from_lon_lat(lon: f64, lat: f64) -> Self {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        Self::new([cos_lat * cos_lon, cos_lat * sin_lon, sin_lat])
    }

    /// Longitude and latitude in radians.
    #[must_use]
    pub fn to_lon_lat(&self) -> (f64, f64) {
        let [x, y, z] = self.coords;
        (y.atan2(x), z.atan2(x.hypot(y)))
    }

    /// The point as an `nalgebra` vector.
    #[must_use]
    pub fn to_vector(&self) -> na::Vector3<f64> {
        na::Vector3::new(self.coords[0], self.coords[1], self.coords[2])
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.coords[index]
    }
}

impl<const D: usize> From<[f64; D]> for Point<D> {
    fn from(coords: [f64; D]) -> Self {
        Self::new(coords)
    }
}

impl<const D: usize> From<Point<D>> for [f64; D] {
    fn from(point: Point<D>) -> Self {
        point.coords
    }
}

// =============================================================================
// SERDE
// =============================================================================

// `[f64; D]` has no serde impls for a generic `D`, so points go through a tuple.
impl<const D: usize> Serialize for Point<D> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(D)?;
        for coord in &self.coords {
            tuple.serialize_element(coord)?;
        }
        tuple.end()
    }
}

impl<'de, const D: usize> Deserialize<'de> for Point<D> {
    fn deserialize<DE>(deserializer: DE) -> Result<Self, DE::Error>
    where
        DE: Deserializer<'de>,
    {
        struct ArrayVisitor<const D: usize>;

        impl<'de, const D: usize> Visitor<'de> for ArrayVisitor<D> {
            type Value = Point<D>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an array of {D} coordinates")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut coords = [0.0; D];
                for (i, slot) in coords.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| Error::invalid_length(i, &self))?;
                }
                Ok(Point::new(coords))
            }
        }

        deserializer.deserialize_tuple(D, ArrayVisitor::<D>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lon_lat_round_trip_away_from_poles() {
        let p = Point::from_lon_lat(1.2, -0.4);
        assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-15);
        let (lon, lat) = p.to_lon_lat();
        assert_relative_eq!(lon, 1.2, epsilon = 1e-14);
        assert_relative_eq!(lat, -0.4, epsilon = 1e-14);
    }

    #[test]
    fn distances_and_finiteness() {
        let a = Point::new([0.0, 0.0]);
        let b = Point::new([3.0, 4.0]);
        assert_relative_eq!(a.euclidean_distance(&b), 5.0);
        assert!(b.is_finite());
        assert!(!Point::new([f64::NAN, 0.0]).is_finite());
    }

    #[test]
    fn serde_uses_plain_arrays() {
        let p = Point::new([1.0, -2.5, 0.125]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[1.0,-2.5,0.125]");
        let back: Point<3> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<Point<3>>("[1.0, 2.0]").is_err());
    }
}
