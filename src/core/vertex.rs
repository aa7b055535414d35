//! Vertex identifiers and vertex records.
//!
//! A vertex is identified by the position of its point in insertion order, so a
//! caller's field arrays (values, weights, gradients) index directly by
//! [`VertexId::index`]. Rejected insertions do not consume an id.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::triangulation_data_structure::TriangleKey;
use crate::geometry::point::Point;

/// Index of a vertex in insertion order.
///
/// # Examples
///
/// ```
/// use trisurf::core::vertex::VertexId;
///
/// let v = VertexId::new(7);
/// assert_eq!(v.index(), 7);
/// assert_eq!(v.to_string(), "v7");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(usize);

impl VertexId {
    /// Wraps a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index into field arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for VertexId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A mesh vertex: its (canonicalised) point and one incident triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex<const D: usize> {
    point: Point<D>,
    incident_triangle: Option<TriangleKey>,
}

impl<const D: usize> Vertex<D> {
    pub(crate) const fn new(point: Point<D>) -> Self {
        Self {
            point,
            incident_triangle: None,
        }
    }

    /// The vertex position.
    #[must_use]
    pub const fn point(&self) -> &Point<D> {
        &self.point
    }

    /// Some triangle having this vertex as a corner, once the initial simplex
    /// exists.
    #[must_use]
    pub const fn incident_triangle(&self) -> Option<TriangleKey> {
        self.incident_triangle
    }

    pub(crate) const fn set_incident_triangle(&mut self, key: Option<TriangleKey>) {
        self.incident_triangle = key;
    }
}
