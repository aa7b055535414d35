//! Triangle records of the mesh arena.
//!
//! Vertices are stored counter-clockwise (seen from outside the sphere) and
//! `neighbors[i]` is the triangle across the edge opposite `vertices[i]`, i.e.
//! the edge running from `vertices[i + 1]` to `vertices[i + 2]` (indices modulo
//! three). A `None` neighbour marks a planar convex-hull edge.

use thiserror::Error;

use crate::core::triangulation_data_structure::TriangleKey;
use crate::core::vertex::VertexId;

/// Errors reported by [`Triangle::is_valid`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangleValidationError {
    /// A vertex appears twice.
    #[error("Triangle repeats vertex {vertex}")]
    DuplicateVertex {
        /// The repeated vertex.
        vertex: VertexId,
    },
    /// The triangle names itself as a neighbour.
    #[error("Triangle {key:?} lists itself as neighbour {index}")]
    SelfNeighbor {
        /// Key of the offending triangle.
        key: TriangleKey,
        /// Neighbour slot.
        index: usize,
    },
}

/// A triangle: three vertices and the three adjacent triangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    vertices: [VertexId; 3],
    neighbors: [Option<TriangleKey>; 3],
}

/// Next index in counter-clockwise order.
#[inline]
#[must_use]
pub const fn ccw(i: usize) -> usize {
    (i + 1) % 3
}

/// Previous index in counter-clockwise order.
#[inline]
#[must_use]
pub const fn cw(i: usize) -> usize {
    (i + 2) % 3
}

impl Triangle {
    pub(crate) const fn new(vertices: [VertexId; 3], neighbors: [Option<TriangleKey>; 3]) -> Self {
        Self {
            vertices,
            neighbors,
        }
    }

    /// Corner vertices, counter-clockwise.
    #[must_use]
    pub const fn vertices(&self) -> &[VertexId; 3] {
        &self.vertices
    }

    /// Adjacent triangles; slot `i` is across the edge opposite vertex `i`.
    #[must_use]
    pub const fn neighbors(&self) -> &[Option<TriangleKey>; 3] {
        &self.neighbors
    }

    /// Vertex at corner `i`.
    #[must_use]
    pub const fn vertex(&self, i: usize) -> VertexId {
        self.vertices[i]
    }

    /// Neighbour across the edge opposite corner `i`.
    #[must_use]
    pub const fn neighbor(&self, i: usize) -> Option<TriangleKey> {
        self.neighbors[i]
    }

    /// Corner index of `v`, if it belongs to the triangle.
    #[must_use]
    pub fn index_of(&self, v: VertexId) -> Option<usize> {
        self.vertices.iter().position(|&w| w == v)
    }

    /// Returns `true` when `v` is a corner.
    #[must_use]
    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.index_of(v).is_some()
    }

    /// Directed edge opposite corner `i`.
    #[must_use]
    pub const fn edge(&self, i: usize) -> (VertexId, VertexId) {
        (self.vertices[ccw(i)], self.vertices[cw(i)])
    }

    /// Corner opposite the undirected edge `{u, v}`, if that edge belongs to the
    /// triangle.
    #[must_use]
    pub fn opposite_index(&self, u: VertexId, v: VertexId) -> Option<usize> {
        let iu = self.index_of(u)?;
        let iv = self.index_of(v)?;
        if iu == iv {
            return None;
        }
        Some(3 - iu - iv)
    }

    /// Neighbour slot pointing at `key`.
    #[must_use]
    pub fn neighbor_index(&self, key: TriangleKey) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == Some(key))
    }

    pub(crate) const fn set_neighbor(&mut self, i: usize, key: Option<TriangleKey>) {
        self.neighbors[i] = key;
    }

    /// Checks the record in isolation: distinct vertices, no self adjacency.
    ///
    /// # Errors
    ///
    /// Returns the first [`TriangleValidationError`] found.
    pub fn is_valid(&self, key: TriangleKey) -> Result<(), TriangleValidationError> {
        for i in 0..3 {
            if self.vertices[i] == self.vertices[ccw(i)] {
                return Err(TriangleValidationError::DuplicateVertex {
                    vertex: self.vertices[i],
                });
            }
            if self.neighbors[i] == Some(key) {
                return Err(TriangleValidationError::SelfNeighbor { key, index: i });
            }
        }
        Ok(())
    }
}
