//! Combinatorial triangulation data structure.
//!
//! [`Tds`] stores the vertices of a triangulation in insertion order and its
//! triangles in a [`SlotMap`] arena addressed by [`TriangleKey`]s. Adjacency is
//! kept as key triples on each [`Triangle`]; nothing holds a reference into the
//! arena, so the cyclic neighbour graph needs no shared ownership.
//!
//! # Topological Invariants
//!
//! - **Edge sharing**: every edge belongs to exactly two triangles, except planar
//!   convex-hull edges which belong to one.
//! - **Neighbour consistency**: if `t.neighbors[i] == Some(u)` then `u` holds the
//!   edge opposite `t.vertices[i]` in reverse direction and points back at `t`.
//! - **Vertex incidence**: every vertex of a constructed triangulation names an
//!   incident triangle that contains it.
//!
//! The structure is purely combinatorial; orientation and the Delaunay property
//! are checked by [`DelaunayTriangulation`](crate::core::delaunay_triangulation::DelaunayTriangulation),
//! which owns the geometric kernel.
//!
//! # Journaling
//!
//! Insertions mutate the arena in place. While a journal is open every first
//! modification of a triangle or an incident pointer saves the previous record,
//! so a failed insertion can be rolled back to the exact pre-insertion state.

use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::core::collections::{
    FastHashMap, FastHashSet, LINK_BUFFER_SIZE, SmallBuffer, fast_hash_map_with_capacity,
};
use crate::core::triangle::{Triangle, TriangleValidationError, ccw, cw};
use crate::core::vertex::{Vertex, VertexId};
use crate::geometry::point::Point;

// =============================================================================
// KEYS AND STATE
// =============================================================================

new_key_type! {
    /// Key type for accessing triangles in the arena.
    ///
    /// Keys stay valid as long as the triangle exists; flips rewrite triangles
    /// in place, so a key may describe a different vertex triple after an
    /// insertion.
    pub struct TriangleKey;
}

/// Represents the construction state of a triangulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriangulationConstructionState {
    /// The stored vertices span no triangle yet (fewer than three, or a
    /// collinear start). Contains the number of vertices currently stored.
    Incomplete(usize),
    /// The initial simplex exists; the triangulation is queryable.
    Constructed,
}

impl Default for TriangulationConstructionState {
    fn default() -> Self {
        Self::Incomplete(0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by combinatorial queries and updates.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TdsError {
    /// A triangle key does not refer to a live triangle.
    #[error("Triangle {key:?} not found")]
    MissingTriangle {
        /// The dangling key.
        key: TriangleKey,
    },
    /// A vertex id is out of range.
    #[error("Vertex {vertex} not found")]
    MissingVertex {
        /// The unknown vertex.
        vertex: VertexId,
    },
    /// The vertex has no incident triangle.
    #[error("Vertex {vertex} has no incident triangle")]
    IsolatedVertex {
        /// The isolated vertex.
        vertex: VertexId,
    },
    /// A triangle was expected to contain an edge that it does not have.
    #[error("Triangle {key:?} has no edge {u}-{v}")]
    EdgeNotFound {
        /// Triangle searched.
        key: TriangleKey,
        /// First endpoint.
        u: VertexId,
        /// Second endpoint.
        v: VertexId,
    },
    /// Rotating around a vertex did not close or reach the boundary.
    #[error("Broken triangle fan around vertex {vertex} after {steps} steps")]
    BrokenFan {
        /// Centre of the rotation.
        vertex: VertexId,
        /// Steps taken before giving up.
        steps: usize,
    },
}

/// Structural validation failures reported by [`Tds::validate`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TdsValidationError {
    /// A triangle record is inconsistent on its own.
    #[error("Invalid triangle {key:?}: {source}")]
    InvalidTriangle {
        /// The offending triangle.
        key: TriangleKey,
        /// What is wrong with it.
        source: TriangleValidationError,
    },
    /// A triangle references a vertex that does not exist.
    #[error("Triangle {key:?} references unknown vertex {vertex}")]
    UnknownVertex {
        /// The offending triangle.
        key: TriangleKey,
        /// The unknown vertex.
        vertex: VertexId,
    },
    /// A neighbour key does not refer to a live triangle.
    #[error("Triangle {key:?} has dangling neighbour in slot {index}")]
    DanglingNeighbor {
        /// The offending triangle.
        key: TriangleKey,
        /// Neighbour slot.
        index: usize,
    },
    /// Two triangles disagree about their shared edge.
    #[error("Triangles {key:?} and {neighbor:?} are not mutual neighbours across a reversed edge")]
    InconsistentNeighbors {
        /// First triangle.
        key: TriangleKey,
        /// Second triangle.
        neighbor: TriangleKey,
    },
    /// A boundary edge was found in a closed triangulation.
    #[error("Triangle {key:?} has a boundary edge in slot {index} but the surface is closed")]
    UnexpectedBoundary {
        /// The offending triangle.
        key: TriangleKey,
        /// Edge slot without neighbour.
        index: usize,
    },
    /// A vertex's incident triangle is missing or does not contain it.
    #[error("Vertex {vertex} has an invalid incident triangle")]
    InvalidIncidentTriangle {
        /// The offending vertex.
        vertex: VertexId,
    },
    /// The vertex fan could not be traversed.
    #[error("Fan traversal failed: {0}")]
    Fan(#[from] TdsError),
}

// =============================================================================
// JOURNAL
// =============================================================================

#[derive(Clone, Debug, Default)]
struct Journal {
    saved_triangles: FastHashMap<TriangleKey, Triangle>,
    created_triangles: FastHashSet<TriangleKey>,
    saved_incident: FastHashMap<VertexId, Option<TriangleKey>>,
    vertex_count: usize,
}

// =============================================================================
// TDS
// =============================================================================

/// Vertices plus a triangle arena with neighbour links.
#[derive(Clone, Debug)]
pub struct Tds<const D: usize> {
    vertices: Vec<Vertex<D>>,
    triangles: SlotMap<TriangleKey, Triangle>,
    journal: Option<Journal>,
}

impl<const D: usize> Default for Tds<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Tds<D> {
    /// Creates an empty structure.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            triangles: SlotMap::with_key(),
            journal: None,
        }
    }

    // -------------------------------------------------------------------------
    // Counting
    // -------------------------------------------------------------------------

    /// Number of stored vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Number of distinct edges.
    ///
    /// Interior edges are seen from two triangles and hull edges from one, so
    /// `E = (3T + B) / 2` with `B` hull edges.
    #[must_use]
    pub fn number_of_edges(&self) -> usize {
        let boundary = self.boundary_edges().len();
        (3 * self.triangles.len() + boundary) / 2
    }

    /// Current construction state.
    #[must_use]
    pub fn construction_state(&self) -> TriangulationConstructionState {
        if self.triangles.is_empty() {
            TriangulationConstructionState::Incomplete(self.vertices.len())
        } else {
            TriangulationConstructionState::Constructed
        }
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Vertex record for `v`.
    #[must_use]
    pub fn vertex(&self, v: VertexId) -> Option<&Vertex<D>> {
        self.vertices.get(v.index())
    }

    /// Position of `v`.
    #[must_use]
    pub fn point(&self, v: VertexId) -> Option<&Point<D>> {
        self.vertices.get(v.index()).map(Vertex::point)
    }

    pub(crate) fn point_or_err(&self, v: VertexId) -> Result<&Point<D>, TdsError> {
        self.point(v).ok_or(TdsError::MissingVertex { vertex: v })
    }

    /// Iterates over all vertices in insertion order.
    pub fn vertices(&self) -> impl ExactSizeIterator<Item = (VertexId, &Vertex<D>)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (VertexId::new(i), v))
    }

    /// Triangle record for `key`.
    #[must_use]
    pub fn triangle(&self, key: TriangleKey) -> Option<&Triangle> {
        self.triangles.get(key)
    }

    pub(crate) fn triangle_or_err(&self, key: TriangleKey) -> Result<&Triangle, TdsError> {
        self.triangles
            .get(key)
            .ok_or(TdsError::MissingTriangle { key })
    }

    /// Returns `true` if `key` refers to a live triangle.
    #[must_use]
    pub fn contains_triangle(&self, key: TriangleKey) -> bool {
        self.triangles.contains_key(key)
    }

    /// Iterates over all triangles in arena order.
    ///
    /// The order only depends on the sequence of insertions, so it is stable
    /// across runs and across concurrent readers.
    pub fn triangles(&self) -> impl Iterator<Item = (TriangleKey, &Triangle)> + '_ {
        self.triangles.iter()
    }

    /// Iterates over all triangle keys in arena order.
    pub fn triangle_keys(&self) -> impl Iterator<Item = TriangleKey> + '_ {
        self.triangles.keys()
    }

    /// Corner points of a triangle.
    pub(crate) fn triangle_points(&self, key: TriangleKey) -> Result<[Point<D>; 3], TdsError> {
        let triangle = self.triangle_or_err(key)?;
        let [a, b, c] = *triangle.vertices();
        Ok([
            *self.point_or_err(a)?,
            *self.point_or_err(b)?,
            *self.point_or_err(c)?,
        ])
    }

    /// All hull edges as `(triangle, slot)` pairs.
    #[must_use]
    pub fn boundary_edges(&self) -> Vec<(TriangleKey, usize)> {
        self.triangles
            .iter()
            .flat_map(|(key, t)| {
                (0..3)
                    .filter(move |&i| t.neighbor(i).is_none())
                    .map(move |i| (key, i))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Vertex fans
    // -------------------------------------------------------------------------

    /// Triangles around `v` in counter-clockwise order.
    ///
    /// For a vertex on the planar hull the sequence starts at the triangle
    /// holding the hull edge that leaves `v` counter-clockwise and ends at the
    /// one holding the hull edge that enters it.
    ///
    /// # Errors
    ///
    /// Returns a [`TdsError`] if `v` is unknown, isolated, or the fan is broken.
    pub fn incident_triangles(
        &self,
        v: VertexId,
    ) -> Result<SmallBuffer<TriangleKey, LINK_BUFFER_SIZE>, TdsError> {
        let start = self
            .vertex(v)
            .ok_or(TdsError::MissingVertex { vertex: v })?
            .incident_triangle()
            .ok_or(TdsError::IsolatedVertex { vertex: v })?;
        let limit = self.triangles.len() + 1;

        // Rotate clockwise until the fan closes or the hull is reached.
        let mut first = start;
        let mut steps = 0;
        loop {
            let triangle = self.triangle_or_err(first)?;
            let i = triangle.index_of(v).ok_or(TdsError::EdgeNotFound {
                key: first,
                u: v,
                v,
            })?;
            match triangle.neighbor(cw(i)) {
                Some(previous) if previous == start => {
                    first = start;
                    break;
                }
                Some(previous) => first = previous,
                None => break,
            }
            steps += 1;
            if steps > limit {
                return Err(TdsError::BrokenFan { vertex: v, steps });
            }
        }

        let mut fan = SmallBuffer::new();
        let mut current = first;
        loop {
            fan.push(current);
            let triangle = self.triangle_or_err(current)?;
            let i = triangle.index_of(v).ok_or(TdsError::EdgeNotFound {
                key: current,
                u: v,
                v,
            })?;
            match triangle.neighbor(ccw(i)) {
                Some(next) if next == first => break,
                Some(next) => current = next,
                None => break,
            }
            if fan.len() > limit {
                return Err(TdsError::BrokenFan {
                    vertex: v,
                    steps: fan.len(),
                });
            }
        }
        Ok(fan)
    }

    /// The link of `v`: adjacent vertices in counter-clockwise order.
    ///
    /// For a planar hull vertex the first and last entries are its two hull
    /// neighbours.
    ///
    /// # Errors
    ///
    /// Returns a [`TdsError`] if `v` is unknown, isolated, or the fan is broken.
    pub fn neighbors(&self, v: VertexId) -> Result<SmallBuffer<VertexId, LINK_BUFFER_SIZE>, TdsError> {
        let fan = self.incident_triangles(v)?;
        let mut link = SmallBuffer::with_capacity(fan.len() + 1);
        for &key in &fan {
            let triangle = self.triangle_or_err(key)?;
            let i = triangle
                .index_of(v)
                .ok_or(TdsError::EdgeNotFound { key, u: v, v })?;
            link.push(triangle.vertex(ccw(i)));
        }
        if let Some(&last) = fan.last() {
            let triangle = self.triangle_or_err(last)?;
            let i = triangle
                .index_of(v)
                .ok_or(TdsError::EdgeNotFound { key: last, u: v, v })?;
            if triangle.neighbor(ccw(i)).is_none() {
                link.push(triangle.vertex(cw(i)));
            }
        }
        Ok(link)
    }

    /// Returns `true` if `v` lies on the planar hull.
    ///
    /// # Errors
    ///
    /// Returns a [`TdsError`] if `v` is unknown or isolated.
    pub fn is_boundary_vertex(&self, v: VertexId) -> Result<bool, TdsError> {
        let fan = self.incident_triangles(v)?;
        let first = self.triangle_or_err(fan[0])?;
        let i = first.index_of(v).ok_or(TdsError::EdgeNotFound {
            key: fan[0],
            u: v,
            v,
        })?;
        Ok(first.neighbor(cw(i)).is_none())
    }

    // -------------------------------------------------------------------------
    // Mutation (crate internal, journaled)
    // -------------------------------------------------------------------------

    pub(crate) fn push_vertex(&mut self, point: Point<D>) -> VertexId {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(point));
        id
    }

    pub(crate) fn insert_triangle(&mut self, triangle: Triangle) -> TriangleKey {
        let key = self.triangles.insert(triangle);
        if let Some(journal) = self.journal.as_mut() {
            journal.created_triangles.insert(key);
        }
        key
    }

    pub(crate) fn triangle_mut(&mut self, key: TriangleKey) -> Result<&mut Triangle, TdsError> {
        let triangle = self
            .triangles
            .get_mut(key)
            .ok_or(TdsError::MissingTriangle { key })?;
        if let Some(journal) = self.journal.as_mut()
            && !journal.created_triangles.contains(&key)
        {
            journal.saved_triangles.entry(key).or_insert(*triangle);
        }
        Ok(triangle)
    }

    /// Replaces a triangle record wholesale.
    pub(crate) fn replace_triangle(
        &mut self,
        key: TriangleKey,
        triangle: Triangle,
    ) -> Result<(), TdsError> {
        *self.triangle_mut(key)? = triangle;
        Ok(())
    }

    /// Points the neighbour slot of `key` across edge `{u, v}` at `neighbor`.
    pub(crate) fn set_neighbor_across(
        &mut self,
        key: TriangleKey,
        u: VertexId,
        v: VertexId,
        neighbor: Option<TriangleKey>,
    ) -> Result<(), TdsError> {
        let triangle = self.triangle_mut(key)?;
        let slot = triangle
            .opposite_index(u, v)
            .ok_or(TdsError::EdgeNotFound { key, u, v })?;
        triangle.set_neighbor(slot, neighbor);
        Ok(())
    }

    pub(crate) fn set_incident_triangle(
        &mut self,
        v: VertexId,
        key: TriangleKey,
    ) -> Result<(), TdsError> {
        let vertex = self
            .vertices
            .get_mut(v.index())
            .ok_or(TdsError::MissingVertex { vertex: v })?;
        if let Some(journal) = self.journal.as_mut() {
            journal
                .saved_incident
                .entry(v)
                .or_insert(vertex.incident_triangle());
        }
        vertex.set_incident_triangle(Some(key));
        Ok(())
    }

    /// Starts recording changes for a possible rollback.
    pub(crate) fn begin_journal(&mut self) {
        self.journal = Some(Journal {
            saved_triangles: fast_hash_map_with_capacity(8),
            created_triangles: FastHashSet::default(),
            saved_incident: fast_hash_map_with_capacity(8),
            vertex_count: self.vertices.len(),
        });
    }

    /// Accepts all changes since [`begin_journal`](Self::begin_journal).
    pub(crate) fn commit_journal(&mut self) {
        self.journal = None;
    }

    /// Restores the state at [`begin_journal`](Self::begin_journal).
    pub(crate) fn rollback_journal(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for key in journal.created_triangles {
            self.triangles.remove(key);
        }
        for (key, triangle) in journal.saved_triangles {
            if let Some(slot) = self.triangles.get_mut(key) {
                *slot = triangle;
            }
        }
        self.vertices.truncate(journal.vertex_count);
        for (v, incident) in journal.saved_incident {
            if let Some(vertex) = self.vertices.get_mut(v.index()) {
                vertex.set_incident_triangle(incident);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Checks the combinatorial invariants listed in the module documentation.
    ///
    /// `allows_boundary` is `false` for closed (spherical) triangulations, in
    /// which case any edge without a neighbour is an error.
    ///
    /// # Errors
    ///
    /// Returns the first [`TdsValidationError`] found.
    pub fn validate(&self, allows_boundary: bool) -> Result<(), TdsValidationError> {
        for (key, triangle) in &self.triangles {
            triangle
                .is_valid(key)
                .map_err(|source| TdsValidationError::InvalidTriangle { key, source })?;
            for &vertex in triangle.vertices() {
                if self.vertex(vertex).is_none() {
                    return Err(TdsValidationError::UnknownVertex { key, vertex });
                }
            }
            for index in 0..3 {
                let Some(neighbor_key) = triangle.neighbor(index) else {
                    if allows_boundary {
                        continue;
                    }
                    return Err(TdsValidationError::UnexpectedBoundary { key, index });
                };
                let neighbor = self
                    .triangle(neighbor_key)
                    .ok_or(TdsValidationError::DanglingNeighbor { key, index })?;
                let (u, v) = triangle.edge(index);
                let consistent = neighbor
                    .opposite_index(u, v)
                    .is_some_and(|j| neighbor.edge(j) == (v, u) && neighbor.neighbor(j) == Some(key));
                if !consistent {
                    return Err(TdsValidationError::InconsistentNeighbors {
                        key,
                        neighbor: neighbor_key,
                    });
                }
            }
        }

        if !self.triangles.is_empty() {
            for (vertex, record) in self.vertices() {
                let valid = record
                    .incident_triangle()
                    .and_then(|key| self.triangle(key))
                    .is_some_and(|t| t.contains_vertex(vertex));
                if !valid {
                    return Err(TdsValidationError::InvalidIncidentTriangle { vertex });
                }
                self.incident_triangles(vertex)?;
            }
        }
        Ok(())
    }
}
