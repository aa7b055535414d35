//! Delaunay triangulation layer with incremental insertion.
//!
//! [`DelaunayTriangulation`] owns the combinatorial [`Tds`] together with the
//! [`Kernel`] that supplies every geometric decision, so the planar and the
//! spherical triangulation share one insertion algorithm and differ only in
//! their kernel type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::incremental_insertion::{
    InsertionError, InsertionStatistics, insert_vertex,
};
use crate::core::algorithms::locate::{LocateError, LocateResult, hull_edges, locate, nearest_vertex};
use crate::core::collections::{LINK_BUFFER_SIZE, SmallBuffer};
use crate::core::triangle::Triangle;
use crate::core::triangulation_data_structure::{
    Tds, TdsError, TdsValidationError, TriangleKey, TriangulationConstructionState,
};
use crate::core::util::delaunay_validation::{DelaunayValidationError, is_delaunay};
use crate::core::vertex::{Vertex, VertexId};
use crate::geometry::kernel::{Kernel, PlanarKernel, SphericalKernel};
use crate::geometry::point::Point;
use crate::geometry::predicates::Orientation;
use crate::topology::characteristics::euler::check_triangulation_euler;
use crate::topology::traits::topological_space::TopologyError;

// =============================================================================
// OPTIONS AND ERRORS
// =============================================================================

/// Tolerances used while building a triangulation.
///
/// The predicates are exact; these are the only tolerances in the
/// construction.
///
/// # Examples
///
/// ```rust
/// use trisurf::core::delaunay_triangulation::ConstructionOptions;
///
/// let options = ConstructionOptions::default().with_duplicate_tolerance(1e-8);
/// assert_eq!(options.duplicate_tolerance(), 1e-8);
/// assert_eq!(options.norm_tolerance(), 1e-6);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionOptions {
    duplicate_tolerance: f64,
    norm_tolerance: f64,
    max_flips: Option<usize>,
}

impl Default for ConstructionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionOptions {
    /// Points closer than this (in the kernel's metric) to a stored vertex are
    /// rejected as duplicates.
    pub const DEFAULT_DUPLICATE_TOLERANCE: f64 = 1e-10;
    /// Sphere points whose norm differs from 1 by more than this are rejected.
    pub const DEFAULT_NORM_TOLERANCE: f64 = 1e-6;

    /// Default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duplicate_tolerance: Self::DEFAULT_DUPLICATE_TOLERANCE,
            norm_tolerance: Self::DEFAULT_NORM_TOLERANCE,
            max_flips: None,
        }
    }

    /// Sets the duplicate rejection distance.
    #[must_use]
    pub const fn with_duplicate_tolerance(mut self, tolerance: f64) -> Self {
        self.duplicate_tolerance = tolerance;
        self
    }

    /// Sets the accepted deviation of sphere points from unit norm.
    #[must_use]
    pub const fn with_norm_tolerance(mut self, tolerance: f64) -> Self {
        self.norm_tolerance = tolerance;
        self
    }

    /// Caps the flips of a single insertion. `None` uses `3·T + 64`.
    #[must_use]
    pub const fn with_max_flips(mut self, max_flips: Option<usize>) -> Self {
        self.max_flips = max_flips;
        self
    }

    /// Duplicate rejection distance.
    #[must_use]
    pub const fn duplicate_tolerance(&self) -> f64 {
        self.duplicate_tolerance
    }

    /// Accepted deviation of sphere points from unit norm.
    #[must_use]
    pub const fn norm_tolerance(&self) -> f64 {
        self.norm_tolerance
    }

    /// Flip cap of a single insertion, if set.
    #[must_use]
    pub const fn max_flips(&self) -> Option<usize> {
        self.max_flips
    }
}

/// Batch construction failed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TriangulationConstructionError {
    /// A point could not be inserted.
    #[error("Failed to add vertex {index}: {source}")]
    FailedToAddVertex {
        /// Position of the point in the input slice.
        index: usize,
        /// Why the insertion failed.
        #[source]
        source: InsertionError,
    },
}

/// Validation failures reported by [`DelaunayTriangulation::is_valid`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TriangulationValidationError {
    /// The combinatorial structure is broken.
    #[error("Invalid data structure: {0}")]
    Tds(#[from] TdsValidationError),
    /// A planar triangle is not counter-clockwise.
    #[error("Triangle {key:?} is not counter-clockwise")]
    NotCounterClockwise {
        /// The offending triangle.
        key: TriangleKey,
    },
    /// The combinatorial structure is inconsistent.
    #[error("Data structure error: {0}")]
    Fan(#[from] TdsError),
    /// The Euler characteristic does not match the surface.
    #[error("Topology check failed: {0}")]
    Topology(#[from] TopologyError),
}

// =============================================================================
// TRIANGULATION
// =============================================================================

/// Delaunay triangulation with incremental insertion support.
///
/// # Type Parameters
/// - `K`: Geometric kernel implementing predicates
/// - `D`: Number of point coordinates (2 for the plane, 3 for the sphere)
///
/// # Implementation
///
/// - Point location (stochastic walk) - [`locate`]
/// - Triangle and edge splits, hull extension - [`incremental_insertion`]
/// - Delaunay restoration by Lawson flips - [`restore_delaunay`]
///
/// Each insertion is atomic: on error the triangulation is left unchanged.
///
/// [`locate`]: crate::core::algorithms::locate::locate
/// [`incremental_insertion`]: crate::core::algorithms::incremental_insertion
/// [`restore_delaunay`]: crate::core::algorithms::flips::restore_delaunay
#[derive(Clone, Debug)]
pub struct DelaunayTriangulation<K, const D: usize>
where
    K: Kernel<D>,
{
    tds: Tds<D>,
    kernel: K,
    options: ConstructionOptions,
    /// Hint for next `locate()` call (last inserted triangle)
    last_inserted_triangle: Option<TriangleKey>,
}

/// Triangulation of points in the plane.
pub type PlanarTriangulation = DelaunayTriangulation<PlanarKernel, 2>;

/// Triangulation of points on the unit sphere.
pub type SphericalTriangulation = DelaunayTriangulation<SphericalKernel, 3>;

impl<K, const D: usize> Default for DelaunayTriangulation<K, D>
where
    K: Kernel<D>,
{
    fn default() -> Self {
        Self::empty()
    }
}

impl<K, const D: usize> DelaunayTriangulation<K, D>
where
    K: Kernel<D>,
{
    /// Triangulates `points` with the default kernel and options.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationConstructionError::FailedToAddVertex`] for the
    /// first point that cannot be inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trisurf::prelude::*;
    ///
    /// let s = 1.0 / 3.0_f64.sqrt();
    /// let points = [
    ///     Point::new([1.0, 0.0, 0.0]),
    ///     Point::new([0.0, 1.0, 0.0]),
    ///     Point::new([0.0, 0.0, 1.0]),
    ///     Point::new([-s, -s, -s]),
    /// ];
    /// let dt = SphericalTriangulation::new(&points).unwrap();
    /// assert_eq!(dt.number_of_triangles(), 4);
    /// assert_eq!(dt.neighbors(VertexId::new(3)).unwrap().len(), 3);
    /// ```
    pub fn new(points: &[Point<D>]) -> Result<Self, TriangulationConstructionError> {
        Self::with_options(K::default(), ConstructionOptions::default(), points)
    }

    /// Triangulates `points` with an explicit kernel and options.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationConstructionError::FailedToAddVertex`] for the
    /// first point that cannot be inserted.
    pub fn with_options(
        kernel: K,
        options: ConstructionOptions,
        points: &[Point<D>],
    ) -> Result<Self, TriangulationConstructionError> {
        let mut dt = Self::with_empty_kernel(kernel, options);
        for (index, point) in points.iter().enumerate() {
            dt.insert(*point)
                .map_err(|source| TriangulationConstructionError::FailedToAddVertex { index, source })?;
        }
        tracing::debug!(
            vertices = dt.number_of_vertices(),
            triangles = dt.number_of_triangles(),
            "triangulation constructed"
        );
        Ok(dt)
    }

    /// Creates an empty triangulation with the default kernel and options.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_empty_kernel(K::default(), ConstructionOptions::default())
    }

    /// Creates an empty triangulation with an explicit kernel and options.
    #[must_use]
    pub fn with_empty_kernel(kernel: K, options: ConstructionOptions) -> Self {
        Self {
            tds: Tds::new(),
            kernel,
            options,
            last_inserted_triangle: None,
        }
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Inserts a point and restores the Delaunay property.
    ///
    /// Returns the id of the new vertex, which is its position in insertion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`InsertionError`] for invalid, duplicate or degenerate points
    /// and for internal failures; the triangulation is unchanged on error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trisurf::prelude::*;
    ///
    /// let mut dt = PlanarTriangulation::empty();
    /// for p in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
    ///     dt.insert(Point::new(p)).unwrap();
    /// }
    /// assert_eq!(dt.number_of_triangles(), 2);
    /// assert!(dt.insert(Point::new([1.0, 1.0])).is_err());
    /// ```
    pub fn insert(&mut self, point: Point<D>) -> Result<VertexId, InsertionError> {
        self.insert_with_statistics(point).map(|(vertex, _)| vertex)
    }

    /// Like [`insert`](Self::insert), also reporting what the insertion did.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn insert_with_statistics(
        &mut self,
        point: Point<D>,
    ) -> Result<(VertexId, InsertionStatistics), InsertionError> {
        let outcome = insert_vertex(
            &mut self.tds,
            &self.kernel,
            &self.options,
            &point,
            self.last_inserted_triangle,
        )?;
        if outcome.hint.is_some() {
            self.last_inserted_triangle = outcome.hint;
        }
        Ok((outcome.vertex, outcome.statistics))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Locates `point`, starting the walk at `hint` if given.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError`] for an empty triangulation or a walk that does
    /// not terminate.
    pub fn locate(
        &self,
        point: &Point<D>,
        hint: Option<TriangleKey>,
    ) -> Result<LocateResult, LocateError> {
        locate(&self.tds, &self.kernel, point, hint.or(self.last_inserted_triangle))
    }

    /// Vertex nearest to `point` in the kernel's metric.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::EmptyTriangulation`] without vertices.
    pub fn nearest_vertex(&self, point: &Point<D>) -> Result<VertexId, LocateError> {
        nearest_vertex(&self.tds, &self.kernel, point, self.last_inserted_triangle)
    }

    /// Adjacent vertices of `v` in counter-clockwise order.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError`] for unknown or isolated vertices.
    pub fn neighbors(&self, v: VertexId) -> Result<SmallBuffer<VertexId, LINK_BUFFER_SIZE>, TdsError> {
        self.tds.neighbors(v)
    }

    /// Triangles in arena order.
    pub fn triangles(&self) -> impl Iterator<Item = (TriangleKey, &Triangle)> + '_ {
        self.tds.triangles()
    }

    /// Vertex index triples of all triangles in arena order.
    #[must_use]
    pub fn triangle_vertex_indices(&self) -> Vec<[usize; 3]> {
        self.tds
            .triangles()
            .map(|(_, t)| t.vertices().map(VertexId::index))
            .collect()
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl ExactSizeIterator<Item = (VertexId, &Vertex<D>)> + '_ {
        self.tds.vertices()
    }

    /// Position of vertex `v`.
    #[must_use]
    pub fn point(&self, v: VertexId) -> Option<&Point<D>> {
        self.tds.point(v)
    }

    /// Hull edges as `(triangle, corner)` pairs; empty for a closed sphere.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError`] on an inconsistent structure.
    pub fn hull_edges(&self) -> Result<Vec<(TriangleKey, usize)>, TdsError> {
        hull_edges(&self.tds, &self.kernel)
    }

    /// Returns `true` if `v` lies on the planar hull.
    ///
    /// # Errors
    ///
    /// Returns [`TdsError`] for unknown or isolated vertices.
    pub fn is_boundary_vertex(&self, v: VertexId) -> Result<bool, TdsError> {
        self.tds.is_boundary_vertex(v)
    }

    /// Number of vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.tds.number_of_vertices()
    }

    /// Number of triangles.
    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.tds.number_of_triangles()
    }

    /// Number of edges.
    #[must_use]
    pub fn number_of_edges(&self) -> usize {
        self.tds.number_of_edges()
    }

    /// Hull edges of the planar triangulation as `(triangle, slot)` pairs.
    #[must_use]
    pub fn boundary_edges(&self) -> Vec<(TriangleKey, usize)> {
        self.tds.boundary_edges()
    }

    /// Current construction state.
    #[must_use]
    pub fn construction_state(&self) -> TriangulationConstructionState {
        self.tds.construction_state()
    }

    /// The underlying data structure.
    #[must_use]
    pub const fn tds(&self) -> &Tds<D> {
        &self.tds
    }

    /// The geometric kernel.
    #[must_use]
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The construction options.
    #[must_use]
    pub const fn options(&self) -> &ConstructionOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Checks structure, orientation and Euler characteristic.
    ///
    /// # Errors
    ///
    /// Returns the first [`TriangulationValidationError`] found.
    pub fn is_valid(&self) -> Result<(), TriangulationValidationError> {
        let allows_boundary = self.kernel.allows_boundary();
        self.tds.validate(allows_boundary)?;
        if allows_boundary {
            for key in self.tds.triangle_keys() {
                let [a, b, c] = self.tds.triangle_points(key)?;
                if self.kernel.orientation(&a, &b, &c) != Orientation::POSITIVE {
                    return Err(TriangulationValidationError::NotCounterClockwise { key });
                }
            }
        }
        if self.tds.number_of_triangles() > 0 {
            check_triangulation_euler(&self.tds, &self.kernel.space())?;
        }
        Ok(())
    }

    /// Exhaustive empty-circumcircle check.
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayValidationError`] naming a violating triangle.
    pub fn validate_delaunay(&self) -> Result<(), DelaunayValidationError> {
        is_delaunay(&self.tds, &self.kernel)
    }
}
