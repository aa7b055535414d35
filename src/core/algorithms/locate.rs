//! Point location algorithms for triangulations.
//!
//! Implements a remembering stochastic visibility walk: starting from a hint
//! triangle, the walk repeatedly crosses an edge that has the query point on
//! its right until no such edge exists. The first edge tested in each triangle
//! is chosen by a deterministic xorshift sequence, which rules out the cycles a
//! fixed edge order can produce, and the edge the walk just came through is
//! never retested.
//!
//! On the sphere, triangles that are not positively oriented ("big"
//! triangles, which exist only while all vertices lie in one hemisphere) cover
//! the region outside the spherical hull of the vertices. The walk never enters
//! them; reaching one reports [`LocateResult::Outside`] exactly like leaving the
//! planar convex hull does.
//!
//! # References
//!
//! - O. Devillers, S. Pion, and M. Teillaud, "Walking in a Triangulation",
//!   International Journal of Foundations of Computer Science, 2001.

use crate::core::collections::{
    FastHashSet, LINK_BUFFER_SIZE, SmallBuffer, TriangleKeyBuffer, TriangleSecondaryMap,
};
use crate::core::triangle::{ccw, cw};
use crate::core::triangulation_data_structure::{Tds, TdsError, TriangleKey};
use crate::core::vertex::VertexId;
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;
use crate::geometry::predicates::{InSphere, Orientation};

/// Result of point location query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateResult {
    /// Point is strictly inside the triangle.
    InsideTriangle(TriangleKey),
    /// Point is in the relative interior of the edge opposite the given corner.
    OnEdge(TriangleKey, usize),
    /// Point coincides with a vertex.
    OnVertex(VertexId),
    /// Point is outside the hull; the walk left through the edge opposite the
    /// given corner of the given triangle, which has the point on its right.
    Outside(TriangleKey, usize),
}

impl LocateResult {
    /// Triangle the walk stopped in, if any.
    #[must_use]
    pub const fn triangle(&self) -> Option<TriangleKey> {
        match *self {
            Self::InsideTriangle(key) | Self::OnEdge(key, _) | Self::Outside(key, _) => Some(key),
            Self::OnVertex(_) => None,
        }
    }
}

/// Error during point location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// Triangulation has no triangles (and, for nearest-vertex queries, no
    /// vertices).
    #[error("Cannot locate in empty triangulation")]
    EmptyTriangulation,

    /// The walk exceeded its step limit.
    #[error("Walk did not terminate after {steps} steps")]
    WalkDidNotTerminate {
        /// Number of steps taken.
        steps: usize,
    },

    /// A triangle reached by the walk is degenerate.
    #[error("Invalid triangle reference: {key:?}")]
    InvalidTriangle {
        /// The invalid triangle key.
        key: TriangleKey,
    },

    /// The combinatorial structure is inconsistent.
    #[error("Triangulation data structure error: {source}")]
    Tds {
        /// Underlying error.
        #[from]
        source: TdsError,
    },
}

/// Error during conflict region search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// Starting triangle is missing or not in conflict with the point.
    #[error("Invalid starting triangle: {key:?}")]
    InvalidStartTriangle {
        /// The invalid triangle key.
        key: TriangleKey,
    },

    /// The combinatorial structure is inconsistent.
    #[error("Triangulation data structure error: {source}")]
    Tds {
        /// Underlying error.
        #[from]
        source: TdsError,
    },
}

/// Deterministic xorshift sequence choosing the first edge tested per step.
#[derive(Debug, Clone, Copy)]
struct EdgeShuffle(u32);

impl EdgeShuffle {
    const SEED: u32 = 0x9E37_79B9;

    const fn new() -> Self {
        Self(Self::SEED)
    }

    const fn next_offset(&mut self) -> usize {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        match x % 3 {
            0 => 0,
            1 => 1,
            _ => 2,
        }
    }
}

/// Returns `true` if `key` is not positively oriented.
///
/// Planar triangles are always positively oriented. On the sphere this marks
/// the triangles covering the complement of the vertices' spherical hull.
///
/// # Errors
///
/// Returns [`TdsError`] if the triangle or one of its vertices is missing.
pub fn is_big_triangle<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    key: TriangleKey,
) -> Result<bool, TdsError>
where
    K: Kernel<D>,
{
    let [a, b, c] = tds.triangle_points(key)?;
    Ok(kernel.orientation(&a, &b, &c) != Orientation::POSITIVE)
}

/// Locate a point in the triangulation by walking.
///
/// # Errors
///
/// Returns `LocateError` if:
/// - The triangulation is empty
/// - The walk exceeds `4·T + 64` steps
/// - The structure is inconsistent
///
/// # Examples
///
/// ```rust
/// use trisurf::core::algorithms::locate::{LocateResult, locate};
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.0, 1.0]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// let kernel = PlanarKernel::new();
///
/// let inside = locate(dt.tds(), &kernel, &Point::new([0.2, 0.2]), None).unwrap();
/// assert!(matches!(inside, LocateResult::InsideTriangle(_)));
///
/// let outside = locate(dt.tds(), &kernel, &Point::new([2.0, 2.0]), None).unwrap();
/// assert!(matches!(outside, LocateResult::Outside(_, _)));
///
/// let corner = locate(dt.tds(), &kernel, &Point::new([1.0, 0.0]), None).unwrap();
/// assert_eq!(corner, LocateResult::OnVertex(VertexId::new(1)));
/// ```
pub fn locate<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    hint: Option<TriangleKey>,
) -> Result<LocateResult, LocateError>
where
    K: Kernel<D>,
{
    locate_with_steps(tds, kernel, point, hint).map(|(result, _)| result)
}

/// Like [`locate`], also returning the number of triangles visited.
///
/// # Errors
///
/// See [`locate`].
pub fn locate_with_steps<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    hint: Option<TriangleKey>,
) -> Result<(LocateResult, usize), LocateError>
where
    K: Kernel<D>,
{
    if tds.number_of_triangles() == 0 {
        return Err(LocateError::EmptyTriangulation);
    }
    let mut current = start_triangle(tds, kernel, hint)?;
    let limit = 4 * tds.number_of_triangles() + 64;
    let mut shuffle = EdgeShuffle::new();
    let mut previous: Option<TriangleKey> = None;

    for step in 1..=limit {
        let triangle = tds.triangle_or_err(current)?;
        let corners = tds.triangle_points(current)?;
        let offset = shuffle.next_offset();
        let mut on_edge = [false; 3];
        let mut exit = None;

        for k in 0..3 {
            let i = (offset + k) % 3;
            // The point is strictly left of the edge we arrived through.
            if previous.is_some() && triangle.neighbor(i) == previous {
                continue;
            }
            match kernel.orientation(&corners[ccw(i)], &corners[cw(i)], point) {
                Orientation::NEGATIVE => {
                    exit = Some(i);
                    break;
                }
                Orientation::DEGENERATE => on_edge[i] = true,
                Orientation::POSITIVE => {}
            }
        }

        if let Some(i) = exit {
            match triangle.neighbor(i) {
                Some(next) if !is_big_triangle(tds, kernel, next)? => {
                    tracing::trace!(?current, ?next, step, "walk step");
                    previous = Some(current);
                    current = next;
                    continue;
                }
                _ => return Ok((LocateResult::Outside(current, i), step)),
            }
        }

        let zeros: SmallBuffer<usize, 3> = (0..3).filter(|&i| on_edge[i]).collect();
        let result = match zeros.as_slice() {
            [] => LocateResult::InsideTriangle(current),
            [i] => LocateResult::OnEdge(current, *i),
            [i, j] => LocateResult::OnVertex(triangle.vertex(3 - i - j)),
            _ => return Err(LocateError::InvalidTriangle { key: current }),
        };
        return Ok((result, step));
    }

    tracing::warn!(limit, "point location walk did not terminate");
    Err(LocateError::WalkDidNotTerminate { steps: limit })
}

/// Hint if it is a live, positively oriented triangle; otherwise the first
/// such triangle in arena order.
fn start_triangle<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    hint: Option<TriangleKey>,
) -> Result<TriangleKey, LocateError>
where
    K: Kernel<D>,
{
    if let Some(key) = hint
        && tds.contains_triangle(key)
        && !is_big_triangle(tds, kernel, key)?
    {
        return Ok(key);
    }
    for key in tds.triangle_keys() {
        if !is_big_triangle(tds, kernel, key)? {
            return Ok(key);
        }
    }
    Err(LocateError::EmptyTriangulation)
}

/// Vertex closest to `point` in the kernel's metric.
///
/// Walks to the point, takes the closest corner of the final triangle and
/// then descends greedily over Delaunay neighbours; in a Delaunay
/// triangulation a vertex none of whose neighbours is closer is the global
/// nearest neighbour. Before the first triangle exists the stored vertices are
/// scanned.
///
/// # Errors
///
/// Returns [`LocateError::EmptyTriangulation`] if there are no vertices, or
/// any error of the walk.
///
/// ```rust
/// use trisurf::core::algorithms::locate::nearest_vertex;
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.0, 1.0]),
///     Point::new([1.0, 1.0]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// let nearest = nearest_vertex(dt.tds(), &PlanarKernel::new(), &Point::new([0.9, 1.4]), None).unwrap();
/// assert_eq!(nearest, VertexId::new(3));
/// ```
pub fn nearest_vertex<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    hint: Option<TriangleKey>,
) -> Result<VertexId, LocateError>
where
    K: Kernel<D>,
{
    if tds.number_of_triangles() == 0 {
        return tds
            .vertices()
            .map(|(id, v)| (id, kernel.distance(v.point(), point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
            .ok_or(LocateError::EmptyTriangulation);
    }

    let key = match locate(tds, kernel, point, hint)? {
        LocateResult::OnVertex(v) => return Ok(v),
        LocateResult::InsideTriangle(key)
        | LocateResult::OnEdge(key, _)
        | LocateResult::Outside(key, _) => key,
    };
    Ok(nearest_vertex_from(tds, kernel, point, key)?)
}

/// Greedy nearest-vertex descent starting at the corners of `key`.
pub(crate) fn nearest_vertex_from<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    key: TriangleKey,
) -> Result<VertexId, TdsError>
where
    K: Kernel<D>,
{
    let distance_to = |v: VertexId| -> Result<f64, TdsError> {
        Ok(kernel.distance(tds.point_or_err(v)?, point))
    };
    let corners = *tds.triangle_or_err(key)?.vertices();
    let mut best = corners[0];
    let mut best_distance = distance_to(best)?;
    for &v in &corners[1..] {
        let d = distance_to(v)?;
        if d < best_distance {
            best = v;
            best_distance = d;
        }
    }

    let mut visited: FastHashSet<VertexId> = FastHashSet::default();
    visited.insert(best);
    loop {
        let link: SmallBuffer<VertexId, LINK_BUFFER_SIZE> = tds.neighbors(best)?;
        let mut improved = false;
        for v in link {
            let d = distance_to(v)?;
            if d < best_distance && visited.insert(v) {
                best = v;
                best_distance = d;
                improved = true;
            }
        }
        if !improved {
            return Ok(best);
        }
    }
}

/// Returns `true` if `point` conflicts with triangle `key`.
///
/// A triangle conflicts when the point lies strictly inside its circumcircle.
/// A big triangle also conflicts when the point lies on its circumcircle, so
/// that coplanar faces of the spherical hull are merged by a cavity insertion.
///
/// # Errors
///
/// Returns [`TdsError`] if the triangle or one of its vertices is missing.
pub fn is_in_conflict<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    key: TriangleKey,
) -> Result<bool, TdsError>
where
    K: Kernel<D>,
{
    let [a, b, c] = tds.triangle_points(key)?;
    Ok(match kernel.in_circle(&a, &b, &c, point) {
        InSphere::INSIDE => true,
        InSphere::BOUNDARY => kernel.orientation(&a, &b, &c) != Orientation::POSITIVE,
        InSphere::OUTSIDE => false,
    })
}

/// Find all triangles whose circumcircles contain the query point.
///
/// Breadth-first traversal from `start`, which must itself be in conflict
/// (see [`is_in_conflict`]).
/// On the sphere this is the set of hull faces visible from the point, which
/// is connected.
///
/// # Errors
///
/// Returns [`ConflictError::InvalidStartTriangle`] if `start` is missing or
/// not in conflict.
pub fn find_conflict_region<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
    start: TriangleKey,
) -> Result<TriangleKeyBuffer, ConflictError>
where
    K: Kernel<D>,
{
    let in_conflict = |key: TriangleKey| is_in_conflict(tds, kernel, point, key);
    if !tds.contains_triangle(start) || !in_conflict(start)? {
        return Err(ConflictError::InvalidStartTriangle { key: start });
    }

    let mut conflict = TriangleKeyBuffer::new();
    let mut queue = TriangleKeyBuffer::new();
    let mut visited: TriangleSecondaryMap<()> = TriangleSecondaryMap::new();
    queue.push(start);
    visited.insert(start, ());

    while let Some(key) = queue.pop() {
        if !in_conflict(key)? {
            continue;
        }
        conflict.push(key);
        for neighbor in tds.triangle_or_err(key)?.neighbors().iter().flatten() {
            if !visited.contains_key(*neighbor) {
                visited.insert(*neighbor, ());
                queue.push(*neighbor);
            }
        }
    }
    Ok(conflict)
}

/// Edges of a conflict region whose other side is not in conflict, as
/// `(triangle, corner)` pairs with the triangle inside the region.
///
/// # Errors
///
/// Returns [`ConflictError::Tds`] if a triangle of the region is missing.
pub fn extract_cavity_boundary<const D: usize>(
    tds: &Tds<D>,
    conflict: &[TriangleKey],
) -> Result<Vec<(TriangleKey, usize)>, ConflictError> {
    let region: FastHashSet<TriangleKey> = conflict.iter().copied().collect();
    let mut boundary = Vec::with_capacity(conflict.len() + 2);
    for &key in conflict {
        let triangle = tds.triangle_or_err(key)?;
        for i in 0..3 {
            if triangle.neighbor(i).is_none_or(|n| !region.contains(&n)) {
                boundary.push((key, i));
            }
        }
    }
    Ok(boundary)
}

/// Hull edges as `(triangle, corner)` pairs: planar edges without neighbour
/// and, on the sphere, edges between a positively oriented triangle and a big
/// one.
///
/// # Errors
///
/// Returns [`TdsError`] on an inconsistent structure.
pub fn hull_edges<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
) -> Result<Vec<(TriangleKey, usize)>, TdsError>
where
    K: Kernel<D>,
{
    if kernel.allows_boundary() {
        return Ok(tds.boundary_edges());
    }
    let mut edges = Vec::new();
    for (key, triangle) in tds.triangles() {
        if is_big_triangle(tds, kernel, key)? {
            continue;
        }
        for i in 0..3 {
            if let Some(neighbor) = triangle.neighbor(i)
                && is_big_triangle(tds, kernel, neighbor)?
            {
                edges.push((key, i));
            }
        }
    }
    Ok(edges)
}
