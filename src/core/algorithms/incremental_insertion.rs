//! Incremental insertion algorithms.
//!
//! A point is connected to the mesh by one of four topological operations,
//! chosen from the result of the walk:
//!
//! - inside a triangle: split it into three ([`split_triangle`]);
//! - on an interior edge: split the two adjacent triangles into four
//!   ([`split_edge`]), or on a planar hull edge the single triangle into two;
//! - outside the planar hull: fan the point to every visible hull edge
//!   ([`extend_hull`]);
//! - outside the spherical hull (all points in one hemisphere): replace the
//!   conflicting faces by a star of new faces ([`fill_cavity`]).
//!
//! Lawson flips then restore the Delaunay property. Every mutation of one
//! insertion is journaled by the [`Tds`], so a failure at any stage leaves the
//! mesh exactly as it was.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::flips::{FlipError, restore_delaunay};
use crate::core::algorithms::locate::{
    ConflictError, LocateError, LocateResult, extract_cavity_boundary, find_conflict_region,
    is_big_triangle, is_in_conflict, locate_with_steps, nearest_vertex_from,
};
use crate::core::collections::{
    FastHashMap, SmallBuffer, TriangleKeyBuffer, fast_hash_map_with_capacity,
};
use crate::core::delaunay_triangulation::ConstructionOptions;
use crate::core::triangle::{Triangle, ccw, cw};
use crate::core::triangulation_data_structure::{Tds, TdsError, TriangleKey};
use crate::core::vertex::VertexId;
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;
use crate::geometry::predicates::Orientation;
use crate::topology::traits::topological_space::TopologyError;

/// Error during incremental insertion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsertionError {
    /// The first points cannot span a triangle.
    #[error("Degenerate input at point {index}: {message}")]
    DegenerateInput {
        /// Position of the rejected point.
        index: usize,
        /// What makes the input degenerate.
        message: String,
    },

    /// The point coincides with a stored vertex.
    #[error("Point {index} duplicates vertex {existing} (distance {distance:e})")]
    DuplicatePoint {
        /// Position of the rejected point.
        index: usize,
        /// The vertex it coincides with.
        existing: VertexId,
        /// Distance between the two in the kernel's metric.
        distance: f64,
    },

    /// The point has non-finite coordinates or is off the surface.
    #[error("Point {index} is invalid: {source}")]
    InvalidPoint {
        /// Position of the rejected point.
        index: usize,
        /// Why the point was rejected.
        #[source]
        source: TopologyError,
    },

    /// Point location failed
    #[error("Location error: {0}")]
    Location(#[from] LocateError),

    /// Conflict region finding failed
    #[error("Conflict region error: {0}")]
    ConflictRegion(#[from] ConflictError),

    /// The flip cascade failed
    #[error("Delaunay repair failed: {0}")]
    Flip(#[from] FlipError),

    /// The combinatorial structure is inconsistent
    #[error("Topology error: {0}")]
    Topology(#[from] TdsError),

    /// Cavity filling failed
    #[error("Cavity filling failed: {message}")]
    CavityFilling {
        /// Error message
        message: String,
    },
}

/// How a point was connected to the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionKind {
    /// Stored without a triangle; the stored points span no triangle yet.
    Pending,
    /// Completed the initial simplex.
    InitialSimplex,
    /// Split the containing triangle into three.
    Interior,
    /// Split the edge the point lies on.
    Edge,
    /// Fanned to the visible edges of the planar hull.
    HullExtension,
    /// Replaced the conflicting faces of the spherical hull.
    Cavity,
}

/// Statistics about a vertex insertion operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionStatistics {
    /// Topological operation used.
    pub kind: InsertionKind,
    /// Triangles visited by the location walk.
    pub walk_steps: usize,
    /// Edge flips performed to restore the Delaunay property.
    pub flips: usize,
}

impl InsertionStatistics {
    const fn bootstrap(kind: InsertionKind) -> Self {
        Self {
            kind,
            walk_steps: 0,
            flips: 0,
        }
    }
}

/// Outcome of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionOutcome {
    /// The new vertex.
    pub vertex: VertexId,
    /// A triangle incident to the new vertex, usable as the next walk hint.
    pub hint: Option<TriangleKey>,
    /// What the insertion did.
    pub statistics: InsertionStatistics,
}

/// Inserts `point` into the mesh.
///
/// The point is validated and canonicalised by the kernel, located starting at
/// `hint`, checked against nearby vertices for duplicates, connected, and the
/// Delaunay property is restored by flips.
///
/// # Errors
///
/// Returns [`InsertionError`]; the mesh is unchanged on error.
pub fn insert_vertex<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    options: &ConstructionOptions,
    point: &Point<D>,
    hint: Option<TriangleKey>,
) -> Result<InsertionOutcome, InsertionError>
where
    K: Kernel<D>,
{
    let index = tds.number_of_vertices();
    let point = kernel
        .canonicalize(point, options.norm_tolerance())
        .map_err(|source| InsertionError::InvalidPoint { index, source })?;

    if tds.number_of_triangles() == 0 {
        return insert_bootstrap(tds, kernel, options, point);
    }

    let (location, walk_steps) = locate_with_steps(tds, kernel, &point, hint)?;
    reject_duplicate(tds, kernel, options, &point, location)?;

    tds.begin_journal();
    let p = tds.push_vertex(point);
    match connect_point(tds, kernel, options, p, location) {
        Ok((kind, flips)) => {
            tds.commit_journal();
            let vertex = VertexId::new(index);
            let hint = tds.vertex(vertex).and_then(|v| v.incident_triangle());
            tracing::debug!(index, ?kind, walk_steps, flips, "inserted vertex");
            Ok(InsertionOutcome {
                vertex,
                hint,
                statistics: InsertionStatistics {
                    kind,
                    walk_steps,
                    flips,
                },
            })
        }
        Err(err) => {
            tds.rollback_journal();
            tracing::debug!(index, error = %err, "insertion rolled back");
            Err(err)
        }
    }
}

/// Leading points that may lie on one line (or great circle) before the
/// initial simplex must form; one more degenerate point is rejected.
const MAX_PENDING: usize = 3;

/// Stores one of the first points. Points that span no triangle with the
/// stored ones are held back; the first point that does forms the initial
/// simplex (two triangles covering the sphere, or one planar triangle) and the
/// held points are then connected through the regular insertion path.
fn insert_bootstrap<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    options: &ConstructionOptions,
    point: Point<D>,
) -> Result<InsertionOutcome, InsertionError>
where
    K: Kernel<D>,
{
    let index = tds.number_of_vertices();
    if let Some((existing, distance)) = tds
        .vertices()
        .map(|(id, v)| (id, kernel.distance(v.point(), &point)))
        .filter(|&(_, d)| d <= options.duplicate_tolerance())
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        return Err(InsertionError::DuplicatePoint {
            index,
            existing,
            distance,
        });
    }

    let spanning = if index < 2 {
        None
    } else {
        spanning_pair(tds, kernel, &point)?
    };
    let Some((a, b, orientation)) = spanning else {
        if index >= MAX_PENDING {
            let message = if kernel.allows_boundary() {
                "the first four points are collinear"
            } else {
                "the first four points are coplanar through the origin"
            };
            return Err(InsertionError::DegenerateInput {
                index,
                message: message.to_string(),
            });
        }
        let vertex = tds.push_vertex(point);
        if index == 2 {
            tracing::debug!(index, "holding a degenerate leading point");
        }
        return Ok(InsertionOutcome {
            vertex,
            hint: None,
            statistics: InsertionStatistics::bootstrap(InsertionKind::Pending),
        });
    };

    tds.begin_journal();
    match seed_simplex(tds, kernel, options, point, a, b, orientation) {
        Ok(flips) => {
            tds.commit_journal();
            let vertex = VertexId::new(index);
            let hint = tds.vertex(vertex).and_then(|v| v.incident_triangle());
            tracing::debug!(index, held = index - 2, flips, "initial simplex created");
            Ok(InsertionOutcome {
                vertex,
                hint,
                statistics: InsertionStatistics {
                    kind: InsertionKind::InitialSimplex,
                    walk_steps: 0,
                    flips,
                },
            })
        }
        Err(err) => {
            tds.rollback_journal();
            tracing::debug!(index, error = %err, "initial simplex rolled back");
            Err(err)
        }
    }
}

/// First pair of stored vertices that spans a non-degenerate triangle with
/// `point`, with that triangle's orientation.
fn spanning_pair<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    point: &Point<D>,
) -> Result<Option<(VertexId, VertexId, Orientation)>, TdsError>
where
    K: Kernel<D>,
{
    let n = tds.number_of_vertices();
    for i in 0..n {
        for j in i + 1..n {
            let (a, b) = (VertexId::new(i), VertexId::new(j));
            let orientation = kernel.orientation(tds.point_or_err(a)?, tds.point_or_err(b)?, point);
            if orientation != Orientation::DEGENERATE {
                return Ok(Some((a, b, orientation)));
            }
        }
    }
    Ok(None)
}

/// Builds the initial simplex from `a`, `b` and the new `point`, then connects
/// the held vertices. Returns the number of flips spent on the held vertices.
fn seed_simplex<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    options: &ConstructionOptions,
    point: Point<D>,
    a: VertexId,
    b: VertexId,
    orientation: Orientation,
) -> Result<usize, InsertionError>
where
    K: Kernel<D>,
{
    let held: SmallBuffer<VertexId, MAX_PENDING> = tds
        .vertices()
        .map(|(id, _)| id)
        .filter(|&id| id != a && id != b)
        .collect();

    let c = tds.push_vertex(point);
    let (b, c) = if orientation == Orientation::NEGATIVE {
        (c, b)
    } else {
        (b, c)
    };
    let first = tds.insert_triangle(Triangle::new([a, b, c], [None; 3]));
    if !kernel.allows_boundary() {
        let second = tds.insert_triangle(Triangle::new([a, c, b], [Some(first); 3]));
        tds.replace_triangle(first, Triangle::new([a, b, c], [Some(second); 3]))?;
    }
    for v in [a, b, c] {
        tds.set_incident_triangle(v, first)?;
    }

    let mut flips = 0;
    for v in held {
        let held_point = *tds.point_or_err(v)?;
        let (location, _) = locate_with_steps(tds, kernel, &held_point, None)?;
        let (kind, spent) = connect_point(tds, kernel, options, v, location)?;
        tracing::trace!(vertex = %v, ?kind, "connected held vertex");
        flips += spent;
    }
    Ok(flips)
}

fn reject_duplicate<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    options: &ConstructionOptions,
    point: &Point<D>,
    location: LocateResult,
) -> Result<(), InsertionError>
where
    K: Kernel<D>,
{
    let index = tds.number_of_vertices();
    let nearest = match location {
        LocateResult::OnVertex(v) => v,
        LocateResult::InsideTriangle(key)
        | LocateResult::OnEdge(key, _)
        | LocateResult::Outside(key, _) => nearest_vertex_from(tds, kernel, point, key)?,
    };
    let distance = kernel.distance(tds.point_or_err(nearest)?, point);
    if matches!(location, LocateResult::OnVertex(_)) || distance <= options.duplicate_tolerance() {
        return Err(InsertionError::DuplicatePoint {
            index,
            existing: nearest,
            distance,
        });
    }
    Ok(())
}

/// Connects the stored vertex `p` at `location` and runs the flip cascade.
fn connect_point<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    options: &ConstructionOptions,
    p: VertexId,
    location: LocateResult,
) -> Result<(InsertionKind, usize), InsertionError>
where
    K: Kernel<D>,
{
    let max_flips = options
        .max_flips()
        .unwrap_or_else(|| 3 * tds.number_of_triangles() + 64);

    let (kind, seeds) = match location {
        LocateResult::InsideTriangle(key) => {
            (InsertionKind::Interior, split_triangle(tds, key, p)?.into_iter().collect())
        }
        LocateResult::OnEdge(key, i) => {
            let neighbor = tds.triangle_or_err(key)?.neighbor(i);
            match neighbor {
                Some(n) if is_big_triangle(tds, kernel, n)? => {
                    (InsertionKind::Cavity, insert_in_cavity(tds, kernel, p, key, i)?)
                }
                _ => (InsertionKind::Edge, split_edge(tds, key, i, p)?),
            }
        }
        LocateResult::Outside(key, i) if kernel.allows_boundary() => {
            (InsertionKind::HullExtension, extend_hull(tds, kernel, key, i, p)?)
        }
        LocateResult::Outside(key, i) => {
            (InsertionKind::Cavity, insert_in_cavity(tds, kernel, p, key, i)?)
        }
        LocateResult::OnVertex(existing) => {
            return Err(InsertionError::DuplicatePoint {
                index: p.index(),
                existing,
                distance: 0.0,
            });
        }
    };

    let stats = restore_delaunay(tds, kernel, p, &seeds, max_flips)?;
    Ok((kind, stats.flips))
}

// =============================================================================
// TOPOLOGICAL OPERATIONS
// =============================================================================

/// Splits triangle `key = (v0, v1, v2)` at vertex `p` into `(p, v1, v2)`,
/// `(v0, p, v2)` and `(v0, v1, p)`; the first reuses `key`.
///
/// # Errors
///
/// Returns [`TdsError`] if a record is missing or inconsistent.
pub fn split_triangle<const D: usize>(
    tds: &mut Tds<D>,
    key: TriangleKey,
    p: VertexId,
) -> Result<[TriangleKey; 3], TdsError> {
    let t = *tds.triangle_or_err(key)?;
    let [v0, v1, v2] = *t.vertices();
    let [n0, n1, n2] = *t.neighbors();

    let t1 = tds.insert_triangle(Triangle::new([v0, p, v2], [None; 3]));
    let t2 = tds.insert_triangle(Triangle::new([v0, v1, p], [None; 3]));
    tds.replace_triangle(key, Triangle::new([p, v1, v2], [n0, Some(t1), Some(t2)]))?;
    tds.replace_triangle(t1, Triangle::new([v0, p, v2], [Some(key), n1, Some(t2)]))?;
    tds.replace_triangle(t2, Triangle::new([v0, v1, p], [Some(key), Some(t1), n2]))?;

    if let Some(n) = n1 {
        tds.set_neighbor_across(n, v2, v0, Some(t1))?;
    }
    if let Some(n) = n2 {
        tds.set_neighbor_across(n, v0, v1, Some(t2))?;
    }
    for v in [p, v1, v2] {
        tds.set_incident_triangle(v, key)?;
    }
    tds.set_incident_triangle(v0, t1)?;
    Ok([key, t1, t2])
}

/// Splits the edge opposite corner `index` of triangle `key` at vertex `p`.
///
/// With `key = (w, a, b)` and its neighbour `(x, b, a)` the result is the four
/// triangles `(w, a, p)`, `(w, p, b)`, `(x, b, p)` and `(x, p, a)`. A hull
/// edge yields the first two only.
///
/// # Errors
///
/// Returns [`TdsError`] if a record is missing or inconsistent.
pub fn split_edge<const D: usize>(
    tds: &mut Tds<D>,
    key: TriangleKey,
    index: usize,
    p: VertexId,
) -> Result<TriangleKeyBuffer, TdsError> {
    let t = *tds.triangle_or_err(key)?;
    let w = t.vertex(index);
    let (a, b) = t.edge(index);
    let across_bw = t.neighbor(ccw(index));
    let across_wa = t.neighbor(cw(index));

    let Some(other) = t.neighbor(index) else {
        let t2 = tds.insert_triangle(Triangle::new([w, p, b], [None, across_bw, Some(key)]));
        tds.replace_triangle(key, Triangle::new([w, a, p], [None, Some(t2), across_wa]))?;
        if let Some(n) = across_bw {
            tds.set_neighbor_across(n, b, w, Some(t2))?;
        }
        for v in [p, w, a] {
            tds.set_incident_triangle(v, key)?;
        }
        tds.set_incident_triangle(b, t2)?;
        return Ok([key, t2].into_iter().collect());
    };

    let u = *tds.triangle_or_err(other)?;
    let j = u
        .opposite_index(a, b)
        .ok_or(TdsError::EdgeNotFound { key: other, u: a, v: b })?;
    let x = u.vertex(j);
    let across_xb = u.neighbor(cw(j));
    let across_ax = u.neighbor(ccw(j));

    let t2 = tds.insert_triangle(Triangle::new([w, p, b], [None; 3]));
    let u2 = tds.insert_triangle(Triangle::new([x, p, a], [None; 3]));
    tds.replace_triangle(key, Triangle::new([w, a, p], [Some(u2), Some(t2), across_wa]))?;
    tds.replace_triangle(t2, Triangle::new([w, p, b], [Some(other), across_bw, Some(key)]))?;
    tds.replace_triangle(other, Triangle::new([x, b, p], [Some(t2), Some(u2), across_xb]))?;
    tds.replace_triangle(u2, Triangle::new([x, p, a], [Some(key), across_ax, Some(other)]))?;

    if let Some(n) = across_bw {
        tds.set_neighbor_across(n, b, w, Some(t2))?;
    }
    if let Some(n) = across_ax {
        tds.set_neighbor_across(n, a, x, Some(u2))?;
    }
    for v in [p, w, a] {
        tds.set_incident_triangle(v, key)?;
    }
    tds.set_incident_triangle(b, t2)?;
    tds.set_incident_triangle(x, other)?;
    Ok([key, t2, other, u2].into_iter().collect())
}

/// Next hull edge counter-clockwise: the edge leaving the end vertex of the
/// hull edge opposite corner `index` of `key`.
fn next_hull_edge<const D: usize>(
    tds: &Tds<D>,
    key: TriangleKey,
    index: usize,
) -> Result<(TriangleKey, usize), TdsError> {
    let pivot = tds.triangle_or_err(key)?.vertex(cw(index));
    rotate_to_hull(tds, key, pivot, cw)
}

/// Previous hull edge: the edge entering the start vertex.
fn previous_hull_edge<const D: usize>(
    tds: &Tds<D>,
    key: TriangleKey,
    index: usize,
) -> Result<(TriangleKey, usize), TdsError> {
    let pivot = tds.triangle_or_err(key)?.vertex(ccw(index));
    rotate_to_hull(tds, key, pivot, ccw)
}

/// Rotates around `pivot`, crossing the edge `slot(i)` of each triangle
/// (`i` the pivot's corner) until that edge has no neighbour.
fn rotate_to_hull<const D: usize>(
    tds: &Tds<D>,
    start: TriangleKey,
    pivot: VertexId,
    slot: fn(usize) -> usize,
) -> Result<(TriangleKey, usize), TdsError> {
    let limit = tds.number_of_triangles() + 1;
    let mut current = start;
    for _ in 0..limit {
        let triangle = tds.triangle_or_err(current)?;
        let i = triangle.index_of(pivot).ok_or(TdsError::EdgeNotFound {
            key: current,
            u: pivot,
            v: pivot,
        })?;
        match triangle.neighbor(slot(i)) {
            Some(next) => current = next,
            None => return Ok((current, slot(i))),
        }
    }
    Err(TdsError::BrokenFan {
        vertex: pivot,
        steps: limit,
    })
}

/// Connects `p`, which lies outside the planar hull, to every hull edge that
/// has it strictly on its outer side. The walk exited through the edge
/// opposite corner `index` of `key`, which is one of them.
///
/// # Errors
///
/// Returns [`InsertionError::CavityFilling`] if that edge is not visible from
/// `p`, or [`InsertionError::Topology`] on an inconsistent hull.
pub fn extend_hull<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    key: TriangleKey,
    index: usize,
    p: VertexId,
) -> Result<TriangleKeyBuffer, InsertionError>
where
    K: Kernel<D>,
{
    let point = *tds.point_or_err(p)?;
    let visible = |tds: &Tds<D>, (k, i): (TriangleKey, usize)| -> Result<bool, TdsError> {
        let triangle = tds.triangle_or_err(k)?;
        if triangle.neighbor(i).is_some() {
            return Ok(false);
        }
        let (a, b) = triangle.edge(i);
        Ok(kernel.orientation(tds.point_or_err(a)?, tds.point_or_err(b)?, &point)
            == Orientation::NEGATIVE)
    };

    let start = (key, index);
    if !visible(tds, start)? {
        return Err(InsertionError::CavityFilling {
            message: format!("hull edge {index} of {key:?} is not visible from the new point"),
        });
    }

    // Visible edges form one chain of the hull; collect it in hull order.
    let limit = tds.number_of_triangles() + 1;
    let mut chain = Vec::new();
    let mut current = start;
    for _ in 0..limit {
        let previous = previous_hull_edge(tds, current.0, current.1)?;
        if previous == start || !visible(tds, previous)? {
            break;
        }
        chain.push(previous);
        current = previous;
    }
    chain.reverse();
    chain.push(start);
    current = start;
    for _ in 0..limit {
        let next = next_hull_edge(tds, current.0, current.1)?;
        if chain.contains(&next) || !visible(tds, next)? {
            break;
        }
        chain.push(next);
        current = next;
    }

    let mut edges = Vec::with_capacity(chain.len());
    for &(k, i) in &chain {
        let (a, b) = tds.triangle_or_err(k)?.edge(i);
        edges.push((k, a, b));
    }
    let created: TriangleKeyBuffer = edges
        .iter()
        .map(|&(_, a, b)| tds.insert_triangle(Triangle::new([b, a, p], [None; 3])))
        .collect();
    for (j, &(outer, a, b)) in edges.iter().enumerate() {
        let before = j.checked_sub(1).map(|m| created[m]);
        let after = created.get(j + 1).copied();
        tds.replace_triangle(created[j], Triangle::new([b, a, p], [before, after, Some(outer)]))?;
        tds.set_neighbor_across(outer, a, b, Some(created[j]))?;
    }
    if let Some(&first) = created.first() {
        tds.set_incident_triangle(p, first)?;
    }
    tracing::trace!(visible_edges = created.len(), "extended planar hull");
    Ok(created)
}

/// Inserts `p`, which lies outside the spherical hull (or on a hull edge next
/// to a big triangle), by rebuilding the conflict region around it.
fn insert_in_cavity<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    p: VertexId,
    key: TriangleKey,
    index: usize,
) -> Result<TriangleKeyBuffer, InsertionError>
where
    K: Kernel<D>,
{
    let point = *tds.point_or_err(p)?;
    let candidates = [Some(key), tds.triangle_or_err(key)?.neighbor(index)];
    let mut seed = None;
    for candidate in candidates.into_iter().flatten() {
        if is_in_conflict(tds, kernel, &point, candidate)? {
            seed = Some(candidate);
            break;
        }
    }
    let seed = seed.ok_or_else(|| InsertionError::CavityFilling {
        message: format!("no triangle at edge {index} of {key:?} conflicts with the new point"),
    })?;
    let conflict = find_conflict_region(tds, kernel, &point, seed)?;
    let boundary = extract_cavity_boundary(tds, &conflict)?;
    fill_cavity(tds, p, &conflict, &boundary)
}

/// Replaces the triangles of a conflict region by a star around `p`.
///
/// `boundary` holds the region's outer edges as returned by
/// [`extract_cavity_boundary`]. Each edge `(u, v)` becomes a triangle
/// `(u, v, p)`. The region's keys are reused and the two extra triangles are
/// allocated, so the region must be a disk without interior vertices.
///
/// # Errors
///
/// Returns [`InsertionError::CavityFilling`] if the boundary is not a simple
/// cycle of `conflict.len() + 2` edges.
pub fn fill_cavity<const D: usize>(
    tds: &mut Tds<D>,
    p: VertexId,
    conflict: &[TriangleKey],
    boundary: &[(TriangleKey, usize)],
) -> Result<TriangleKeyBuffer, InsertionError> {
    if boundary.len() != conflict.len() + 2 {
        return Err(InsertionError::CavityFilling {
            message: format!(
                "cavity of {} triangles has {} boundary edges",
                conflict.len(),
                boundary.len()
            ),
        });
    }

    let mut horizon = Vec::with_capacity(boundary.len());
    let mut starts: FastHashMap<VertexId, usize> = fast_hash_map_with_capacity(boundary.len());
    let mut ends: FastHashMap<VertexId, usize> = fast_hash_map_with_capacity(boundary.len());
    for (j, &(key, i)) in boundary.iter().enumerate() {
        let triangle = tds.triangle_or_err(key)?;
        let (u, v) = triangle.edge(i);
        horizon.push((u, v, triangle.neighbor(i)));
        if starts.insert(u, j).is_some() || ends.insert(v, j).is_some() {
            return Err(InsertionError::CavityFilling {
                message: format!("cavity boundary passes vertex {u} or {v} twice"),
            });
        }
    }

    let mut keys: TriangleKeyBuffer = conflict.iter().copied().collect();
    for &(u, v, _) in &horizon[conflict.len()..] {
        keys.push(tds.insert_triangle(Triangle::new([u, v, p], [None; 3])));
    }

    for (j, &(u, v, outer)) in horizon.iter().enumerate() {
        let (Some(&after), Some(&before)) = (starts.get(&v), ends.get(&u)) else {
            return Err(InsertionError::CavityFilling {
                message: format!("cavity boundary is not closed at edge {u}-{v}"),
            });
        };
        tds.replace_triangle(
            keys[j],
            Triangle::new([u, v, p], [Some(keys[after]), Some(keys[before]), outer]),
        )?;
    }
    for (j, &(u, v, outer)) in horizon.iter().enumerate() {
        if let Some(outer) = outer {
            tds.set_neighbor_across(outer, u, v, Some(keys[j]))?;
        }
        tds.set_incident_triangle(u, keys[j])?;
    }
    tds.set_incident_triangle(p, keys[0])?;
    tracing::trace!(
        removed = conflict.len(),
        created = keys.len(),
        "filled spherical cavity"
    );
    Ok(keys)
}
