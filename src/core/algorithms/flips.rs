//! Edge flips and Lawson's Delaunay restoration.
//!
//! An edge flip replaces the two triangles sharing an edge by the two
//! triangles sharing the other diagonal of their quadrilateral. After a new
//! vertex `p` is connected to the mesh, every edge opposite `p` whose far
//! triangle has `p` inside its circumcircle is flipped; the two new triangles
//! again contain `p` and their far edges are queued. The cascade ends when no
//! queued edge is in conflict, at which point the triangulation is Delaunay.
//!
//! # References
//! - C. L. Lawson, "Software for C¹ surface interpolation", 1977.
//! - R. J. Renka, "Algorithm 772: STRIPACK", ACM TOMS 23(3), 1997.

use thiserror::Error;

use crate::core::collections::TriangleKeyBuffer;
use crate::core::triangle::{Triangle, ccw, cw};
use crate::core::triangulation_data_structure::{Tds, TdsError, TriangleKey};
use crate::core::vertex::VertexId;
use crate::geometry::kernel::Kernel;
use crate::geometry::predicates::InSphere;

/// Errors raised by edge flips.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlipError {
    /// The edge has no triangle on its other side.
    #[error("Edge opposite corner {index} of triangle {key:?} is on the boundary")]
    BoundaryEdge {
        /// Triangle holding the edge.
        key: TriangleKey,
        /// Corner opposite the edge.
        index: usize,
    },
    /// The two triangles do not share the edge in opposite directions.
    #[error("Edge adjacency mismatch between triangle {key:?} and neighbour {neighbor:?}")]
    InvalidEdgeAdjacency {
        /// Triangle key.
        key: TriangleKey,
        /// Neighbour key.
        neighbor: TriangleKey,
    },
    /// The flipped diagonal would duplicate an existing edge.
    #[error("Flip would duplicate edge {u}-{v}")]
    DuplicateEdge {
        /// First endpoint.
        u: VertexId,
        /// Second endpoint.
        v: VertexId,
    },
    /// The cascade performed more flips than allowed.
    #[error("Flip cascade exceeded {limit} flips")]
    FlipLimitExceeded {
        /// Allowed number of flips.
        limit: usize,
    },
    /// The combinatorial structure is inconsistent.
    #[error("Triangulation data structure error: {source}")]
    Tds {
        /// Underlying error.
        #[from]
        source: TdsError,
    },
}

/// Counters of one Delaunay restoration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DelaunayRepairStats {
    /// Edges tested with the in-circle predicate.
    pub edges_checked: usize,
    /// Flips performed.
    pub flips: usize,
}

/// Flips the edge opposite corner `index` of triangle `key`.
///
/// With `key = (p, a, b)` and its neighbour `(d, b, a)`, the records are
/// rewritten in place to `(p, a, d)` and `(p, d, b)`: `key` keeps `p`, `a`
/// and the neighbour key keeps `p`, `b`. Returns `(key, neighbour)`.
///
/// # Errors
///
/// Returns [`FlipError`] for hull edges, inconsistent adjacency, or when `p`
/// and `d` are already adjacent.
pub fn flip_edge<const D: usize>(
    tds: &mut Tds<D>,
    key: TriangleKey,
    index: usize,
) -> Result<(TriangleKey, TriangleKey), FlipError> {
    let t = *tds.triangle_or_err(key)?;
    let neighbor = t
        .neighbor(index)
        .ok_or(FlipError::BoundaryEdge { key, index })?;
    let u = *tds.triangle_or_err(neighbor)?;

    let p = t.vertex(index);
    let (a, b) = t.edge(index);
    let j = u
        .opposite_index(a, b)
        .filter(|&j| u.edge(j) == (b, a) && u.neighbor(j) == Some(key))
        .ok_or(FlipError::InvalidEdgeAdjacency { key, neighbor })?;
    let d = u.vertex(j);
    if d == p || t.contains_vertex(d) {
        return Err(FlipError::DuplicateEdge { u: p, v: d });
    }

    let n_a = t.neighbor(ccw(index)); // across (b, p)
    let n_b = t.neighbor(cw(index)); // across (p, a)
    let m_b = u.neighbor(ccw(j)); // across (a, d)
    let m_a = u.neighbor(cw(j)); // across (d, b)

    tds.replace_triangle(key, Triangle::new([p, a, d], [m_b, Some(neighbor), n_b]))?;
    tds.replace_triangle(neighbor, Triangle::new([p, d, b], [m_a, n_a, Some(key)]))?;

    if let Some(m) = m_b {
        tds.set_neighbor_across(m, a, d, Some(key))?;
    }
    if let Some(n) = n_a {
        tds.set_neighbor_across(n, b, p, Some(neighbor))?;
    }

    tds.set_incident_triangle(p, key)?;
    tds.set_incident_triangle(a, key)?;
    tds.set_incident_triangle(d, key)?;
    tds.set_incident_triangle(b, neighbor)?;
    Ok((key, neighbor))
}

/// Restores the Delaunay property around a newly connected vertex `p`.
///
/// `seeds` are the triangles incident to `p` after the topological insertion.
/// Each queued triangle's edge opposite `p` is tested against the triangle on
/// its other side, flipping while `p` lies strictly inside that triangle's
/// circumcircle.
///
/// # Errors
///
/// Returns [`FlipError::FlipLimitExceeded`] after `max_flips` flips, or any
/// error of [`flip_edge`]. The caller is expected to roll back.
pub fn restore_delaunay<K, const D: usize>(
    tds: &mut Tds<D>,
    kernel: &K,
    p: VertexId,
    seeds: &[TriangleKey],
    max_flips: usize,
) -> Result<DelaunayRepairStats, FlipError>
where
    K: Kernel<D>,
{
    let mut stats = DelaunayRepairStats::default();
    let mut stack: TriangleKeyBuffer = seeds.iter().copied().collect();
    let point = *tds.point_or_err(p)?;

    while let Some(key) = stack.pop() {
        let triangle = *tds.triangle_or_err(key)?;
        let Some(i) = triangle.index_of(p) else {
            continue;
        };
        let Some(neighbor) = triangle.neighbor(i) else {
            continue;
        };
        stats.edges_checked += 1;
        let [a, b, c] = tds.triangle_points(neighbor)?;
        if kernel.in_circle(&a, &b, &c, &point) != InSphere::INSIDE {
            continue;
        }
        if stats.flips >= max_flips {
            return Err(FlipError::FlipLimitExceeded { limit: max_flips });
        }
        let (first, second) = flip_edge(tds, key, i)?;
        stats.flips += 1;
        tracing::trace!(?first, ?second, vertex = %p, "flipped edge");
        stack.push(first);
        stack.push(second);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::kernel::PlanarKernel;
    use crate::geometry::point::Point;

    /// Quadrilateral split along the diagonal 0-2: (0,1,2) and (0,2,3).
    fn quad(corner: [f64; 2]) -> (Tds<2>, TriangleKey, TriangleKey) {
        let mut tds = Tds::new();
        for p in [[0.0, 0.0], corner, [1.0, 1.0], [0.0, 1.0]] {
            tds.push_vertex(Point::new(p));
        }
        let v = VertexId::new;
        let t0 = tds.insert_triangle(Triangle::new([v(0), v(1), v(2)], [None; 3]));
        let t1 = tds.insert_triangle(Triangle::new([v(0), v(2), v(3)], [None; 3]));
        tds.set_neighbor_across(t0, v(0), v(2), Some(t1)).unwrap();
        tds.set_neighbor_across(t1, v(0), v(2), Some(t0)).unwrap();
        for i in 0..3 {
            tds.set_incident_triangle(v(i), t0).unwrap();
        }
        tds.set_incident_triangle(v(3), t1).unwrap();
        (tds, t0, t1)
    }

    #[test]
    fn flip_swaps_the_diagonal() {
        let (mut tds, t0, t1) = quad([1.0, 0.0]);
        // Corner 1 of (0,1,2) is opposite the diagonal.
        flip_edge(&mut tds, t0, 1).unwrap();
        tds.validate(true).unwrap();
        let mut link: Vec<usize> = tds
            .neighbors(VertexId::new(1))
            .unwrap()
            .iter()
            .map(|v| v.index())
            .collect();
        link.sort_unstable();
        assert_eq!(link, vec![0, 2, 3]);
        // The diagonal 0-2 is gone.
        assert!(!tds.triangle(t0).unwrap().contains_vertex(VertexId::new(0)));
        assert!(!tds.triangle(t1).unwrap().contains_vertex(VertexId::new(2)));
    }

    #[test]
    fn boundary_edges_cannot_flip() {
        let (mut tds, t0, _) = quad([1.0, 0.0]);
        assert_eq!(
            flip_edge(&mut tds, t0, 0),
            Err(FlipError::BoundaryEdge { key: t0, index: 0 })
        );
    }

    #[test]
    fn cocircular_quad_is_left_alone() {
        let (mut tds, t0, t1) = quad([1.0, 0.0]);
        let stats =
            restore_delaunay(&mut tds, &PlanarKernel::new(), VertexId::new(1), &[t0, t1], 0).unwrap();
        assert_eq!(stats.flips, 0);
        assert_eq!(stats.edges_checked, 1);
    }

    #[test]
    fn conflicting_edge_is_flipped_within_the_limit() {
        // (0.6, 0.4) lies inside the circumcircle of (0,0), (1,1), (0,1).
        let (mut tds, t0, _) = quad([0.6, 0.4]);
        assert_eq!(
            restore_delaunay(&mut tds, &PlanarKernel::new(), VertexId::new(1), &[t0], 0),
            Err(FlipError::FlipLimitExceeded { limit: 0 })
        );

        let (mut tds, t0, _) = quad([0.6, 0.4]);
        let stats =
            restore_delaunay(&mut tds, &PlanarKernel::new(), VertexId::new(1), &[t0], 8).unwrap();
        assert_eq!(stats.flips, 1);
        tds.validate(true).unwrap();
        assert_eq!(tds.neighbors(VertexId::new(1)).unwrap().len(), 3);
    }
}
