//! Property-based tests for planar and spherical Delaunay triangulations.
//!
//! - Structural validity and the empty-circumcircle condition
//! - Triangle and edge counts from the Euler characteristic
//! - Insertion-order independence under general position
//! - Hull edges of spherical point sets confined to a cap

use proptest::prelude::*;
use std::collections::BTreeSet;
use trisurf::core::algorithms::incremental_insertion::InsertionError;
use trisurf::prelude::*;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// STRATEGIES
// =============================================================================

fn finite_coordinate() -> impl Strategy<Value = f64> {
    (-100.0..100.0).prop_filter("must be finite", |x: &f64| x.is_finite())
}

fn planar_points(max: usize) -> impl Strategy<Value = Vec<Point<2>>> {
    prop::collection::vec(
        prop::array::uniform2(finite_coordinate()).prop_map(Point::new),
        3..=max,
    )
}

fn sphere_point(z_range: std::ops::Range<f64>) -> impl Strategy<Value = Point<3>> {
    (0.0..std::f64::consts::TAU, z_range).prop_map(|(lon, z): (f64, f64)| {
        let r = (1.0 - z * z).sqrt();
        Point::new([r * lon.cos(), r * lon.sin(), z])
    })
}

/// Builds a triangulation, rejecting inputs that are degenerate or carry
/// duplicates; every other failure is reported.
fn build_or_reject<K, const D: usize>(
    points: &[Point<D>],
) -> Result<DelaunayTriangulation<K, D>, TestCaseError>
where
    K: Kernel<D>,
{
    match DelaunayTriangulation::<K, D>::with_options(K::default(), ConstructionOptions::default(), points) {
        Ok(dt) => Ok(dt),
        Err(TriangulationConstructionError::FailedToAddVertex {
            source: InsertionError::DegenerateInput { .. } | InsertionError::DuplicatePoint { .. },
            ..
        }) => Err(TestCaseError::reject("degenerate or duplicate input")),
        Err(err) => Err(TestCaseError::fail(format!("construction failed: {err}"))),
    }
}

/// Triangles as sorted coordinate triples, independent of vertex numbering.
fn triangle_set<K, const D: usize>(
    dt: &DelaunayTriangulation<K, D>,
    points: &[Point<D>],
) -> BTreeSet<Vec<Vec<u64>>>
where
    K: Kernel<D>,
{
    dt.triangle_vertex_indices()
        .into_iter()
        .map(|tri| {
            let mut corners: Vec<Vec<u64>> = tri
                .iter()
                .map(|&i| points[i].coords().iter().map(|c| c.to_bits()).collect())
                .collect();
            corners.sort();
            corners
        })
        .collect()
}

// =============================================================================
// PLANAR PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every planar construction is valid, Delaunay and has
    /// `2N − 2 − h` triangles for `h` hull edges.
    #[test]
    fn prop_planar_triangulation_is_delaunay(points in planar_points(60)) {
        init_tracing();
        let dt: PlanarTriangulation = build_or_reject(&points)?;
        prop_assert!(dt.is_valid().is_ok());
        prop_assert!(dt.validate_delaunay().is_ok());

        let n = dt.number_of_vertices();
        let h = dt.boundary_edges().len();
        prop_assert_eq!(dt.number_of_triangles(), 2 * n - 2 - h);
        prop_assert_eq!(dt.number_of_edges(), 3 * n - 3 - h);
        prop_assert_eq!(dt.hull_edges().unwrap().len(), h);
    }

    /// Property: the planar triangle set does not depend on insertion order.
    #[test]
    fn prop_planar_insertion_order_invariance(points in planar_points(30)) {
        init_tracing();
        let forward: PlanarTriangulation = build_or_reject(&points)?;
        let reversed_points: Vec<Point<2>> = points.iter().rev().copied().collect();
        let reversed: PlanarTriangulation = build_or_reject(&reversed_points)?;
        prop_assert_eq!(
            triangle_set(&forward, &points),
            triangle_set(&reversed, &reversed_points)
        );
    }

    /// Property: every point used in construction is found on a vertex.
    #[test]
    fn prop_planar_vertices_locate_on_themselves(points in planar_points(40)) {
        init_tracing();
        let dt: PlanarTriangulation = build_or_reject(&points)?;
        for (v, vertex) in dt.vertices() {
            prop_assert_eq!(dt.nearest_vertex(vertex.point()).unwrap(), v);
            let located = dt.locate(vertex.point(), None).unwrap();
            prop_assert_eq!(located, LocateResult::OnVertex(v));
        }
    }
}

// =============================================================================
// SPHERICAL PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the sphere mesh is closed with `2N − 4` triangles and
    /// `3N − 6` edges and is Delaunay.
    #[test]
    fn prop_sphere_triangulation_is_closed_and_delaunay(
        points in prop::collection::vec(sphere_point(-0.999..0.999), 4..=60)
    ) {
        init_tracing();
        let dt: SphericalTriangulation = build_or_reject(&points)?;
        prop_assert!(dt.is_valid().is_ok());
        prop_assert!(dt.validate_delaunay().is_ok());

        let n = dt.number_of_vertices();
        prop_assert_eq!(dt.number_of_triangles(), 2 * n - 4);
        prop_assert_eq!(dt.number_of_edges(), 3 * n - 6);
        prop_assert!(dt.boundary_edges().is_empty());
    }

    /// Property: points confined to a polar cap have a hull; the small
    /// triangles cover it as in the plane and the rest are big.
    #[test]
    fn prop_sphere_cap_has_a_hull(
        points in prop::collection::vec(sphere_point(0.3..0.95), 4..=40)
    ) {
        init_tracing();
        let dt: SphericalTriangulation = build_or_reject(&points)?;
        prop_assert!(dt.validate_delaunay().is_ok());

        let n = dt.number_of_vertices();
        let h = dt.hull_edges().unwrap().len();
        prop_assert!(h >= 3);
        let small = dt
            .triangles()
            .filter(|(_, t)| {
                let [a, b, c] = t.vertices().map(|v| *dt.point(v).unwrap());
                dt.kernel().orientation(&a, &b, &c) == Orientation::POSITIVE
            })
            .count();
        prop_assert_eq!(small, 2 * n - 2 - h);
        prop_assert_eq!(dt.number_of_triangles(), 2 * n - 4);
    }

    /// Property: the sphere triangle set does not depend on insertion order.
    #[test]
    fn prop_sphere_insertion_order_invariance(
        points in prop::collection::vec(sphere_point(-0.999..0.999), 4..=30)
    ) {
        init_tracing();
        let forward: SphericalTriangulation = build_or_reject(&points)?;
        let reversed_points: Vec<Point<3>> = points.iter().rev().copied().collect();
        let reversed: SphericalTriangulation = build_or_reject(&reversed_points)?;
        prop_assert_eq!(
            triangle_set(&forward, &points),
            triangle_set(&reversed, &reversed_points)
        );
    }
}

// =============================================================================
// FIXED SCENARIOS
// =============================================================================

#[test]
fn tetrahedron_vertices_are_mutual_neighbours() {
    init_tracing();
    let s = 1.0 / 3.0_f64.sqrt();
    let points = [
        Point::new([1.0, 0.0, 0.0]),
        Point::new([0.0, 1.0, 0.0]),
        Point::new([0.0, 0.0, 1.0]),
        Point::new([-s, -s, -s]),
    ];
    let dt = SphericalTriangulation::new(&points).unwrap();
    assert_eq!(dt.number_of_triangles(), 4);
    assert!(dt.hull_edges().unwrap().is_empty());
    for i in 0..4 {
        let v = VertexId::new(i);
        let mut neighbors: Vec<usize> = dt.neighbors(v).unwrap().iter().map(|n| n.index()).collect();
        neighbors.sort_unstable();
        let expected: Vec<usize> = (0..4).filter(|&j| j != i).collect();
        assert_eq!(neighbors, expected);
    }
}

#[test]
fn octahedron_is_closed_and_delaunay() {
    init_tracing();
    let points = [
        Point::new([1.0, 0.0, 0.0]),
        Point::new([-1.0, 0.0, 0.0]),
        Point::new([0.0, 1.0, 0.0]),
        Point::new([0.0, -1.0, 0.0]),
        Point::new([0.0, 0.0, 1.0]),
        Point::new([0.0, 0.0, -1.0]),
    ];
    let dt = SphericalTriangulation::new(&points).unwrap();
    dt.is_valid().unwrap();
    dt.validate_delaunay().unwrap();
    assert_eq!(dt.number_of_triangles(), 8);
    assert_eq!(dt.number_of_edges(), 12);
}

#[test]
fn square_with_centre_has_four_triangles() {
    init_tracing();
    let points = [
        Point::new([0.0, 0.0]),
        Point::new([1.0, 0.0]),
        Point::new([1.0, 1.0]),
        Point::new([0.0, 1.0]),
        Point::new([0.5, 0.5]),
    ];
    let dt = PlanarTriangulation::new(&points).unwrap();
    assert_eq!(dt.number_of_triangles(), 4);
    assert_eq!(dt.boundary_edges().len(), 4);
    let centre = VertexId::new(4);
    assert_eq!(dt.neighbors(centre).unwrap().len(), 4);
    assert!(!dt.is_boundary_vertex(centre).unwrap());
    assert!(dt.is_boundary_vertex(VertexId::new(0)).unwrap());
}
