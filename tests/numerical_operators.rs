//! End-to-end tests of the numerical operators: gradient estimation,
//! constrained smoothing and interpolation on planar and spherical meshes.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trisurf::interpolation::evaluate::tension_factor;
use trisurf::interpolation::gradient::GradientError;
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

fn random_planar(n: usize, seed: u64) -> Vec<Point<2>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Point::new([rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)]))
        .collect()
}

fn random_sphere(n: usize, seed: u64) -> Vec<Point<3>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let z: f64 = rng.random_range(-1.0..1.0);
            let lon: f64 = rng.random_range(0.0..std::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            Point::new([r * lon.cos(), r * lon.sin(), z])
        })
        .collect()
}

/// Points inside every small triangle, at fixed barycentric weights.
fn interior_samples<K, const D: usize>(dt: &DelaunayTriangulation<K, D>) -> Vec<Point<D>>
where
    K: Kernel<D>,
{
    let weights = [[1.0 / 3.0; 3], [0.6, 0.3, 0.1], [0.1, 0.2, 0.7]];
    dt.triangle_vertex_indices()
        .into_iter()
        .flat_map(|tri| {
            weights.iter().map(move |w| {
                let corners = tri.map(|i| dt.point(VertexId::new(i)).map_or([0.0; D], Point::to_array));
                Point::new(std::array::from_fn(|k| {
                    w[0] * corners[0][k] + w[1] * corners[1][k] + w[2] * corners[2][k]
                }))
            })
        })
        .collect()
}

// =============================================================================
// GRADIENTS
// =============================================================================

#[test]
fn planar_quadratic_field_is_reproduced_from_estimated_gradients() {
    init_tracing();
    let points = random_planar(150, 31);
    let dt = PlanarTriangulation::new(&points).unwrap();
    let field = |p: &Point<2>| 0.5 * p[0] * p[0] - p[0] * p[1] + 2.0 * p[1] - 1.0;
    let values: Vec<f64> = points.iter().map(field).collect();

    let gradients = estimate_gradients(&dt, &values, &GradientOptions::default()).unwrap();
    for (g, p) in gradients.iter().zip(&points) {
        assert_relative_eq!(g[0], p[0] - p[1], epsilon = 1e-7);
        assert_relative_eq!(g[1], -p[0] + 2.0, epsilon = 1e-7);
    }

    let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();
    let queries = interior_samples(&dt);
    let evaluated = interpolator.evaluate_many(&queries).unwrap();
    for (q, f) in queries.iter().zip(evaluated) {
        assert_relative_eq!(f, field(q), epsilon = 1e-6);
    }
}

#[test]
fn parallel_gradient_estimation_matches_sequential() {
    init_tracing();
    let points = random_sphere(200, 4);
    let dt = SphericalTriangulation::new(&points).unwrap();
    let values: Vec<f64> = points.iter().map(|p| (2.0 * p[0]).sin() + p[2] * p[1]).collect();
    let sequential =
        estimate_gradients(&dt, &values, &GradientOptions::new().with_parallel(false)).unwrap();
    let parallel =
        estimate_gradients(&dt, &values, &GradientOptions::new().with_parallel(true)).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn sphere_gradients_are_tangent() {
    init_tracing();
    let points = random_sphere(150, 8);
    let dt = SphericalTriangulation::new(&points).unwrap();
    let values: Vec<f64> = points.iter().map(|p| p[0] * p[1] - p[2]).collect();
    let (gradients, report) =
        estimate_gradients_global(&dt, &values, &GlobalGradientOptions::default()).unwrap();
    assert!(report.sweeps >= 1);
    for (g, p) in gradients.iter().zip(&points) {
        let normal_component: f64 = g.iter().zip(p.coords()).map(|(a, b)| a * b).sum();
        assert!(normal_component.abs() < 1e-10);
    }
}

#[test]
fn lon_lat_partials_fail_at_the_poles() {
    init_tracing();
    let north = Point::from_lon_lat(0.0, std::f64::consts::FRAC_PI_2);
    let err = lon_lat_partials(&north, &[1.0, 0.0, 0.0], 1e-6).unwrap_err();
    assert!(matches!(err, GradientError::PoleSingularity { .. }));

    // f = x on the equator: moving east decreases x at lon = π/2.
    let p = Point::from_lon_lat(std::f64::consts::FRAC_PI_2, 0.0);
    let partials = lon_lat_partials(&p, &[1.0, 0.0, 0.0], 1e-6).unwrap();
    assert_relative_eq!(partials.d_lon, -1.0, epsilon = 1e-12);
    assert_relative_eq!(partials.d_lat, 0.0, epsilon = 1e-12);
}

// =============================================================================
// INTERPOLATION
// =============================================================================

#[test]
fn sphere_linear_field_is_approximated_closely() {
    init_tracing();
    let points = random_sphere(400, 17);
    let dt = SphericalTriangulation::new(&points).unwrap();
    let c = [0.4, -1.1, 0.6];
    let field = |p: &Point<3>| c[0] * p[0] + c[1] * p[1] + c[2] * p[2];
    let values: Vec<f64> = points.iter().map(field).collect();
    let gradients = estimate_gradients(&dt, &values, &GradientOptions::default()).unwrap();
    let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();

    let mut hint = None;
    for (p, f) in points.iter().zip(&values) {
        assert_relative_eq!(interpolator.evaluate(p, &mut hint).unwrap(), *f, epsilon = 1e-12);
    }
    let queries = random_sphere(500, 18);
    let worst = interpolator
        .evaluate_many(&queries)
        .unwrap()
        .iter()
        .zip(&queries)
        .map(|(f, q)| (f - field(q)).abs())
        .fold(0.0, f64::max);
    assert!(worst < 0.05, "largest error {worst}");
}

#[test]
fn tension_blends_towards_linear_interpolation() {
    init_tracing();
    let points = random_planar(40, 23);
    let dt = PlanarTriangulation::new(&points).unwrap();
    let values: Vec<f64> = points.iter().map(|p| (5.0 * p[0]).cos() * p[1]).collect();
    let gradients = estimate_gradients(&dt, &values, &GradientOptions::default()).unwrap();
    let cubic = Interpolator::new(&dt, &values, &gradients).unwrap();
    let tense = Interpolator::new(&dt, &values, &gradients)
        .unwrap()
        .tension(25.0)
        .unwrap();
    let phi = tension_factor(25.0);

    let mut hint = None;
    for tri in dt.triangle_vertex_indices() {
        let corners = tri.map(|i| points[i]);
        let centroid = Point::new([
            (corners[0][0] + corners[1][0] + corners[2][0]) / 3.0,
            (corners[0][1] + corners[1][1] + corners[2][1]) / 3.0,
        ]);
        let linear = tri.iter().map(|&i| values[i]).sum::<f64>() / 3.0;
        let c = cubic.evaluate(&centroid, &mut hint).unwrap();
        let t = tense.evaluate(&centroid, &mut hint).unwrap();
        assert_relative_eq!(t, linear + phi * (c - linear), epsilon = 1e-9);
    }
}

#[test]
fn cap_extrapolation_keeps_constant_fields() {
    init_tracing();
    let points: Vec<Point<3>> = random_sphere(300, 2)
        .into_iter()
        .filter(|p| p[2] > 0.4)
        .collect();
    let dt = SphericalTriangulation::new(&points).unwrap();
    assert!(!dt.hull_edges().unwrap().is_empty());
    let values = vec![-2.5; points.len()];
    let gradients = vec![[0.0; 3]; points.len()];
    let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();

    let mut hint = None;
    for q in [
        Point::from_lon_lat(0.0, -1.2),
        Point::from_lon_lat(2.0, 0.0),
        Point::new([0.0, 0.0, -1.0]),
    ] {
        let (f, g) = interpolator.evaluate_with_gradient(&q, &mut hint).unwrap();
        assert_relative_eq!(f, -2.5, epsilon = 1e-12);
        for component in g {
            assert_relative_eq!(component, 0.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn outside_queries_extrapolate_from_the_nearest_hull_point() {
    init_tracing();
    let points = random_planar(80, 12);
    let dt = PlanarTriangulation::new(&points).unwrap();
    let field = |x: f64, y: f64| x * x + 0.5 * x * y - y + 2.0;
    let slope = |x: f64, y: f64| [2.0 * x + 0.5 * y, 0.5 * x - 1.0];
    let values: Vec<f64> = points.iter().map(|p| field(p[0], p[1])).collect();
    let gradients: Vec<[f64; 2]> = points.iter().map(|p| slope(p[0], p[1])).collect();
    let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();

    let segments: Vec<([f64; 2], [f64; 2])> = dt
        .hull_edges()
        .unwrap()
        .into_iter()
        .map(|(key, corner)| {
            let (u, w) = dt.tds().triangle(key).unwrap().edge(corner);
            (dt.point(u).unwrap().to_array(), dt.point(w).unwrap().to_array())
        })
        .collect();
    let nearest_on_hull = |p: [f64; 2]| -> [f64; 2] {
        segments
            .iter()
            .map(|&(a, b)| {
                let d = [b[0] - a[0], b[1] - a[1]];
                let t = (((p[0] - a[0]) * d[0] + (p[1] - a[1]) * d[1]) / (d[0] * d[0] + d[1] * d[1]))
                    .clamp(0.0, 1.0);
                [a[0] + t * d[0], a[1] + t * d[1]]
            })
            .min_by(|q, r| {
                let dq = (q[0] - p[0]).hypot(q[1] - p[1]);
                let dr = (r[0] - p[0]).hypot(r[1] - p[1]);
                dq.total_cmp(&dr)
            })
            .unwrap()
    };

    let mut rng = StdRng::seed_from_u64(13);
    let mut hint = None;
    let mut checked = 0;
    while checked < 100 {
        let p = [rng.random_range(-1.0..2.0), rng.random_range(-1.0..2.0)];
        let query = Point::new(p);
        if !matches!(dt.locate(&query, None).unwrap(), LocateResult::Outside(_, _)) {
            continue;
        }
        let q = nearest_on_hull(p);
        let g = slope(q[0], q[1]);
        let expected = field(q[0], q[1]) + g[0] * (p[0] - q[0]) + g[1] * (p[1] - q[1]);
        let (f, gradient) = interpolator.evaluate_with_gradient(&query, &mut hint).unwrap();
        assert_relative_eq!(f, expected, epsilon = 1e-8);
        assert_relative_eq!(gradient[0], g[0], epsilon = 1e-7);
        assert_relative_eq!(gradient[1], g[1], epsilon = 1e-7);
        checked += 1;
    }
}

#[test]
fn evaluation_rejects_invalid_queries() {
    init_tracing();
    let points = random_sphere(20, 6);
    let dt = SphericalTriangulation::new(&points).unwrap();
    let values = vec![1.0; 20];
    let gradients = vec![[0.0; 3]; 20];
    let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();
    let mut hint = None;
    assert!(interpolator.evaluate(&Point::new([f64::NAN, 0.0, 1.0]), &mut hint).is_err());
    assert!(Interpolator::new(&dt, &values[..10], &gradients).is_err());
    assert!(Interpolator::new(&dt, &values, &gradients).unwrap().tension(-1.0).is_err());
}

// =============================================================================
// SMOOTHING
// =============================================================================

fn smoothing_options(target: f64) -> SmoothingOptions {
    SmoothingOptionsBuilder::default()
        .target(target)
        .q2_tolerance(0.02)
        .gradient_tolerance(1e-6)
        .max_sweeps(5000)
        .build()
        .unwrap()
}

#[test]
fn smoothed_surface_interpolates_the_smoothed_values() {
    init_tracing();
    let points = random_planar(60, 41);
    let dt = PlanarTriangulation::new(&points).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<f64> = points
        .iter()
        .map(|p| (3.0 * p[0]).sin() + p[1] * p[1] + rng.random_range(-0.05..0.05))
        .collect();
    let weights = vec![400.0; 60];

    let field = smooth(&dt, &data, &weights, &smoothing_options(60.0)).unwrap();
    assert_eq!(field.report.status, SmoothingStatus::Converged);
    assert!((field.report.q2 - 60.0).abs() <= 0.02 * 60.0);

    let interpolator = Interpolator::new(&dt, &field.values, &field.gradients).unwrap();
    let mut hint = None;
    for (p, h) in points.iter().zip(&field.values) {
        assert_relative_eq!(interpolator.evaluate(p, &mut hint).unwrap(), *h, epsilon = 1e-12);
    }
}

#[test]
fn sphere_smoothing_reaches_the_target() {
    init_tracing();
    let points = random_sphere(120, 51);
    let dt = SphericalTriangulation::new(&points).unwrap();
    let mut rng = StdRng::seed_from_u64(52);
    let data: Vec<f64> = points
        .iter()
        .map(|p| (2.0 * p[0]).sin() * p[2] + rng.random_range(-0.05..0.05))
        .collect();
    let weights = vec![400.0; 120];

    let field = smooth(&dt, &data, &weights, &smoothing_options(120.0)).unwrap();
    assert_eq!(field.report.status, SmoothingStatus::Converged);
    assert!((field.report.q2 - 120.0).abs() <= 0.02 * 120.0);
    assert!(field.report.smoothing_parameter > 0.0);
    assert_eq!(field.gradients.len(), 120);
}

#[test]
fn generous_targets_return_the_trend() {
    init_tracing();
    let points = random_planar(30, 61);
    let dt = PlanarTriangulation::new(&points).unwrap();
    let data: Vec<f64> = points.iter().map(|p| 1.0 + 2.0 * p[0] - p[1]).collect();
    let field = smooth(&dt, &data, &vec![1.0; 30], &smoothing_options(30.0)).unwrap();
    assert_eq!(field.report.status, SmoothingStatus::ConstraintInactive);
    for (h, f) in field.values.iter().zip(&data) {
        assert_relative_eq!(*h, *f, epsilon = 1e-9);
    }
    for g in &field.gradients {
        assert_relative_eq!(g[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(g[1], -1.0, epsilon = 1e-9);
    }
}
