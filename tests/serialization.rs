//! Serde behaviour of points, options and run reports.

use proptest::prelude::*;
use trisurf::core::builder::ConstructionReport;
use trisurf::interpolation::gradient::SweepReport;
use trisurf::interpolation::smoothing::{SmoothingError, SmoothingReport};
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

fn finite_coordinate() -> impl Strategy<Value = f64> {
    (-1e6..1e6).prop_filter("must be finite", |x: &f64| x.is_finite())
}

proptest! {
    /// Property: points serialize as plain coordinate arrays.
    #[test]
    fn prop_point_json_is_a_plain_array(coords in prop::array::uniform3(finite_coordinate())) {
        let point = Point::new(coords);
        let json = serde_json::to_value(point).unwrap();
        prop_assert_eq!(json, serde_json::json!(coords));
        let back: Point<3> = serde_json::from_value(serde_json::json!(coords)).unwrap();
        prop_assert_eq!(back, point);
    }
}

#[test]
fn triangle_indices_and_vertex_ids_export_as_integers() {
    init_tracing();
    let points = [
        Point::new([0.0, 0.0]),
        Point::new([1.0, 0.0]),
        Point::new([0.0, 1.0]),
    ];
    let dt = PlanarTriangulation::new(&points).unwrap();
    let json = serde_json::to_string(&dt.triangle_vertex_indices()).unwrap();
    let mut back: Vec<[usize; 3]> = serde_json::from_str(&json).unwrap();
    back[0].sort_unstable();
    assert_eq!(back, vec![[0, 1, 2]]);
    assert_eq!(serde_json::to_string(&VertexId::new(2)).unwrap(), "2");
    let id: VertexId = serde_json::from_str("5").unwrap();
    assert_eq!(id.index(), 5);
}

#[test]
fn options_read_from_hand_written_json() {
    init_tracing();
    let interpolation: InterpolationOptions =
        serde_json::from_str(r#"{"tension": 2.0, "parallel": false, "chunk_size": 64}"#).unwrap();
    assert!(!interpolation.parallel);
    assert_eq!(interpolation.chunk_size, 64);

    let gradients: GlobalGradientOptions = serde_json::from_str(
        r#"{"tension": 0.5, "tolerance": 1e-8, "max_sweeps": 20, "parallel": true}"#,
    )
    .unwrap();
    assert_eq!(gradients.max_sweeps, 20);

    let smoothing: SmoothingOptions = serde_json::from_str(
        r#"{"target": 50.0, "q2_tolerance": 0.01, "gradient_tolerance": 1e-5,
            "tension": 0.0, "max_iterations": 50, "max_sweeps": 1000}"#,
    )
    .unwrap();
    let built = SmoothingOptionsBuilder::default().target(50.0).build().unwrap();
    assert_eq!(smoothing, built);

    assert!(serde_json::from_str::<GradientOptions>(r#"{"parallel": "yes"}"#).is_err());
}

#[test]
fn deserialized_smoothing_options_are_validated_on_use() {
    init_tracing();
    let options: SmoothingOptions = serde_json::from_str(
        r#"{"target": -1.0, "q2_tolerance": 0.01, "gradient_tolerance": 1e-5,
            "tension": 0.0, "max_iterations": 50, "max_sweeps": 1000}"#,
    )
    .unwrap();
    let points = [
        Point::new([0.0, 0.0]),
        Point::new([1.0, 0.0]),
        Point::new([0.0, 1.0]),
        Point::new([1.0, 1.0]),
        Point::new([0.3, 0.6]),
    ];
    let dt = PlanarTriangulation::new(&points).unwrap();
    let err = smooth(&dt, &[0.0, 1.0, 0.5, 0.2, 0.9], &[1.0; 5], &options).unwrap_err();
    assert!(matches!(err, SmoothingError::InvalidOptions { .. }));
}

#[test]
fn run_reports_survive_a_json_round_trip() {
    init_tracing();
    let points = [
        Point::new([0.0, 0.0]),
        Point::new([1.0, 0.0]),
        Point::new([0.0, 1.0]),
        Point::new([1.0, 0.0]),
        Point::new([1.0, 1.0]),
        Point::new([0.4, 0.45]),
    ];
    let (dt, report): (PlanarTriangulation, ConstructionReport) =
        DelaunayTriangulationBuilder::new(&points)
            .skip_duplicates(true)
            .build_with_report(PlanarKernel::new())
            .unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"skipped_duplicates\":[3]"), "{json}");
    assert_eq!(serde_json::from_str::<ConstructionReport>(&json).unwrap(), report);

    let values = [0.0, 1.0, 0.5, 0.2, 0.9];
    let (_, sweeps) =
        estimate_gradients_global(&dt, &values, &GlobalGradientOptions::default()).unwrap();
    let back: SweepReport = serde_json::from_str(&serde_json::to_string(&sweeps).unwrap()).unwrap();
    assert_eq!(back.sweeps, sweeps.sweeps);
    assert_eq!(back.converged, sweeps.converged);

    let options = SmoothingOptionsBuilder::default().target(0.5).build().unwrap();
    let field = smooth(&dt, &values, &[1.0; 5], &options).unwrap();
    let json = serde_json::to_string(&field.report).unwrap();
    let back: SmoothingReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.status, field.report.status);
    assert_eq!(back.iterations, field.report.iterations);
}
