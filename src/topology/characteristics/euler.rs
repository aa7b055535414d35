//! Euler characteristic computation and validation for triangulated surfaces.
//!
//! χ = V − E + F. A planar triangulation of a point set is a topological disk
//! (χ = 1) and a spherical one is S² (χ = 2).
//!
//! # Examples
//!
//! ```rust
//! use trisurf::prelude::*;
//! use trisurf::topology::characteristics::euler;
//!
//! let s = 1.0 / 3.0_f64.sqrt();
//! let points = [
//!     Point::new([1.0, 0.0, 0.0]),
//!     Point::new([0.0, 1.0, 0.0]),
//!     Point::new([0.0, 0.0, 1.0]),
//!     Point::new([-s, -s, -s]),
//! ];
//! let dt = SphericalTriangulation::new(&points).unwrap();
//!
//! let counts = euler::count_simplices(dt.tds());
//! assert_eq!(euler::euler_characteristic(&counts), 2);
//! ```

use crate::core::triangulation_data_structure::Tds;
use crate::topology::traits::topological_space::{TopologicalSpace, TopologyError, TopologyKind};

/// Counts of k-simplices (the f-vector) of a triangulated surface.
///
/// ```rust
/// use trisurf::topology::characteristics::euler::SimplexCounts;
///
/// let counts = SimplexCounts { vertices: 3, edges: 3, triangles: 1 };
/// assert_eq!(counts.count(1), 3);
/// assert_eq!(counts.count(5), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimplexCounts {
    /// Number of vertices (f₀).
    pub vertices: usize,
    /// Number of edges (f₁).
    pub edges: usize,
    /// Number of triangles (f₂).
    pub triangles: usize,
}

impl SimplexCounts {
    /// Number of `k`-simplices; zero above dimension two.
    #[must_use]
    pub const fn count(&self, k: usize) -> usize {
        match k {
            0 => self.vertices,
            1 => self.edges,
            2 => self.triangles,
            _ => 0,
        }
    }
}

/// Topological classification of a triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyClassification {
    /// No triangle exists yet.
    Empty,
    /// Planar triangulation with a convex-hull boundary.
    Disk,
    /// Closed triangulation of the sphere.
    Sphere,
}

/// Result of Euler characteristic validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyCheckResult {
    /// Computed Euler characteristic.
    pub chi: isize,
    /// Expected χ (`None` for an empty triangulation).
    pub expected: Option<isize>,
    /// Topological classification.
    pub classification: TopologyClassification,
    /// Simplex counts.
    pub counts: SimplexCounts,
}

impl TopologyCheckResult {
    /// Returns `true` if χ matches expectation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expected.is_none_or(|expected| self.chi == expected)
    }
}

/// Counts vertices, edges and triangles.
#[must_use]
pub fn count_simplices<const D: usize>(tds: &Tds<D>) -> SimplexCounts {
    SimplexCounts {
        vertices: tds.number_of_vertices(),
        edges: tds.number_of_edges(),
        triangles: tds.number_of_triangles(),
    }
}

/// χ = V − E + F.
#[must_use]
pub fn euler_characteristic(counts: &SimplexCounts) -> isize {
    let signed = |n: usize| isize::try_from(n).unwrap_or(isize::MAX);
    signed(counts.vertices) - signed(counts.edges) + signed(counts.triangles)
}

/// Counts simplices, classifies the triangulation for `space` and compares χ
/// against the expected value.
///
/// ```rust
/// use trisurf::prelude::*;
/// use trisurf::topology::characteristics::euler::validate_triangulation_euler;
///
/// let points = [
///     Point::new([0.0, 0.0]),
///     Point::new([1.0, 0.0]),
///     Point::new([0.5, 1.0]),
///     Point::new([0.5, 0.3]),
/// ];
/// let dt = PlanarTriangulation::new(&points).unwrap();
/// let result = validate_triangulation_euler(dt.tds(), &EuclideanSpace::new());
/// assert_eq!(result.chi, 1);
/// assert!(result.is_valid());
/// ```
#[must_use]
pub fn validate_triangulation_euler<S, const D: usize>(tds: &Tds<D>, space: &S) -> TopologyCheckResult
where
    S: TopologicalSpace,
{
    let counts = count_simplices(tds);
    let chi = euler_characteristic(&counts);
    let (classification, expected) = if counts.triangles == 0 {
        (TopologyClassification::Empty, None)
    } else {
        let classification = match space.kind() {
            TopologyKind::Euclidean => TopologyClassification::Disk,
            TopologyKind::Spherical => TopologyClassification::Sphere,
        };
        (classification, Some(space.expected_euler_characteristic()))
    };
    TopologyCheckResult {
        chi,
        expected,
        classification,
        counts,
    }
}

/// Like [`validate_triangulation_euler`] but turns a mismatch into an error.
///
/// # Errors
///
/// Returns [`TopologyError::EulerMismatch`] when χ differs from the expected
/// value.
pub fn check_triangulation_euler<S, const D: usize>(tds: &Tds<D>, space: &S) -> Result<(), TopologyError>
where
    S: TopologicalSpace,
{
    let result = validate_triangulation_euler(tds, space);
    match result.expected {
        Some(expected) if expected != result.chi => Err(TopologyError::EulerMismatch {
            computed: result.chi,
            expected,
            topology_type: format!("{:?}", result.classification),
        }),
        _ => Ok(()),
    }
}
