//! Delaunay empty-circumcircle property validation utilities.

use thiserror::Error;

use crate::core::triangle::TriangleValidationError;
use crate::core::triangulation_data_structure::{Tds, TdsError, TdsValidationError, TriangleKey};
use crate::core::vertex::VertexId;
use crate::geometry::kernel::Kernel;
use crate::geometry::predicates::InSphere;

/// Errors that can occur during Delaunay property validation.
///
/// # Examples
///
/// ```rust
/// use trisurf::core::triangulation_data_structure::TriangleKey;
/// use trisurf::core::util::delaunay_validation::DelaunayValidationError;
/// use trisurf::core::vertex::VertexId;
///
/// let err = DelaunayValidationError::DelaunayViolation {
///     key: TriangleKey::default(),
///     vertex: VertexId::new(7),
/// };
/// assert!(err.to_string().contains("vertex 7"));
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DelaunayValidationError {
    /// A vertex lies strictly inside the circumcircle of a triangle.
    #[error("Triangle {key:?} violates the Delaunay property: vertex {vertex} is inside its circumcircle")]
    DelaunayViolation {
        /// The violating triangle.
        key: TriangleKey,
        /// A vertex inside its circumcircle.
        vertex: VertexId,
    },
    /// Structural corruption detected during validation.
    #[error("TDS corruption: {source}")]
    TriangulationState {
        /// The underlying structural error.
        #[source]
        source: TdsValidationError,
    },
    /// A triangle references a missing vertex.
    #[error("Triangulation data structure error: {source}")]
    Tds {
        /// Underlying error.
        #[from]
        source: TdsError,
    },
    /// Invalid triangle record detected during validation.
    #[error("Invalid triangle {key:?}: {source}")]
    InvalidTriangle {
        /// The invalid triangle.
        key: TriangleKey,
        /// The underlying triangle error.
        #[source]
        source: TriangleValidationError,
    },
}

// =============================================================================
// DELAUNAY PROPERTY VALIDATION
// =============================================================================

/// First vertex strictly inside the circumcircle of `key`, if any.
fn first_violating_vertex<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    key: TriangleKey,
) -> Result<Option<VertexId>, DelaunayValidationError>
where
    K: Kernel<D>,
{
    let Some(triangle) = tds.triangle(key) else {
        return Ok(None);
    };
    triangle
        .is_valid(key)
        .map_err(|source| DelaunayValidationError::InvalidTriangle { key, source })?;

    let [a, b, c] = tds.triangle_points(key)?;

    for (vertex, record) in tds.vertices() {
        if triangle.contains_vertex(vertex) {
            continue;
        }
        if kernel.in_circle(&a, &b, &c, record.point()) == InSphere::INSIDE {
            return Ok(Some(vertex));
        }
    }
    Ok(None)
}

/// Checks every triangle against every vertex.
///
/// Cost is `O(T·N)`; intended for tests and debugging.
///
/// # Errors
///
/// Returns the first [`DelaunayValidationError`] found.
pub fn is_delaunay<K, const D: usize>(tds: &Tds<D>, kernel: &K) -> Result<(), DelaunayValidationError>
where
    K: Kernel<D>,
{
    for key in tds.triangle_keys() {
        if let Some(vertex) = first_violating_vertex(tds, kernel, key)? {
            return Err(DelaunayValidationError::DelaunayViolation { key, vertex });
        }
    }
    Ok(())
}

/// Triangles that have a vertex strictly inside their circumcircle.
///
/// Checks `triangles` if given, otherwise every triangle.
///
/// # Errors
///
/// Returns [`DelaunayValidationError`] for malformed triangle records.
pub fn find_delaunay_violations<K, const D: usize>(
    tds: &Tds<D>,
    kernel: &K,
    triangles: Option<&[TriangleKey]>,
) -> Result<Vec<TriangleKey>, DelaunayValidationError>
where
    K: Kernel<D>,
{
    let keys: Vec<TriangleKey> = match triangles {
        Some(keys) => keys.to_vec(),
        None => tds.triangle_keys().collect(),
    };
    let mut violating = Vec::new();
    for key in keys {
        if first_violating_vertex(tds, kernel, key)?.is_some() {
            violating.push(key);
        }
    }
    tracing::debug!(
        checked = triangles.map_or(tds.number_of_triangles(), <[TriangleKey]>::len),
        violations = violating.len(),
        "Delaunay check finished"
    );
    Ok(violating)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delaunay_triangulation::{PlanarTriangulation, SphericalTriangulation};
    use crate::geometry::kernel::{PlanarKernel, SphericalKernel};
    use crate::geometry::point::Point;

    #[test]
    fn square_with_centre_is_delaunay() {
        let points = [
            Point::new([0.0, 0.0]),
            Point::new([2.0, 0.0]),
            Point::new([2.0, 2.0]),
            Point::new([0.0, 2.0]),
            Point::new([1.0, 0.9]),
        ];
        let dt = PlanarTriangulation::new(&points).unwrap();
        assert!(is_delaunay(dt.tds(), &PlanarKernel::new()).is_ok());
        assert!(
            find_delaunay_violations(dt.tds(), &PlanarKernel::new(), None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn octahedron_is_delaunay() {
        let points = [
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
            Point::new([-1.0, 0.0, 0.0]),
            Point::new([0.0, -1.0, 0.0]),
            Point::new([0.0, 0.0, -1.0]),
        ];
        let dt = SphericalTriangulation::new(&points).unwrap();
        assert_eq!(dt.number_of_triangles(), 8);
        assert!(is_delaunay(dt.tds(), &SphericalKernel::new()).is_ok());
    }
}
