//! Core trait for topological spaces and related error types.
//!
//! A triangulation lives either in the Euclidean plane, where the convex hull
//! forms a boundary, or on the unit sphere, which is closed. The space decides
//! how input coordinates are validated and canonicalised and which Euler
//! characteristic a valid triangulation must have.

use thiserror::Error;

/// Errors that can occur during point canonicalisation or topology validation.
///
/// # Examples
///
/// ```rust
/// use trisurf::topology::traits::topological_space::TopologyError;
///
/// let error = TopologyError::OffSurface { norm: 1.5, tolerance: 1e-6 };
/// assert_eq!(
///     error.to_string(),
///     "Point has norm 1.5, farther than 0.000001 from the unit sphere"
/// );
/// ```
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum TopologyError {
    /// A coordinate is NaN or infinite.
    #[error("Coordinate {index} is not finite: {value}")]
    NonFiniteCoordinate {
        /// Position of the coordinate.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// A spherical point is too far from the unit sphere to be renormalised.
    #[error("Point has norm {norm}, farther than {tolerance} from the unit sphere")]
    OffSurface {
        /// Euclidean norm of the point.
        norm: f64,
        /// Accepted deviation from 1.
        tolerance: f64,
    },

    /// The coordinate slice does not match the space dimension.
    #[error("Expected {expected} coordinates, got {actual}")]
    DimensionMismatch {
        /// Coordinates required by the space.
        expected: usize,
        /// Coordinates supplied.
        actual: usize,
    },

    /// Euler characteristic does not match the expected value.
    #[error(
        "Euler characteristic mismatch: computed χ={computed}, expected χ={expected} for {topology_type}"
    )]
    EulerMismatch {
        /// The computed Euler characteristic.
        computed: isize,
        /// The expected Euler characteristic.
        expected: isize,
        /// Human-readable topology type description.
        topology_type: String,
    },
}

/// Classification of topological spaces for triangulations.
///
/// ```rust
/// use trisurf::topology::traits::topological_space::TopologyKind;
///
/// let kind = TopologyKind::Spherical;
/// assert_eq!(format!("{kind:?}"), "Spherical");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    /// The Euclidean plane. The triangulation covers the convex hull of the
    /// points and has boundary edges.
    Euclidean,

    /// The unit sphere S². The triangulation is closed: every edge has two
    /// triangles and nothing lies "outside".
    Spherical,
}

/// Trait for topological spaces that triangulations can inhabit.
///
/// `DIM` is the number of ambient coordinates per point (2 for the plane, 3 for
/// the sphere embedded in R³).
pub trait TopologicalSpace {
    /// Number of coordinates per point.
    const DIM: usize;

    /// Returns the kind of topological space.
    fn kind(&self) -> TopologyKind;

    /// Returns whether triangulations in this space have boundary edges.
    ///
    /// - `true` for the plane (convex hull boundary)
    /// - `false` for the sphere
    fn allows_boundary(&self) -> bool;

    /// Validates a point and moves it onto the space if it is within
    /// `tolerance` of it.
    ///
    /// - **Euclidean**: coordinates must be finite; nothing else changes.
    /// - **Spherical**: the point is divided by its norm when that norm is
    ///   within `tolerance` of 1.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError`] if the point is not finite, has the wrong
    /// number of coordinates, or is too far from the space.
    fn canonicalize_point(&self, coords: &mut [f64], tolerance: f64) -> Result<(), TopologyError>;

    /// Euler characteristic χ = V − E + F of a valid triangulation with at
    /// least one triangle: 1 for a planar triangulation (a disk), 2 for the
    /// sphere.
    fn expected_euler_characteristic(&self) -> isize;
}

/// Shared finiteness and length check used by the concrete spaces.
pub(crate) fn check_coordinates(coords: &[f64], expected: usize) -> Result<(), TopologyError> {
    if coords.len() != expected {
        return Err(TopologyError::DimensionMismatch {
            expected,
            actual: coords.len(),
        });
    }
    if let Some((index, &value)) = coords.iter().enumerate().find(|(_, c)| !c.is_finite()) {
        return Err(TopologyError::NonFiniteCoordinate { index, value });
    }
    Ok(())
}
