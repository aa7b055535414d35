//! Euclidean plane topology.

use crate::topology::traits::topological_space::{
    TopologicalSpace, TopologyError, TopologyKind, check_coordinates,
};

/// The Euclidean plane.
///
/// # Examples
///
/// ```rust
/// use trisurf::topology::spaces::EuclideanSpace;
/// use trisurf::topology::traits::topological_space::TopologicalSpace;
///
/// let space = EuclideanSpace::new();
/// assert!(space.allows_boundary());
/// assert_eq!(space.expected_euler_characteristic(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanSpace;

impl EuclideanSpace {
    /// Creates a new Euclidean space instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TopologicalSpace for EuclideanSpace {
    const DIM: usize = 2;

    fn kind(&self) -> TopologyKind {
        TopologyKind::Euclidean
    }

    fn allows_boundary(&self) -> bool {
        true
    }

    fn canonicalize_point(&self, coords: &mut [f64], _tolerance: f64) -> Result<(), TopologyError> {
        check_coordinates(coords, Self::DIM)
    }

    fn expected_euler_characteristic(&self) -> isize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_leaves_finite_points_alone() {
        let mut coords = [3.5, -2.0];
        EuclideanSpace::new()
            .canonicalize_point(&mut coords, 0.0)
            .unwrap();
        assert_eq!(coords, [3.5, -2.0]);
    }

    #[test]
    fn canonicalize_rejects_nan() {
        let mut coords = [0.0, f64::NAN];
        let err = EuclideanSpace::new()
            .canonicalize_point(&mut coords, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            TopologyError::NonFiniteCoordinate { index: 1, .. }
        ));
    }
}
