//! Spherical space topology.
//!
//! Triangulations on S² are closed manifolds with Euler characteristic χ = 2,
//! so a triangulation of `N` points has `2N − 4` triangles and `3N − 6` edges.

use crate::topology::traits::topological_space::{
    TopologicalSpace, TopologyError, TopologyKind, check_coordinates,
};

/// The unit sphere embedded in R³.
///
/// # Examples
///
/// ```rust
/// use trisurf::topology::spaces::SphericalSpace;
/// use trisurf::topology::traits::topological_space::TopologicalSpace;
///
/// let space = SphericalSpace::new();
/// assert!(!space.allows_boundary());
///
/// let mut coords = [0.0, 0.0, 1.0 + 1e-9];
/// space.canonicalize_point(&mut coords, 1e-6).unwrap();
/// assert_eq!(coords, [0.0, 0.0, 1.0]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalSpace;

impl SphericalSpace {
    /// Creates a new spherical space instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TopologicalSpace for SphericalSpace {
    const DIM: usize = 3;

    fn kind(&self) -> TopologyKind {
        TopologyKind::Spherical
    }

    fn allows_boundary(&self) -> bool {
        false
    }

    fn canonicalize_point(&self, coords: &mut [f64], tolerance: f64) -> Result<(), TopologyError> {
        check_coordinates(coords, Self::DIM)?;
        let norm = coords.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm == 0.0 || (norm - 1.0).abs() > tolerance {
            return Err(TopologyError::OffSurface { norm, tolerance });
        }
        if norm != 1.0 {
            for c in coords.iter_mut() {
                *c /= norm;
            }
        }
        Ok(())
    }

    fn expected_euler_characteristic(&self) -> isize {
        2
    }
}
