//! Fluent builder for Delaunay triangulations.
//!
//! [`DelaunayTriangulationBuilder`] collects the input points and the
//! construction options and defers the choice of kernel to the
//! [`build`](DelaunayTriangulationBuilder::build) call:
//!
//! ```rust
//! use trisurf::core::builder::DelaunayTriangulationBuilder;
//! use trisurf::prelude::*;
//!
//! let points = [
//!     Point::new([0.0, 0.0]),
//!     Point::new([1.0, 0.0]),
//!     Point::new([0.0, 1.0]),
//! ];
//! let dt = DelaunayTriangulationBuilder::new(&points)
//!     .duplicate_tolerance(1e-9)
//!     .build::<PlanarKernel>()
//!     .unwrap();
//! assert_eq!(dt.number_of_triangles(), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::core::algorithms::incremental_insertion::InsertionError;
use crate::core::delaunay_triangulation::{
    ConstructionOptions, DelaunayTriangulation, TriangulationConstructionError,
};
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;

/// Summary of a batch construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructionReport {
    /// Input positions that were skipped as duplicates.
    pub skipped_duplicates: Vec<usize>,
    /// Total edge flips over all insertions.
    pub flips: usize,
    /// Total triangles visited by the location walks.
    pub walk_steps: usize,
}

/// Builder for [`DelaunayTriangulation`].
///
/// # Examples
///
/// ```rust
/// use trisurf::core::builder::DelaunayTriangulationBuilder;
/// use trisurf::prelude::*;
///
/// let points = [
///     Point::new([1.0, 0.0, 0.0]),
///     Point::new([0.0, 1.0, 0.0]),
///     Point::new([0.0, 0.0, 1.0]),
///     Point::new([0.0, 0.0, 1.0]),
///     Point::new([0.0, 0.0, -1.0]),
/// ];
/// let (dt, report) = DelaunayTriangulationBuilder::new(&points)
///     .skip_duplicates(true)
///     .build_with_report(SphericalKernel::new())
///     .unwrap();
/// assert_eq!(dt.number_of_vertices(), 4);
/// assert_eq!(report.skipped_duplicates, vec![3]);
/// ```
#[derive(Clone, Debug)]
pub struct DelaunayTriangulationBuilder<'p, const D: usize> {
    points: &'p [Point<D>],
    construction_options: ConstructionOptions,
    /// When `true`, duplicate points are skipped instead of aborting.
    ///
    /// Vertex ids then count the kept points only.
    skip_duplicates: bool,
}

impl<'p, const D: usize> DelaunayTriangulationBuilder<'p, D> {
    /// Creates a builder over `points` with default options.
    #[must_use]
    pub fn new(points: &'p [Point<D>]) -> Self {
        Self {
            points,
            construction_options: ConstructionOptions::default(),
            skip_duplicates: false,
        }
    }

    /// Replaces all construction options.
    #[must_use]
    pub const fn construction_options(mut self, construction_options: ConstructionOptions) -> Self {
        self.construction_options = construction_options;
        self
    }

    /// Sets the duplicate rejection distance.
    #[must_use]
    pub const fn duplicate_tolerance(mut self, tolerance: f64) -> Self {
        self.construction_options = self.construction_options.with_duplicate_tolerance(tolerance);
        self
    }

    /// Skips duplicate points instead of failing.
    #[must_use]
    pub const fn skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    /// Builds the triangulation with the kernel's default value.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationConstructionError::FailedToAddVertex`] for the
    /// first point that cannot be inserted.
    pub fn build<K>(self) -> Result<DelaunayTriangulation<K, D>, TriangulationConstructionError>
    where
        K: Kernel<D>,
    {
        self.build_with_kernel(K::default())
    }

    /// Builds the triangulation using a caller-supplied kernel.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_with_kernel<K>(
        self,
        kernel: K,
    ) -> Result<DelaunayTriangulation<K, D>, TriangulationConstructionError>
    where
        K: Kernel<D>,
    {
        self.build_with_report(kernel).map(|(dt, _)| dt)
    }

    /// Builds the triangulation and reports what the construction did.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_with_report<K>(
        self,
        kernel: K,
    ) -> Result<(DelaunayTriangulation<K, D>, ConstructionReport), TriangulationConstructionError>
    where
        K: Kernel<D>,
    {
        let mut dt = DelaunayTriangulation::with_empty_kernel(kernel, self.construction_options);
        let mut report = ConstructionReport::default();
        for (index, point) in self.points.iter().enumerate() {
            match dt.insert_with_statistics(*point) {
                Ok((_, statistics)) => {
                    report.flips += statistics.flips;
                    report.walk_steps += statistics.walk_steps;
                }
                Err(InsertionError::DuplicatePoint { existing, .. }) if self.skip_duplicates => {
                    tracing::debug!(index, %existing, "skipped duplicate point");
                    report.skipped_duplicates.push(index);
                }
                Err(source) => {
                    return Err(TriangulationConstructionError::FailedToAddVertex { index, source });
                }
            }
        }
        Ok((dt, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::kernel::PlanarKernel;

    fn square_with_duplicate() -> Vec<Point<2>> {
        vec![
            Point::new([0.0, 0.0]),
            Point::new([1.0, 0.0]),
            Point::new([1.0, 1.0]),
            Point::new([1.0, 1.0 + 1e-12]),
            Point::new([0.0, 1.0]),
        ]
    }

    #[test]
    fn duplicates_abort_by_default() {
        let points = square_with_duplicate();
        let err = DelaunayTriangulationBuilder::new(&points)
            .build::<PlanarKernel>()
            .unwrap_err();
        assert!(matches!(
            err,
            TriangulationConstructionError::FailedToAddVertex { index: 3, .. }
        ));
    }

    #[test]
    fn duplicates_can_be_skipped() {
        let points = square_with_duplicate();
        let (dt, report) = DelaunayTriangulationBuilder::new(&points)
            .skip_duplicates(true)
            .build_with_report(PlanarKernel::new())
            .unwrap();
        assert_eq!(report.skipped_duplicates, vec![3]);
        assert_eq!(dt.number_of_vertices(), 4);
        assert_eq!(dt.number_of_triangles(), 2);
    }

    #[test]
    fn tolerance_decides_what_counts_as_duplicate() {
        let points = square_with_duplicate();
        let dt = DelaunayTriangulationBuilder::new(&points)
            .duplicate_tolerance(0.0)
            .build::<PlanarKernel>()
            .unwrap();
        assert_eq!(dt.number_of_vertices(), 5);
        dt.validate_delaunay().unwrap();
    }
}
