//! # trisurf
//!
//! Delaunay triangulations of scattered points in the plane and on the unit
//! sphere, together with the numerical operators that turn irregularly sampled
//! data into a smooth surface over the mesh:
//!
//! - incremental Delaunay construction with exact predicates and edge flips,
//! - point location by a remembering visibility walk,
//! - per-vertex gradient estimation from local weighted fits,
//! - curvature-constrained smoothing of noisy data,
//! - cubic Hermite-type interpolation with optional tension.
//!
//! The planar and spherical variants share every algorithm; the geometry is
//! a type parameter ([`PlanarKernel`](geometry::kernel::PlanarKernel) or
//! [`SphericalKernel`](geometry::kernel::SphericalKernel)).
//!
//! # Basic Usage
//!
//! ```rust
//! use trisurf::prelude::*;
//!
//! let points = [
//!     Point::new([0.0, 0.0]),
//!     Point::new([1.0, 0.0]),
//!     Point::new([0.0, 1.0]),
//!     Point::new([1.0, 1.0]),
//!     Point::new([0.4, 0.6]),
//! ];
//! let dt = PlanarTriangulation::new(&points).unwrap();
//!
//! assert_eq!(dt.number_of_vertices(), 5);
//! assert_eq!(dt.number_of_triangles(), 4);
//! assert!(dt.is_valid().is_ok());
//! assert!(dt.validate_delaunay().is_ok());
//! ```
//!
//! On the sphere the triangulation of points that are not confined to a
//! hemisphere is closed: `T = 2N − 4` triangles and `E = 3N − 6` edges.
//!
//! ```rust
//! use trisurf::prelude::*;
//!
//! let s = 1.0 / 3.0_f64.sqrt();
//! let points = [
//!     Point::new([1.0, 0.0, 0.0]),
//!     Point::new([0.0, 1.0, 0.0]),
//!     Point::new([0.0, 0.0, 1.0]),
//!     Point::new([-s, -s, -s]),
//! ];
//! let dt = SphericalTriangulation::new(&points).unwrap();
//! assert_eq!(dt.number_of_triangles(), 4);
//! assert_eq!(dt.number_of_edges(), 6);
//! ```
//!
//! # From samples to a surface
//!
//! ```rust
//! use trisurf::prelude::*;
//!
//! let points: Vec<Point<2>> = (0..25)
//!     .map(|i| Point::new([f64::from(i % 5) * 0.25, f64::from(i / 5) * 0.25 + 0.01 * f64::from(i * i % 7)]))
//!     .collect();
//! let dt = PlanarTriangulation::new(&points).unwrap();
//! let values: Vec<f64> = points.iter().map(|p| p[0] * p[0] + p[1]).collect();
//!
//! let gradients = estimate_gradients(&dt, &values, &GradientOptions::default()).unwrap();
//! let interpolator = Interpolator::new(&dt, &values, &gradients).unwrap();
//!
//! let mut hint = None;
//! let f = interpolator.evaluate(&Point::new([0.5, 0.5]), &mut hint).unwrap();
//! assert!((f - 0.75).abs() < 1e-2);
//! ```
//!
//! # Triangulation Invariants
//!
//! After every successful insertion:
//!
//! - every triangle is counter-clockwise (seen from outside the sphere),
//! - neighbour relations are mutual and share exactly the common edge,
//! - every vertex references one of its incident triangles,
//! - no vertex lies strictly inside the circumcircle of any triangle.
//!
//! [`DelaunayTriangulation::is_valid`](core::delaunay_triangulation::DelaunayTriangulation::is_valid)
//! checks the structural invariants and the Euler characteristic;
//! [`DelaunayTriangulation::validate_delaunay`](core::delaunay_triangulation::DelaunayTriangulation::validate_delaunay)
//! runs the exhaustive empty-circle check.
//!
//! A failed insertion rolls the mesh back to its previous state and reports
//! the offending input index through
//! [`TriangulationConstructionError`](core::delaunay_triangulation::TriangulationConstructionError).
//!
//! # Concurrency
//!
//! Construction takes `&mut self`. A built triangulation is `Send + Sync` and
//! every query takes `&self`, so gradient estimation and batched evaluation
//! run in parallel with [`rayon`]. Smoothing is sequential per field.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (`debug` for construction, `trace` for
//! per-step detail, `warn` for suspicious parameters and non-convergence) and
//! never installs a subscriber.

#![forbid(unsafe_code)]

/// Triangulation data structure, construction and point location.
pub mod core {
    /// Algorithms operating on the triangulation data structure.
    pub mod algorithms {
        /// Edge flips and Delaunay restoration.
        pub mod flips;
        /// Incremental vertex insertion.
        pub mod incremental_insertion;
        /// Point location and conflict regions.
        pub mod locate;
    }
    pub mod builder;
    pub mod collections;
    pub mod delaunay_triangulation;
    pub mod triangle;
    pub mod triangulation_data_structure;
    /// Validation helpers.
    pub mod util {
        pub mod delaunay_validation;
    }
    pub mod vertex;

    pub use delaunay_triangulation::*;
    pub use triangle::*;
    pub use triangulation_data_structure::*;
    pub use vertex::*;
}

/// Points, predicates, kernels and surface metrics.
pub mod geometry {
    pub mod kernel;
    pub mod matrix;
    pub mod point;
    pub mod predicates;
    pub mod robust_predicates;
    pub mod surface;

    pub use kernel::*;
    pub use point::*;
    pub use predicates::*;
}

/// Topological spaces and Euler characteristic checks.
pub mod topology {
    /// Euler characteristic computations.
    pub mod characteristics {
        pub mod euler;
    }
    /// Concrete spaces.
    pub mod spaces {
        pub mod euclidean;
        pub mod spherical;

        pub use euclidean::EuclideanSpace;
        pub use spherical::SphericalSpace;
    }
    /// Space abstractions.
    pub mod traits {
        pub mod topological_space;
    }
}

/// Gradient estimation, smoothing and interpolation over a triangulation.
pub mod interpolation {
    pub mod curvature;
    pub mod evaluate;
    pub mod gradient;
    pub mod smoothing;
}

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use crate::core::algorithms::locate::LocateResult;
    pub use crate::core::builder::DelaunayTriangulationBuilder;
    pub use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
    pub use crate::core::delaunay_triangulation::{
        ConstructionOptions, DelaunayTriangulation, PlanarTriangulation, SphericalTriangulation,
        TriangulationConstructionError,
    };
    pub use crate::core::triangulation_data_structure::TriangleKey;
    pub use crate::core::vertex::VertexId;
    pub use crate::geometry::kernel::{Kernel, PlanarKernel, SphericalKernel};
    pub use crate::geometry::point::Point;
    pub use crate::geometry::predicates::{InSphere, Orientation};
    pub use crate::geometry::surface::Surface;
    pub use crate::interpolation::evaluate::{InterpolationOptions, Interpolator};
    pub use crate::interpolation::gradient::{
        GlobalGradientOptions, Gradient, GradientOptions, estimate_gradient, estimate_gradients,
        estimate_gradients_global, lon_lat_partials,
    };
    pub use crate::interpolation::smoothing::{
        SmoothingOptions, SmoothingOptionsBuilder, SmoothingStatus, smooth,
    };
    pub use crate::topology::spaces::{EuclideanSpace, SphericalSpace};
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}
