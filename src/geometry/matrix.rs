//! Matrix operations.
//!
//! Small dense linear algebra helpers built on `nalgebra`: a weighted
//! least-squares solver with an explicit rank check, used by the gradient
//! fits, and guarded solves of the 2×2 and 3×3 systems that appear in the
//! global gradient and smoothing iterations.

use nalgebra as na;
use thiserror::Error;

/// Error type for matrix operations.
///
/// # Examples
///
/// ```rust
/// use trisurf::geometry::matrix::MatrixError;
///
/// let err = MatrixError::SingularMatrix;
/// assert_eq!(err.to_string(), "Matrix is singular!");
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    /// Matrix is singular.
    #[error("Matrix is singular!")]
    SingularMatrix,

    /// A least-squares system does not determine all unknowns.
    #[error("Rank deficient system: rank {rank} for {unknowns} unknowns")]
    RankDeficient {
        /// Numerical rank of the weighted design matrix.
        rank: usize,
        /// Number of columns.
        unknowns: usize,
    },

    /// Row counts of the design matrix, right-hand side and weights differ.
    #[error("Dimension mismatch: {rows} rows, {rhs} right-hand sides, {weights} weights")]
    DimensionMismatch {
        /// Rows of the design matrix.
        rows: usize,
        /// Entries of the right-hand side.
        rhs: usize,
        /// Entries of the weight vector.
        weights: usize,
    },
}

/// Default tolerance for matrix singularity checks, relative to the largest
/// singular value or diagonal entry.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Solves `min ‖W (A x − b)‖₂` for a diagonal weight matrix `W`.
///
/// The system is solved through a singular value decomposition. A system
/// whose numerical rank (singular values above
/// [`SINGULARITY_TOLERANCE`] times the largest one) is below the number of
/// columns is rejected rather than solved in the minimum-norm sense.
///
/// # Errors
///
/// Returns [`MatrixError::DimensionMismatch`] for inconsistent inputs and
/// [`MatrixError::RankDeficient`] when the columns are numerically dependent.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{DMatrix, DVector};
/// use trisurf::geometry::matrix::weighted_least_squares;
///
/// // Fit y = 2x + 1 through three points.
/// let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
/// let b = DVector::from_vec(vec![1.0, 3.0, 5.0]);
/// let x = weighted_least_squares(&a, &b, &[1.0, 2.0, 1.0]).unwrap();
/// assert!((x[0] - 1.0).abs() < 1e-12);
/// assert!((x[1] - 2.0).abs() < 1e-12);
/// ```
pub fn weighted_least_squares(
    design: &na::DMatrix<f64>,
    rhs: &na::DVector<f64>,
    weights: &[f64],
) -> Result<na::DVector<f64>, MatrixError> {
    let rows = design.nrows();
    if rhs.len() != rows || weights.len() != rows {
        return Err(MatrixError::DimensionMismatch {
            rows,
            rhs: rhs.len(),
            weights: weights.len(),
        });
    }
    let unknowns = design.ncols();
    if rows < unknowns {
        return Err(MatrixError::RankDeficient {
            rank: rows,
            unknowns,
        });
    }

    let mut weighted = design.clone();
    let mut target = rhs.clone();
    for (i, &w) in weights.iter().enumerate() {
        weighted.row_mut(i).scale_mut(w);
        target[i] *= w;
    }

    let svd = weighted.svd(true, true);
    let largest = svd.singular_values.max();
    if !largest.is_finite() || largest <= 0.0 {
        return Err(MatrixError::RankDeficient { rank: 0, unknowns });
    }
    let eps = largest * SINGULARITY_TOLERANCE;
    let rank = svd.rank(eps);
    if rank < unknowns {
        return Err(MatrixError::RankDeficient { rank, unknowns });
    }
    svd.solve(&target, eps)
        .map_err(|_| MatrixError::SingularMatrix)
}

/// Solves a 3×3 system `H x = r` by LU decomposition.
///
/// # Errors
///
/// Returns [`MatrixError::SingularMatrix`] when `H` is singular or the
/// solution is not finite.
pub fn solve3(h: &na::Matrix3<f64>, r: &na::Vector3<f64>) -> Result<na::Vector3<f64>, MatrixError> {
    h.lu()
        .solve(r)
        .filter(|x| x.iter().all(|v| v.is_finite()))
        .ok_or(MatrixError::SingularMatrix)
}

/// Solves a 2×2 system `H x = r` by Cramer's rule with a relative
/// singularity guard.
///
/// # Errors
///
/// Returns [`MatrixError::SingularMatrix`] when the determinant is negligible
/// relative to the entries of `H`.
///
/// ```rust
/// use nalgebra::{Matrix2, Vector2};
/// use trisurf::geometry::matrix::solve2;
///
/// let h = Matrix2::new(2.0, 1.0, 1.0, 3.0);
/// let x = solve2(&h, &Vector2::new(3.0, 4.0)).unwrap();
/// assert!((x - Vector2::new(1.0, 1.0)).norm() < 1e-15);
/// ```
pub fn solve2(h: &na::Matrix2<f64>, r: &na::Vector2<f64>) -> Result<na::Vector2<f64>, MatrixError> {
    let det = h[(0, 0)] * h[(1, 1)] - h[(0, 1)] * h[(1, 0)];
    let scale = h.abs().max();
    if !det.is_finite() || det.abs() <= SINGULARITY_TOLERANCE * scale * scale {
        return Err(MatrixError::SingularMatrix);
    }
    Ok(na::Vector2::new(
        (h[(1, 1)] * r[0] - h[(0, 1)] * r[1]) / det,
        (h[(0, 0)] * r[1] - h[(1, 0)] * r[0]) / det,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn least_squares_rejects_dependent_columns() {
        let a = na::DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let b = na::DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            weighted_least_squares(&a, &b, &[1.0; 3]),
            Err(MatrixError::RankDeficient {
                rank: 1,
                unknowns: 2
            })
        );
    }

    #[test]
    fn least_squares_rejects_underdetermined() {
        let a = na::DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = na::DVector::from_vec(vec![1.0]);
        assert!(matches!(
            weighted_least_squares(&a, &b, &[1.0]),
            Err(MatrixError::RankDeficient { .. })
        ));
        assert!(matches!(
            weighted_least_squares(&a, &b, &[1.0, 1.0]),
            Err(MatrixError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn weights_change_the_compromise() {
        // Fitting a constant to [0, 1]: the weighted mean.
        let a = na::DMatrix::from_element(2, 1, 1.0);
        let b = na::DVector::from_vec(vec![0.0, 1.0]);
        let x = weighted_least_squares(&a, &b, &[1.0, 3.0]).unwrap();
        // Row weights w scale residuals, so the weights on squares are w².
        assert_relative_eq!(x[0], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn small_solves() {
        let h = na::Matrix3::new(4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0);
        let expected = na::Vector3::new(1.0, -1.0, 2.0);
        let x = solve3(&h, &(h * expected)).unwrap();
        assert_relative_eq!(x, expected, epsilon = 1e-12);

        assert_eq!(
            solve3(&na::Matrix3::zeros(), &expected),
            Err(MatrixError::SingularMatrix)
        );
        assert_eq!(
            solve2(&na::Matrix2::new(1.0, 2.0, 2.0, 4.0), &na::Vector2::new(1.0, 1.0)),
            Err(MatrixError::SingularMatrix)
        );
    }
}
