//! # Covariance Matrix Calculations
//!
//! Covariance, standard errors and correlations of fitted parameters from the
//! Jacobian of the residual vector at the solution.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};

const SINGULAR_PIVOT: f64 = 1e-13;

/// Calculate the covariance matrix from the Jacobian.
///
/// For nonlinear least-squares problems the covariance is estimated as
///   covar = redchi * inv(J^T * J)
/// where redchi is the sum of squares divided by the degrees of freedom.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let n = jtj.nrows();
    let a = DMatrix::from_fn(n, n, |i, j| jtj[[i, j]]);

    let singular =
        || FitError::LinearAlgebra("J^T J is singular or not positive definite".to_string());

    let max_diag = (0..n).map(|i| a[(i, i)]).fold(0.0f64, f64::max);
    let chol = a.cholesky().ok_or_else(singular)?;
    // Pivots that vanish relative to the largest diagonal mean rank deficiency
    let l = chol.l();
    if (0..n).any(|i| l[(i, i)] * l[(i, i)] <= SINGULAR_PIVOT * max_diag) {
        return Err(singular());
    }
    let inverse = chol.inverse();

    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(FitError::LinearAlgebra(
            "inverse of J^T J is not finite".to_string(),
        ));
    }

    Ok(Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)] * redchi))
}

/// Calculate the correlation matrix from the covariance matrix.
///
/// Diagonal elements are 1.0, off-diagonal elements are correlation
/// coefficients between -1 and 1.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else {
            let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
            if denom > 0.0 {
                covar[[i, j]] / denom
            } else {
                0.0
            }
        }
    })
}

/// Square roots of the diagonal of the covariance matrix.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}
