//! Finite difference methods for numerical differentiation.
//!
//! Derivatives of the residual vector are approximated by forward differences.
//! Each column costs one extra residual evaluation, which here means one ODE
//! solve per dataset.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::parameters::Bounds;

/// Default relative step size for finite differences.
pub const DEFAULT_STEP: f64 = 1e-7;

/// Absolute step used when a parameter is (close to) zero.
const MIN_STEP: f64 = 1e-10;

/// Perturbation for parameter value `x` at relative step `step`.
pub fn step_size(x: f64, step: f64) -> f64 {
    (x.abs() * step).max(step * step).max(MIN_STEP)
}

/// Forward-difference Jacobian of `f` when the residuals at `params` are
/// already known.
///
/// J[i,j] = ∂residual[i]/∂param[j] ≈ (r_i(x + h e_j) - r_i(x)) / h
pub fn jacobian_at<F>(
    f: F,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    step: f64,
) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    let n_params = params.len();
    let n_residuals = residuals.len();
    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let h = step_size(params[j], step);
        let mut perturbed = params.clone();
        perturbed[j] += h;
        // Use the step actually representable in floating point
        let h = perturbed[j] - params[j];

        let residuals_perturbed = f(&perturbed)?;
        if residuals_perturbed.len() != n_residuals {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                residuals_perturbed.len()
            )));
        }

        let column = (&residuals_perturbed - residuals) / h;
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}

/// Like [`jacobian_at`], but every perturbed point stays inside `bounds`:
/// a forward step that would leave a box is taken backwards instead.
pub fn jacobian_in_bounds<F>(
    f: F,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    bounds: &[Bounds],
    step: f64,
) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    if bounds.len() != params.len() {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} bounds, got {}",
            params.len(),
            bounds.len()
        )));
    }

    let mut jac = Array2::zeros((residuals.len(), params.len()));
    for j in 0..params.len() {
        let mut h = step_size(params[j], step);
        if !bounds[j].is_within_bounds(params[j] + h) {
            h = -h;
        }
        let mut perturbed = params.clone();
        perturbed[j] = bounds[j].clamp(params[j] + h);
        let h = perturbed[j] - params[j];
        if h == 0.0 {
            return Err(FitError::LinearAlgebra(format!(
                "no room for a difference step in parameter {j}"
            )));
        }

        let residuals_perturbed = f(&perturbed)?;
        if residuals_perturbed.len() != residuals.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                residuals.len(),
                residuals_perturbed.len()
            )));
        }
        jac.column_mut(j)
            .assign(&((&residuals_perturbed - residuals) / h));
    }
    Ok(jac)
}
