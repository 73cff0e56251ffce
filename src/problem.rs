//! Least-squares problem definition.
//!
//! This module defines the `Problem` trait, the seam between whatever produces
//! a residual vector and the Levenberg-Marquardt optimizer that minimizes its
//! sum of squares.

use ndarray::{Array1, Array2};

use crate::error::Result;

/// A nonlinear least-squares problem over an unconstrained parameter vector.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at `params`, where the residuals are
    /// already known.
    ///
    /// The default uses forward differences with the given relative step.
    fn jacobian(
        &self,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
        step: f64,
    ) -> Result<Array2<f64>> {
        crate::utils::finite_difference::jacobian_at(|p| self.eval(p), params, residuals, step)
    }

    /// Sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}
