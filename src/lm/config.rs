//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the convergence tolerances, the damping schedule and
//! the finite-difference step used by the optimizer.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::utils::finite_difference::DEFAULT_STEP;

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of trial steps, accepted or rejected. Default: 200
    pub max_iterations: usize,

    /// Tolerance for relative change in the sum of squares. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for relative change in parameter values. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the largest gradient component. Default: 1e-10
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Relative step for the forward-difference Jacobian. Default: 1e-7
    pub diff_step: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e10,
            diff_step: DEFAULT_STEP,
        }
    }
}

impl LmConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(FitError::Configuration(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(FitError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.min_lambda > 0.0
            && self.min_lambda <= self.initial_lambda
            && self.initial_lambda <= self.max_lambda
            && self.max_lambda.is_finite())
        {
            return Err(FitError::Configuration(format!(
                "lambda settings must satisfy 0 < min_lambda <= initial_lambda <= max_lambda < inf \
                 (got {}, {}, {})",
                self.min_lambda, self.initial_lambda, self.max_lambda
            )));
        }
        if !(self.lambda_up_factor > 1.0) || !(self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0) {
            return Err(FitError::Configuration(format!(
                "lambda factors must satisfy up > 1 and 0 < down < 1 (got {}, {})",
                self.lambda_up_factor, self.lambda_down_factor
            )));
        }
        if !(self.diff_step > 0.0 && self.diff_step < 1.0) {
            return Err(FitError::Configuration(format!(
                "diff_step must lie in (0, 1), got {}",
                self.diff_step
            )));
        }
        Ok(())
    }
}
