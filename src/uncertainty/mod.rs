//! # Parameter Uncertainty
//!
//! Standard errors and correlations of the fitted parameters, estimated from
//! the linearized model at the solution. Derivatives are taken with respect to
//! the external (physical) parameter values, so the reported errors are in the
//! parameters' own units.

pub mod covariance;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::objective::MultiExperimentObjective;
use crate::parameters::ParameterSet;
use crate::utils::jacobian_in_bounds;

pub use covariance::{calculate_correlation, calculate_covariance, standard_errors_from_covariance};

/// Uncertainty estimate for the varying parameters of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyResult {
    /// Names of the varying parameters, in matrix order
    pub names: Vec<String>,

    /// Covariance matrix
    pub covariance: Array2<f64>,

    /// Correlation matrix
    pub correlation: Array2<f64>,

    /// Standard errors
    pub standard_errors: Array1<f64>,

    /// Sum of squares divided by the degrees of freedom
    pub reduced_chi_square: f64,
}

impl UncertaintyResult {
    pub fn standard_error(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.standard_errors[i])
    }

    pub fn correlation_between(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.correlation[[i, j]])
    }

    /// Write the standard errors into the matching parameters of `params`.
    pub fn apply_to(&self, params: &mut ParameterSet) {
        for (name, &stderr) in self.names.iter().zip(self.standard_errors.iter()) {
            if let Some(param) = params.get_mut(name) {
                param.set_stderr(Some(stderr));
            }
        }
    }
}

/// Reduced chi-square `cost / (m - n)`; fails when there are no degrees of
/// freedom left.
pub fn reduced_chi_square(cost: f64, n_residuals: usize, n_varying: usize) -> Result<f64> {
    if n_residuals <= n_varying {
        return Err(FitError::Configuration(format!(
            "{n_residuals} residuals leave no degrees of freedom for {n_varying} varying parameters"
        )));
    }
    Ok(cost / (n_residuals - n_varying) as f64)
}

/// Estimate the uncertainty of the varying parameters of `solution`.
///
/// `residuals` are the objective's residuals at `solution`; one extra
/// evaluation per varying parameter is made for the Jacobian.
pub fn uncertainty_analysis(
    objective: &MultiExperimentObjective<'_>,
    solution: &ParameterSet,
    residuals: &Array1<f64>,
    diff_step: f64,
) -> Result<UncertaintyResult> {
    let n_varying = solution.varying_count();
    let cost = residuals.dot(residuals);
    let redchi = reduced_chi_square(cost, residuals.len(), n_varying)?;

    let values = solution.varying_values();
    let bounds = solution.varying_bounds();
    let jacobian = jacobian_in_bounds(
        |v| objective.evaluate(&solution.with_varying_values(v)?),
        &values,
        residuals,
        &bounds,
        diff_step,
    )?;

    let covariance = calculate_covariance(&jacobian, redchi)?;
    let correlation = calculate_correlation(&covariance);
    let standard_errors = standard_errors_from_covariance(&covariance);

    Ok(UncertaintyResult {
        names: solution
            .varying_names()
            .into_iter()
            .map(String::from)
            .collect(),
        covariance,
        correlation,
        standard_errors,
        reduced_chi_square: redchi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_reduced_chi_square() {
        assert_relative_eq!(reduced_chi_square(4.0, 10, 2).unwrap(), 0.5);
        assert!(reduced_chi_square(4.0, 2, 2).is_err());
    }

    #[test]
    fn test_apply_to_parameters() {
        let mut params = ParameterSet::new();
        params.add_param("mumax", 0.5).unwrap();
        params.add_fixed("Ks", 1.0).unwrap();

        let result = UncertaintyResult {
            names: vec!["mumax".to_string()],
            covariance: arr2(&[[0.0004]]),
            correlation: arr2(&[[1.0]]),
            standard_errors: arr1(&[0.02]),
            reduced_chi_square: 1.0,
        };
        result.apply_to(&mut params);

        assert_eq!(params.get("mumax").unwrap().stderr(), Some(0.02));
        assert_eq!(params.get("Ks").unwrap().stderr(), None);
        assert_eq!(result.standard_error("mumax"), Some(0.02));
        assert_eq!(result.correlation_between("mumax", "mumax"), Some(1.0));
        assert_eq!(result.standard_error("Ks"), None);
    }
}
