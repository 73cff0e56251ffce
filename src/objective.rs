//! Residuals of all experiments as one least-squares problem.

use ndarray::Array1;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::experiment::{self, Experiment};
use crate::model::REQUIRED_PARAMETERS;
use crate::parameters::{ParameterError, ParameterSet};
use crate::problem::Problem;
use crate::residuals::ExperimentResidual;

/// Concatenated residuals over all experiments in registration order.
///
/// As a [`Problem`] the objective works in the optimizer's internal
/// coordinates: only varying parameters are exposed and every internal vector
/// maps to a parameter set that satisfies the bounds.
#[derive(Debug, Clone)]
pub struct MultiExperimentObjective<'a> {
    parameters: &'a ParameterSet,
    experiments: &'a [Experiment],
    residual: ExperimentResidual,
    parallel: bool,
    residual_count: usize,
}

impl<'a> MultiExperimentObjective<'a> {
    /// Check the parameter set and the experiments and build the objective.
    ///
    /// All configuration errors surface here, before any integration.
    pub fn new(
        parameters: &'a ParameterSet,
        experiments: &'a [Experiment],
        residual: ExperimentResidual,
    ) -> Result<Self> {
        parameters.validate()?;
        for name in REQUIRED_PARAMETERS {
            if parameters.get(name).is_none() {
                return Err(ParameterError::NotFound {
                    name: name.to_string(),
                }
                .into());
            }
        }
        residual.weights().validate()?;
        experiment::validate_experiments(experiments)?;

        Ok(Self {
            parameters,
            experiments,
            residual,
            parallel: false,
            residual_count: experiment::residual_count(experiments),
        })
    }

    /// Evaluate experiments concurrently. Has no effect without the
    /// `parallel` feature.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn parameters(&self) -> &ParameterSet {
        self.parameters
    }

    pub fn experiments(&self) -> &[Experiment] {
        self.experiments
    }

    pub fn residual(&self) -> &ExperimentResidual {
        &self.residual
    }

    /// The parameter set for a vector of internal optimizer coordinates.
    pub fn parameters_from_internal(&self, internal: &Array1<f64>) -> Result<ParameterSet> {
        Ok(self.parameters.with_internal(internal)?)
    }

    /// Residual vector for a full parameter set.
    pub fn evaluate(&self, params: &ParameterSet) -> Result<Array1<f64>> {
        let parts = self.evaluate_experiments(params)?;
        let mut out = Vec::with_capacity(self.residual_count);
        for part in parts {
            out.extend(part);
        }
        Ok(Array1::from_vec(out))
    }

    #[cfg(feature = "parallel")]
    fn evaluate_experiments(&self, params: &ParameterSet) -> Result<Vec<Vec<f64>>> {
        if self.parallel {
            // Collect every outcome first so the reported fault is the first in
            // registration order, as in the sequential path.
            let outcomes: Vec<Result<Vec<f64>>> = self
                .experiments
                .par_iter()
                .map(|e| self.residual.experiment_residuals(params, e))
                .collect();
            outcomes.into_iter().collect()
        } else {
            self.evaluate_sequential(params)
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_experiments(&self, params: &ParameterSet) -> Result<Vec<Vec<f64>>> {
        self.evaluate_sequential(params)
    }

    fn evaluate_sequential(&self, params: &ParameterSet) -> Result<Vec<Vec<f64>>> {
        self.experiments
            .iter()
            .map(|e| self.residual.experiment_residuals(params, e))
            .collect()
    }
}

impl Problem for MultiExperimentObjective<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let candidate = self.parameters_from_internal(params)?;
        self.evaluate(&candidate)
    }

    fn parameter_count(&self) -> usize {
        self.parameters.varying_count()
    }

    fn residual_count(&self) -> usize {
        self.residual_count
    }
}
