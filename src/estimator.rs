//! Parameter estimation over a set of experiments.
//!
//! The [`Estimator`] validates the fit setup, builds the
//! [`MultiExperimentObjective`] and minimizes it with Levenberg-Marquardt in
//! internal (unbounded) coordinates. Fixed parameters never change and every
//! candidate respects the bounds.
//!
//! Outcomes:
//! - configuration problems are returned as `Err` before any integration;
//! - a simulation fault during the search is returned as `Err` carrying the
//!   experiment, dataset and model time of the fault;
//! - running out of iterations or damping is an `Ok` [`FitResult`] whose
//!   status is [`FitStatus::Failed`], holding the last accepted parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FitError, Result};
use crate::experiment::Experiment;
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::objective::MultiExperimentObjective;
use crate::observable::ResidualWeights;
use crate::ode::OdeConfig;
use crate::parameters::ParameterSet;
use crate::problem::Problem;
use crate::residuals::ExperimentResidual;
use crate::simulator::Simulator;
use crate::uncertainty::{uncertainty_analysis, UncertaintyResult};

pub use crate::lm::{ConvergenceReason, FailureReason, FitStatus};

/// Settings for one estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Integrator tolerances
    pub ode: OdeConfig,

    /// Optimizer settings
    pub lm: LmConfig,

    /// Residual weighting factors per observable
    pub weights: ResidualWeights,

    /// Evaluate experiments concurrently (requires the `parallel` feature)
    pub parallel: bool,

    /// Estimate standard errors and correlations at the solution
    pub uncertainty: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            ode: OdeConfig::default(),
            lm: LmConfig::default(),
            weights: ResidualWeights::default(),
            parallel: cfg!(feature = "parallel"),
            uncertainty: true,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        self.ode
            .validate()
            .map_err(|e| FitError::Configuration(e.to_string()))?;
        self.lm.validate()?;
        self.weights.validate()
    }
}

/// Outcome of an estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Fitted parameters, with standard errors when they could be estimated
    pub params: ParameterSet,

    /// Starting parameters
    pub initial_params: ParameterSet,

    /// How the optimizer terminated
    pub status: FitStatus,

    /// Trial steps taken
    pub iterations: usize,

    /// Accepted steps
    pub accepted_steps: usize,

    /// Objective evaluations, including those for Jacobians
    pub func_evals: usize,

    /// Number of residuals
    pub residual_count: usize,

    /// Sum of squared weighted residuals at the start
    pub initial_cost: f64,

    /// Sum of squared weighted residuals at the solution
    pub cost: f64,

    /// Standard errors and correlations, if computable
    pub uncertainty: Option<UncertaintyResult>,
}

impl FitResult {
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Euclidean norm of the weighted residual vector.
    pub fn residual_norm(&self) -> f64 {
        self.cost.sqrt()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.get(name).map(|p| p.value())
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_varying = self.params.varying_count();
        writeln!(f, "[[Fit Statistics]]")?;
        writeln!(f, "    status             = {}", self.status)?;
        writeln!(
            f,
            "    iterations         = {} ({} accepted)",
            self.iterations, self.accepted_steps
        )?;
        writeln!(f, "    function evals     = {}", self.func_evals)?;
        writeln!(f, "    data points        = {}", self.residual_count)?;
        writeln!(f, "    variables          = {}", n_varying)?;
        writeln!(f, "    initial cost       = {:.6e}", self.initial_cost)?;
        writeln!(f, "    sum of squares     = {:.6e}", self.cost)?;
        if let Some(u) = &self.uncertainty {
            writeln!(f, "    reduced chi-square = {:.6e}", u.reduced_chi_square)?;
        }

        writeln!(f, "[[Variables]]")?;
        for param in self.params.iter() {
            write!(f, "    {:<10} {:.6}", format!("{}:", param.name()), param.value())?;
            if param.is_fixed() {
                writeln!(f, " (fixed)")?;
                continue;
            }
            match param.stderr() {
                Some(stderr) if param.value() != 0.0 => write!(
                    f,
                    " +/- {:.6} ({:.2}%)",
                    stderr,
                    100.0 * stderr / param.value().abs()
                )?,
                Some(stderr) => write!(f, " +/- {:.6}", stderr)?,
                None => write!(f, " +/- (not estimated)")?,
            }
            if let Some(init) = self.initial_params.get(param.name()) {
                write!(f, " (init = {})", init.value())?;
            }
            let bounds = param.bounds();
            writeln!(f, " bounds [{}, {}]", bounds.min, bounds.max)?;
        }

        if let Some(u) = &self.uncertainty {
            let mut pairs = Vec::new();
            for i in 0..u.names.len() {
                for j in (i + 1)..u.names.len() {
                    pairs.push((i, j, u.correlation[[i, j]]));
                }
            }
            pairs.retain(|(_, _, c)| c.abs() > 0.1);
            pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
            if !pairs.is_empty() {
                writeln!(f, "[[Correlations]] (unreported correlations are < 0.100)")?;
                for (i, j, c) in pairs {
                    writeln!(f, "    C({}, {}) = {:+.4}", u.names[i], u.names[j], c)?;
                }
            }
        }
        Ok(())
    }
}

/// Drives the least-squares search over a [`ParameterSet`].
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimatorConfig,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// The objective this estimator minimizes, fully validated.
    pub fn objective<'a>(
        &self,
        initial_params: &'a ParameterSet,
        experiments: &'a [Experiment],
    ) -> Result<MultiExperimentObjective<'a>> {
        self.config.validate()?;
        let residual = ExperimentResidual::new(
            Simulator::new(self.config.ode.clone()),
            self.config.weights,
        );
        Ok(MultiExperimentObjective::new(initial_params, experiments, residual)?
            .with_parallel(self.config.parallel))
    }

    /// Fit the varying parameters of `initial_params` to all `experiments`.
    pub fn estimate(
        &self,
        initial_params: &ParameterSet,
        experiments: &[Experiment],
    ) -> Result<FitResult> {
        let objective = self.objective(initial_params, experiments)?;
        let n_varying = objective.parameter_count();
        let n_residuals = objective.residual_count();

        info!(
            experiments = experiments.len(),
            varying = ?initial_params.varying_names(),
            residuals = n_residuals,
            "starting estimation"
        );
        if n_residuals < n_varying {
            warn!(
                residuals = n_residuals,
                varying = n_varying,
                "fewer residuals than varying parameters, the fit is underdetermined"
            );
        }

        let x0 = initial_params.to_internal()?;
        let optimizer = LevenbergMarquardt::with_config(self.config.lm.clone());
        let lm = optimizer.minimize(&objective, x0)?;

        let mut params = objective.parameters_from_internal(&lm.params)?;
        params.clear_stderr();

        let uncertainty = if self.config.uncertainty && n_varying > 0 {
            match uncertainty_analysis(&objective, &params, &lm.residuals, self.config.lm.diff_step)
            {
                Ok(u) => {
                    u.apply_to(&mut params);
                    Some(u)
                }
                Err(err) => {
                    warn!(error = %err, "parameter uncertainties could not be estimated");
                    None
                }
            }
        } else {
            None
        };

        if lm.status.is_converged() {
            info!(
                status = %lm.status,
                iterations = lm.iterations,
                cost = lm.cost,
                "estimation finished"
            );
        } else {
            warn!(
                status = %lm.status,
                iterations = lm.iterations,
                cost = lm.cost,
                "estimation did not converge"
            );
        }

        let mut initial = initial_params.clone();
        initial.clear_stderr();

        Ok(FitResult {
            params,
            initial_params: initial,
            status: lm.status,
            iterations: lm.iterations,
            accepted_steps: lm.accepted_steps,
            func_evals: lm.func_evals,
            residual_count: n_residuals,
            initial_cost: lm.initial_cost,
            cost: lm.cost,
            uncertainty,
        })
    }
}
