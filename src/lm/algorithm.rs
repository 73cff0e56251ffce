//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Each outer iteration computes the Jacobian once and then tries damped
//! steps until one reduces the sum of squares, a convergence test passes or
//! the damping is exhausted. Every trial step counts against
//! `max_iterations`, so the number of residual evaluations is bounded by
//! `1 + max_iterations * (1 + n)` for `n` parameters.

use std::fmt;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{FitError, Result};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{
    ConvergenceCriteria, ConvergenceReason, FailureReason, FitStatus, OptimizerState,
};
use super::damping::{gain_ratio, Damping, NormalEquations};

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Parameter values at the last accepted point
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Sum of squared residuals at the starting point
    pub initial_cost: f64,

    /// Number of trial steps performed
    pub iterations: usize,

    /// Number of accepted steps
    pub accepted_steps: usize,

    /// Number of residual evaluations, including those for the Jacobian
    pub func_evals: usize,

    /// How the optimization ended
    pub status: FitStatus,

    /// Damping parameter at termination
    pub lambda: f64,
}

impl LmResult {
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of trial steps.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in the sum of squares.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for the gradient.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the factor by which to increase lambda.
    pub fn with_lambda_up_factor(mut self, factor: f64) -> Self {
        self.config.lambda_up_factor = factor;
        self
    }

    /// Set the factor by which to decrease lambda.
    pub fn with_lambda_down_factor(mut self, factor: f64) -> Self {
        self.config.lambda_down_factor = factor;
        self
    }

    /// Set the minimum value for lambda.
    pub fn with_min_lambda(mut self, min_lambda: f64) -> Self {
        self.config.min_lambda = min_lambda;
        self
    }

    /// Set the maximum value for lambda.
    pub fn with_max_lambda(mut self, max_lambda: f64) -> Self {
        self.config.max_lambda = max_lambda;
        self
    }

    /// Set the relative finite-difference step.
    pub fn with_diff_step(mut self, diff_step: f64) -> Self {
        self.config.diff_step = diff_step;
        self
    }

    /// Minimize the sum of squared residuals of `problem` starting from
    /// `initial_params`.
    ///
    /// Errors from the problem (for example a failed simulation) abort the
    /// optimization and are returned as `Err`. Running out of iterations or
    /// damping is reported through [`LmResult::status`] instead.
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let mut state = OptimizerState::Initialized;
        self.minimize_tracked(problem, initial_params, &mut state)
    }

    /// [`minimize`](Self::minimize), leaving the final optimizer state in
    /// `state`. An error raised while iterating moves the state to
    /// `Failed(ObjectiveError)` before it is returned.
    fn minimize_tracked<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        state: &mut OptimizerState,
    ) -> Result<LmResult> {
        self.run(problem, initial_params, state).map_err(|err| {
            let failed =
                OptimizerState::Terminated(FitStatus::Failed(FailureReason::ObjectiveError));
            if let Some(next) = state.advance(failed) {
                debug!(from = ?*state, to = ?next, error = %err, "optimizer state");
                *state = next;
            }
            err
        })
    }

    fn run<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        state: &mut OptimizerState,
    ) -> Result<LmResult> {
        self.config.validate()?;

        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let criteria =
            ConvergenceCriteria::new(self.config.xtol, self.config.ftol, self.config.gtol);
        let mut damping = Damping::new(&self.config);

        transition(state, OptimizerState::Iterating, f64::NAN);
        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        check_residuals(problem, &residuals)?;
        let mut cost = sum_of_squares(&residuals);
        let initial_cost = cost;

        let mut iterations = 0;
        let mut accepted_steps = 0;

        let status = 'outer: loop {
            let jacobian = self.jacobian(problem, &params, &residuals)?;
            func_evals += n_params;
            let equations = NormalEquations::new(&jacobian, &residuals);

            if criteria.gradient_converged(equations.gradient()) {
                break FitStatus::Converged(ConvergenceReason::Gradient);
            }

            loop {
                if iterations >= self.config.max_iterations {
                    break 'outer FitStatus::Failed(FailureReason::MaxIterations);
                }

                let Some(trial) = equations.step(damping.lambda()) else {
                    debug!(lambda = damping.lambda(), "singular damped system");
                    if !damping.increase() {
                        break 'outer FitStatus::Failed(FailureReason::NoFurtherReduction);
                    }
                    continue;
                };

                iterations += 1;
                let new_params = &params + &trial.step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                check_residuals(problem, &new_residuals)?;
                let new_cost = sum_of_squares(&new_residuals);

                let rho = gain_ratio(cost, new_cost, trial.predicted_reduction);
                let lambda = damping.lambda();
                let accepted = damping.update(rho);
                transition(state, OptimizerState::Iterating, cost);
                debug!(
                    iteration = iterations,
                    lambda,
                    cost,
                    new_cost,
                    gain_ratio = rho,
                    accepted,
                    "trial step"
                );

                if accepted {
                    let actual = cost - new_cost;
                    let small_step = criteria.step_converged(&params, &trial.step);
                    let small_change =
                        criteria.cost_converged(cost, Some(actual), trial.predicted_reduction);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    accepted_steps += 1;

                    if cost == 0.0 || small_change {
                        break 'outer FitStatus::Converged(ConvergenceReason::CostChange);
                    }
                    if small_step {
                        break 'outer FitStatus::Converged(ConvergenceReason::ParameterChange);
                    }
                    continue 'outer;
                }

                // Rejected: the current point already is as good as the
                // linear model can tell
                if criteria.cost_converged(cost, None, trial.predicted_reduction) {
                    break 'outer FitStatus::Converged(ConvergenceReason::CostChange);
                }
                if criteria.step_converged(&params, &trial.step) {
                    break 'outer FitStatus::Converged(ConvergenceReason::ParameterChange);
                }
                if damping.is_exhausted() {
                    break 'outer FitStatus::Failed(FailureReason::NoFurtherReduction);
                }
            }
        };

        transition(state, OptimizerState::Terminated(status), cost);

        Ok(LmResult {
            params,
            residuals,
            cost,
            initial_cost,
            iterations,
            accepted_steps,
            func_evals,
            status,
            lambda: damping.lambda(),
        })
    }

    fn jacobian<P: Problem + ?Sized>(
        &self,
        problem: &P,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
    ) -> Result<Array2<f64>> {
        let jacobian = problem.jacobian(params, residuals, self.config.diff_step)?;
        if jacobian.dim() != (residuals.len(), params.len()) {
            return Err(FitError::DimensionMismatch(format!(
                "Jacobian has shape {:?}, expected ({}, {})",
                jacobian.dim(),
                residuals.len(),
                params.len()
            )));
        }
        if jacobian.iter().any(|v| !v.is_finite()) {
            return Err(FitError::LinearAlgebra(
                "Jacobian contains non-finite entries".to_string(),
            ));
        }
        Ok(jacobian)
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}

fn check_residuals<P: Problem + ?Sized>(problem: &P, residuals: &Array1<f64>) -> Result<()> {
    if residuals.len() != problem.residual_count() {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            problem.residual_count(),
            residuals.len()
        )));
    }
    if residuals.iter().any(|r| !r.is_finite()) {
        return Err(FitError::LinearAlgebra(
            "residual vector contains non-finite entries".to_string(),
        ));
    }
    Ok(())
}

fn transition(state: &mut OptimizerState, next: OptimizerState, cost: f64) {
    let from = *state;
    if let Some(advanced) = from.advance(next) {
        if from != advanced {
            debug!(from = ?from, to = ?advanced, cost, "optimizer state");
        }
        *state = advanced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // Simple linear model for testing: y = a * x + b
    struct LinearModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl LinearModel {
        fn new(x_data: Array1<f64>, y_data: Array1<f64>) -> Self {
            assert_eq!(x_data.len(), y_data.len());
            Self { x_data, y_data }
        }
    }

    impl Problem for LinearModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(&self.x_data * params[0] + params[1] - &self.y_data)
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    // y = a * exp(-k x), nonlinear in k
    struct Decay {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for Decay {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let model = self.x_data.mapv(|x| params[0] * (-params[1] * x).exp());
            Ok(model - &self.y_data)
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    struct Failing;

    impl Problem for Failing {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            if params[0] > 1.5 {
                Err(FitError::Configuration("out of domain".into()))
            } else {
                Ok(array![params[0] - 3.0])
            }
        }

        fn parameter_count(&self) -> usize {
            1
        }

        fn residual_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_linear_fit() {
        let x = Array1::linspace(0.0, 10.0, 11);
        let y = x.mapv(|x| 2.0 * x + 1.0);
        let problem = LinearModel::new(x, y);

        let result = LevenbergMarquardt::new()
            .minimize(&problem, array![0.0, 0.0])
            .unwrap();

        assert!(result.success(), "{}", result);
        assert_relative_eq!(result.params[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-6);
        assert!(result.cost < 1e-10);
    }

    #[test]
    fn test_exponential_decay_fit() {
        let x = Array1::linspace(0.0, 4.0, 25);
        let y = x.mapv(|x: f64| 3.0 * (-1.3 * x).exp());
        let problem = Decay {
            x_data: x,
            y_data: y,
        };

        let result = LevenbergMarquardt::new()
            .minimize(&problem, array![1.0, 0.5])
            .unwrap();

        assert!(result.success(), "{}", result);
        assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(result.params[1], 1.3, epsilon = 1e-5);
        assert!(result.accepted_steps <= result.iterations);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let x = Array1::linspace(0.0, 4.0, 25);
        let y = x.mapv(|x: f64| 3.0 * (-1.3 * x).exp());
        let problem = Decay {
            x_data: x,
            y_data: y,
        };

        let result = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .minimize(&problem, array![1.0, 0.5])
            .unwrap();

        assert_eq!(result.status, FitStatus::Failed(FailureReason::MaxIterations));
        assert_eq!(result.iterations, 1);
        // The starting cost bounds the reported one
        let start = problem.eval_cost(&array![1.0, 0.5]).unwrap();
        assert!(result.cost <= start);
    }

    #[test]
    fn test_problem_error_aborts() {
        let mut state = OptimizerState::Initialized;
        let result = LevenbergMarquardt::new().minimize_tracked(&Failing, array![0.0], &mut state);
        assert!(matches!(result, Err(FitError::Configuration(_))));
        assert_eq!(
            state,
            OptimizerState::Terminated(FitStatus::Failed(FailureReason::ObjectiveError))
        );
    }

    #[test]
    fn test_converged_run_ends_terminated() {
        let x = Array1::linspace(0.0, 10.0, 11);
        let y = x.mapv(|x| 2.0 * x + 1.0);
        let problem = LinearModel::new(x, y);

        let mut state = OptimizerState::Initialized;
        let result = LevenbergMarquardt::new()
            .minimize_tracked(&problem, array![0.0, 0.0], &mut state)
            .unwrap();
        assert_eq!(state, OptimizerState::Terminated(result.status));
    }

    #[test]
    fn test_dimension_mismatch() {
        let problem = LinearModel::new(array![0.0, 1.0], array![0.0, 1.0]);
        let mut state = OptimizerState::Initialized;
        let result = LevenbergMarquardt::new().minimize_tracked(&problem, array![0.0], &mut state);
        assert!(matches!(result, Err(FitError::DimensionMismatch(_))));
        // Rejected before the first evaluation
        assert_eq!(state, OptimizerState::Initialized);
    }

    #[test]
    fn test_already_at_minimum() {
        let x = Array1::linspace(0.0, 1.0, 5);
        let y = x.mapv(|x| x + 1.0);
        let problem = LinearModel::new(x, y);

        let result = LevenbergMarquardt::new()
            .minimize(&problem, array![1.0, 1.0])
            .unwrap();
        assert_eq!(
            result.status,
            FitStatus::Converged(ConvergenceReason::Gradient)
        );
        assert_eq!(result.iterations, 0);
    }
}
