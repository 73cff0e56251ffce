//! Optimizer states and convergence criteria.
//!
//! The optimizer moves through `Initialized -> Iterating -> Converged | Failed`.
//! Running out of iterations or damping is not an error: the caller gets the
//! last accepted parameters together with the reason. An error raised by the
//! objective ends in `Failed(ObjectiveError)` and is returned as `Err`.

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Why the optimizer stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceReason {
    /// The largest gradient component fell below `gtol`.
    Gradient,

    /// The parameter step fell below `xtol`.
    ParameterChange,

    /// The actual and predicted relative reduction of the sum of squares fell
    /// below `ftol`.
    CostChange,
}

/// Why the optimizer gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The trial step budget was exhausted.
    MaxIterations,

    /// The damping reached its maximum without finding a reducing step.
    NoFurtherReduction,

    /// The objective raised an error, such as a simulation fault. The
    /// optimizer returns that error rather than a result.
    ObjectiveError,
}

/// Terminal outcome of an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged(ConvergenceReason),
    Failed(FailureReason),
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged(_))
    }

    /// Returns a description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            FitStatus::Converged(ConvergenceReason::Gradient) => "Converged: small gradient",
            FitStatus::Converged(ConvergenceReason::ParameterChange) => {
                "Converged: small parameter change"
            }
            FitStatus::Converged(ConvergenceReason::CostChange) => {
                "Converged: small change in sum of squares"
            }
            FitStatus::Failed(FailureReason::MaxIterations) => {
                "Failed: maximum iterations reached"
            }
            FitStatus::Failed(FailureReason::NoFurtherReduction) => {
                "Failed: sum of squares cannot be reduced further"
            }
            FitStatus::Failed(FailureReason::ObjectiveError) => {
                "Failed: objective evaluation raised an error"
            }
        }
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// State of a running optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    Initialized,
    Iterating,
    Terminated(FitStatus),
}

impl OptimizerState {
    /// Move to `next`, rejecting transitions the state machine does not have.
    pub fn advance(self, next: OptimizerState) -> Option<OptimizerState> {
        use OptimizerState::*;
        match (self, next) {
            (Initialized, Iterating) | (Iterating, Iterating) | (Iterating, Terminated(_)) => {
                Some(next)
            }
            _ => None,
        }
    }
}

/// Tolerances that decide when the optimizer has converged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCriteria {
    pub xtol: f64,
    pub ftol: f64,
    pub gtol: f64,
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64) -> Self {
        Self { xtol, ftol, gtol }
    }

    /// Largest absolute gradient component is at most `gtol`.
    pub fn gradient_converged(&self, gradient: &Array1<f64>) -> bool {
        let g_max = gradient.iter().fold(0.0f64, |m, g| m.max(g.abs()));
        g_max <= self.gtol
    }

    /// `||step|| <= xtol * (||params|| + xtol)`
    pub fn step_converged(&self, params: &Array1<f64>, step: &Array1<f64>) -> bool {
        let step_norm = step.dot(step).sqrt();
        let params_norm = params.dot(params).sqrt();
        step_norm <= self.xtol * (params_norm + self.xtol)
    }

    /// Both the actual and the predicted relative reductions are at most
    /// `ftol`. `actual` is ignored for rejected steps.
    pub fn cost_converged(&self, cost: f64, actual: Option<f64>, predicted: f64) -> bool {
        if cost <= 0.0 {
            return true;
        }
        let predicted_small = predicted.abs() / cost <= self.ftol;
        match actual {
            Some(actual) => predicted_small && actual.abs() / cost <= self.ftol,
            None => predicted_small,
        }
    }
}
