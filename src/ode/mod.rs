//! Ordinary differential equation integration.
//!
//! The process model is integrated with an adaptive explicit Runge-Kutta
//! method ([`Dopri5`]) that reports the solution exactly at caller-requested
//! output times. Discontinuities in the right-hand side are not detected by
//! the integrator: callers split the interval at known switch times and
//! integrate each continuous piece separately.

pub mod dopri5;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dopri5::Dopri5;

/// A system of `N` first-order ODEs `dy/dt = f(t, y)`.
pub trait OdeSystem<const N: usize> {
    /// Evaluate the right-hand side at time `t` and state `y`.
    fn rhs(&self, t: f64, y: &[f64; N]) -> [f64; N];

    /// Whether `y` lies in the domain where the system is defined.
    ///
    /// An accepted step that leaves the domain aborts the integration.
    fn admissible(&self, _y: &[f64; N]) -> bool {
        true
    }
}

/// Adapter turning a closure into an [`OdeSystem`].
pub struct FnSystem<F>(pub F);

impl<F, const N: usize> OdeSystem<N> for FnSystem<F>
where
    F: Fn(f64, &[f64; N]) -> [f64; N],
{
    fn rhs(&self, t: f64, y: &[f64; N]) -> [f64; N] {
        (self.0)(t, y)
    }
}

/// Errors raised by the integrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("step size {step:e} underflow at t = {time}")]
    StepSizeUnderflow { time: f64, step: f64 },

    #[error("step budget of {max_steps} exhausted at t = {time}")]
    TooManySteps { time: f64, max_steps: usize },

    #[error("non-finite derivative or state at t = {time}")]
    NonFinite { time: f64 },

    #[error("state left the admissible domain at t = {time}: {state:?}")]
    InadmissibleState { time: f64, state: Vec<f64> },

    #[error("invalid integration request: {0}")]
    InvalidRequest(String),
}

impl IntegrationError {
    /// Model time at which the integrator stopped, if known.
    pub fn time(&self) -> Option<f64> {
        match self {
            IntegrationError::StepSizeUnderflow { time, .. }
            | IntegrationError::TooManySteps { time, .. }
            | IntegrationError::NonFinite { time }
            | IntegrationError::InadmissibleState { time, .. } => Some(*time),
            IntegrationError::InvalidRequest(_) => None,
        }
    }
}

/// Tolerances and limits for the adaptive integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeConfig {
    /// Relative tolerance. Default: 1e-8
    pub rtol: f64,

    /// Absolute tolerance. Default: 1e-10
    pub atol: f64,

    /// First trial step; chosen automatically when `None`.
    pub initial_step: Option<f64>,

    /// Largest allowed step; unlimited when `None`.
    pub max_step: Option<f64>,

    /// Maximum number of step attempts per integration. Default: 100_000
    pub max_steps: usize,
}

impl Default for OdeConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            initial_step: None,
            max_step: None,
            max_steps: 100_000,
        }
    }
}

impl OdeConfig {
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Check the tolerances are usable.
    pub fn validate(&self) -> Result<(), IntegrationError> {
        if !(self.rtol > 0.0 && self.rtol.is_finite()) || !(self.atol >= 0.0 && self.atol.is_finite())
        {
            return Err(IntegrationError::InvalidRequest(format!(
                "tolerances must be positive and finite (rtol = {}, atol = {})",
                self.rtol, self.atol
            )));
        }
        if matches!(self.initial_step, Some(h) if !(h > 0.0))
            || matches!(self.max_step, Some(h) if !(h > 0.0))
        {
            return Err(IntegrationError::InvalidRequest(
                "step limits must be positive".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(IntegrationError::InvalidRequest(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Work counters for one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub rhs_evals: usize,
}

/// Solution of one integration call.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<const N: usize> {
    /// State at each requested output time, in request order
    pub values: Vec<[f64; N]>,

    /// State at the end of the integration interval
    pub final_state: [f64; N],

    pub stats: SolverStats,
}
