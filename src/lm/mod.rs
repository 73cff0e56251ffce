//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides a damped Gauss-Newton optimizer for nonlinear
//! least-squares problems expressed through the [`Problem`](crate::problem::Problem)
//! trait, with Marquardt scaling, gain-ratio controlled damping and an explicit
//! optimizer state machine.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod damping;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use convergence::{
    ConvergenceCriteria, ConvergenceReason, FailureReason, FitStatus, OptimizerState,
};
pub use damping::{Damping, NormalEquations, StepResult};
