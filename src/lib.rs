//! # fedbatch-fit
//!
//! `fedbatch-fit` estimates kinetic parameters of a fed-batch bioprocess model
//! from measurements taken in several experiments.
//!
//! The library provides:
//! - A Monod growth model with substrate feeding and a base-consumption
//!   observable, integrated with an adaptive Dormand-Prince method
//! - Weighted residuals over any number of experiments and measurement tables
//! - A Levenberg-Marquardt optimizer with bounded and fixed parameters
//! - Standard errors and correlations of the fitted parameters
//!
//! ## Basic Usage
//!
//! ```
//! use fedbatch_fit::experiment::Experiment;
//! use fedbatch_fit::model::{ControlInputs, StateVector};
//! use fedbatch_fit::observable::Observable;
//! use fedbatch_fit::parameters::ParameterSet;
//! use fedbatch_fit::simulator::{linspace, Simulator};
//! use fedbatch_fit::synthetic::synthesize_dataset;
//! use fedbatch_fit::Estimator;
//! use rand::thread_rng;
//!
//! let mut truth = ParameterSet::new();
//! truth.add_bounded("mumax", 0.5, 1e-4, 1.0).unwrap();
//! truth.add_bounded("Yxs", 0.2, 1e-4, 1.0).unwrap();
//! truth.add_fixed("Ks", 1.0).unwrap();
//! truth.add_bounded("base_coef", 1.0, 1e-4, f64::INFINITY).unwrap();
//!
//! let state = StateVector::new(3.0, 0.2, 0.5);
//! let controls = ControlInputs::new(5.0, 0.02, 200.0);
//! let offline = synthesize_dataset(
//!     &Simulator::default(),
//!     &truth,
//!     &state,
//!     &controls,
//!     "offline",
//!     linspace(0.0, 10.0, 21),
//!     &[Observable::BiomassConc, Observable::SubstrateConc],
//!     0.0,
//!     &mut thread_rng(),
//! )
//! .unwrap();
//! let experiments = vec![Experiment::new("E1", state, controls, vec![offline]).unwrap()];
//!
//! let mut initial = truth.clone();
//! initial.get_mut("mumax").unwrap().set_value(0.4).unwrap();
//!
//! let result = Estimator::default().estimate(&initial, &experiments).unwrap();
//! assert!(result.converged());
//! assert!((result.value("mumax").unwrap() - 0.5).abs() < 1e-4);
//! ```

pub mod error;
pub mod estimator;
pub mod experiment;
pub mod lm;
pub mod model;
pub mod objective;
pub mod observable;
pub mod ode;
pub mod parameters;
pub mod problem;
pub mod residuals;
pub mod setup;
pub mod simulator;
pub mod synthetic;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use error::{FitError, Result, SimulationFault, SimulationFaultKind};
pub use estimator::{Estimator, EstimatorConfig, FitResult};
pub use experiment::{Experiment, MeasuredVariable, MeasurementDataset};
pub use lm::{ConvergenceReason, FailureReason, FitStatus, LevenbergMarquardt, LmConfig};
pub use model::{ControlInputs, StateVector};
pub use objective::MultiExperimentObjective;
pub use observable::{Observable, ResidualWeights};
pub use ode::OdeConfig;
pub use parameters::{Parameter, ParameterSet};
pub use problem::Problem;
pub use residuals::ExperimentResidual;
pub use setup::FitSetup;
pub use simulator::{SimulationTrace, Simulator};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
