use thiserror::Error;

use crate::ode::IntegrationError;
use crate::parameters::ParameterError;

/// What went wrong numerically while simulating one experiment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationFaultKind {
    /// The ODE integrator gave up.
    #[error("integration failed: {0}")]
    Integration(#[from] IntegrationError),

    /// Volume reached zero or became negative.
    #[error("non-positive volume {volume} L")]
    NonPositiveVolume { volume: f64 },

    /// A state or derived value became NaN or infinite.
    #[error("non-finite {what}")]
    NonFinite { what: &'static str },
}

/// A simulation fault, located at the model time where it was detected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("at t = {time} h: {kind}")]
pub struct SimulationFault {
    /// Model time (h) at which the fault was detected
    pub time: f64,

    /// The kind of fault
    pub kind: SimulationFaultKind,
}

impl SimulationFault {
    pub fn new(time: f64, kind: SimulationFaultKind) -> Self {
        Self { time, kind }
    }
}

/// Error types for the fedbatch-fit library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Malformed parameter or parameter set.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Measured variable name that has no weighting factor.
    #[error("Unknown observable '{0}'")]
    UnknownObservable(String),

    /// Malformed measurement dataset.
    #[error("Invalid dataset '{dataset}': {message}")]
    InvalidDataset { dataset: String, message: String },

    /// Time grid that is empty, unsorted or non-finite.
    #[error("Invalid time grid: {0}")]
    InvalidTimeGrid(String),

    /// Two experiments registered under the same name.
    #[error("Duplicate experiment name '{0}'")]
    DuplicateExperiment(String),

    /// Any other inconsistency in the fit setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Numerical failure while simulating.
    #[error("{}", describe_simulation(.experiment, .dataset, .fault))]
    Simulation {
        experiment: Option<String>,
        dataset: Option<String>,
        fault: SimulationFault,
    },

    /// Error indicating a mismatch in matrix or vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_simulation(
    experiment: &Option<String>,
    dataset: &Option<String>,
    fault: &SimulationFault,
) -> String {
    match (experiment, dataset) {
        (Some(e), Some(d)) => format!("Simulation fault in experiment '{e}', dataset '{d}' {fault}"),
        (Some(e), None) => format!("Simulation fault in experiment '{e}' {fault}"),
        _ => format!("Simulation fault {fault}"),
    }
}

impl From<SimulationFault> for FitError {
    fn from(fault: SimulationFault) -> Self {
        FitError::Simulation {
            experiment: None,
            dataset: None,
            fault,
        }
    }
}

impl FitError {
    /// True for errors that are detected before any integration runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FitError::Parameter(_)
                | FitError::UnknownObservable(_)
                | FitError::InvalidDataset { .. }
                | FitError::InvalidTimeGrid(_)
                | FitError::DuplicateExperiment(_)
                | FitError::Configuration(_)
        )
    }

    /// The simulation fault carried by this error, if any.
    pub fn simulation_fault(&self) -> Option<&SimulationFault> {
        match self {
            FitError::Simulation { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Attach the experiment and dataset a simulation fault occurred in.
    ///
    /// Location already recorded closer to the fault is kept.
    pub(crate) fn locate(self, experiment_name: &str, dataset_name: &str) -> Self {
        self.locate_parts(Some(experiment_name), Some(dataset_name))
    }

    /// Attach the experiment a simulation fault occurred in.
    pub fn locate_experiment(self, experiment_name: &str) -> Self {
        self.locate_parts(Some(experiment_name), None)
    }

    fn locate_parts(self, experiment_name: Option<&str>, dataset_name: Option<&str>) -> Self {
        match self {
            FitError::Simulation {
                experiment,
                dataset,
                fault,
            } => FitError::Simulation {
                experiment: experiment.or_else(|| experiment_name.map(String::from)),
                dataset: dataset.or_else(|| dataset_name.map(String::from)),
                fault,
            },
            other => other,
        }
    }
}

/// Result type alias for fedbatch-fit operations.
pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::UnknownObservable("pH".to_string());
        assert!(format!("{}", err).contains("pH"));

        let err = FitError::DuplicateExperiment("Experiment 1".to_string());
        assert!(format!("{}", err).contains("Experiment 1"));
    }

    #[test]
    fn test_simulation_fault_location() {
        let fault = SimulationFault::new(
            3.5,
            SimulationFaultKind::NonPositiveVolume { volume: -0.1 },
        );
        let err: FitError = fault.into();
        assert!(!err.is_configuration());

        let err = err.locate("Experiment 2", "offline");
        let message = format!("{}", err);
        assert!(message.contains("Experiment 2"));
        assert!(message.contains("offline"));
        assert!(message.contains("3.5"));

        // An existing location wins over an outer one.
        let err = err.locate("other", "online");
        let message = format!("{}", err);
        assert!(message.contains("Experiment 2"));
        assert!(!message.contains("online"));
    }

    #[test]
    fn test_locate_experiment_only() {
        let fault = SimulationFault::new(1.0, SimulationFaultKind::NonFinite { what: "state" });
        let err = FitError::from(fault).locate_experiment("E1");
        assert_eq!(
            format!("{}", err),
            "Simulation fault in experiment 'E1' at t = 1 h: non-finite state"
        );
        let err = FitError::Configuration("x".into()).locate_experiment("E1");
        assert!(matches!(err, FitError::Configuration(_)));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FitError = io_err.into();

        match err {
            FitError::Io(_) => (),
            _ => panic!("Expected Io variant"),
        }

        assert!(FitError::Configuration("x".into()).is_configuration());
    }
}
