//! JSON fit-setup documents.
//!
//! A setup bundles the starting parameters, the experiments in registration
//! order and the estimator settings:
//!
//! ```json
//! {
//!   "parameters": [{"name": "mumax", "value": 0.5, "min": 0.0001, "max": 1.0}, ...],
//!   "experiments": [{"name": "E1", "initial_state": {...}, "controls": {...}, "datasets": [...]}],
//!   "estimator": {"lm": {"max_iterations": 100}}
//! }
//! ```
//!
//! The document is parsed first and validated afterwards, so a malformed
//! parameter, dataset or variable name is reported with its own
//! [`FitError`] variant rather than as a JSON error. A document that loads
//! is well formed locally; [`FitSetup::validate`] adds the cross-checks the
//! objective needs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::estimator::{Estimator, EstimatorConfig};
use crate::experiment::{Experiment, RawExperiment};
use crate::parameters::parameter::ParameterSpec;
use crate::parameters::{Parameter, ParameterError, ParameterSet};

/// Everything needed to run one estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SetupDocument")]
pub struct FitSetup {
    /// Starting values, bounds and fixed flags
    pub parameters: ParameterSet,

    /// Experiments in registration order
    pub experiments: Vec<Experiment>,

    /// Estimator settings
    pub estimator: EstimatorConfig,
}

/// A setup as written on disk, before validation.
#[derive(Deserialize)]
struct SetupDocument {
    parameters: Vec<ParameterSpec>,
    experiments: Vec<RawExperiment>,
    #[serde(default)]
    estimator: EstimatorConfig,
}

impl TryFrom<SetupDocument> for FitSetup {
    type Error = FitError;

    fn try_from(document: SetupDocument) -> Result<Self> {
        let parameters = document
            .parameters
            .into_iter()
            .map(Parameter::try_from)
            .collect::<std::result::Result<Vec<_>, ParameterError>>()?;
        let experiments = document
            .experiments
            .into_iter()
            .map(Experiment::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            parameters: ParameterSet::try_from(parameters)?,
            experiments,
            estimator: document.estimator,
        })
    }
}

impl FitSetup {
    pub fn new(parameters: ParameterSet, experiments: Vec<Experiment>) -> Self {
        Self {
            parameters,
            experiments,
            estimator: EstimatorConfig::default(),
        }
    }

    /// Load a setup from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: SetupDocument = serde_json::from_str(json)?;
        document.try_into()
    }

    /// Load a setup from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Check the whole setup without integrating anything.
    pub fn validate(&self) -> Result<()> {
        self.estimator()
            .objective(&self.parameters, &self.experiments)
            .map(|_| ())
    }

    pub fn estimator(&self) -> Estimator {
        Estimator::new(self.estimator.clone())
    }

    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use crate::observable::Observable;

    const SETUP: &str = r#"{
        "parameters": [
            {"name": "mumax", "value": 0.5, "min": 0.0001, "max": 1.0},
            {"name": "Yxs", "value": 0.2, "min": 0.0001, "max": 1.0},
            {"name": "Ks", "value": 1.0, "fixed": true},
            {"name": "base_coef", "value": 1.0, "min": 0.0001}
        ],
        "experiments": [
            {
                "name": "E2",
                "initial_state": {"substrate_mass": 3.0, "biomass": 0.2, "volume": 0.5},
                "controls": {"feed_start_time": 5.0, "feed_rate": 0.02, "feed_substrate_conc": 200.0},
                "datasets": [
                    {
                        "name": "offline",
                        "times": [0.0, 2.0, 4.0],
                        "columns": [
                            {"variable": "cX", "values": [0.4, 1.0, 2.4]},
                            {"variable": "cS", "values": [6.0, 3.1, 0.2]}
                        ]
                    }
                ]
            },
            {
                "name": "E1",
                "initial_state": {"substrate_mass": 3.0, "biomass": 0.2, "volume": 0.5},
                "controls": {"feed_start_time": 4.0, "feed_rate": 0.03, "feed_substrate_conc": 200.0},
                "datasets": [
                    {
                        "name": "online",
                        "times": [0.5, 1.0, 1.5],
                        "columns": [{"variable": "base_rate", "values": [0.1, 0.15, 0.2]}]
                    }
                ]
            }
        ],
        "estimator": {"lm": {"max_iterations": 50}, "parallel": false}
    }"#;

    #[test]
    fn test_load_keeps_document_order() {
        let setup = FitSetup::from_json_str(SETUP).unwrap();
        setup.validate().unwrap();

        let names: Vec<_> = setup.experiments.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["E2", "E1"]);
        assert_eq!(setup.parameters.varying_names(), ["mumax", "Yxs", "base_coef"]);
        assert_eq!(setup.estimator.lm.max_iterations, 50);
        // Unspecified settings fall back to defaults
        assert_eq!(setup.estimator.lm.ftol, 1e-8);
        assert!(!setup.estimator.parallel);

        let online = setup.experiment("E1").unwrap().dataset("online").unwrap();
        assert_eq!(online.columns()[0].variable, Observable::BaseConsumptionRate);
        assert!(setup.experiment("E3").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let setup = FitSetup::from_json_str(SETUP).unwrap();
        let back = FitSetup::from_json_str(&setup.to_json().unwrap()).unwrap();
        assert_eq!(setup, back);
    }

    #[test]
    fn test_unknown_variable_rejected_at_load() {
        let bad = SETUP.replace("\"base_rate\"", "\"OD600\"");
        let err = FitSetup::from_json_str(&bad).unwrap_err();
        assert!(matches!(err, FitError::UnknownObservable(ref n) if n == "OD600"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bound_violation_rejected_at_load() {
        let bad = SETUP.replace("\"value\": 0.5", "\"value\": 2.0");
        let err = FitSetup::from_json_str(&bad).unwrap_err();
        assert!(matches!(err, FitError::Parameter(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_dataset_rejected_at_load() {
        let bad = SETUP.replace("[0.4, 1.0, 2.4]", "[0.4, 1.0]");
        let err = FitSetup::from_json_str(&bad).unwrap_err();
        assert!(matches!(err, FitError::InvalidDataset { ref dataset, .. } if dataset == "offline"));
    }

    #[test]
    fn test_syntax_error_is_json_error() {
        let err = FitSetup::from_json_str("{\"parameters\": [").unwrap_err();
        assert!(matches!(err, FitError::Json(_)));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_validate_reports_missing_parameter() {
        let mut setup = FitSetup::from_json_str(SETUP).unwrap();
        let mut params = ParameterSet::new();
        for p in setup.parameters.iter().filter(|p| p.name() != "Yxs") {
            params.add(p.clone()).unwrap();
        }
        setup.parameters = params;

        let err = setup.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Yxs"));
    }

    #[test]
    fn test_validate_reports_duplicate_experiment() {
        let mut setup = FitSetup::from_json_str(SETUP).unwrap();
        let copy = setup.experiments[0].clone();
        setup.experiments.push(copy);
        assert!(matches!(
            setup.validate(),
            Err(FitError::DuplicateExperiment(name)) if name == "E2"
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = FitSetup::from_file("/nonexistent/setup.json").unwrap_err();
        assert!(matches!(err, FitError::Io(_)));
    }
}
