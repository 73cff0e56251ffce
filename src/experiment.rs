//! Experiments and their measurement data.
//!
//! An [`Experiment`] bundles the initial state, the feed settings and one or
//! more [`MeasurementDataset`]s (for example an "offline" sample table and an
//! "online" sensor table). Each dataset has its own time grid and is simulated
//! separately; the simulation of a dataset starts from the experiment's initial
//! state at the dataset's first time point.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::model::{ControlInputs, StateVector};
use crate::observable::Observable;
use crate::simulator::validate_time_grid;

/// Observed values of one variable, aligned with the dataset's time grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredVariable {
    pub variable: Observable,
    pub values: Vec<f64>,
}

impl MeasuredVariable {
    pub fn new(variable: Observable, values: Vec<f64>) -> Self {
        Self { variable, values }
    }
}

/// One measurement table: a time grid and one column per measured variable.
///
/// Columns keep their insertion order, which fixes the layout of the residual
/// vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct MeasurementDataset {
    name: String,
    times: Vec<f64>,
    columns: Vec<MeasuredVariable>,
}

/// Column as written in a setup file. The variable name is resolved after
/// parsing so an unknown name keeps its own error.
#[derive(Deserialize)]
pub(crate) struct RawColumn {
    variable: String,
    values: Vec<f64>,
}

#[derive(Deserialize)]
pub(crate) struct RawDataset {
    name: String,
    times: Vec<f64>,
    columns: Vec<RawColumn>,
}

impl TryFrom<RawDataset> for MeasurementDataset {
    type Error = FitError;

    fn try_from(raw: RawDataset) -> Result<Self> {
        let columns = raw
            .columns
            .into_iter()
            .map(|c| -> Result<MeasuredVariable> {
                Ok(MeasuredVariable::new(c.variable.parse()?, c.values))
            })
            .collect::<Result<Vec<_>>>()?;
        MeasurementDataset::new(raw.name, raw.times, columns)
    }
}

impl MeasurementDataset {
    /// Build and validate a dataset.
    ///
    /// The time grid must be strictly increasing, every column must have one
    /// finite value per time point and no variable may appear twice.
    pub fn new(
        name: impl Into<String>,
        times: Vec<f64>,
        columns: Vec<MeasuredVariable>,
    ) -> Result<Self> {
        let dataset = Self {
            name: name.into(),
            times,
            columns,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Convenience constructor from `(variable name, values)` pairs.
    pub fn from_named_columns(
        name: impl Into<String>,
        times: Vec<f64>,
        columns: Vec<(&str, Vec<f64>)>,
    ) -> Result<Self> {
        let columns = columns
            .into_iter()
            .map(|(variable, values)| -> Result<MeasuredVariable> {
                Ok(MeasuredVariable::new(variable.parse()?, values))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, times, columns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn columns(&self) -> &[MeasuredVariable] {
        &self.columns
    }

    pub fn column(&self, variable: Observable) -> Option<&MeasuredVariable> {
        self.columns.iter().find(|c| c.variable == variable)
    }

    /// Number of observed values, i.e. the residuals this dataset contributes.
    pub fn residual_count(&self) -> usize {
        self.times.len() * self.columns.len()
    }

    fn invalid(&self, message: impl Into<String>) -> FitError {
        FitError::InvalidDataset {
            dataset: self.name.clone(),
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(self.invalid("dataset name is empty"));
        }
        validate_time_grid(&self.times).map_err(|e| self.invalid(e.to_string()))?;
        if self.columns.is_empty() {
            return Err(self.invalid("no measured variables"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.variable) {
                return Err(self.invalid(format!("variable {} appears twice", column.variable)));
            }
            if column.values.len() != self.times.len() {
                return Err(self.invalid(format!(
                    "variable {} has {} values for {} time points",
                    column.variable,
                    column.values.len(),
                    self.times.len()
                )));
            }
            if let Some(i) = column.values.iter().position(|v| !v.is_finite()) {
                return Err(self.invalid(format!(
                    "variable {} has a non-finite value at t = {}",
                    column.variable, self.times[i]
                )));
            }
        }
        Ok(())
    }
}

/// One fed-batch run: its initial state, feed settings and measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExperiment")]
pub struct Experiment {
    name: String,
    initial_state: StateVector,
    controls: ControlInputs,
    datasets: Vec<MeasurementDataset>,
}

#[derive(Deserialize)]
pub(crate) struct RawExperiment {
    name: String,
    initial_state: StateVector,
    controls: ControlInputs,
    datasets: Vec<RawDataset>,
}

impl TryFrom<RawExperiment> for Experiment {
    type Error = FitError;

    fn try_from(raw: RawExperiment) -> Result<Self> {
        let datasets = raw
            .datasets
            .into_iter()
            .map(MeasurementDataset::try_from)
            .collect::<Result<Vec<_>>>()?;
        Experiment::new(raw.name, raw.initial_state, raw.controls, datasets)
    }
}

impl Experiment {
    /// Build and validate an experiment.
    ///
    /// # Examples
    ///
    /// ```
    /// use fedbatch_fit::experiment::{Experiment, MeasurementDataset};
    /// use fedbatch_fit::model::{ControlInputs, StateVector};
    ///
    /// let offline = MeasurementDataset::from_named_columns(
    ///     "offline",
    ///     vec![0.0, 2.0, 4.0],
    ///     vec![("cX", vec![0.4, 1.0, 2.4]), ("cS", vec![6.0, 3.1, 0.2])],
    /// )
    /// .unwrap();
    ///
    /// let experiment = Experiment::new(
    ///     "Experiment 1",
    ///     StateVector::new(3.0, 0.2, 0.5),
    ///     ControlInputs::new(5.0, 0.02, 200.0),
    ///     vec![offline],
    /// )
    /// .unwrap();
    /// assert_eq!(experiment.residual_count(), 6);
    /// ```
    pub fn new(
        name: impl Into<String>,
        initial_state: StateVector,
        controls: ControlInputs,
        datasets: Vec<MeasurementDataset>,
    ) -> Result<Self> {
        let experiment = Self {
            name: name.into(),
            initial_state,
            controls,
            datasets,
        };
        experiment.validate()?;
        Ok(experiment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> &StateVector {
        &self.initial_state
    }

    pub fn controls(&self) -> &ControlInputs {
        &self.controls
    }

    pub fn datasets(&self) -> &[MeasurementDataset] {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Option<&MeasurementDataset> {
        self.datasets.iter().find(|d| d.name() == name)
    }

    pub fn residual_count(&self) -> usize {
        self.datasets.iter().map(MeasurementDataset::residual_count).sum()
    }

    /// Last measured time over all datasets.
    pub fn end_time(&self) -> Option<f64> {
        self.datasets
            .iter()
            .filter_map(|d| d.times().last().copied())
            .reduce(f64::max)
    }

    pub fn validate(&self) -> Result<()> {
        let context = |e: FitError| match e {
            FitError::Configuration(message) => {
                FitError::Configuration(format!("experiment '{}': {message}", self.name))
            }
            other => other,
        };

        if self.name.is_empty() {
            return Err(FitError::Configuration("experiment name is empty".into()));
        }
        self.initial_state.validate().map_err(context)?;
        self.controls.validate().map_err(context)?;
        if self.datasets.is_empty() {
            return Err(context(FitError::Configuration(
                "no measurement datasets".into(),
            )));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            dataset.validate()?;
            if !seen.insert(dataset.name()) {
                return Err(context(FitError::Configuration(format!(
                    "dataset '{}' appears twice",
                    dataset.name()
                ))));
            }
        }
        Ok(())
    }
}

/// Check a collection of experiments before fitting: at least one experiment,
/// unique names, each experiment valid.
pub fn validate_experiments(experiments: &[Experiment]) -> Result<()> {
    if experiments.is_empty() {
        return Err(FitError::Configuration("no experiments given".into()));
    }
    let mut seen = HashSet::new();
    for experiment in experiments {
        if !seen.insert(experiment.name()) {
            return Err(FitError::DuplicateExperiment(experiment.name().to_string()));
        }
        experiment.validate()?;
    }
    Ok(())
}

/// Total number of residuals over all experiments, datasets and variables.
pub fn residual_count(experiments: &[Experiment]) -> usize {
    experiments.iter().map(Experiment::residual_count).sum()
}
