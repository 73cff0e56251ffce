//! Weighted residuals between simulation and measurements for one experiment.

use tracing::debug;

use crate::error::{FitError, Result};
use crate::experiment::{Experiment, MeasurementDataset};
use crate::model::{ControlInputs, StateVector};
use crate::observable::ResidualWeights;
use crate::parameters::ParameterSet;
use crate::simulator::{SimulationTrace, Simulator};

/// Residuals of one experiment.
///
/// Layout: datasets in the experiment's order; within a dataset, variables in
/// column order; within a variable, time order. Each entry is
/// `(simulated - observed) * weight`.
#[derive(Debug, Clone, Default)]
pub struct ExperimentResidual {
    simulator: Simulator,
    weights: ResidualWeights,
}

impl ExperimentResidual {
    pub fn new(simulator: Simulator, weights: ResidualWeights) -> Self {
        Self { simulator, weights }
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn weights(&self) -> &ResidualWeights {
        &self.weights
    }

    /// Residuals of all datasets of `experiment`.
    ///
    /// A simulation fault is reported with the experiment and dataset it
    /// occurred in.
    pub fn experiment_residuals(
        &self,
        params: &ParameterSet,
        experiment: &Experiment,
    ) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(experiment.residual_count());
        for dataset in experiment.datasets() {
            let r = self
                .dataset_residuals(
                    params,
                    experiment.controls(),
                    experiment.initial_state(),
                    dataset,
                )
                .map_err(|e| e.locate(experiment.name(), dataset.name()))?;
            out.extend(r);
        }
        debug!(
            experiment = experiment.name(),
            residuals = out.len(),
            "evaluated experiment residuals"
        );
        Ok(out)
    }

    /// Residuals for explicitly given inputs, one simulation per dataset.
    pub fn residuals(
        &self,
        params: &ParameterSet,
        controls: &ControlInputs,
        initial_state: &StateVector,
        datasets: &[MeasurementDataset],
    ) -> Result<Vec<f64>> {
        let mut out = Vec::new();
        for dataset in datasets {
            let r = self.dataset_residuals(params, controls, initial_state, dataset)?;
            out.extend(r);
        }
        Ok(out)
    }

    /// Simulate on the dataset's own time grid and compare every column.
    pub fn dataset_residuals(
        &self,
        params: &ParameterSet,
        controls: &ControlInputs,
        initial_state: &StateVector,
        dataset: &MeasurementDataset,
    ) -> Result<Vec<f64>> {
        let trace = self
            .simulator
            .simulate(dataset.times(), initial_state, params, controls)?;
        self.compare(&trace, dataset)
    }

    /// Weighted residuals of a dataset against an existing trace on the same grid.
    pub fn compare(&self, trace: &SimulationTrace, dataset: &MeasurementDataset) -> Result<Vec<f64>> {
        if trace.len() != dataset.times().len() {
            return Err(FitError::DimensionMismatch(format!(
                "trace has {} rows, dataset '{}' has {} time points",
                trace.len(),
                dataset.name(),
                dataset.times().len()
            )));
        }

        let mut out = Vec::with_capacity(dataset.residual_count());
        for column in dataset.columns() {
            let weight = self.weights.weight(column.variable);
            let simulated = trace.values(column.variable);
            out.extend(weighted_differences(&simulated, &column.values, weight));
        }
        Ok(out)
    }
}

/// `(simulated - observed) * weight`, elementwise.
pub fn weighted_differences<'a>(
    simulated: &'a [f64],
    observed: &'a [f64],
    weight: f64,
) -> impl Iterator<Item = f64> + 'a {
    simulated
        .iter()
        .zip(observed)
        .map(move |(s, o)| (s - o) * weight)
}
