//! Simulation of one experiment on a prescribed time grid.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result, SimulationFault, SimulationFaultKind};
use crate::model::{ControlInputs, FeedPhase, FedBatchModel, StateVector};
use crate::observable::Observable;
use crate::ode::{Dopri5, IntegrationError, OdeConfig, OdeSystem};
use crate::parameters::ParameterSet;

/// One output row of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Time (h)
    pub time: f64,

    /// Substrate concentration (g/L)
    pub substrate_conc: f64,

    /// Biomass concentration (g/L)
    pub biomass_conc: f64,

    /// Broth volume (L)
    pub volume: f64,

    /// Base consumption rate
    pub base_consumption_rate: f64,
}

impl TraceRow {
    pub fn value(&self, observable: Observable) -> f64 {
        match observable {
            Observable::SubstrateConc => self.substrate_conc,
            Observable::BiomassConc => self.biomass_conc,
            Observable::BaseConsumptionRate => self.base_consumption_rate,
        }
    }

    pub fn substrate_mass(&self) -> f64 {
        self.substrate_conc * self.volume
    }

    pub fn biomass(&self) -> f64 {
        self.biomass_conc * self.volume
    }
}

/// Simulated observables, one row per requested time point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTrace {
    rows: Vec<TraceRow>,
}

impl SimulationTrace {
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    /// Column of one observable.
    pub fn values(&self, observable: Observable) -> Vec<f64> {
        self.rows.iter().map(|r| r.value(observable)).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.volume).collect()
    }

    /// CSV rendering with a header line.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("time,substrate_conc,biomass_conc,volume,base_consumption_rate\n");
        for r in &self.rows {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                r.time, r.substrate_conc, r.biomass_conc, r.volume, r.base_consumption_rate
            ));
        }
        out
    }
}

/// The model restricted to one side of the feed switch.
struct PhaseSystem<'a> {
    model: &'a FedBatchModel,
    phase: FeedPhase,
}

impl OdeSystem<3> for PhaseSystem<'_> {
    fn rhs(&self, _t: f64, y: &[f64; 3]) -> [f64; 3] {
        self.model
            .rhs_in_phase(self.phase, &StateVector::from_array(y))
            .to_array()
    }

    fn admissible(&self, y: &[f64; 3]) -> bool {
        y[2] > 0.0
    }
}

/// Integrates the fed-batch model for one experiment.
///
/// Faults fail fast: the first integration failure, non-positive volume or
/// non-finite output aborts the simulation with [`FitError::Simulation`]. A
/// successful trace never contains NaN or infinite values.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    solver: Dopri5,
}

impl Simulator {
    pub fn new(config: OdeConfig) -> Self {
        Self {
            solver: Dopri5::new(config),
        }
    }

    pub fn ode_config(&self) -> &OdeConfig {
        self.solver.config()
    }

    /// Simulate on `time_grid` (strictly increasing) from `initial_state` at
    /// `time_grid[0]`.
    ///
    /// The interval is split at the feed start time so that each piece is
    /// integrated with a continuous right-hand side.
    ///
    /// # Examples
    ///
    /// ```
    /// use fedbatch_fit::model::{ControlInputs, StateVector};
    /// use fedbatch_fit::parameters::ParameterSet;
    /// use fedbatch_fit::simulator::Simulator;
    ///
    /// let mut params = ParameterSet::new();
    /// params.add_param("mumax", 0.5).unwrap();
    /// params.add_param("Yxs", 0.2).unwrap();
    /// params.add_fixed("Ks", 1.0).unwrap();
    /// params.add_param("base_coef", 1.0).unwrap();
    ///
    /// let trace = Simulator::default()
    ///     .simulate(
    ///         &[0.0, 5.0, 10.0],
    ///         &StateVector::new(3.0, 0.2, 0.5),
    ///         &params,
    ///         &ControlInputs::new(5.0, 0.02, 200.0),
    ///     )
    ///     .unwrap();
    /// assert_eq!(trace.len(), 3);
    /// assert!((trace.rows()[2].volume - 0.6).abs() < 1e-9);
    /// ```
    pub fn simulate(
        &self,
        time_grid: &[f64],
        initial_state: &StateVector,
        params: &ParameterSet,
        controls: &ControlInputs,
    ) -> Result<SimulationTrace> {
        validate_time_grid(time_grid)?;
        initial_state.validate()?;
        controls.validate()?;
        let model = FedBatchModel::from_parameters(params, controls)?;

        let states = self.integrate(&model, time_grid, initial_state)?;

        let rows = time_grid
            .iter()
            .zip(states.iter())
            .map(|(&time, state)| observe(&model, time, state))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SimulationTrace { rows })
    }

    /// States at every grid point, integrating each feed phase separately.
    fn integrate(
        &self,
        model: &FedBatchModel,
        time_grid: &[f64],
        initial_state: &StateVector,
    ) -> std::result::Result<Vec<StateVector>, SimulationFault> {
        let t0 = time_grid[0];
        let t_end = time_grid[time_grid.len() - 1];
        let switch = model.controls().feed_start_time;

        let mut segments = Vec::with_capacity(2);
        if switch > t0 && switch < t_end {
            let split = time_grid.partition_point(|&t| t <= switch);
            segments.push((t0, switch, FeedPhase::Off, &time_grid[..split]));
            segments.push((switch, t_end, FeedPhase::On, &time_grid[split..]));
        } else {
            // A grid starting at the switch time runs entirely on the fed side.
            let phase = if switch <= t0 {
                FeedPhase::On
            } else {
                FeedPhase::Off
            };
            segments.push((t0, t_end, phase, time_grid));
        }

        let mut y = initial_state.to_array();
        let mut states = Vec::with_capacity(time_grid.len());
        for (start, end, phase, grid) in segments {
            let system = PhaseSystem { model, phase };
            let trajectory = self
                .solver
                .integrate(&system, start, y, end, grid)
                .map_err(|err| integration_fault(err, start))?;
            states.extend(trajectory.values.iter().map(StateVector::from_array));
            y = trajectory.final_state;
        }

        Ok(states)
    }
}

/// Concentrations and the re-evaluated base rate at one solved point.
fn observe(
    model: &FedBatchModel,
    time: f64,
    state: &StateVector,
) -> std::result::Result<TraceRow, SimulationFault> {
    if !state.is_finite() {
        return Err(SimulationFault::new(
            time,
            SimulationFaultKind::NonFinite { what: "state" },
        ));
    }
    if state.volume <= 0.0 {
        return Err(SimulationFault::new(
            time,
            SimulationFaultKind::NonPositiveVolume {
                volume: state.volume,
            },
        ));
    }

    let row = TraceRow {
        time,
        substrate_conc: state.substrate_conc(),
        biomass_conc: state.biomass_conc(),
        volume: state.volume,
        base_consumption_rate: model.base_consumption_rate(time, state),
    };
    if !row.base_consumption_rate.is_finite()
        || !row.substrate_conc.is_finite()
        || !row.biomass_conc.is_finite()
    {
        return Err(SimulationFault::new(
            time,
            SimulationFaultKind::NonFinite {
                what: "observable",
            },
        ));
    }
    Ok(row)
}

fn integration_fault(err: IntegrationError, segment_start: f64) -> SimulationFault {
    let time = err.time().unwrap_or(segment_start);
    let kind = match err {
        IntegrationError::InadmissibleState { state, .. } => SimulationFaultKind::NonPositiveVolume {
            volume: state.get(2).copied().unwrap_or(f64::NAN),
        },
        IntegrationError::NonFinite { .. } => SimulationFaultKind::NonFinite { what: "state" },
        other => SimulationFaultKind::Integration(other),
    };
    SimulationFault::new(time, kind)
}

/// A time grid must be non-empty, finite and strictly increasing.
pub fn validate_time_grid(time_grid: &[f64]) -> Result<()> {
    if time_grid.is_empty() {
        return Err(FitError::InvalidTimeGrid("time grid is empty".to_string()));
    }
    if let Some(t) = time_grid.iter().find(|t| !t.is_finite()) {
        return Err(FitError::InvalidTimeGrid(format!(
            "time grid contains non-finite value {t}"
        )));
    }
    if let Some(w) = time_grid.windows(2).find(|w| w[1] <= w[0]) {
        return Err(FitError::InvalidTimeGrid(format!(
            "time grid must be strictly increasing ({} followed by {})",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(mumax: f64, yxs: f64, ks: f64, base_coef: f64) -> ParameterSet {
        let mut p = ParameterSet::new();
        p.add_param("mumax", mumax).unwrap();
        p.add_param("Yxs", yxs).unwrap();
        p.add_fixed("Ks", ks).unwrap();
        p.add_param("base_coef", base_coef).unwrap();
        p
    }

    #[test]
    fn test_time_grid_validation() {
        assert!(validate_time_grid(&[]).is_err());
        assert!(validate_time_grid(&[0.0, 1.0, 1.0]).is_err());
        assert!(validate_time_grid(&[0.0, f64::NAN]).is_err());
        assert!(validate_time_grid(&[2.0]).is_ok());
    }

    #[test]
    fn test_linspace() {
        let grid = linspace(0.0, 10.0, 1001);
        assert_eq!(grid.len(), 1001);
        assert_eq!(grid[1000], 10.0);
        assert_relative_eq!(grid[500], 5.0, epsilon = 1e-12);
        assert!(validate_time_grid(&grid).is_ok());
    }

    #[test]
    fn test_single_point_grid_returns_initial_state() {
        let trace = Simulator::default()
            .simulate(
                &[1.0],
                &StateVector::new(3.0, 0.2, 0.5),
                &params(0.5, 0.2, 1.0, 1.0),
                &ControlInputs::new(5.0, 0.02, 200.0),
            )
            .unwrap();
        let row = trace.rows()[0];
        assert_eq!(row.substrate_conc, 6.0);
        assert_eq!(row.biomass_conc, 0.4);
        assert_eq!(row.volume, 0.5);
    }

    #[test]
    fn test_missing_parameter_fails_before_integration() {
        let mut p = ParameterSet::new();
        p.add_param("mumax", 0.5).unwrap();
        let err = Simulator::default()
            .simulate(
                &[0.0, 1.0],
                &StateVector::new(3.0, 0.2, 0.5),
                &p,
                &ControlInputs::batch(),
            )
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_volume_tracks_feed_exactly() {
        let grid = linspace(0.0, 10.0, 41);
        let trace = Simulator::default()
            .simulate(
                &grid,
                &StateVector::new(3.0, 0.2, 0.5),
                &params(0.5, 0.2, 1.0, 1.0),
                &ControlInputs::new(2.6, 0.05, 100.0),
            )
            .unwrap();

        for row in trace.rows() {
            let expected = 0.5 + 0.05 * (row.time - 2.6).max(0.0);
            assert_relative_eq!(row.volume, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_grid_starting_after_feed_start() {
        let trace = Simulator::default()
            .simulate(
                &[6.0, 7.0],
                &StateVector::new(3.0, 0.2, 0.5),
                &params(0.5, 0.2, 1.0, 1.0),
                &ControlInputs::new(5.0, 0.02, 200.0),
            )
            .unwrap();
        assert_relative_eq!(trace.rows()[1].volume, 0.52, epsilon = 1e-9);
    }

    #[test]
    fn test_draining_reactor_faults() {
        // Negative feed empties the reactor at t = 5 h
        let err = Simulator::new(OdeConfig::default().with_max_step(0.1))
            .simulate(
                &linspace(0.0, 10.0, 11),
                &StateVector::new(3.0, 0.2, 0.5),
                &params(0.5, 0.2, 1.0, 1.0),
                &ControlInputs::new(0.0, -0.1, 0.0),
            )
            .unwrap_err();

        assert!(!err.is_configuration());
        let fault = err.simulation_fault().expect("simulation fault");
        assert!(fault.time > 4.0 && fault.time <= 5.2, "fault at {}", fault.time);
    }

    #[test]
    fn test_csv_output() {
        let trace = Simulator::default()
            .simulate(
                &[0.0, 1.0],
                &StateVector::new(3.0, 0.2, 0.5),
                &params(0.5, 0.2, 1.0, 1.0),
                &ControlInputs::batch(),
            )
            .unwrap();
        let csv = trace.to_csv();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("time,substrate_conc"));
    }
}
