//! Synthetic measurements from simulations.
//!
//! Used to build fit scenarios with a known answer: simulate an experiment at
//! chosen parameters and optionally perturb every value with independent
//! Gaussian noise.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{FitError, Result};
use crate::experiment::{MeasuredVariable, MeasurementDataset};
use crate::model::{ControlInputs, StateVector};
use crate::observable::Observable;
use crate::parameters::ParameterSet;
use crate::simulator::Simulator;

/// Simulate the requested `variables` on `times` and add noise with standard
/// deviation `noise_std` (zero gives the exact simulated values).
///
/// # Examples
///
/// ```
/// use fedbatch_fit::model::{ControlInputs, StateVector};
/// use fedbatch_fit::observable::Observable;
/// use fedbatch_fit::parameters::ParameterSet;
/// use fedbatch_fit::simulator::Simulator;
/// use fedbatch_fit::synthetic::synthesize_dataset;
/// use rand::thread_rng;
///
/// let mut params = ParameterSet::new();
/// params.add_param("mumax", 0.5).unwrap();
/// params.add_param("Yxs", 0.2).unwrap();
/// params.add_param("Ks", 1.0).unwrap();
/// params.add_param("base_coef", 1.0).unwrap();
///
/// let dataset = synthesize_dataset(
///     &Simulator::default(),
///     &params,
///     &StateVector::new(3.0, 0.2, 0.5),
///     &ControlInputs::new(5.0, 0.02, 200.0),
///     "offline",
///     vec![0.0, 2.5, 5.0, 7.5, 10.0],
///     &[Observable::BiomassConc, Observable::SubstrateConc],
///     0.05,
///     &mut thread_rng(),
/// )
/// .unwrap();
/// assert_eq!(dataset.residual_count(), 10);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn synthesize_dataset<R: Rng + ?Sized>(
    simulator: &Simulator,
    params: &ParameterSet,
    initial_state: &StateVector,
    controls: &ControlInputs,
    name: &str,
    times: Vec<f64>,
    variables: &[Observable],
    noise_std: f64,
    rng: &mut R,
) -> Result<MeasurementDataset> {
    if !noise_std.is_finite() || noise_std < 0.0 {
        return Err(FitError::Configuration(format!(
            "noise standard deviation must be finite and non-negative, got {noise_std}"
        )));
    }
    let noise = Normal::new(0.0, noise_std)
        .map_err(|e| FitError::Configuration(format!("noise distribution: {e}")))?;

    let trace = simulator.simulate(&times, initial_state, params, controls)?;

    let columns = variables
        .iter()
        .map(|&variable| {
            let mut values = trace.values(variable);
            if noise_std > 0.0 {
                for v in values.iter_mut() {
                    *v += noise.sample(rng);
                }
            }
            MeasuredVariable::new(variable, values)
        })
        .collect();

    MeasurementDataset::new(name, times, columns)
}
