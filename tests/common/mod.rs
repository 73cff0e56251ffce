//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use fedbatch_fit::experiment::{Experiment, MeasurementDataset};
use fedbatch_fit::model::{ControlInputs, StateVector};
use fedbatch_fit::observable::Observable;
use fedbatch_fit::parameters::ParameterSet;
use fedbatch_fit::simulator::{linspace, Simulator};
use fedbatch_fit::synthetic::synthesize_dataset;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const MUMAX: f64 = 0.5;
pub const YXS: f64 = 0.2;
pub const KS: f64 = 1.0;
pub const BASE_COEF: f64 = 1.0;

/// Parameters of the reference scenario with the usual bounds and `Ks` fixed.
pub fn reference_parameters() -> ParameterSet {
    parameters(MUMAX, YXS, BASE_COEF)
}

pub fn parameters(mumax: f64, yxs: f64, base_coef: f64) -> ParameterSet {
    let mut params = ParameterSet::new();
    params.add_bounded("mumax", mumax, 1e-4, 1.0).unwrap();
    params.add_bounded("Yxs", yxs, 1e-4, 1.0).unwrap();
    params.add_fixed("Ks", KS).unwrap();
    params
        .add_bounded("base_coef", base_coef, 1e-4, f64::INFINITY)
        .unwrap();
    params
}

pub fn reference_state() -> StateVector {
    StateVector::new(3.0, 0.2, 0.5)
}

pub fn reference_controls() -> ControlInputs {
    ControlInputs::new(5.0, 0.02, 200.0)
}

/// An experiment whose measurements are simulated at `truth` with seeded
/// Gaussian noise: an offline table of `cX`/`cS` every 0.5 h and an online
/// `base_rate` table every 0.25 h.
pub fn synthetic_experiment(
    name: &str,
    truth: &ParameterSet,
    controls: ControlInputs,
    noise_std: f64,
    seed: u64,
) -> Experiment {
    let simulator = Simulator::default();
    let state = reference_state();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let offline = synthesize_dataset(
        &simulator,
        truth,
        &state,
        &controls,
        "offline",
        linspace(0.0, 10.0, 21),
        &[Observable::BiomassConc, Observable::SubstrateConc],
        noise_std,
        &mut rng,
    )
    .unwrap();
    let online = synthesize_dataset(
        &simulator,
        truth,
        &state,
        &controls,
        "online",
        linspace(0.25, 10.0, 40),
        &[Observable::BaseConsumptionRate],
        noise_std,
        &mut rng,
    )
    .unwrap();

    Experiment::new(name, state, controls, vec![offline, online]).unwrap()
}

/// A small hand-written dataset.
pub fn offline_dataset(times: Vec<f64>, cx: Vec<f64>, cs: Vec<f64>) -> MeasurementDataset {
    MeasurementDataset::from_named_columns("offline", times, vec![("cX", cx), ("cS", cs)]).unwrap()
}
