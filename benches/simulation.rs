//! Benchmarks for the simulate-then-fit inner loop
//!
//! One simulation of the reference fed-batch experiment and one evaluation of
//! a two-experiment objective, sequential and parallel.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fedbatch_fit::experiment::Experiment;
use fedbatch_fit::model::{ControlInputs, StateVector};
use fedbatch_fit::objective::MultiExperimentObjective;
use fedbatch_fit::observable::Observable;
use fedbatch_fit::parameters::ParameterSet;
use fedbatch_fit::residuals::ExperimentResidual;
use fedbatch_fit::simulator::{linspace, Simulator};
use fedbatch_fit::synthetic::synthesize_dataset;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn parameters() -> ParameterSet {
    let mut params = ParameterSet::new();
    params.add_bounded("mumax", 0.5, 1e-4, 1.0).unwrap();
    params.add_bounded("Yxs", 0.2, 1e-4, 1.0).unwrap();
    params.add_fixed("Ks", 1.0).unwrap();
    params
        .add_bounded("base_coef", 1.0, 1e-4, f64::INFINITY)
        .unwrap();
    params
}

fn experiment(name: &str, controls: ControlInputs, params: &ParameterSet) -> Experiment {
    let state = StateVector::new(3.0, 0.2, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let simulator = Simulator::default();
    let offline = synthesize_dataset(
        &simulator,
        params,
        &state,
        &controls,
        "offline",
        linspace(0.0, 10.0, 21),
        &[Observable::BiomassConc, Observable::SubstrateConc],
        0.01,
        &mut rng,
    )
    .unwrap();
    let online = synthesize_dataset(
        &simulator,
        params,
        &state,
        &controls,
        "online",
        linspace(0.25, 10.0, 40),
        &[Observable::BaseConsumptionRate],
        0.01,
        &mut rng,
    )
    .unwrap();
    Experiment::new(name, state, controls, vec![offline, online]).unwrap()
}

fn bench_simulation(c: &mut Criterion) {
    let params = parameters();
    let grid = linspace(0.0, 10.0, 1001);
    let state = StateVector::new(3.0, 0.2, 0.5);
    let controls = ControlInputs::new(5.0, 0.02, 200.0);
    let simulator = Simulator::default();

    c.bench_function("simulate_1001_points", |b| {
        b.iter(|| {
            simulator
                .simulate(black_box(&grid), &state, &params, &controls)
                .unwrap()
        })
    });
}

fn bench_objective(c: &mut Criterion) {
    let params = parameters();
    let experiments = vec![
        experiment("E1", ControlInputs::new(5.0, 0.02, 200.0), &params),
        experiment("E2", ControlInputs::new(4.0, 0.04, 150.0), &params),
    ];
    let objective =
        MultiExperimentObjective::new(&params, &experiments, ExperimentResidual::default())
            .unwrap();
    let parallel = objective.clone().with_parallel(true);

    let mut group = c.benchmark_group("objective");
    group.bench_function("sequential", |b| {
        b.iter(|| objective.evaluate(black_box(&params)).unwrap())
    });
    group.bench_function("parallel", |b| {
        b.iter(|| parallel.evaluate(black_box(&params)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_simulation, bench_objective);
criterion_main!(benches);
