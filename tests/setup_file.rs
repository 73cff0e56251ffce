//! Fit setups written to and read from disk.

mod common;

use std::path::PathBuf;

use approx::assert_relative_eq;
use fedbatch_fit::{FitError, FitSetup};

use common::*;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fedbatch-fit-{}-{name}", std::process::id()))
}

fn setup() -> FitSetup {
    let truth = reference_parameters();
    let mut setup = FitSetup::new(
        parameters(0.4, 0.25, 0.8),
        vec![synthetic_experiment("E1", &truth, reference_controls(), 0.0, 3)],
    );
    setup.estimator.parallel = false;
    setup
}

#[test]
fn test_save_load_and_fit() {
    let path = temp_path("setup.json");
    let original = setup();
    original.save_json(&path).unwrap();

    let loaded = FitSetup::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    loaded.validate().unwrap();
    assert_eq!(loaded.experiments.len(), 1);
    assert_eq!(loaded.parameters.varying_names(), ["mumax", "Yxs", "base_coef"]);
    assert_eq!(loaded.estimator, original.estimator);

    let result = loaded
        .estimator()
        .estimate(&loaded.parameters, &loaded.experiments)
        .unwrap();
    assert!(result.converged(), "{result}");
    assert_relative_eq!(result.value("mumax").unwrap(), MUMAX, max_relative = 1e-4);
    assert_relative_eq!(result.value("Yxs").unwrap(), YXS, max_relative = 1e-4);
}

#[test]
fn test_malformed_documents() {
    assert!(matches!(
        FitSetup::from_json_str("{\"parameters\": []"),
        Err(FitError::Json(_))
    ));

    // Initial value outside its bounds
    let json = setup()
        .to_json()
        .unwrap()
        .replacen("\"value\": 0.4", "\"value\": 1.4", 1);
    let err = FitSetup::from_json_str(&json).unwrap_err();
    assert!(err.to_string().contains("mumax"), "{err}");
}
