use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fedbatch_fit::simulator::linspace;
use fedbatch_fit::{FitError, FitSetup, Result, Simulator};

#[derive(Parser)]
#[command(name = "fedbatch")]
#[command(about = "Kinetic parameter estimation for fed-batch experiments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a fit setup without simulating anything
    Validate {
        /// Path to the setup JSON file
        setup: PathBuf,
    },
    /// Simulate one experiment at the setup's starting parameters
    Simulate {
        /// Path to the setup JSON file
        setup: PathBuf,
        /// Name of the experiment to simulate
        #[arg(short, long)]
        experiment: String,
        /// Start time in hours
        #[arg(long, default_value_t = 0.0)]
        t_start: f64,
        /// End time in hours (defaults to the last measurement of the experiment)
        #[arg(long)]
        t_end: Option<f64>,
        /// Number of output points
        #[arg(long, default_value_t = 1001)]
        points: usize,
        /// Output CSV file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Estimate the varying parameters from all experiments
    Fit {
        /// Path to the setup JSON file
        setup: PathBuf,
        /// Print the result as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Validate { setup } => cmd_validate(&setup),
        Commands::Simulate {
            setup,
            experiment,
            t_start,
            t_end,
            points,
            output,
        } => cmd_simulate(&setup, &experiment, t_start, t_end, points, output.as_deref()),
        Commands::Fit { setup, json } => cmd_fit(&setup, json),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let setup = FitSetup::from_file(path)?;
    setup.validate()?;
    let residuals: usize = setup.experiments.iter().map(|e| e.residual_count()).sum();
    println!(
        "{}: {} parameters ({} varying), {} experiments, {} residuals",
        path.display(),
        setup.parameters.len(),
        setup.parameters.varying_count(),
        setup.experiments.len(),
        residuals
    );
    Ok(())
}

fn cmd_simulate(
    path: &Path,
    experiment: &str,
    t_start: f64,
    t_end: Option<f64>,
    points: usize,
    output: Option<&Path>,
) -> Result<()> {
    let setup = FitSetup::from_file(path)?;
    let experiment = setup
        .experiment(experiment)
        .ok_or_else(|| FitError::Configuration(format!("no experiment named '{experiment}'")))?;
    let t_end = match t_end.or_else(|| experiment.end_time()) {
        Some(t) => t,
        None => {
            return Err(FitError::Configuration(format!(
                "experiment '{}' has no measurements; pass --t-end",
                experiment.name()
            )))
        }
    };
    if points < 2 || t_end <= t_start {
        return Err(FitError::InvalidTimeGrid(format!(
            "need at least 2 points on an increasing interval, got {points} on [{t_start}, {t_end}]"
        )));
    }

    let simulator = Simulator::new(setup.estimator.ode.clone());
    let trace = simulator
        .simulate(
            &linspace(t_start, t_end, points),
            experiment.initial_state(),
            &setup.parameters,
            experiment.controls(),
        )
        .map_err(|e| e.locate_experiment(experiment.name()))?;
    info!(experiment = experiment.name(), rows = trace.len(), "simulated");

    match output {
        Some(file) => fs::write(file, trace.to_csv())?,
        None => io::stdout().write_all(trace.to_csv().as_bytes())?,
    }
    Ok(())
}

fn cmd_fit(path: &Path, json: bool) -> Result<()> {
    let setup = FitSetup::from_file(path)?;
    let result = setup
        .estimator()
        .estimate(&setup.parameters, &setup.experiments)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{result}");
    }
    Ok(())
}
