mod compile;
mod config;
mod database;
mod executors;
mod experiments;
mod ingest;
mod job;
mod sweep;
mod trials;

use clap::Parser;
use compile::Builders;
use config::{BenchConfig, ConfigErrors};
use experiments::Factory;
use executors::LocalExecutor;
use std::{path::PathBuf, process::ExitCode, time::Instant};
use sweep::{Sweep, SweepError};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Compile, run and record the teebench join experiments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Repetitions per configuration, overrides `reps` from the config
    #[arg(short, long)]
    reps: Option<usize>,

    /// Print the known experiments and exit
    #[arg(long)]
    list: bool,

    /// Experiments to run, all of them if none is given
    experiments: Vec<String>,
}

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

/// Config with the command line overrides applied and the experiments to run
struct Plan {
    config: BenchConfig,
    experiments: Vec<Factory>,
}

/// resolve everything the command line asks for, nothing is built or spawned yet
fn plan(args: &Args) -> Result<Plan, ConfigErrors> {
    let mut config = BenchConfig::load(&args.config)?;
    if let Some(reps) = args.reps {
        config.reps = reps;
    }

    let experiments = experiments::select(&args.experiments)?;

    Ok(Plan {
        config,
        experiments,
    })
}

fn run(args: Args) -> Result<(), RunError> {
    let Plan {
        config,
        experiments: factories,
    } = plan(&args)?;

    if config.preflight_checks() {
        return Err(ConfigErrors::Preflight.into());
    }

    let executor = LocalExecutor::load(&config.app);
    info!("Benchmark binary: {}", executor.exec().display());

    let mut sweep = Sweep::new(executor, Builders::load(&config.build), &config);

    for factory in factories {
        let experiment = factory(&config);
        let start = Instant::now();

        info!("Running {} ({} points)", experiment.name, experiment.points.len());
        let summary = sweep.run(&experiment)?;
        info!(
            "{} took {:?}: {} points, {} rows, {} pruned, {} timed out, {} rows skipped",
            experiment.name,
            start.elapsed(),
            summary.points,
            summary.rows,
            summary.pruned,
            summary.timeouts,
            summary.skipped_rows
        );
    }

    info!("Compiled the benchmark {} times", sweep.builds());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("teebench=info")),
        )
        .init();

    let args = Args::parse();

    if args.list {
        experiments::names().for_each(|name| println!("{name}"));
        return ExitCode::SUCCESS;
    }

    let start = Instant::now();
    match run(args) {
        Ok(()) => {
            info!("Execution time: {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
