use crate::{
    compile::{BuildConfiguration, BuildError, Builder},
    config::BenchConfig,
    database::{Dataset, DatabaseError, Row, Schema},
    executors::{Executor, ExecutorError},
    job::RunConfiguration,
    trials::{self, Aggregate, Sentinels},
};
use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// One point of a parameter grid
#[derive(Debug, Clone)]
pub struct Point {
    pub build: BuildConfiguration,
    pub run: RunConfiguration,
    /// dataset name written to the row, e.g. `S=10R`
    pub label: String,
}

impl Point {
    pub fn new(build: &BuildConfiguration, run: RunConfiguration, label: impl Into<String>) -> Self {
        Self {
            build: build.clone(),
            run,
            label: label.into(),
        }
    }
}

/// A fully enumerated experiment
///
/// `points` are visited in order. Points for which `prune` returns true are skipped without
/// spawning anything; `rows` turns the aggregate of a point into the lines of the dataset.
pub struct Experiment {
    pub name: &'static str,
    pub file: &'static str,
    pub schema: Schema,
    pub sentinels: Sentinels,
    /// fixed repetitions, ignoring `reps` from the config
    pub reps: Option<usize>,
    pub points: Vec<Point>,
    pub prune: Option<fn(&Point) -> bool>,
    pub rows: fn(&Point, &Aggregate) -> Vec<Row>,
}

impl Experiment {
    pub fn new(
        name: &'static str,
        file: &'static str,
        schema: Schema,
        rows: fn(&Point, &Aggregate) -> Vec<Row>,
    ) -> Self {
        Self {
            name,
            file,
            schema,
            sentinels: Sentinels::default(),
            reps: None,
            points: Vec::new(),
            prune: None,
            rows,
        }
    }

    pub fn sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn reps(mut self, reps: usize) -> Self {
        self.reps = Some(reps);
        self
    }

    pub fn prune(mut self, prune: fn(&Point) -> bool) -> Self {
        self.prune = Some(prune);
        self
    }

    pub fn points(mut self, points: impl IntoIterator<Item = Point>) -> Self {
        self.points.extend(points);
        self
    }

    pub fn is_pruned(&self, point: &Point) -> bool {
        self.prune.map_or(false, |prune| prune(point))
    }
}

/// Remembers the build configuration of the binary on disk
pub struct BuildTracker<B> {
    builder: B,
    current: Option<BuildConfiguration>,
    builds: usize,
}

impl<B: Builder> BuildTracker<B> {
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            current: None,
            builds: 0,
        }
    }

    /// build `config` unless it is the active one, returns true if a build ran
    pub fn ensure(&mut self, config: &BuildConfiguration) -> Result<bool, BuildError> {
        if self.current.as_ref() == Some(config) {
            debug!("Reusing build {config}");
            return Ok(false);
        }

        // a failed build leaves the binary in an unknown state
        self.current = None;
        self.builder.build(config)?;
        self.current = Some(config.clone());
        self.builds += 1;

        Ok(true)
    }

    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub points: usize,
    pub pruned: usize,
    pub timeouts: usize,
    pub rows: usize,
    pub skipped_rows: usize,
}

/// Drives experiments one after another, sharing the executor and the active build
pub struct Sweep<E, B> {
    executor: E,
    builds: BuildTracker<B>,
    data_dir: PathBuf,
    reps: usize,
    experiment: bool,
}

impl<E: Executor, B: Builder> Sweep<E, B> {
    pub fn new(executor: E, builder: B, config: &BenchConfig) -> Self {
        Self {
            executor,
            builds: BuildTracker::new(builder),
            data_dir: config.data_dir.clone(),
            reps: config.reps,
            experiment: config.experiment,
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.builds()
    }

    #[instrument(skip_all, fields(experiment = experiment.name))]
    pub fn run(&mut self, experiment: &Experiment) -> Result<SweepSummary, SweepError> {
        let path = self.data_dir.join(experiment.file);

        if !self.experiment {
            plot_only(path, &experiment.schema);
            return Ok(SweepSummary::default());
        }

        let dataset = Dataset::create(path, experiment.schema.clone())?;
        let reps = experiment.reps.unwrap_or(self.reps);
        let total = experiment.points.len();
        let mut summary = SweepSummary::default();

        for (i, point) in experiment.points.iter().enumerate() {
            if experiment.is_pruned(point) {
                debug!("Pruned {}", point.run);
                summary.pruned += 1;
                continue;
            }

            self.builds.ensure(&point.build)?;

            let aggregate =
                match trials::aggregate(&mut self.executor, &point.run, reps, &experiment.sentinels) {
                    Ok(aggregate) => aggregate,
                    Err(e) => {
                        error!(config = %point.run, "Aborting {}: {e}", experiment.name);
                        if let ExecutorError::Failure { stdout, stderr, .. } = &e {
                            debug!("stdout of the failed run:\n{stdout}");
                            error!("stderr of the failed run:\n{stderr}");
                        }
                        return Err(e.into());
                    }
                };
            summary.points += 1;
            debug!("Aggregated {} trials of {}", aggregate.trials, aggregate.config);
            if aggregate.timed_out() {
                summary.timeouts += 1;
            }

            for row in (experiment.rows)(point, &aggregate) {
                match dataset.append(&row) {
                    Ok(()) => {
                        info!("{row}");
                        summary.rows += 1;
                    }
                    Err(e @ DatabaseError::Arity { .. }) => {
                        warn!("Skipping row {row}: {e}");
                        summary.skipped_rows += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            info!("Done with {}/{total}", i + 1);
        }

        info!(
            "Finished {} into {}",
            experiment.name,
            dataset.path().display()
        );

        Ok(summary)
    }
}

/// leave the dataset alone and report what the plots will be drawn from
fn plot_only(path: PathBuf, schema: &Schema) {
    match Dataset::open(path.clone(), schema.clone()).and_then(|dataset| dataset.rows()) {
        Ok(rows) => info!("Plotting from {} ({rows} rows)", path.display()),
        Err(DatabaseError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            warn!("No dataset at {}, run with `experiment: true` first", path.display())
        }
        Err(e) => warn!("Dataset {} is not usable for plotting: {e}", path.display()),
    }
}
