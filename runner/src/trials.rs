use crate::{
    executors::{Executor, ExecutorError},
    ingest::{self, markers, TrialMetrics},
    job::RunConfiguration,
};
use std::collections::BTreeMap;
use tracing::{debug, instrument, trace, warn};

/// value reported for metrics that could not be measured and are not throughput-like
pub const DEFAULT_SENTINEL: f64 = 999.0;

/// Placeholders for metrics without a single successful sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sentinels {
    default: f64,
    overrides: BTreeMap<String, f64>,
}

impl Default for Sentinels {
    /// throughput is reported as 0, everything else (cycles, timers) as 999
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
            .with(markers::THROUGHPUT, 0.0)
            .with(markers::AVERAGE_THROUGHPUT, 0.0)
            .with(markers::QUERY_THROUGHPUT, 0.0)
    }
}

impl Sentinels {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.overrides.insert(metric.into(), value);
        self
    }

    pub fn get(&self, metric: &str) -> f64 {
        self.overrides.get(metric).copied().unwrap_or(self.default)
    }
}

/// Median of the samples, the mean of the two middle values for an even count
///
/// NaN samples are ordered with `total_cmp`, they never show up in benchmark output.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Result of running one configuration `reps` times
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub config: RunConfiguration,
    pub trials: usize,
    timed_out: bool,
    medians: BTreeMap<String, f64>,
    sequences: BTreeMap<String, Vec<Vec<u64>>>,
    sentinels: Sentinels,
}

impl Aggregate {
    pub fn from_trials(config: RunConfiguration, trials: &[TrialMetrics], sentinels: Sentinels) -> Self {
        let mut samples: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut sequences: BTreeMap<String, Vec<Vec<u64>>> = BTreeMap::new();

        for trial in trials {
            for (name, values) in trial.scalars() {
                samples.entry(name).or_default().extend_from_slice(values);
            }
            for (name, values) in trial.sequence_metrics() {
                sequences
                    .entry(name.to_string())
                    .or_default()
                    .extend(values.iter().cloned());
            }
        }

        let medians = samples
            .into_iter()
            .filter_map(|(name, values)| median(&values).map(|m| (name.to_string(), m)))
            .collect();

        Self {
            config,
            trials: trials.len(),
            timed_out: false,
            medians,
            sequences,
            sentinels,
        }
    }

    /// aggregate of a configuration that hit the timeout, every metric reports its sentinel
    pub fn timeout(config: RunConfiguration, trials: usize, sentinels: Sentinels) -> Self {
        Self {
            config,
            trials,
            timed_out: true,
            medians: BTreeMap::new(),
            sequences: BTreeMap::new(),
            sentinels,
        }
    }

    /// median of the metric or its sentinel if it was never measured
    pub fn value(&self, metric: &str) -> f64 {
        self.medians
            .get(metric)
            .copied()
            .unwrap_or_else(|| self.sentinels.get(metric))
    }

    #[cfg(test)]
    pub fn has(&self, metric: &str) -> bool {
        self.medians.contains_key(metric)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// `(name, median)` of every `Phase <name>` metric, in name order
    pub fn phases(&self) -> impl Iterator<Item = (&str, f64)> {
        self.medians.iter().filter_map(|(name, value)| {
            name.strip_prefix(markers::PHASE_PREFIX)
                .map(|phase| (phase, *value))
        })
    }

    /// every record of a sequence metric, trial after trial
    pub fn sequences(&self, metric: &str) -> &[Vec<u64>] {
        self.sequences
            .get(metric)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Run `config` `reps` times and reduce every metric to its median
///
/// The first timeout ends the repetitions and yields an all-sentinel aggregate. Any other
/// executor error is returned to the caller.
#[instrument(skip(executor, config, sentinels), fields(config = %config))]
pub fn aggregate<E: Executor>(
    executor: &mut E,
    config: &RunConfiguration,
    reps: usize,
    sentinels: &Sentinels,
) -> Result<Aggregate, ExecutorError> {
    let args = config.args();
    let mut trials = Vec::with_capacity(reps);

    for rep in 0..reps {
        match executor.execute(&args) {
            Ok(output) => {
                let metrics = ingest::extract(&output.stdout);

                debug!(
                    "Trial {}/{reps} took {} ms: {metrics:?}",
                    rep + 1,
                    output.runtime / 1_000_000
                );
                if !output.stderr.is_empty() {
                    trace!("Trial {}/{reps} stderr: {}", rep + 1, output.stderr);
                }
                trials.push(metrics);
            }
            Err(ExecutorError::Timeout(timeout)) => {
                warn!(
                    "Trial {}/{reps} timed out after {timeout:?}, reporting sentinels for {config}",
                    rep + 1
                );

                return Ok(Aggregate::timeout(config.clone(), rep + 1, sentinels.clone()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Aggregate::from_trials(config.clone(), &trials, sentinels.clone()))
}
