pub mod crkj;
pub mod multi_query;
pub mod tpch;

use crate::{
    compile::{self, BuildConfiguration},
    config::{BenchConfig, ConfigErrors},
    sweep::{Experiment, Point},
};

pub type Factory = fn(&BenchConfig) -> Experiment;

/// Every experiment the runner knows, in the order a full run executes them
pub static CATALOGUE: &[(&str, Factory)] = &[
    ("crkj-comparison", crkj::comparison),
    ("crkj-bits", crkj::bits),
    ("crkj-phases", crkj::phases),
    ("crkj-partition-phases", crkj::partition_phases),
    ("crkj-time-per-partition", crkj::time_per_partition),
    ("crkj-skew", crkj::skew),
    ("crkj-multi-threading", crkj::multi_threading),
    ("crkj-scale-input", crkj::scale_input),
    ("crkj-scale-r", crkj::scale_r),
    ("crkj-scale-s", crkj::scale_s),
    ("crkj-scale-build-phase", crkj::scale_build_phase),
    ("mcj-memory", crkj::mcj_memory),
    ("multi-query-queries", multi_query::queries),
    ("multi-query-delays", multi_query::delays),
    ("multi-query-eight-queries", multi_query::eight_queries),
    ("tpch-queries", tpch::queries),
];

pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOGUE.iter().map(|(name, _)| *name)
}

pub fn find(name: &str) -> Result<Factory, ConfigErrors> {
    CATALOGUE
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| ConfigErrors::UnknownExperiment(name.to_string()))
}

/// resolve the requested names, nothing requested means the whole catalogue
pub fn select(requested: &[String]) -> Result<Vec<Factory>, ConfigErrors> {
    if requested.is_empty() {
        Ok(CATALOGUE.iter().map(|(_, factory)| *factory).collect())
    } else {
        requested.iter().map(|name| find(name)).collect()
    }
}

pub const DATASETS: [char; 4] = ['A', 'B', 'C', 'D'];

pub fn millions(m: u64) -> u64 {
    m * 1_000_000
}

/// build for the configured mode with the default enclave
fn build(config: &BenchConfig) -> BuildConfiguration {
    BuildConfiguration::new(config.mode).debug(config.build.debug)
}

/// build for the configured mode with an enclave of `gb` gigabytes
fn build_with_enclave(config: &BenchConfig, gb: u32) -> BuildConfiguration {
    build(config).enclave(compile::enclave(gb))
}

/// tuple counts of R and S, zero when the point runs on a predefined dataset
fn sizes(point: &Point) -> (u64, u64) {
    point.run.input.sizes().unwrap_or_default()
}
