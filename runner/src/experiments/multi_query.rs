//! Concurrent queries of the MULTI_QUERY application
use super::{build_with_enclave, DATASETS};
use crate::{
    compile::Application,
    config::BenchConfig,
    database::{Row, Schema},
    ingest::markers::AVERAGE_THROUGHPUT,
    job::{Input, RunConfiguration},
    sweep::{Experiment, Point},
    trials::Aggregate,
};
use itertools::iproduct;

const ALGS: [&str; 4] = ["CrkJoin", "RHO", "MCJoin", "PaMeCo"];
const MEMORY: u32 = 100;
const QUERIES: u32 = 8;

fn throughput(aggregate: &Aggregate) -> f64 {
    aggregate.value(AVERAGE_THROUGHPUT)
}

fn run(config: &BenchConfig, alg: &str, ds: char, queries: u32, delay: u32) -> RunConfiguration {
    RunConfiguration::new(alg, config.threads(alg), Input::Dataset(ds))
        .memory(MEMORY)
        .queries(queries)
        .delay(delay)
}

pub fn queries(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 3).application(Application::MultiQuery);

    Experiment::new(
        "multi-query-queries",
        "multi-query-queries.csv",
        Schema::new(&["alg", "dataset", "queries", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(&point.run.alg)
                .text(&point.label)
                .text(point.run.queries.unwrap_or_default())
                .float(throughput(aggregate), 4)]
        },
    )
    .points(iproduct!(ALGS, ['A', 'D'], 1..=17).map(|(alg, ds, queries)| {
        Point::new(&build, run(config, alg, ds, queries, 0), ds.to_string())
    }))
}

/// Eight queries with a growing pause between their arrivals
pub fn delays(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 4).application(Application::MultiQuery);

    Experiment::new(
        "multi-query-delays",
        "multi-query-delays.csv",
        Schema::new(&["alg", "dataset", "queries", "delay", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(&point.run.alg)
                .text(&point.label)
                .text(point.run.queries.unwrap_or_default())
                .text(point.run.delay.unwrap_or_default())
                .float(throughput(aggregate), 4)]
        },
    )
    .points(
        iproduct!(ALGS, ['A', 'D'], (500..=15000).step_by(500)).map(|(alg, ds, delay)| {
            Point::new(&build, run(config, alg, ds, QUERIES, delay), ds.to_string())
        }),
    )
}

pub fn eight_queries(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 8).application(Application::MultiQuery);
    let algs = ["BHJ", "RHO", "MCJoin", "PaMeCo", "CRKJ"];

    Experiment::new(
        "multi-query-eight-queries",
        "multi-query-eight-queries.csv",
        Schema::new(&["dataset", "alg", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(&point.label)
                .text(&point.run.alg)
                .float(throughput(aggregate), 4)]
        },
    )
    .points(iproduct!(DATASETS, algs).map(|(ds, alg)| {
        Point::new(&build, run(config, alg, ds, QUERIES, 0), ds.to_string())
    }))
}
