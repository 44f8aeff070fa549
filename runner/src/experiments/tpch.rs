//! TPC-H queries of the TPCH application
use super::build_with_enclave;
use crate::{
    compile::Application,
    config::BenchConfig,
    database::{Row, Schema},
    ingest::markers::{
        QUERY_THROUGHPUT, QUERY_TIME_JOIN, QUERY_TIME_SELECTION, QUERY_TIME_TOTAL,
        TPCH_JOIN_TIMERS,
    },
    job::{Input, RunConfiguration},
    sweep::{Experiment, Point},
    trials::Sentinels,
};
use itertools::iproduct;

pub fn queries(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 4).application(Application::Tpch);
    // not every query plan has a second or third join
    let sentinels = Sentinels::default()
        .with(TPCH_JOIN_TIMERS[1], 0.0)
        .with(TPCH_JOIN_TIMERS[2], 0.0);

    Experiment::new(
        "tpch-queries",
        "tpch-queries.csv",
        Schema::new(&[
            "alg",
            "query",
            "scale",
            "timeTotalUs",
            "timeSelectionUs",
            "timeJoinUs",
            "throughput",
            "join1Us",
            "join2Us",
            "join3Us",
        ]),
        |point, aggregate| {
            let scale = match point.run.input {
                Input::Scale(scale) => scale.to_string(),
                _ => String::new(),
            };
            let row = Row::new()
                .text(&point.run.alg)
                .text(point.run.queries.unwrap_or_default())
                .text(scale)
                .float(aggregate.value(QUERY_TIME_TOTAL), 2)
                .float(aggregate.value(QUERY_TIME_SELECTION), 2)
                .float(aggregate.value(QUERY_TIME_JOIN), 2)
                .float(aggregate.value(QUERY_THROUGHPUT), 4);

            vec![TPCH_JOIN_TIMERS
                .iter()
                .fold(row, |row, timer| row.float(aggregate.value(timer), 2))]
        },
    )
    .sentinels(sentinels)
    .points(
        iproduct!([1, 10], ["CrkJoin", "RHO", "MCJoin"], [3, 10, 12, 19]).map(
            |(scale, alg, query)| {
                let run = RunConfiguration::new(alg, config.threads(alg), Input::Scale(scale))
                    .memory(275)
                    .queries(query);
                Point::new(&build, run, "")
            },
        ),
    )
}
