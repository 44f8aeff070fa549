//! Join experiments of the TEE_BENCH application
use super::{build, build_with_enclave, millions, sizes, DATASETS};
use crate::{
    config::BenchConfig,
    database::{Field, Row, Schema},
    ingest::markers::{CYCLES_PER_TUPLE, PARTITION_STATS, THROUGHPUT, TIMER_PER_PARTITION},
    job::{Input, RunConfiguration},
    sweep::{Experiment, Point},
    trials::Aggregate,
};
use itertools::iproduct;

const BITS_SIZES: [u64; 8] = [4, 8, 16, 32, 64, 128, 256, 512];
/// `(label, R factor, S factor)`
const BITS_SHAPES: [(&str, u64, u64); 5] = [
    ("S=R", 1, 1),
    ("S=10R", 1, 10),
    ("S=50R", 1, 50),
    ("10S=R", 10, 1),
    ("50S=R", 50, 1),
];
const SKEWS: [f64; 10] = [0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3];
const PARTITION_BITS: u32 = 10;
const PARTITION_THREADS: usize = 4;

fn throughput(aggregate: &Aggregate) -> f64 {
    aggregate.value(THROUGHPUT)
}

pub fn comparison(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 4);
    let algs = ["NL", "BHJ", "RHO", "MCJoin", "PaMeCo", "CrkJoin"];

    Experiment::new(
        "crkj-comparison",
        "crkj-comparison.csv",
        Schema::new(&["alg", "threads", "ds", "memRestriction", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(&point.run.alg)
                .int(point.run.threads as u64)
                .text(&point.label)
                .int(point.run.memory.unwrap_or_default().into())
                .float(throughput(aggregate), 2)]
        },
    )
    .points(iproduct!(DATASETS, algs).map(|(ds, alg)| {
        let run = RunConfiguration::new(alg, config.threads(alg), Input::Dataset(ds)).memory(275);
        Point::new(&build, run, ds.to_string())
    }))
}

/// Throughput and cycles of CrkJoin over the number of partitioning bits
pub fn bits(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 4);

    Experiment::new(
        "crkj-bits",
        "crkj-bits-output.csv",
        Schema::new(&[
            "alg",
            "threads",
            "dataset",
            "sizeR",
            "sizeS",
            "bits",
            "throughput",
            "cycles-per-tuple",
        ]),
        |point, aggregate| {
            let (r, s) = sizes(point);
            let bits = match point.run.bits {
                Some(bits) => bits.to_string(),
                None => String::new(),
            };

            vec![Row::new()
                .text(&point.run.alg)
                .int(point.run.threads as u64)
                .text(&point.label)
                .int(r / 1_000_000)
                .int(s / 1_000_000)
                .text(bits)
                .float(throughput(aggregate), 2)
                .float(aggregate.value(CYCLES_PER_TUPLE), 2)]
        },
    )
    .points(
        iproduct!(BITS_SHAPES, BITS_SIZES, 1..=16).map(|((label, r, s), size, bits)| {
            let input = Input::Sizes {
                r: millions(r * size),
                s: millions(s * size),
            };
            Point::new(
                &build,
                RunConfiguration::new("CRKJ", 1, input).bits(bits),
                label,
            )
        }),
    )
    // few partitions for large inputs take forever
    .prune(|point| {
        let (r, s) = sizes(point);
        r.min(s) >= millions(64) && point.run.bits.map_or(false, |bits| bits < 5)
    })
}

/// Cycles spent in every phase of CrkJoin, one row per phase
pub fn phases(config: &BenchConfig) -> Experiment {
    let build = build(config);
    let ten_r = [1, 2, 4, 8, 16, 32, 64, 128, 256].map(|r| ("S=10R", r, 10 * r));
    let equal = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048].map(|r| ("S=R", r, r));

    Experiment::new(
        "crkj-phases",
        "crkj-phases.csv",
        Schema::new(&["mode", "alg", "ds", "sizeR", "sizeS", "phase", "cycles"]),
        |point, aggregate| {
            let (r, s) = sizes(point);

            aggregate
                .phases()
                .map(|(phase, cycles)| {
                    Row::new()
                        .text(point.build.mode)
                        .text(&point.run.alg)
                        .text(&point.label)
                        .int(r)
                        .int(s)
                        .text(phase)
                        .float(cycles, 1)
                })
                .collect()
        },
    )
    .points(ten_r.into_iter().chain(equal).map(|(label, r, s)| {
        let input = Input::Sizes {
            r: millions(r),
            s: millions(s),
        };
        Point::new(&build, RunConfiguration::new("CrkJoin", 1, input), label)
    }))
}

/// Per partition statistics of a single large CrkJoin run
pub fn partition_phases(config: &BenchConfig) -> Experiment {
    let input = Input::Sizes {
        r: millions(128),
        s: millions(1280),
    };
    let run = RunConfiguration::new("CrkJoin", 1, input).bits(8);

    Experiment::new(
        "crkj-partition-phases",
        "crkj-partition-phases.csv",
        Schema::new(&["id", "timeMillis", "cyclesHT", "cyclesPartition", "cyclesProbe"]),
        |_, aggregate| records(aggregate, PARTITION_STATS),
    )
    .reps(1)
    .points([Point::new(&build(config), run, "")])
}

/// Time spent per partition and thread with skewed input
pub fn time_per_partition(config: &BenchConfig) -> Experiment {
    let build = build(config).flag("MEASURE_PARTITIONS");
    let run = RunConfiguration::new("CRKJ", PARTITION_THREADS, Input::Dataset('A'))
        .bits(PARTITION_BITS)
        .skew(0.4);

    Experiment::new(
        "crkj-time-per-partition",
        "crkj-time-per-partition-skew.csv",
        Schema::numbered("p", (1 << PARTITION_BITS) / PARTITION_THREADS),
        |_, aggregate| records(aggregate, TIMER_PER_PARTITION),
    )
    .points([Point::new(&build, run, "A")])
}

fn records(aggregate: &Aggregate, metric: &str) -> Vec<Row> {
    aggregate
        .sequences(metric)
        .iter()
        .map(|record| record.iter().copied().map(Field::Int).collect::<Row>())
        .collect()
}

pub fn skew(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 4);
    let algs = ["CrkJoin", "RHO", "MCJoin", "PaMeCo"];

    Experiment::new(
        "crkj-skew",
        "crkj-skew.csv",
        Schema::new(&["mode", "alg", "ds", "skew", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(point.build.mode)
                .text(&point.run.alg)
                .text(&point.label)
                .text(point.run.skew.unwrap_or_default())
                .float(throughput(aggregate), 2)]
        },
    )
    .points(iproduct!(algs, ['A', 'B'], SKEWS).map(|(alg, ds, skew)| {
        let run = RunConfiguration::new(alg, config.threads(alg), Input::Dataset(ds))
            .skew(skew)
            .memory(config.memory(alg));
        Point::new(&build, run, ds.to_string())
    }))
}

pub fn multi_threading(config: &BenchConfig) -> Experiment {
    let build = build_with_enclave(config, 8);

    Experiment::new(
        "crkj-multi-threading",
        "crkj-multi-threading.csv",
        Schema::new(&["mode", "alg", "dataset", "threads", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(point.build.mode)
                .text(&point.run.alg)
                .text(&point.label)
                .int(point.run.threads as u64)
                .float(throughput(aggregate), 4)]
        },
    )
    .points(
        iproduct!(["CrkJoin", "RHO"], DATASETS, 1..=16).map(|(alg, ds, threads)| {
            let run = RunConfiguration::new(alg, threads, Input::Dataset(ds)).memory(config.memory(alg));
            Point::new(&build, run, ds.to_string())
        }),
    )
}

/// Scaling of the input size, RHO needs the large enclave
pub fn scale_input(config: &BenchConfig) -> Experiment {
    let default = build(config);
    let large = build_with_enclave(config, 32);
    let shapes = [1, 2, 4, 8, 16, 32, 64, 128]
        .map(|r| ("S=10R", r, 10 * r))
        .into_iter()
        .chain([1, 2, 4, 8, 16, 32, 64, 128, 256, 512].map(|r| ("S=R", r, r)))
        .collect::<Vec<_>>();

    let points = ["CrkJoin", "MCJoin", "PaMeCo", "RHO"]
        .into_iter()
        .flat_map(|alg| shapes.iter().map(move |shape| (alg, *shape)))
        .map(|(alg, (label, r, s))| {
            let build = if alg == "RHO" { &large } else { &default };
            let run = RunConfiguration::new(
                alg,
                config.threads(alg),
                Input::Sizes {
                    r: millions(r),
                    s: millions(s),
                },
            )
            .memory(config.memory(alg))
            .bits(13);
            Point::new(build, run, label)
        })
        .collect::<Vec<_>>();

    Experiment::new(
        "crkj-scale-input",
        "crkj-scale-input.csv",
        Schema::new(&[
            "mode",
            "alg",
            "threads",
            "dsName",
            "M_R",
            "M_S",
            "throughput",
            "cycles-per-tuple",
        ]),
        |point, aggregate| {
            let (r, s) = sizes(point);

            vec![Row::new()
                .text(point.build.mode)
                .text(&point.run.alg)
                .int(point.run.threads as u64)
                .text(&point.label)
                .int(r / 1_000_000)
                .int(s / 1_000_000)
                .float(throughput(aggregate), 2)
                .float(aggregate.value(CYCLES_PER_TUPLE), 2)]
        },
    )
    .points(points)
}

fn sizes_row(point: &Point, aggregate: &Aggregate) -> Vec<Row> {
    let (r, s) = sizes(point);

    vec![Row::new()
        .text(point.build.mode)
        .text(&point.run.alg)
        .int(point.run.threads as u64)
        .int(r)
        .int(s)
        .float(throughput(aggregate), 2)]
}

fn sizes_schema() -> Schema {
    Schema::new(&["mode", "alg", "threads", "sizeR", "sizeS", "throughput"])
}

/// Growing R against a fixed S, four stops per doubling
pub fn scale_r(config: &BenchConfig) -> Experiment {
    let build = build(config);
    let s_sizes = [160, 320, 640, 1280, 2560].map(millions);
    // 16 MB of 8 byte tuples
    let r_init = 131_072.0 * 128.0 / 8.0;

    Experiment::new("crkj-scale-r", "crkj-scale-r.csv", sizes_schema(), sizes_row)
        .reps(1)
        .points(iproduct!(s_sizes, 4..=28).map(|(s, i)| {
            let r = (2f64.powf(i as f64 / 4.0) * r_init) as u64;
            Point::new(&build, RunConfiguration::new("CRKJ", 1, Input::Sizes { r, s }), "")
        }))
        .prune(|point| {
            let (r, s) = sizes(point);
            r > s
        })
}

pub fn scale_s(config: &BenchConfig) -> Experiment {
    let build = build(config);
    let threads = config.threads("CRKJ");

    Experiment::new("crkj-scale-s", "crkj-scale-s.csv", sizes_schema(), sizes_row).points(
        iproduct!([4, 8, 16, 32, 64, 128].map(millions), 1..=9).map(|(r, i)| {
            let input = Input::Sizes { r, s: r * i };
            Point::new(&build, RunConfiguration::new("CRKJ", threads, input), "")
        }),
    )
}

/// Build phase only, S is empty
pub fn scale_build_phase(config: &BenchConfig) -> Experiment {
    let build = build(config);

    Experiment::new(
        "crkj-scale-build-phase",
        "crkj-scale-build-phase.csv",
        Schema::new(&["mode", "alg", "threads", "dsName", "sizeR", "throughput"]),
        |point, aggregate| {
            vec![Row::new()
                .text(point.build.mode)
                .text(&point.run.alg)
                .int(point.run.threads as u64)
                .text(&point.label)
                .int(sizes(point).0)
                .float(throughput(aggregate), 2)]
        },
    )
    .points((4..=40).map(|i| {
        let r = (2f64.powf(i as f64 / 4.0) * 1_000_000.0) as u64;
        Point::new(&build, RunConfiguration::new("CRKJ", 1, Input::Sizes { r, s: 0 }), "S=0")
    }))
}

/// MCJoin throughput over its memory limit
pub fn mcj_memory(config: &BenchConfig) -> Experiment {
    let build = build(config);
    let input = Input::Sizes {
        r: millions(32),
        s: millions(320),
    };

    Experiment::new(
        "mcj-memory",
        "mcj-memory-output.csv",
        Schema::new(&["alg", "sizeR", "sizeS", "memory", "throughput"]),
        |point, aggregate| {
            let (r, s) = sizes(point);

            vec![Row::new()
                .text(&point.run.alg)
                .int(r)
                .int(s)
                .int(point.run.memory.unwrap_or_default().into())
                .float(throughput(aggregate), 2)]
        },
    )
    .points((80..300).step_by(5).map(|memory| {
        Point::new(&build, RunConfiguration::new("MCJ", 1, input).memory(memory), "")
    }))
}
