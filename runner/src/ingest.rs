pub mod ansi;
pub mod markers;

use self::markers::{Marker, MARKERS};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone, Default)]
/// captured output of a successful run of the benchmark binary
/// supposed to be interpreted by `extract`
pub struct RunOutput {
    /// wall clock time in ns
    pub runtime: u128,
    pub stdout: String,
    pub stderr: String,
}

/// Named metrics scraped from the output of a single trial
///
/// Scalar metrics keep every value in the order their lines appeared. Sequence metrics
/// (per-partition timers, partition records) keep one vector per matching line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialMetrics {
    scalars: BTreeMap<String, Vec<f64>>,
    sequences: BTreeMap<String, Vec<Vec<u64>>>,
}

impl TrialMetrics {
    pub fn push_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.scalars.entry(name.into()).or_default().push(value);
    }

    pub fn push_sequence(&mut self, name: impl Into<String>, values: Vec<u64>) {
        self.sequences.entry(name.into()).or_default().push(values);
    }

    /// all values recorded for a scalar metric, empty if the metric never showed up
    #[cfg(test)]
    pub fn samples(&self, name: &str) -> &[f64] {
        self.scalars.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn sequences(&self, name: &str) -> &[Vec<u64>] {
        self.sequences.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.scalars
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn sequence_metrics(&self) -> impl Iterator<Item = (&str, &[Vec<u64>])> {
        self.sequences
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.sequences.is_empty()
    }
}

/// Scan the output of one trial line by line and collect every known metric
///
/// Escape sequences are removed before any matching. Each line is attributed to the first
/// marker it contains; lines without a marker are skipped.
pub fn extract(text: &str) -> TrialMetrics {
    extract_with(text, MARKERS)
}

pub fn extract_with(text: &str, markers: &[Marker]) -> TrialMetrics {
    let mut metrics = TrialMetrics::default();

    for raw in text.lines() {
        let line = ansi::strip(raw);

        if let Some(marker) = markers.iter().find(|marker| marker.matches(&line)) {
            if !marker.apply(&line, &mut metrics) {
                trace!(marker = marker.needle, line = %line, "Marker matched without a usable value");
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::markers::{
        phase, AVERAGE_THROUGHPUT, CYCLES_PER_TUPLE, PARTITION_STATS, QUERY_THROUGHPUT,
        QUERY_TIME_JOIN, QUERY_TIME_SELECTION, QUERY_TIME_TOTAL, THROUGHPUT, TIMER_PER_PARTITION,
        TPCH_JOIN_TIMERS,
    };
    use super::*;
    use proptest::prelude::*;

    const CRKJ_OUTPUT: &str = "\
[    0.0012][ INFO] Initialize enclave
[    1.2031][ INFO] Phase build (cycles)     : 1200340
[    1.2032][ INFO] Phase partition (cycles) : 880123
[    1.2032][ INFO] Phase probe (cycles)     : 403998
[    1.2033][ INFO] CPU Cycles-per-tuple     : 112
[    1.2034][ INFO] Time total (usec)        : 58120
[    1.2034][ INFO] Throughput (M rec/sec)   : 81.3401
";

    #[test]
    fn throughput_is_second_float() {
        let metrics = extract("Throughput is 12.34 and 56.78 Mrec/s");

        assert_eq!(metrics.samples(THROUGHPUT), &[56.78]);
    }

    #[test]
    fn full_crkj_report() {
        let metrics = extract(CRKJ_OUTPUT);

        assert_eq!(metrics.samples(THROUGHPUT), &[81.3401]);
        assert_eq!(metrics.samples(CYCLES_PER_TUPLE), &[112.0]);
        assert_eq!(metrics.samples(&phase("build")), &[1200340.0]);
        assert_eq!(metrics.samples(&phase("partition")), &[880123.0]);
        assert_eq!(metrics.samples(&phase("probe")), &[403998.0]);
        assert_eq!(metrics.scalars().count(), 5);
    }

    #[test]
    fn average_throughput_is_its_own_metric() {
        let metrics = extract("[ 3.5000][ INFO] Average throughput (M rec/sec) : 20.1234");

        assert_eq!(metrics.samples(AVERAGE_THROUGHPUT), &[20.1234]);
        assert!(metrics.samples(THROUGHPUT).is_empty());
    }

    #[test]
    fn cycles_per_tuple_survives_colour_codes() {
        let coloured = "\x1b[32m[ 1.0100][ INFO]\x1b[0m CPU Cycles-per-tuple : \x1b[1m417\x1b[0m";
        let metrics = extract(coloured);

        assert_eq!(metrics.samples(CYCLES_PER_TUPLE), &[417.0]);
    }

    #[test]
    fn partition_stats_record() {
        let metrics = extract("[ 2.0000][ INFO] Partition stats: 3,120,4000,5000,6000");

        assert_eq!(
            metrics.sequences(PARTITION_STATS),
            &[vec![3, 120, 4000, 5000, 6000]]
        );
    }

    #[test]
    fn timer_per_partition_per_thread() {
        let output = "\
[ 2.0][ INFO] TimerPerPartitionThread0 : 10,20,30
[ 2.0][ INFO] TimerPerPartitionThread1 : \x1b[0m40,50,60\x1b[0m
";
        let metrics = extract(output);

        assert_eq!(
            metrics.sequences(TIMER_PER_PARTITION),
            &[vec![10, 20, 30], vec![40, 50, 60]]
        );
    }

    #[test]
    fn tpch_report() {
        let output = "\
[ 9.1000][ INFO] QueryTimeTotal (us)      : 912345
[ 9.1000][ INFO] QueryTimeSelection (us)  : 12000
[ 9.1000][ INFO] QueryTimeJoin (us)       : 900345
[ 9.1000][ INFO] Join 1 timer : 500000
[ 9.1000][ INFO] Join 2 timer : 400345
[ 9.1001][ INFO] QueryThroughput (M rec/s)   : 12.5512
";
        let metrics = extract(output);

        assert_eq!(metrics.samples(QUERY_TIME_TOTAL), &[912345.0]);
        assert_eq!(metrics.samples(QUERY_TIME_SELECTION), &[12000.0]);
        assert_eq!(metrics.samples(QUERY_TIME_JOIN), &[900345.0]);
        assert_eq!(metrics.samples(TPCH_JOIN_TIMERS[0]), &[500000.0]);
        assert_eq!(metrics.samples(TPCH_JOIN_TIMERS[1]), &[400345.0]);
        assert!(metrics.samples(TPCH_JOIN_TIMERS[2]).is_empty());
        // the query throughput line must not be counted as a join throughput
        assert_eq!(metrics.samples(QUERY_THROUGHPUT), &[12.5512]);
        assert!(metrics.samples(THROUGHPUT).is_empty());
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let metrics = extract("Initialize enclave\nCrkJ matches = 128000000\n\n");

        assert!(metrics.is_empty());
    }

    #[test]
    fn marker_without_number_is_absent() {
        // crash right after printing the label
        let metrics = extract("[ 0.5000][ INFO] Throughput (M rec/sec) :");

        assert!(metrics.samples(THROUGHPUT).is_empty());
    }

    proptest! {
        #[test]
        fn one_sample_per_throughput_line(values in prop::collection::vec(0u32..100_000, 0..20)) {
            let text = values
                .iter()
                .map(|v| format!("[ 1.0000][ INFO] Throughput (M rec/sec) : {}.{:02}", v / 100, v % 100))
                .collect::<Vec<_>>()
                .join("\n");
            let expected = values
                .iter()
                .map(|v| format!("{}.{:02}", v / 100, v % 100).parse::<f64>().unwrap())
                .collect::<Vec<_>>();

            let metrics = extract(&text);
            prop_assert_eq!(metrics.samples(THROUGHPUT), expected.as_slice());
        }

        #[test]
        fn extraction_is_pure(text in "(Throughput [0-9]{1,3}\\.[0-9] [0-9]\\.[0-9]\n|Phase [a-z]{1,5} : [0-9]{1,6}\n|noise\n){0,12}") {
            prop_assert_eq!(extract(&text), extract(&text));
        }
    }
}
