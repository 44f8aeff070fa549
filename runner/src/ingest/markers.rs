use super::TrialMetrics;
use once_cell::sync::Lazy;
use regex::Regex;

pub const THROUGHPUT: &str = "throughput";
pub const AVERAGE_THROUGHPUT: &str = "average-throughput";
pub const CYCLES_PER_TUPLE: &str = "cycles-per-tuple";
pub const PARTITION_STATS: &str = "partition-stats";
pub const TIMER_PER_PARTITION: &str = "timer-per-partition";
pub const QUERY_THROUGHPUT: &str = "query-throughput";
pub const QUERY_TIME_TOTAL: &str = "query-time-total";
pub const QUERY_TIME_SELECTION: &str = "query-time-selection";
pub const QUERY_TIME_JOIN: &str = "query-time-join";
pub const TPCH_JOIN_TIMERS: [&str; 3] = ["join-1-timer", "join-2-timer", "join-3-timer"];

pub const PHASE_PREFIX: &str = "phase.";

/// metric name of a `Phase <name>` line
pub fn phase(name: &str) -> String {
    format!("{PHASE_PREFIX}{name}")
}

static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+").expect("valid float pattern"));
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid integer pattern"));

/// Which of the numeric literals on a line carries the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// zero based, counted from the start of the line
    Nth(usize),
    Last,
}

impl Position {
    fn pick<'a>(self, mut literals: impl Iterator<Item = &'a str>) -> Option<&'a str> {
        match self {
            Self::Nth(n) => literals.nth(n),
            Self::Last => literals.last(),
        }
    }
}

/// How the value of a marker line is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Float(Position),
    Integer(Position),
    /// comma separated integers after the first `:` following the marker
    Record,
}

/// Name the extracted value is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    Fixed(&'static str),
    /// `phase.<word>` where word is the token right after the marker
    Phase,
}

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub needle: &'static str,
    pub metric: MetricName,
    pub token: Token,
}

impl Marker {
    const fn new(needle: &'static str, metric: &'static str, token: Token) -> Self {
        Self {
            needle,
            metric: MetricName::Fixed(metric),
            token,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(self.needle)
    }

    fn name(&self, line: &str) -> Option<String> {
        match self.metric {
            MetricName::Fixed(name) => Some(name.to_string()),
            MetricName::Phase => {
                let (_, rest) = line.split_once(self.needle)?;

                rest.split_whitespace().next().map(phase)
            }
        }
    }

    /// record the value of `line` into `metrics`, returns false if the line had no usable value
    pub fn apply(&self, line: &str, metrics: &mut TrialMetrics) -> bool {
        let Some(name) = self.name(line) else {
            return false;
        };

        match self.token {
            Token::Float(position) => {
                match position
                    .pick(FLOAT.find_iter(line).map(|m| m.as_str()))
                    .and_then(|literal| literal.parse::<f64>().ok())
                {
                    Some(value) => {
                        metrics.push_scalar(name, value);
                        true
                    }
                    None => false,
                }
            }
            Token::Integer(position) => {
                match position
                    .pick(INTEGER.find_iter(line).map(|m| m.as_str()))
                    .and_then(|literal| literal.parse::<u64>().ok())
                {
                    Some(value) => {
                        metrics.push_scalar(name, value as f64);
                        true
                    }
                    None => false,
                }
            }
            Token::Record => {
                let Some(record) = line
                    .split_once(self.needle)
                    .and_then(|(_, rest)| rest.split_once(':'))
                    .map(|(_, record)| record)
                else {
                    return false;
                };

                let values = INTEGER
                    .find_iter(record)
                    .map(|m| m.as_str().parse::<u64>())
                    .collect::<Result<Vec<_>, _>>();

                match values {
                    Ok(values) if !values.is_empty() => {
                        metrics.push_sequence(name, values);
                        true
                    }
                    _ => false,
                }
            }
        }
    }
}

/// Markers understood by the extractor, tried in order, first hit wins
///
/// Markers that contain another marker (`QueryThroughput` contains `Throughput`) have to be
/// listed before it.
pub static MARKERS: &[Marker] = &[
    Marker::new("QueryThroughput", QUERY_THROUGHPUT, Token::Float(Position::Nth(1))),
    Marker::new("QueryTimeTotal", QUERY_TIME_TOTAL, Token::Integer(Position::Last)),
    Marker::new("QueryTimeSelection", QUERY_TIME_SELECTION, Token::Integer(Position::Nth(2))),
    Marker::new("QueryTimeJoin", QUERY_TIME_JOIN, Token::Integer(Position::Nth(2))),
    Marker::new("Join 1 timer", TPCH_JOIN_TIMERS[0], Token::Integer(Position::Last)),
    Marker::new("Join 2 timer", TPCH_JOIN_TIMERS[1], Token::Integer(Position::Last)),
    Marker::new("Join 3 timer", TPCH_JOIN_TIMERS[2], Token::Integer(Position::Last)),
    Marker::new("Average throughput", AVERAGE_THROUGHPUT, Token::Float(Position::Nth(1))),
    Marker::new("CPU Cycles-per-tuple", CYCLES_PER_TUPLE, Token::Integer(Position::Last)),
    Marker::new("Partition stats", PARTITION_STATS, Token::Record),
    Marker::new("TimerPerPartition", TIMER_PER_PARTITION, Token::Record),
    Marker {
        needle: "Phase ",
        metric: MetricName::Phase,
        token: Token::Integer(Position::Last),
    },
    Marker::new("Throughput", THROUGHPUT, Token::Float(Position::Nth(1))),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn single(line: &str) -> TrialMetrics {
        let mut metrics = TrialMetrics::default();
        let marker = MARKERS
            .iter()
            .find(|marker| marker.matches(line))
            .expect("line should match a marker");

        assert!(marker.apply(line, &mut metrics), "no value in {line:?}");
        metrics
    }

    #[test]
    fn every_marker_is_reachable() {
        for (index, marker) in MARKERS.iter().enumerate() {
            let shadowed_by = MARKERS[..index]
                .iter()
                .find(|earlier| marker.needle.contains(earlier.needle));

            assert!(
                shadowed_by.is_none(),
                "{} is shadowed by {:?}",
                marker.needle,
                shadowed_by.map(|m| m.needle)
            );
        }
    }

    #[test]
    fn phase_name_is_word_after_marker() {
        let metrics = single("[ 0.1][ INFO] Phase Total (cycles) : 9001");

        assert_eq!(metrics.samples("phase.Total"), &[9001.0]);
    }

    #[test]
    fn repeated_phase_lines_accumulate() {
        let mut metrics = TrialMetrics::default();
        let marker = MARKERS.iter().find(|m| m.needle == "Phase ").unwrap();

        for line in ["Phase probe : 10", "Phase probe : 30", "Phase probe : 20"] {
            assert!(marker.apply(line, &mut metrics));
        }

        assert_eq!(metrics.samples("phase.probe"), &[10.0, 30.0, 20.0]);
    }

    #[test]
    fn float_position_out_of_range() {
        let mut metrics = TrialMetrics::default();
        let marker = MARKERS.iter().find(|m| m.needle == "Throughput").unwrap();

        assert!(!marker.apply("Throughput : 12.5", &mut metrics));
        assert!(metrics.is_empty());
    }

    #[test]
    fn record_needs_a_colon() {
        let mut metrics = TrialMetrics::default();
        let marker = MARKERS.iter().find(|m| m.needle == "Partition stats").unwrap();

        assert!(!marker.apply("Partition stats 1,2,3", &mut metrics));
        assert!(marker.apply("Partition stats: 1,2,3", &mut metrics));
        assert_eq!(metrics.sequences(PARTITION_STATS), &[vec![1, 2, 3]]);
    }

    #[test]
    fn integer_overflow_is_ignored() {
        let mut metrics = TrialMetrics::default();
        let marker = MARKERS
            .iter()
            .find(|m| m.needle == "CPU Cycles-per-tuple")
            .unwrap();

        assert!(!marker.apply(
            "CPU Cycles-per-tuple : 99999999999999999999999",
            &mut metrics
        ));
    }
}
