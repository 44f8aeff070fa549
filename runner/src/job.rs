use std::fmt;

/// Where the benchmark takes its input relations from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// one of the predefined datasets, selected by letter (`-d A`)
    Dataset(char),
    /// synthetic relations with explicit tuple counts (`-r <R> -s <S>`)
    Sizes { r: u64, s: u64 },
    /// TPC-H scale factor (`-s <scale>`)
    Scale(u32),
}

impl Input {
    /// Tuple counts of R and S if the input was given explicitly
    pub fn sizes(&self) -> Option<(u64, u64)> {
        match *self {
            Self::Sizes { r, s } => Some((r, s)),
            _ => None,
        }
    }
}

/// Full set of parameters for one invocation of the join benchmark
///
/// Built once with [`RunConfiguration::new`] and the chained setters, afterwards it is only
/// read. Two equal configurations produce the exact same command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub alg: String,
    pub threads: usize,
    pub input: Input,
    /// partitioning bits handed to `-b`
    pub bits: Option<u32>,
    pub memory: Option<u32>,
    pub skew: Option<f64>,
    pub queries: Option<u32>,
    pub delay: Option<u32>,
}

impl RunConfiguration {
    pub fn new(alg: impl Into<String>, threads: usize, input: Input) -> Self {
        Self {
            alg: alg.into(),
            threads,
            input,
            bits: None,
            memory: None,
            skew: None,
            queries: None,
            delay: None,
        }
    }

    pub fn bits(mut self, bits: u32) -> Self {
        self.bits = Some(bits);
        self
    }

    /// memory limit in MB
    pub fn memory(mut self, memory: u32) -> Self {
        self.memory = Some(memory);
        self
    }

    /// zipf factor of the S relation
    pub fn skew(mut self, skew: f64) -> Self {
        self.skew = Some(skew);
        self
    }

    pub fn queries(mut self, queries: u32) -> Self {
        self.queries = Some(queries);
        self
    }

    /// delay between concurrent queries in ms
    pub fn delay(mut self, delay: u32) -> Self {
        self.delay = Some(delay);
        self
    }

    /// encode the configuration as command line flags of the benchmark binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-a".to_string(),
            self.alg.clone(),
            "-n".to_string(),
            self.threads.to_string(),
        ];

        match self.input {
            Input::Dataset(letter) => {
                args.push("-d".to_string());
                args.push(letter.to_string());
            }
            Input::Sizes { r, s } => {
                args.push("-r".to_string());
                args.push(r.to_string());
                args.push("-s".to_string());
                args.push(s.to_string());
            }
            Input::Scale(scale) => {
                args.push("-s".to_string());
                args.push(scale.to_string());
            }
        }

        if let Some(bits) = self.bits {
            args.push("-b".to_string());
            args.push(bits.to_string());
        }
        if let Some(memory) = self.memory {
            args.push("-m".to_string());
            args.push(memory.to_string());
        }
        if let Some(skew) = self.skew {
            args.push("-z".to_string());
            args.push(skew.to_string());
        }
        if let Some(queries) = self.queries {
            args.push("-q".to_string());
            args.push(queries.to_string());
        }
        if let Some(delay) = self.delay {
            args.push("-p".to_string());
            args.push(delay.to_string());
        }

        args
    }
}

impl fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}
