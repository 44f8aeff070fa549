use crate::compile::Mode;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

// true if the benchmark binary at `path` has any execute bit set
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    let metadata = fs::metadata(path).map_err(|source| ConfigErrors::Inaccessible {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.is_file() {
        return Err(ConfigErrors::NotABinary(path.to_path_buf()));
    }

    Ok(metadata.mode() & 0o111 != 0)
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("Config file is malformed: {0}")]
    Malformed(#[from] serde_yaml::Error),
    #[error("Benchmark binary {path} is not accessible: {source}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("Benchmark binary {0} is not a regular file")]
    NotABinary(PathBuf),
    #[error("Unknown experiment {0}, see --list")]
    UnknownExperiment(String),
    #[error("Config failed the preflight checks")]
    Preflight,
}

/// Top level structure of `config.yaml`
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    // run the sweeps, otherwise only keep the existing datasets for plotting
    #[serde(default = "default_true")]
    pub experiment: bool,
    // repetitions per configuration, overridden by `--reps`
    #[serde(default = "default_reps")]
    pub reps: usize,
    // execution mode every experiment is built and labelled with
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub threads: PerAlgorithm<usize>,
    // memory limit in MB handed to `-m`
    #[serde(default)]
    pub memory: PerAlgorithm<u32>,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// How to invoke the benchmark binary
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_exec")]
    pub exec: PathBuf,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    // seconds per trial, 0 disables the timeout
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// How to (re)compile the benchmark binary
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_workdir")]
    pub dir: PathBuf,
    #[serde(default = "default_make")]
    pub make: PathBuf,
    // build with SGX_DEBUG=1 SGX_PRERELEASE=0
    #[serde(default)]
    pub debug: bool,
}

/// A value that is either shared by all algorithms or given per algorithm
///
/// ```yaml
/// threads: 4
/// memory: {CrkJoin: 275, RHO: 100}
/// ```
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum PerAlgorithm<T> {
    Uniform(T),
    PerAlgorithm(BTreeMap<String, T>),
}

impl<T> Default for PerAlgorithm<T> {
    fn default() -> Self {
        Self::PerAlgorithm(BTreeMap::new())
    }
}

impl<T: Copy> PerAlgorithm<T> {
    pub fn get(&self, alg: &str, default: T) -> T {
        match self {
            Self::Uniform(value) => *value,
            Self::PerAlgorithm(values) => values.get(alg).copied().unwrap_or(default),
        }
    }
}

impl AppConfig {
    /// path the benchmark is spawned with
    ///
    /// a relative path with a directory part is resolved against `workdir`, bare names are
    /// left to the PATH lookup of the spawn
    pub fn exec_path(&self) -> PathBuf {
        if !self.exec.is_relative() || self.exec.components().count() < 2 {
            return self.exec.clone();
        }

        let exec = self.workdir.join(&self.exec);
        if exec.is_relative() {
            match env::current_dir() {
                Ok(cwd) => cwd.join(exec),
                Err(_) => exec,
            }
        } else {
            exec
        }
    }

    /// the file that will actually run, bare names are searched in PATH
    pub fn locate_exec(&self) -> Option<PathBuf> {
        let exec = self.exec_path();
        if exec.components().count() > 1 {
            return Some(exec);
        }

        env::var_os("PATH").and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(&exec))
                .find(|candidate| candidate.is_file())
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exec: default_exec(),
            workdir: default_workdir(),
            timeout: default_timeout(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_workdir(),
            make: default_make(),
            debug: false,
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            experiment: true,
            reps: default_reps(),
            mode: Mode::default(),
            threads: PerAlgorithm::default(),
            memory: PerAlgorithm::default(),
            app: AppConfig::default(),
            build: BuildConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn threads(&self, alg: &str) -> usize {
        self.threads.get(alg, 1)
    }

    pub fn memory(&self, alg: &str) -> u32 {
        self.memory.get(alg, 0)
    }

    /// Check everything that can be checked before a subprocess is spawned
    ///
    /// returns true if any error was found; every problem is logged, not only the first one
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.reps == 0 {
            error!("reps must be at least 1");
            contains_error = true;
        }

        if let PerAlgorithm::Uniform(0) = self.threads {
            error!("threads cannot be 0");
            contains_error = true;
        }
        if let PerAlgorithm::PerAlgorithm(threads) = &self.threads {
            for (alg, _) in threads.iter().filter(|(_, threads)| **threads == 0) {
                error!("threads.{alg} cannot be 0");
                contains_error = true;
            }
        }

        if !self.app.workdir.is_dir() {
            error!(
                "app.workdir {} is not a directory",
                self.app.workdir.to_string_lossy()
            );
            contains_error = true;
        }

        if !self.build.enabled {
            // nothing will produce the binary for us, so it has to be there already
            match self.app.locate_exec().map(|exec| (check_executable(&exec), exec)) {
                None => {
                    error!(
                        "app.exec {} is not in PATH and build.enabled is false",
                        self.app.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
                Some((Ok(true), _)) => {}
                Some((Ok(false), exec)) => {
                    error!(
                        "app.exec {} is not executable and build.enabled is false",
                        exec.to_string_lossy()
                    );
                    contains_error = true;
                }
                Some((Err(e), _)) => {
                    error!("app.exec cannot be used: {e}");
                    contains_error = true;
                }
            }
        } else if !self.build.dir.is_dir() {
            error!(
                "build.dir {} is not a directory",
                self.build.dir.to_string_lossy()
            );
            contains_error = true;
        }

        if self.app.timeout == 0 {
            warn!("app.timeout is 0, a hanging benchmark will block the sweep forever");
        }

        if let Err(e) = fs::create_dir_all(&self.data_dir) {
            error!(
                "Failed to create data_dir {}: {e}",
                self.data_dir.to_string_lossy()
            );
            contains_error = true;
        }

        contains_error
    }
}

fn default_true() -> bool {
    true
}

fn default_reps() -> usize {
    1
}

fn default_exec() -> PathBuf {
    PathBuf::from("./app")
}

fn default_workdir() -> PathBuf {
    PathBuf::from("..")
}

fn default_make() -> PathBuf {
    PathBuf::from("make")
}

fn default_timeout() -> u64 {
    // 15 minutes per trial
    15 * 60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
