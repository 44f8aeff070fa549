use crate::config::BuildConfig;
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const DEFAULT_ENCLAVE: &str = "Enclave/Enclave.config.xml";

/// enclave configuration with `gb` gigabytes of enclave memory
pub fn enclave(gb: u32) -> PathBuf {
    PathBuf::from(format!("Enclave/Enclave{gb}GB.config.xml"))
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to spawn {make}: {source}")]
    Spawn {
        make: String,
        #[source]
        source: io::Error,
    },
    #[error("`make {args}` failed with {code:?}: {stderr}")]
    Failed {
        args: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Execution mode of the benchmark binary, decides the make target and extra defines
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Native,
    NativeMaterialize,
    #[default]
    Sgx,
    SgxMaterialize,
    SgxSeal,
    SgxChunkBuffer,
    SgxAffinity,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::NativeMaterialize => "native-materialize",
            Self::Sgx => "sgx",
            Self::SgxMaterialize => "sgx-materialize",
            Self::SgxSeal => "sgx-seal",
            Self::SgxChunkBuffer => "sgx-chunk-buffer",
            Self::SgxAffinity => "sgx-affinity",
        }
    }

    /// make target, every sgx variant builds the `sgx` target
    pub fn target(&self) -> &'static str {
        match self {
            Self::Native | Self::NativeMaterialize => "native",
            _ => "sgx",
        }
    }

    pub fn defines(&self) -> &'static [&'static str] {
        match self {
            Self::Native => &["NATIVE_COMPILATION"],
            Self::NativeMaterialize => &["NATIVE_COMPILATION", "JOIN_MATERIALIZE"],
            Self::Sgx => &[],
            Self::SgxMaterialize | Self::SgxSeal | Self::SgxChunkBuffer => &["JOIN_MATERIALIZE"],
            Self::SgxAffinity => &["THREAD_AFFINITY"],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program variant linked into the benchmark binary (`APP=`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Application {
    #[default]
    TeeBench,
    MultiQuery,
    Tpch,
}

impl Application {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeeBench => "TEE_BENCH",
            Self::MultiQuery => "MULTI_QUERY",
            Self::Tpch => "TPCH",
        }
    }
}

/// Everything that goes into one compilation of the benchmark binary
///
/// Two equal configurations produce the same binary, the sweep only rebuilds when the
/// configuration changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub mode: Mode,
    pub enclave: Option<PathBuf>,
    pub application: Application,
    pub flags: Vec<String>,
    pub debug: bool,
}

impl BuildConfiguration {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            enclave: None,
            application: Application::default(),
            flags: Vec::new(),
            debug: false,
        }
    }

    pub fn enclave(mut self, enclave: impl Into<PathBuf>) -> Self {
        self.enclave = Some(enclave.into());
        self
    }

    pub fn application(mut self, application: Application) -> Self {
        self.application = application;
        self
    }

    /// extra preprocessor define, passed as `-D<flag>`
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn make_args(&self) -> Vec<String> {
        let mut args = vec!["-B".to_string(), self.mode.target().to_string()];

        if self.debug {
            args.push("SGX_DEBUG=1".to_string());
            args.push("SGX_PRERELEASE=0".to_string());
        }

        let enclave = self
            .enclave
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_ENCLAVE));
        args.push(format!("CONFIG={}", enclave.display()));
        args.push(format!("APP={}", self.application.as_str()));

        let cflags = self
            .mode
            .defines()
            .iter()
            .copied()
            .chain(self.flags.iter().map(String::as_str))
            .map(|define| format!("-D{define}"))
            .collect::<Vec<_>>()
            .join(" ");
        args.push(format!("CFLAGS={cflags}"));

        args
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.make_args().join(" "))
    }
}

/// Anything that can produce the benchmark binary for a build configuration
pub trait Builder {
    fn build(&mut self, config: &BuildConfiguration) -> Result<(), BuildError>;
}

impl<B: Builder + ?Sized> Builder for &mut B {
    fn build(&mut self, config: &BuildConfiguration) -> Result<(), BuildError> {
        (**self).build(config)
    }
}

/// Runs `make clean` followed by a forced `make` in the build directory
#[derive(Debug, Clone)]
pub struct MakeBuilder {
    make: PathBuf,
    dir: PathBuf,
}

impl MakeBuilder {
    pub fn new(make: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            make: make.into(),
            dir: dir.into(),
        }
    }

    fn make(&self, args: &[String]) -> Result<(), BuildError> {
        debug!("Running {} {} in {}", self.make.display(), args.join(" "), self.dir.display());

        let output = Command::new(&self.make)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BuildError::Spawn {
                make: self.make.to_string_lossy().into_owned(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(BuildError::Failed {
                args: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

impl Builder for MakeBuilder {
    #[instrument(skip(self, config), fields(mode = %config.mode))]
    fn build(&mut self, config: &BuildConfiguration) -> Result<(), BuildError> {
        let start = Instant::now();

        info!("Make clean");
        self.make(&["clean".to_string()])?;

        info!("Make {config}");
        self.make(&config.make_args())?;

        info!("Build finished in {:?}", start.elapsed());
        Ok(())
    }
}

/// Builders selectable from the config
#[derive(Debug, Clone)]
pub enum Builders {
    Make(MakeBuilder),
    /// the binary is managed outside of the runner, builds are only logged
    Prebuilt,
}

impl Builders {
    pub fn load(config: &BuildConfig) -> Self {
        if config.enabled {
            Self::Make(MakeBuilder::new(config.make.clone(), config.dir.clone()))
        } else {
            Self::Prebuilt
        }
    }
}

impl Builder for Builders {
    fn build(&mut self, config: &BuildConfiguration) -> Result<(), BuildError> {
        match self {
            Self::Make(make) => make.build(config),
            Self::Prebuilt => {
                info!("Builds are disabled, assuming the binary matches `{config}`");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};

    #[test]
    fn default_sgx_build() {
        let config = BuildConfiguration::new(Mode::Sgx);

        assert_eq!(
            config.make_args(),
            ["-B", "sgx", "CONFIG=Enclave/Enclave.config.xml", "APP=TEE_BENCH", "CFLAGS="]
        );
    }

    #[test]
    fn debug_build_with_flags() {
        let config = BuildConfiguration::new(Mode::SgxAffinity)
            .enclave(enclave(4))
            .application(Application::Tpch)
            .flag("MEASURE_PARTITIONS")
            .debug(true);

        assert_eq!(
            config.to_string(),
            "-B sgx SGX_DEBUG=1 SGX_PRERELEASE=0 CONFIG=Enclave/Enclave4GB.config.xml APP=TPCH \
             CFLAGS=-DTHREAD_AFFINITY -DMEASURE_PARTITIONS"
        );
    }

    #[test]
    fn native_modes_use_native_target() {
        let config = BuildConfiguration::new(Mode::NativeMaterialize);

        assert_eq!(config.make_args()[1], "native");
        assert_eq!(
            config.make_args().last().unwrap(),
            "CFLAGS=-DNATIVE_COMPILATION -DJOIN_MATERIALIZE"
        );
        assert_eq!(Mode::SgxChunkBuffer.target(), "sgx");
    }

    #[test]
    fn mode_names_match_config_values() {
        for mode in [
            Mode::Native,
            Mode::NativeMaterialize,
            Mode::Sgx,
            Mode::SgxMaterialize,
            Mode::SgxSeal,
            Mode::SgxChunkBuffer,
            Mode::SgxAffinity,
        ] {
            let parsed: Mode = serde_yaml::from_str(mode.as_str()).unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn make_builder_cleans_then_builds() {
        let dir = tempfile::tempdir().unwrap();
        let make = dir.path().join("make");
        fs::write(&make, "#!/bin/sh\necho \"$*\" >> make.log\n").unwrap();
        fs::set_permissions(&make, fs::Permissions::from_mode(0o755)).unwrap();

        let mut builder = MakeBuilder::new(&make, dir.path());
        builder
            .build(&BuildConfiguration::new(Mode::Native).enclave(enclave(8)))
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("make.log")).unwrap(),
            "clean\n-B native CONFIG=Enclave/Enclave8GB.config.xml APP=TEE_BENCH \
             CFLAGS=-DNATIVE_COMPILATION\n"
        );
    }

    #[test]
    fn failing_make() {
        let dir = tempfile::tempdir().unwrap();
        let make = dir.path().join("make");
        fs::write(&make, "#!/bin/sh\n[ \"$1\" = clean ] || { echo missing sdk >&2; exit 2; }\n")
            .unwrap();
        fs::set_permissions(&make, fs::Permissions::from_mode(0o755)).unwrap();

        let result = MakeBuilder::new(&make, dir.path()).build(&BuildConfiguration::new(Mode::Sgx));

        match result {
            Err(BuildError::Failed { code, stderr, .. }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "missing sdk\n");
            }
            other => panic!("expected a failed build, got {other:?}"),
        }
    }
}
