use super::{Executor, ExecutorError};
use crate::{config::AppConfig, ingest::RunOutput};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, instrument, trace, warn};
use wait_timeout::ChildExt;

/// Executor that runs the benchmark binary as a direct child of this process
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    exec: PathBuf,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl LocalExecutor {
    pub fn new(exec: impl Into<PathBuf>, workdir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            exec: exec.into(),
            workdir: workdir.into(),
            timeout,
        }
    }

    /// create a new LocalExecutor from the `app` section of the config
    pub fn load(config: &AppConfig) -> Self {
        let timeout = (config.timeout > 0).then(|| Duration::from_secs(config.timeout));

        Self::new(config.exec_path(), config.workdir.clone(), timeout)
    }

    pub fn exec(&self) -> &Path {
        &self.exec
    }
}

/// read a child pipe to the end on a helper thread so the child never blocks on a full pipe
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();

        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    })
}

fn collect(handle: JoinHandle<io::Result<String>>) -> Result<String, ExecutorError> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(ExecutorError::ChildError(io::Error::new(
            io::ErrorKind::Other,
            "output reader thread panicked",
        ))),
    }
}

impl Executor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    fn execute(&mut self, args: &[String]) -> Result<RunOutput, ExecutorError> {
        debug!(
            "Running {} {} in {}",
            self.exec.display(),
            args.join(" "),
            self.workdir.display()
        );

        let start = Instant::now();
        let mut child = Command::new(&self.exec)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                exec: self.exec.to_string_lossy().into_owned(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    // child hasn't exited yet
                    warn!("Benchmark exceeded {timeout:?}, killing pid {}", child.id());
                    child.kill()?;
                    child.wait()?;

                    // grandchildren may still hold the pipes open, leave the readers detached
                    drop(stdout);
                    drop(stderr);

                    return Err(ExecutorError::Timeout(timeout));
                }
            },
            None => child.wait()?,
        };

        let elapsed = start.elapsed();
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        debug!(
            "Finished in {} ns | status: {}",
            elapsed.as_nanos(),
            status.success()
        );
        trace!("Output: {stdout}");

        if !status.success() {
            return Err(ExecutorError::Failure {
                code: status.code(),
                stdout,
                stderr,
            });
        }

        Ok(RunOutput {
            runtime: elapsed.as_nanos(),
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn captures_stdout_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let exec = script(&dir, "app", r#"echo "args: $*""#);
        let mut executor = LocalExecutor::new(exec, dir.path(), None);

        let output = executor.execute(&args(&["-a", "CRKJ", "-n", "2"])).unwrap();

        assert_eq!(output.stdout, "args: -a CRKJ -n 2\n");
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn runs_inside_workdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let exec = script(&dir, "app", "cat marker.txt");
        let mut executor = LocalExecutor::new(exec, dir.path(), Some(Duration::from_secs(10)));

        assert_eq!(executor.execute(&[]).unwrap().stdout, "here");
    }

    #[test]
    fn non_zero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = script(&dir, "app", "echo partial; echo broken >&2; exit 3");
        let mut executor = LocalExecutor::new(exec, dir.path(), None);

        match executor.execute(&[]) {
            Err(ExecutorError::Failure {
                code,
                stdout,
                stderr,
            }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stdout, "partial\n");
                assert_eq!(stderr, "broken\n");
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn slow_child_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let exec = script(&dir, "app", "echo started; exec sleep 30");
        let mut executor =
            LocalExecutor::new(exec, dir.path(), Some(Duration::from_millis(200)));
        let start = Instant::now();

        let result = executor.execute(&[]);

        assert!(matches!(result, Err(ExecutorError::Timeout(_))), "{result:?}");
        assert!(start.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn large_output_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        // well above the usual 64 KiB pipe buffer
        let exec = script(
            &dir,
            "app",
            "i=0; while [ $i -lt 20000 ]; do echo \"TimerPerPartition : $i,$i,$i\"; i=$((i+1)); done",
        );
        let mut executor = LocalExecutor::new(exec, dir.path(), Some(Duration::from_secs(60)));

        let output = executor.execute(&[]).unwrap();

        assert_eq!(output.stdout.lines().count(), 20000);
    }

    #[test]
    fn missing_binary_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = LocalExecutor::new(dir.path().join("nope"), dir.path(), None);

        assert!(matches!(
            executor.execute(&[]),
            Err(ExecutorError::Spawn { .. })
        ));
    }

    #[test]
    fn load_resolves_relative_exec_against_workdir() {
        let config = AppConfig {
            exec: PathBuf::from("./app"),
            workdir: PathBuf::from("/opt/teebench"),
            timeout: 0,
        };
        let executor = LocalExecutor::load(&config);

        assert_eq!(executor.exec(), Path::new("/opt/teebench/./app"));
        assert_eq!(executor.timeout, None);
    }
}
