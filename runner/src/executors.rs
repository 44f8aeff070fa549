mod local;

pub use local::LocalExecutor;

use crate::ingest::RunOutput;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn {exec}: {source}")]
    Spawn {
        exec: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for a child proccess")]
    ChildError(#[from] io::Error),
    #[error("Benchmark exited with {}", describe_exit(.code))]
    Failure {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("Benchmark timed out after {0:?}")]
    Timeout(Duration),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

/// Anything that can run the benchmark binary with a list of arguments
///
/// Implementations block until the child is done; a zero exit returns the captured output,
/// everything else is an `ExecutorError`.
pub trait Executor {
    fn execute(&mut self, args: &[String]) -> Result<RunOutput, ExecutorError>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn execute(&mut self, args: &[String]) -> Result<RunOutput, ExecutorError> {
        (**self).execute(args)
    }
}
